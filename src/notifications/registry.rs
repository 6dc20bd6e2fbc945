//! Registration storage shared by the synchronous and asynchronous hubs.
//!
//! The registry itself is not synchronised; each hub wraps it in the lock
//! that suits its execution model.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::notifications::events::{SubscriptionId, SubscriptionToken};

/// One handler registered under one kind
pub(crate) struct Registration<K, H: ?Sized> {
    pub(crate) token: SubscriptionToken<K>,
    pub(crate) handler: Arc<H>,
    pub(crate) once: bool,
}

impl<K: Clone, H: ?Sized> Clone for Registration<K, H> {
    fn clone(&self) -> Self {
        Self {
            token: self.token.clone(),
            handler: Arc::clone(&self.handler),
            once: self.once,
        }
    }
}

/// Issues subscription ids, starting at 1
#[derive(Debug)]
pub(crate) struct TokenSequence(AtomicU64);

impl TokenSequence {
    pub(crate) fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub(crate) fn next(&self) -> SubscriptionId {
        SubscriptionId::new(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TokenSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered registrations keyed by event kind
///
/// A kind with no registrations has no entry.
pub(crate) struct Registry<K, H: ?Sized> {
    entries: HashMap<K, Vec<Registration<K, H>>>,
}

impl<K, H> Registry<K, H>
where
    K: Eq + Hash + Clone,
    H: ?Sized,
{
    pub(crate) fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Append a registration after every existing one for its kind
    pub(crate) fn insert(&mut self, token: SubscriptionToken<K>, handler: Arc<H>, once: bool) {
        self.entries
            .entry(token.kind().clone())
            .or_default()
            .push(Registration { token, handler, once });
    }

    /// Remove exactly the registration named by `token`
    pub(crate) fn remove(&mut self, token: &SubscriptionToken<K>) -> bool {
        let Some(list) = self.entries.get_mut(token.kind()) else {
            return false;
        };
        let Some(position) = list.iter().position(|r| r.token.id() == token.id()) else {
            return false;
        };
        list.remove(position);
        if list.is_empty() {
            self.entries.remove(token.kind());
        }
        true
    }

    /// Copy the current registrations for `kind`, consuming once-registrations
    pub(crate) fn take_snapshot<Q>(&mut self, kind: &Q) -> Vec<Registration<K, H>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(list) = self.entries.get_mut(kind) else {
            return Vec::new();
        };
        let snapshot = list.clone();
        if snapshot.iter().any(|r| r.once) {
            list.retain(|r| !r.once);
            if list.is_empty() {
                self.entries.remove(kind);
            }
        }
        snapshot
    }

    /// Remove every registration for `kind`, returning how many were removed
    pub(crate) fn clear_kind<Q>(&mut self, kind: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(kind).map_or(0, |list| list.len())
    }

    /// Remove everything, returning how many registrations were removed
    pub(crate) fn clear_all(&mut self) -> usize {
        let removed = self.total();
        self.entries.clear();
        removed
    }

    pub(crate) fn count<Q>(&self, kind: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(kind).map_or(0, Vec::len)
    }

    pub(crate) fn total(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub(crate) fn contains(&self, token: &SubscriptionToken<K>) -> bool {
        self.entries
            .get(token.kind())
            .is_some_and(|list| list.iter().any(|r| r.token.id() == token.id()))
    }

    pub(crate) fn kinds(&self) -> Vec<K> {
        self.entries.keys().cloned().collect()
    }
}

impl<K, H> Default for Registry<K, H>
where
    K: Eq + Hash + Clone,
    H: ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}
