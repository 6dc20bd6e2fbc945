//! Synchronous Notification Hub
//!
//! Thread-safe registry of handlers keyed by event kind. `publish` runs the
//! handlers on the calling thread, in registration order, with no hub lock
//! held, so handlers may freely call back into the hub.

use std::borrow::Borrow;
use std::cell::Cell;
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use log::{debug, error, trace, warn};
use parking_lot::{Mutex, RwLock};

use crate::notifications::error::{HandlerFailure, HandlerResult};
use crate::notifications::events::{EventKind, SubscriptionToken};
use crate::notifications::registry::{Registry, TokenSequence};
use crate::notifications::report::{DispatchReport, DispatchStatus, HandlerOutcome};
use crate::notifications::traits::{DeliveryStats, FnHandler, Handler};

/// In-process publish/subscribe hub with synchronous handlers
///
/// Clones share the same registrations and statistics.
pub struct NotificationHub<P, K = EventKind> {
    registry: Arc<RwLock<Registry<K, dyn Handler<P>>>>,
    sequence: Arc<TokenSequence>,
    stats: Arc<Mutex<DeliveryStats>>,
}

impl<P, K> NotificationHub<P, K>
where
    P: 'static,
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Create an empty hub
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::new())),
            sequence: Arc::new(TokenSequence::new()),
            stats: Arc::new(Mutex::new(DeliveryStats::default())),
        }
    }

    /// Register `handler` after every existing handler for `kind`
    pub fn subscribe(&self, kind: impl Into<K>, handler: Arc<dyn Handler<P>>) -> SubscriptionToken<K> {
        self.register(kind.into(), handler, false)
    }

    /// Register a closure as an anonymous handler
    pub fn subscribe_fn<F>(&self, kind: impl Into<K>, f: F) -> SubscriptionToken<K>
    where
        F: Fn(&P) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(kind.into(), Arc::new(FnHandler::new(f)), false)
    }

    /// Register `handler` for the next publish of `kind` only
    pub fn subscribe_once(&self, kind: impl Into<K>, handler: Arc<dyn Handler<P>>) -> SubscriptionToken<K> {
        self.register(kind.into(), handler, true)
    }

    fn register(&self, kind: K, handler: Arc<dyn Handler<P>>, once: bool) -> SubscriptionToken<K> {
        let token = SubscriptionToken::new(self.sequence.next(), kind);
        debug!("Subscribed '{}' to {:?} as {}{}",
               handler.name(), token.kind(), token.id(), if once { " (once)" } else { "" });
        self.registry.write().insert(token.clone(), handler, once);
        token
    }

    /// Remove the registration named by `token`
    ///
    /// Unknown or already removed tokens are ignored. Returns whether a
    /// registration was removed.
    pub fn unsubscribe(&self, token: &SubscriptionToken<K>) -> bool {
        let removed = self.registry.write().remove(token);
        if removed {
            debug!("Unsubscribed {} from {:?}", token.id(), token.kind());
        } else {
            trace!("Ignoring unsubscribe of unknown token {}", token.id());
        }
        removed
    }

    /// Invoke every handler registered for `kind` with `payload`
    ///
    /// The handler set is fixed when the call starts. Failures and panics are
    /// captured per handler and never stop the remaining handlers.
    pub fn publish(&self, kind: impl Into<K>, payload: &P) -> DispatchReport<K> {
        let kind = kind.into();
        let snapshot = self.registry.write().take_snapshot(&kind);
        let mut report = DispatchReport::with_capacity(kind, snapshot.len());

        if snapshot.is_empty() {
            trace!("No handlers registered for {:?}", report.kind());
            self.record(&report);
            return report;
        }

        let start_time = Instant::now();
        for (index, registration) in snapshot.into_iter().enumerate() {
            let handler = registration.handler;
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                let _guard = DispatchGuard::enter();
                handler.handle(payload)
            }));
            let status = settle(handler.name(), result);
            report.push(HandlerOutcome {
                index,
                token: registration.token,
                handler: handler.name().to_string(),
                status,
            });
        }

        self.record(&report);
        debug!("Published {:?} to {} handlers ({} successful, {} failed) in {:?}",
               report.kind(), report.len(), report.success_count(), report.failure_count(),
               start_time.elapsed());
        report
    }

    /// Remove all registrations for `kind`, or every registration when `None`
    pub fn clear(&self, kind: Option<K>) {
        let mut registry = self.registry.write();
        match kind {
            Some(kind) => {
                let removed = registry.clear_kind(&kind);
                debug!("Cleared {} registrations for {:?}", removed, kind);
            }
            None => {
                let removed = registry.clear_all();
                debug!("Cleared all {} registrations", removed);
            }
        }
    }

    /// Number of handlers currently registered for `kind`
    pub fn subscriber_count<Q>(&self, kind: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.registry.read().count(kind)
    }

    pub fn total_subscriptions(&self) -> usize {
        self.registry.read().total()
    }

    pub fn has_subscription(&self, token: &SubscriptionToken<K>) -> bool {
        self.registry.read().contains(token)
    }

    /// Kinds that currently have at least one handler, in no particular order
    pub fn kinds(&self) -> Vec<K> {
        self.registry.read().kinds()
    }

    pub fn is_empty(&self) -> bool {
        self.total_subscriptions() == 0
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats.lock().clone()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = DeliveryStats::default();
    }

    fn record(&self, report: &DispatchReport<K>) {
        let mut stats = self.stats.lock();
        stats.events_published += 1;
        if report.is_empty() {
            stats.empty_publishes += 1;
        }
        stats.handlers_invoked += report.len() as u64;
        stats.handler_failures += report.failure_count() as u64;
        stats.handler_panics += report.panic_count() as u64;
    }
}

thread_local! {
    static DISPATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as running a handler until dropped
pub(crate) struct DispatchGuard(());

impl DispatchGuard {
    pub(crate) fn enter() -> Self {
        DISPATCH_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self(())
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCH_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Whether the current thread is inside a handler invoked by either hub
///
/// Panic hooks use this to tell captured handler panics from real ones.
pub fn in_dispatch() -> bool {
    DISPATCH_DEPTH.with(|depth| depth.get() > 0)
}

/// Turn the result of one guarded invocation into a dispatch status
pub(crate) fn settle(
    handler_name: &str,
    result: std::thread::Result<HandlerResult>,
) -> DispatchStatus {
    match result {
        Ok(Ok(())) => DispatchStatus::Succeeded,
        Ok(Err(failure)) => {
            warn!("Handler '{}' failed: {}", handler_name, failure);
            DispatchStatus::Failed(failure)
        }
        Err(panic_payload) => {
            let failure = HandlerFailure::from_panic(panic_payload);
            error!("Handler '{}' panicked: {}", handler_name, failure.message());
            DispatchStatus::Failed(failure)
        }
    }
}

impl<P, K> Default for NotificationHub<P, K>
where
    P: 'static,
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P, K> Clone for NotificationHub<P, K> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            sequence: Arc::clone(&self.sequence),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<P, K> fmt::Debug for NotificationHub<P, K>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationHub")
            .field("subscriptions", &self.registry.try_read().map(|registry| registry.total()))
            .field("stats", &*self.stats.lock())
            .finish()
    }
}
