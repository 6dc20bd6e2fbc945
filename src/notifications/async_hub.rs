//! Generic Async Notification Hub
//!
//! Counterpart of [`NotificationHub`](crate::notifications::NotificationHub)
//! for tokio programs. Handlers are awaited one after another in registration
//! order; the registry lock is released before the first handler is awaited.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use futures::future::{self, FutureExt};
use log::{debug, trace};
use tokio::sync::RwLock;

use crate::notifications::events::{EventKind, SubscriptionToken};
use crate::notifications::hub::{settle, DispatchGuard};
use crate::notifications::registry::{Registry, TokenSequence};
use crate::notifications::report::{DispatchReport, HandlerOutcome};
use crate::notifications::traits::{AsyncHandler, DeliveryStats};

/// In-process publish/subscribe hub with asynchronous handlers
pub struct AsyncNotificationHub<P, K = EventKind>
where
    P: Sync,
{
    registry: Arc<RwLock<Registry<K, dyn AsyncHandler<P>>>>,
    sequence: Arc<TokenSequence>,
    stats: Arc<parking_lot::Mutex<DeliveryStats>>,
}

impl<P, K> AsyncNotificationHub<P, K>
where
    P: Send + Sync + 'static,
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::new())),
            sequence: Arc::new(TokenSequence::new()),
            stats: Arc::new(parking_lot::Mutex::new(DeliveryStats::default())),
        }
    }

    /// Register `handler` after every existing handler for `kind`
    pub async fn subscribe(&self, kind: impl Into<K>, handler: Arc<dyn AsyncHandler<P>>) -> SubscriptionToken<K> {
        self.register(kind.into(), handler, false).await
    }

    /// Register `handler` for the next publish of `kind` only
    pub async fn subscribe_once(&self, kind: impl Into<K>, handler: Arc<dyn AsyncHandler<P>>) -> SubscriptionToken<K> {
        self.register(kind.into(), handler, true).await
    }

    async fn register(&self, kind: K, handler: Arc<dyn AsyncHandler<P>>, once: bool) -> SubscriptionToken<K> {
        let token = SubscriptionToken::new(self.sequence.next(), kind);
        debug!("Subscribed '{}' to {:?} as {}{}",
               handler.name(), token.kind(), token.id(), if once { " (once)" } else { "" });
        self.registry.write().await.insert(token.clone(), handler, once);
        token
    }

    /// Remove the registration named by `token`; unknown tokens are ignored
    pub async fn unsubscribe(&self, token: &SubscriptionToken<K>) -> bool {
        let removed = self.registry.write().await.remove(token);
        if removed {
            debug!("Unsubscribed {} from {:?}", token.id(), token.kind());
        } else {
            trace!("Ignoring unsubscribe of unknown token {}", token.id());
        }
        removed
    }

    /// Await every handler registered for `kind` with `payload`
    pub async fn publish(&self, kind: impl Into<K>, payload: &P) -> DispatchReport<K> {
        let kind = kind.into();
        let snapshot = {
            let mut registry = self.registry.write().await;
            registry.take_snapshot(&kind)
        };
        let mut report = DispatchReport::with_capacity(kind, snapshot.len());

        if snapshot.is_empty() {
            trace!("No handlers registered for {:?}", report.kind());
            self.record(&report);
            return report;
        }

        let start_time = Instant::now();
        for (index, registration) in snapshot.into_iter().enumerate() {
            let handler = registration.handler;
            let mut invocation = AssertUnwindSafe(handler.handle(payload)).catch_unwind();
            let result = future::poll_fn(|cx| {
                let _guard = DispatchGuard::enter();
                invocation.poll_unpin(cx)
            })
            .await;
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
    pub async fn clear(&self, kind: Option<K>) {
        let mut registry = self.registry.write().await;
        let removed = match &kind {
            Some(kind) => registry.clear_kind(kind),
            None => registry.clear_all(),
        };
        debug!("Cleared {} registrations ({:?})", removed, kind);
    }

    pub async fn subscriber_count<Q>(&self, kind: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.registry.read().await.count(kind)
    }

    pub async fn total_subscriptions(&self) -> usize {
        self.registry.read().await.total()
    }

    pub async fn has_subscription(&self, token: &SubscriptionToken<K>) -> bool {
        self.registry.read().await.contains(token)
    }

    pub async fn kinds(&self) -> Vec<K> {
        self.registry.read().await.kinds()
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

impl<P, K> Default for AsyncNotificationHub<P, K>
where
    P: Send + Sync + 'static,
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P, K> Clone for AsyncNotificationHub<P, K>
where
    P: Sync,
{
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            sequence: Arc::clone(&self.sequence),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<P, K> fmt::Debug for AsyncNotificationHub<P, K>
where
    P: Sync,
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncNotificationHub")
            .field("subscriptions", &self.registry.try_read().ok().map(|registry| registry.total()))
            .field("stats", &*self.stats.lock())
            .finish()
    }
}
