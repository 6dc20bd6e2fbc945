//! Handler Traits
//!
//! Single-method capabilities implemented by anything that wants to receive
//! published payloads, plus the counters the hubs keep about deliveries.

use async_trait::async_trait;
use serde::Serialize;

use crate::notifications::error::HandlerResult;

/// Name reported for handlers that do not supply one
pub const ANONYMOUS_HANDLER: &str = "anonymous";

/// Synchronous handler for payloads of type `P`
pub trait Handler<P>: Send + Sync {
    /// Handle one published payload
    fn handle(&self, payload: &P) -> HandlerResult;

    /// Display name used in dispatch reports and logs
    fn name(&self) -> &str {
        ANONYMOUS_HANDLER
    }
}

/// Asynchronous handler for payloads of type `P`
#[async_trait]
pub trait AsyncHandler<P>: Send + Sync
where
    P: Sync,
{
    /// Handle one published payload
    async fn handle(&self, payload: &P) -> HandlerResult;

    /// Display name used in dispatch reports and logs
    fn name(&self) -> &str {
        ANONYMOUS_HANDLER
    }
}

/// Adapts a closure into a [`Handler`]
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self::named(ANONYMOUS_HANDLER, f)
    }

    pub fn named(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<P, F> Handler<P> for FnHandler<F>
where
    F: Fn(&P) -> HandlerResult + Send + Sync,
{
    fn handle(&self, payload: &P) -> HandlerResult {
        (self.f)(payload)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Statistics about notification delivery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    /// Total publish calls
    pub events_published: u64,

    /// Publish calls that found no handlers
    pub empty_publishes: u64,

    /// Total handler invocations
    pub handlers_invoked: u64,

    /// Invocations that failed, panics included
    pub handler_failures: u64,

    /// Invocations that panicked
    pub handler_panics: u64,
}

impl DeliveryStats {
    /// Invocations that completed without failure
    pub fn handler_successes(&self) -> u64 {
        self.handlers_invoked - self.handler_failures
    }
}
