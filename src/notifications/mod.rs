//! Generic Pub/Sub Notification Hub
//!
//! Decouples producers of occurrences from the components that react to
//! them. Handlers register under an event kind; publishing a payload under
//! that kind invokes each of them in registration order.
//!
//! # Guarantees
//!
//! - Handlers run in the order they were registered.
//! - Each registration has its own [`SubscriptionToken`]; removing one never
//!   disturbs the others.
//! - A failing or panicking handler is recorded in the [`DispatchReport`] and
//!   the remaining handlers still run. `publish` itself never fails.
//! - The handler set of a dispatch is fixed when `publish` starts; handlers may
//!   subscribe, unsubscribe or publish re-entrantly without affecting it.
//! - Publishing a kind nobody listens to yields an empty report.
//!
//! # Example Usage
//!
//! ```
//! use notihub::notifications::{HandlerFailure, NotificationHub};
//! use std::sync::{Arc, Mutex};
//!
//! let hub = NotificationHub::<String>::new();
//! let log = Arc::new(Mutex::new(Vec::new()));
//!
//! let seen = Arc::clone(&log);
//! hub.subscribe_fn("x", move |payload: &String| {
//!     seen.lock().unwrap().push(payload.clone());
//!     Ok(())
//! });
//! hub.subscribe_fn("x", |_: &String| Err(HandlerFailure::failed("unavailable")));
//!
//! let report = hub.publish("x", &"hello".to_string());
//! assert_eq!(*log.lock().unwrap(), vec!["hello"]);
//! assert_eq!(report.success_count(), 1);
//! assert_eq!(report.failure_count(), 1);
//! ```

pub mod async_hub;
pub mod error;
pub mod events;
pub mod hub;
pub mod report;
pub mod traits;

mod registry;


pub use async_hub::AsyncNotificationHub;
pub use error::{HandlerFailure, HandlerResult, NotificationError, NotificationResult};
pub use events::{EventKind, SubscriptionId, SubscriptionToken};
pub use hub::{in_dispatch, NotificationHub};
pub use report::{DispatchReport, DispatchStatus, HandlerOutcome};
pub use traits::{AsyncHandler, DeliveryStats, FnHandler, Handler, ANONYMOUS_HANDLER};

include!(concat!(env!("OUT_DIR"), "/version_api.rs"));

/// Module metadata
pub const MODULE_NAME: &str = "Notification Hub";
pub const MODULE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get notification system information
pub fn get_system_info() -> String {
    format!(
        "{} v{} (api {}) - in-process pub/sub with isolated dispatch",
        MODULE_NAME,
        MODULE_VERSION,
        HUB_API_VERSION
    )
}
