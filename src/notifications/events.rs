//! Event Kinds and Subscription Tokens
//!
//! Identifiers that flow through the hub: the kind an event is published
//! under, and the token that names a single registration.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::notifications::error::{NotificationError, NotificationResult};

/// Name of a category of occurrence
///
/// Cloning is cheap; the name is shared behind an `Arc<str>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKind(Arc<str>);

impl EventKind {
    /// Create an event kind from any string
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Parse an event kind from untrusted input, trimming whitespace
    pub fn parse(name: &str) -> NotificationResult<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(NotificationError::EmptyEventKind);
        }
        Ok(Self(Arc::from(trimmed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        Self(Arc::from(name))
    }
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl AsRef<str> for EventKind {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for EventKind {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        EventKind::parse(&name).map_err(serde::de::Error::custom)
    }
}

/// Hub-unique number assigned to every registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle for one registration, returned by `subscribe`
///
/// Two registrations of the same handler get two distinct tokens, so either
/// can be removed without touching the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionToken<K = EventKind> {
    id: SubscriptionId,
    kind: K,
}

impl<K> SubscriptionToken<K> {
    pub(crate) fn new(id: SubscriptionId, kind: K) -> Self {
        Self { id, kind }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The kind this registration was made under
    pub fn kind(&self) -> &K {
        &self.kind
    }
}

impl<K: fmt::Display> fmt::Display for SubscriptionToken<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.kind)
    }
}
