//! Admission gate: a per-session busy/free flag in a shared TTL store
//!
//! The gate is a cooperative single-slot lock. Reading "available" and then
//! publishing "busy" are two independent round trips with nothing atomic
//! between them, so two submissions racing on the same session key can both
//! get through. A record that is never released disappears when its TTL
//! expires.

mod memory;
mod redis_store;

pub use memory::MemoryGateStore;
pub use redis_store::{RedisGateStore, canonical_value};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

/// Value published while a job holds the slot
pub const BUSY: &str = "busy";
/// Value published when a job releases the slot
pub const FREE: &str = "free";

/// Key/value store with per-key expiry backing the gate
#[async_trait]
pub trait GateStore: Send + Sync {
    /// Set `key` to `value`, expiring after `ttl` (SETEX)
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Fetch the canonical string form of `key`, `None` when absent (GET)
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Whether a session slot can take a new job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    /// No job holds the slot
    Available,
    /// A job holds the slot
    Occupied,
}

impl GateStatus {
    /// Classify a raw gate value: absent, `"free"` and `"0"` are available
    pub fn from_value(value: Option<&str>) -> Self {
        match value {
            None | Some(FREE) | Some("0") => GateStatus::Available,
            Some(_) => GateStatus::Occupied,
        }
    }

    /// True when the slot is free
    pub fn is_available(self) -> bool {
        self == GateStatus::Available
    }
}

/// Busy/free flag keyed by session, shared by every worker and web handler
#[derive(Clone)]
pub struct AdmissionGate {
    store: Arc<dyn GateStore>,
    ttl: Duration,
}

impl AdmissionGate {
    /// Create a gate over `store`; every record written lives for `ttl`
    pub fn new(store: Arc<dyn GateStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Write `value` for `key`; false when the store could not be reached
    pub async fn publish(&self, key: &str, value: &str) -> bool {
        match self.store.set_with_ttl(key, value, self.ttl).await {
            Ok(()) => {
                tracing::debug!(session_key = key, value, store = self.store.name(), "Gate published");
                true
            }
            Err(e) => {
                tracing::error!(
                    session_key = key,
                    value,
                    store = self.store.name(),
                    error = %e,
                    "Publishing to gate store failed"
                );
                false
            }
        }
    }

    /// Current value for `key`; a store failure reads as absent
    pub async fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => {
                tracing::debug!(session_key = key, value = ?value, "Gate read");
                value
            }
            Err(e) => {
                tracing::error!(
                    session_key = key,
                    store = self.store.name(),
                    error = %e,
                    "Reading from gate store failed"
                );
                None
            }
        }
    }

    /// Read `key` and apply the availability predicate
    pub async fn status(&self, key: &str) -> GateStatus {
        GateStatus::from_value(self.read(key).await.as_deref())
    }

    /// Record lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct UnreachableStore;

    #[async_trait]
    impl GateStore for UnreachableStore {
        async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(Error::Gate("connection refused".to_string()))
        }

        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::Gate("connection refused".to_string()))
        }

        fn name(&self) -> &'static str {
            "unreachable"
        }
    }

    fn memory_gate() -> AdmissionGate {
        AdmissionGate::new(Arc::new(MemoryGateStore::new()), Duration::from_secs(60))
    }

    #[test]
    fn test_availability_predicate() {
        assert_eq!(GateStatus::from_value(None), GateStatus::Available);
        assert_eq!(GateStatus::from_value(Some("free")), GateStatus::Available);
        assert_eq!(GateStatus::from_value(Some("0")), GateStatus::Available);
        assert_eq!(GateStatus::from_value(Some("busy")), GateStatus::Occupied);
        assert_eq!(GateStatus::from_value(Some("1")), GateStatus::Occupied);
        assert_eq!(GateStatus::from_value(Some("")), GateStatus::Occupied);
        assert_eq!(GateStatus::from_value(Some("FREE")), GateStatus::Occupied);
    }

    #[tokio::test]
    async fn test_busy_then_free() {
        let gate = memory_gate();
        let key = "session-1_youtube_download";

        assert!(gate.status(key).await.is_available());

        assert!(gate.publish(key, BUSY).await);
        assert_eq!(gate.read(key).await.as_deref(), Some("busy"));
        assert_eq!(gate.status(key).await, GateStatus::Occupied);

        assert!(gate.publish(key, FREE).await);
        assert!(gate.status(key).await.is_available());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let gate = memory_gate();
        assert!(gate.publish("a", BUSY).await);
        assert!(gate.status("b").await.is_available());
    }

    #[tokio::test]
    async fn test_unreachable_store() {
        let gate = AdmissionGate::new(Arc::new(UnreachableStore), Duration::from_secs(60));
        assert!(!gate.publish("a", BUSY).await);
        assert_eq!(gate.read("a").await, None);
        // A failed read looks like an empty slot
        assert!(gate.status("a").await.is_available());
    }

    #[tokio::test]
    async fn test_record_expires() {
        let gate = AdmissionGate::new(Arc::new(MemoryGateStore::new()), Duration::from_millis(20));
        assert!(gate.publish("a", BUSY).await);
        assert_eq!(gate.status("a").await, GateStatus::Occupied);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gate.status("a").await.is_available());
    }
}
