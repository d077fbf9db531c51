//! Process-local gate store

use super::GateStore;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// In-memory [`GateStore`] with per-key expiry
///
/// Expired records are dropped when read and swept on every write. Only
/// meaningful when a single process serves every session; records do not
/// survive a restart.
#[derive(Default)]
pub struct MemoryGateStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryGateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GateStore for MemoryGateStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let expires_at = now + ttl;
        let mut entries = self.entries.lock().await;
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(key) {
            Some((_, expires_at)) => *expires_at <= Instant::now(),
            None => return Ok(None),
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
