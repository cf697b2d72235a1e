//! Lease store: shared key-value coordination primitives
//!
//! Liveness leases, leader election, and the GC mutex are all built on
//! `insert_if_absent` with expiry. An expired key is absent for every
//! operation, so a lost lease can always be re-claimed by the next
//! caller.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use depot_common::DepotError;

/// Coordination store primitives
///
/// All methods are atomic with respect to each other per key; callers
/// rely on `insert_if_absent` as the single cluster-wide
/// mutual-exclusion device.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Insert `value` under `key` only if the key is absent (or its
    /// previous lease has expired). Returns whether the insert won.
    async fn insert_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, DepotError>;

    async fn get(&self, key: &str) -> Result<Option<String>, DepotError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DepotError>;

    async fn delete(&self, keys: &[&str]) -> Result<(), DepotError>;

    /// Insert a hash field only if absent. Returns whether the insert won.
    async fn hset_if_absent(&self, key: &str, field: &str, value: &str)
    -> Result<bool, DepotError>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, DepotError>;

    async fn hkeys(&self, key: &str) -> Result<Vec<String>, DepotError>;

    async fn hdel(&self, key: &str, fields: &[&str]) -> Result<(), DepotError>;
}

struct ValueEntry {
    value: String,
    stored_at: Instant,
    ttl: Option<Duration>,
}

impl ValueEntry {
    fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => self.stored_at.elapsed() > ttl,
            None => false,
        }
    }
}

/// In-memory lease store backed by DashMap with per-entry expiry
///
/// Hash maps carry no TTL; member liveness is expressed by separate
/// `node:<uid>` leases, not by the member map itself.
pub struct MemoryLeaseStore {
    values: Arc<DashMap<String, ValueEntry>>,
    hashes: Arc<DashMap<String, DashMap<String, String>>>,
}

impl Default for MemoryLeaseStore {
    fn default() -> Self {
        Self {
            values: Arc::new(DashMap::new()),
            hashes: Arc::new(DashMap::new()),
        }
    }
}

impl MemoryLeaseStore {
    /// Create the store and start the background expiry sweep task
    pub fn new() -> Self {
        let store = Self::default();

        let values = store.values.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                let expired: Vec<String> = values
                    .iter()
                    .filter(|entry| entry.value().is_expired())
                    .map(|entry| entry.key().clone())
                    .collect();
                for key in &expired {
                    values.remove(key);
                }
                if !expired.is_empty() {
                    debug!(count = expired.len(), "Swept expired lease entries");
                }
            }
        });

        store
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn insert_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, DepotError> {
        // Entry-level locking makes the check-then-insert atomic
        let mut won = false;
        let entry = self
            .values
            .entry(key.to_string())
            .and_modify(|existing| {
                if existing.is_expired() {
                    existing.value = value.to_string();
                    existing.stored_at = Instant::now();
                    existing.ttl = Some(ttl);
                    won = true;
                }
            });
        if let dashmap::Entry::Vacant(vacant) = entry {
            vacant.insert(ValueEntry {
                value: value.to_string(),
                stored_at: Instant::now(),
                ttl: Some(ttl),
            });
            won = true;
        }
        Ok(won)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, DepotError> {
        Ok(self
            .values
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DepotError> {
        self.values.insert(
            key.to_string(),
            ValueEntry {
                value: value.to_string(),
                stored_at: Instant::now(),
                ttl: Some(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> Result<(), DepotError> {
        for key in keys {
            self.values.remove(*key);
        }
        Ok(())
    }

    async fn hset_if_absent(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, DepotError> {
        let hash = self.hashes.entry(key.to_string()).or_default();
        let mut inserted = false;
        hash.entry(field.to_string()).or_insert_with(|| {
            inserted = true;
            value.to_string()
        });
        Ok(inserted)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, DepotError> {
        Ok(self
            .hashes
            .get(key)
            .map(|hash| {
                hash.iter()
                    .map(|entry| (entry.key().clone(), entry.value().clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>, DepotError> {
        Ok(self
            .hashes
            .get(key)
            .map(|hash| hash.iter().map(|entry| entry.key().clone()).collect())
            .unwrap_or_default())
    }

    async fn hdel(&self, key: &str, fields: &[&str]) -> Result<(), DepotError> {
        if let Some(hash) = self.hashes.get(key) {
            for field in fields {
                hash.remove(*field);
            }
        }
        Ok(())
    }
}
