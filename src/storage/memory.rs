//! In-process storage backend.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tracing::trace;

use super::{Storage, StorageError, StorageKind};
use crate::ratelimit::RateLimitRecord;

/// Keeps rate limit records in a map guarded by a single lock.
///
/// Records are retained for the lifetime of the process; the TTL passed to
/// [`Storage::set`] is ignored.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<String, RateLimitRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a stored record.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Drop all records.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, StorageError> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn set(
        &self,
        key: &str,
        record: &RateLimitRecord,
        _ttl: Duration,
    ) -> Result<(), StorageError> {
        trace!(key = %key, count = record.count, "Storing record in memory");
        self.records.write().insert(key.to_string(), record.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }
}
