//! Storage backends for rate limit records.
//!
//! The decision engine reads and writes records through the [`Storage`]
//! trait. Two backends exist: [`MemoryStorage`] keeps records in-process and
//! [`RedisStorage`] keeps them in Redis with a per-key TTL.

mod memory;
mod redis;

use async_trait::async_trait;
use std::time::Duration;

pub use memory::MemoryStorage;
pub use self::redis::RedisStorage;

pub use crate::error::StorageError;
use crate::ratelimit::RateLimitRecord;

/// Where a backend keeps its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Records live in this process; the engine serializes access to them.
    Local,
    /// Records live in an external store shared by many processes.
    /// Read-modify-write sequences against it are not atomic.
    Remote,
}

/// Trait for rate limit record storage.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Fetch the record for `key`. A missing key is `Ok(None)`, not an error.
    async fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, StorageError>;

    /// Store the full record for `key`, replacing any previous one.
    ///
    /// Backends that support expiration drop the record after `ttl`; a zero
    /// `ttl` means no expiration.
    async fn set(&self, key: &str, record: &RateLimitRecord, ttl: Duration)
        -> Result<(), StorageError>;

    /// Release the backend's resources.
    async fn close(&self) -> Result<(), StorageError>;

    /// Classification used by the engine to decide how to serialize access.
    fn kind(&self) -> StorageKind;
}
