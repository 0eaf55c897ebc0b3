//! Redis storage backend.
//!
//! Records are stored as JSON under their key with the resolved block
//! duration as the Redis expiration, so idle keys are reclaimed by Redis.
//! Read-modify-write through this backend is not atomic: two processes (or
//! two tasks) can read the same record and both write back `count + 1`.

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{Storage, StorageError, StorageKind};
use crate::config::StorageConfig;
use crate::ratelimit::RateLimitRecord;

/// Deadline for establishing the initial connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Stores rate limit records in Redis.
pub struct RedisStorage {
    /// `None` once the backend has been closed
    connection: Mutex<Option<ConnectionManager>>,
    /// Deadline applied to every command
    command_timeout: Duration,
}

impl RedisStorage {
    /// Connect to the Redis server described by `config` and verify it
    /// answers `PING`.
    pub async fn connect(config: &StorageConfig) -> Result<Self, StorageError> {
        info!(
            host = %config.host,
            port = config.port,
            db = config.db,
            "Connecting to Redis"
        );

        let client = redis::Client::open(config.redis_url())?;
        let manager = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| StorageError::Timeout(CONNECT_TIMEOUT))??;

        let storage = Self::from_connection(manager, config.command_timeout());
        storage.ping().await?;

        info!(host = %config.host, port = config.port, "Connected to Redis");
        Ok(storage)
    }

    /// Wrap an existing connection.
    pub fn from_connection(connection: ConnectionManager, command_timeout: Duration) -> Self {
        Self {
            connection: Mutex::new(Some(connection)),
            command_timeout,
        }
    }

    /// Check that the server is reachable.
    pub async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = self.connection()?;
        let _: String = self
            .with_deadline(redis::cmd("PING").query_async::<String>(&mut conn))
            .await?;
        Ok(())
    }

    fn connection(&self) -> Result<ConnectionManager, StorageError> {
        self.connection.lock().clone().ok_or(StorageError::Closed)
    }

    async fn with_deadline<T, F>(&self, fut: F) -> Result<T, StorageError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => result.map_err(|e| {
                error!(error = %e, "Redis command failed");
                StorageError::Redis(e)
            }),
            Err(_) => {
                error!(timeout = ?self.command_timeout, "Redis command timed out");
                Err(StorageError::Timeout(self.command_timeout))
            }
        }
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, StorageError> {
        let mut conn = self.connection()?;
        let data = self
            .with_deadline(conn.get::<_, Option<String>>(key))
            .await?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        record: &RateLimitRecord,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.connection()?;

        debug!(key = %key, count = record.count, ttl_secs = ttl.as_secs(), "Storing record in Redis");

        if ttl.as_secs() == 0 {
            self.with_deadline(conn.set::<_, _, ()>(key, payload)).await
        } else {
            self.with_deadline(conn.set_ex::<_, _, ()>(key, payload, ttl.as_secs()))
                .await
        }
    }

    async fn close(&self) -> Result<(), StorageError> {
        if self.connection.lock().take().is_some() {
            info!("Redis connection closed");
        }
        Ok(())
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Remote
    }
}
