//! Core rate limiter implementation.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::policy::PolicyResolver;
use super::record::RateLimitRecord;
use crate::storage::{Storage, StorageError, StorageKind};

/// The decision engine: a fixed 1-second window per key, with a temporary
/// block once the window's limit is exceeded.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct RateLimiter<S: Storage> {
    /// Limit and block duration per key
    policy: PolicyResolver,
    /// Where records live
    storage: Arc<S>,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Held across the whole read-modify-write when storage is local
    serialize: Option<Mutex<()>>,
}

impl<S: Storage> RateLimiter<S> {
    /// Create a new rate limiter using the system clock.
    pub fn new(policy: PolicyResolver, storage: Arc<S>) -> Self {
        Self::with_clock(policy, storage, Arc::new(SystemClock))
    }

    /// Create a new rate limiter with an explicit clock.
    pub fn with_clock(policy: PolicyResolver, storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        let serialize = match storage.kind() {
            StorageKind::Local => Some(Mutex::new(())),
            StorageKind::Remote => None,
        };

        Self {
            policy,
            storage,
            clock,
            serialize,
        }
    }

    /// Decide whether a request for `key` may proceed.
    ///
    /// Returns `Ok(true)` to admit and `Ok(false)` to deny. A storage error
    /// means the decision could not be made; callers must treat it as a
    /// denial.
    pub async fn check_rate_limit(&self, key: &str, is_token: bool) -> Result<bool, StorageError> {
        let _guard = match &self.serialize {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let now = self.clock.now();

        let mut record = match self.storage.get(key).await? {
            Some(record) => record,
            None => {
                trace!(key = %key, "Creating new rate limit record");
                RateLimitRecord::new(now)
            }
        };

        let tier = self.policy.resolve(key, is_token);
        let block_duration = tier.block_duration();

        trace!(
            key = %key,
            is_token = is_token,
            count = record.count,
            limit = tier.limit,
            block_secs = tier.block_duration_secs,
            "Checking rate limit"
        );

        // A window reset also lifts any block, so it must run first.
        if record.window_expired(now) {
            record.reset(now);
        }

        if record.is_blocked(now, block_duration) {
            debug!(key = %key, "Key is blocked");
            return Ok(false);
        }

        if record.count >= tier.limit {
            record.block(now);
            self.storage.set(key, &record, block_duration).await?;
            debug!(
                key = %key,
                limit = tier.limit,
                block_secs = tier.block_duration_secs,
                "Rate limit exceeded, blocking key"
            );
            return Ok(false);
        }

        record.count += 1;
        self.storage.set(key, &record, block_duration).await?;
        Ok(true)
    }

    /// The policy resolver in use.
    pub fn policy(&self) -> &PolicyResolver {
        &self.policy
    }

    /// The underlying storage backend.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Close the underlying storage backend.
    pub async fn close(&self) -> Result<(), StorageError> {
        self.storage.close().await
    }
}
