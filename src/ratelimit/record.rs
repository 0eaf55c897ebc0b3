//! Per-key rate limit state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::clock::elapsed_between;

/// Length of the fixed counting window.
pub const WINDOW: Duration = Duration::from_secs(1);

/// Rate limit state tracked for a single key.
///
/// While `blocked_at` is set the key is in a block period regardless of
/// `count`; otherwise `count` is the live usage of the current window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    /// Requests admitted in the current window
    pub count: u64,
    /// When the current window started
    pub window_start: DateTime<Utc>,
    /// When the block was triggered, if any
    #[serde(default)]
    pub blocked_at: Option<DateTime<Utc>>,
}

impl RateLimitRecord {
    /// Create a fresh record whose window starts at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
            blocked_at: None,
        }
    }

    /// Whether the window that started at `window_start` has run out.
    ///
    /// Exactly one window elapsed counts as expired.
    pub fn window_expired(&self, now: DateTime<Utc>) -> bool {
        elapsed_between(self.window_start, now) >= WINDOW
    }

    /// Start a new window at `now`, clearing the count and any block.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.count = 0;
        self.window_start = now;
        self.blocked_at = None;
    }

    /// Whether a block triggered earlier is still in force.
    ///
    /// Exactly `block_duration` elapsed counts as unblocked.
    pub fn is_blocked(&self, now: DateTime<Utc>, block_duration: Duration) -> bool {
        match self.blocked_at {
            Some(blocked_at) => elapsed_between(blocked_at, now) < block_duration,
            None => false,
        }
    }

    /// Mark the key as blocked from `now`.
    pub fn block(&mut self, now: DateTime<Utc>) {
        self.blocked_at = Some(now);
    }
}
