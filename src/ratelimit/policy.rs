//! Policy tier resolution.
//!
//! Every key is governed by a `(limit, block duration)` pair. IP keys always
//! use the IP tier; token keys use their configured override when one exists
//! and silently fall back to the IP tier otherwise.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::RateLimitingConfig;

/// Separator between the `token` marker and the token value in a key.
const TOKEN_SEPARATOR: char = ':';

/// The limit and block duration applicable to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyTier {
    /// Maximum requests allowed per window
    pub limit: u64,
    /// How long a key stays blocked after exceeding the limit
    pub block_duration_secs: u64,
}

impl PolicyTier {
    pub fn new(limit: u64, block_duration_secs: u64) -> Self {
        Self {
            limit,
            block_duration_secs,
        }
    }

    /// Block duration as a `Duration`.
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_duration_secs)
    }
}

/// Resolves the policy tier for a key.
#[derive(Debug, Clone)]
pub struct PolicyResolver {
    ip_tier: PolicyTier,
    token_limits: HashMap<String, u64>,
    token_block_times: HashMap<String, u64>,
}

impl PolicyResolver {
    /// Create a resolver with only the IP tier.
    pub fn new(ip_tier: PolicyTier) -> Self {
        Self {
            ip_tier,
            token_limits: HashMap::new(),
            token_block_times: HashMap::new(),
        }
    }

    /// Build a resolver from the rate limiting configuration.
    pub fn from_config(config: &RateLimitingConfig) -> Self {
        Self {
            ip_tier: PolicyTier::new(config.ip_rate_limit, config.ip_block_time_secs),
            token_limits: config.token_limits.clone(),
            token_block_times: config.token_block_times.clone(),
        }
    }

    /// Add an override for a token value.
    pub fn with_token(mut self, token: impl Into<String>, tier: PolicyTier) -> Self {
        let token = token.into();
        self.token_limits.insert(token.clone(), tier.limit);
        self.token_block_times.insert(token, tier.block_duration_secs);
        self
    }

    /// The default tier applied to IP keys and unknown tokens.
    pub fn ip_tier(&self) -> PolicyTier {
        self.ip_tier
    }

    /// Maximum requests per window for a key.
    pub fn limit(&self, key: &str, is_token: bool) -> u64 {
        token_value(key, is_token)
            .and_then(|token| self.token_limits.get(token).copied())
            .unwrap_or(self.ip_tier.limit)
    }

    /// Block duration in seconds for a key.
    pub fn block_duration_secs(&self, key: &str, is_token: bool) -> u64 {
        token_value(key, is_token)
            .and_then(|token| self.token_block_times.get(token).copied())
            .unwrap_or(self.ip_tier.block_duration_secs)
    }

    /// Full tier for a key.
    pub fn resolve(&self, key: &str, is_token: bool) -> PolicyTier {
        PolicyTier {
            limit: self.limit(key, is_token),
            block_duration_secs: self.block_duration_secs(key, is_token),
        }
    }
}

/// Extract the token value from a `token:<value>` key.
///
/// Keys that do not split into exactly two segments carry no usable token.
fn token_value(key: &str, is_token: bool) -> Option<&str> {
    if !is_token {
        return None;
    }

    let mut parts = key.split(TOKEN_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(token), None) => Some(token),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PolicyResolver {
        let mut config = RateLimitingConfig {
            ip_rate_limit: 10,
            ip_block_time_secs: 300,
            ..Default::default()
        };
        config.token_limits.insert("ABC123".to_string(), 100);
        config.token_limits.insert("XYZ789".to_string(), 50);
        config.token_block_times.insert("ABC123".to_string(), 600);
        config.token_block_times.insert("XYZ789".to_string(), 120);
        PolicyResolver::from_config(&config)
    }

    #[test]
    fn test_limit_resolution() {
        let resolver = resolver();

        let cases = [
            ("192.168.1.1", false, 10),
            ("token:ABC123", true, 100),
            ("token:UNKNOWN", true, 10),
            ("token:XYZ789", true, 50),
        ];

        for (key, is_token, expected) in cases {
            assert_eq!(resolver.limit(key, is_token), expected, "key {}", key);
        }
    }

    #[test]
    fn test_block_time_resolution() {
        let resolver = resolver();

        assert_eq!(resolver.block_duration_secs("192.168.1.1", false), 300);
        assert_eq!(resolver.block_duration_secs("token:ABC123", true), 600);
        assert_eq!(resolver.block_duration_secs("token:UNKNOWN", true), 300);
    }

    #[test]
    fn test_ip_key_ignores_token_overrides() {
        let resolver = resolver();

        // looks like a token key but was classified as an IP
        assert_eq!(
            resolver.resolve("token:ABC123", false),
            PolicyTier::new(10, 300)
        );
    }

    #[test]
    fn test_malformed_token_key_falls_back() {
        let resolver = resolver();

        assert_eq!(resolver.limit("ABC123", true), 10);
        assert_eq!(resolver.limit("token:ABC123:extra", true), 10);
    }

    #[test]
    fn test_partial_override_inherits_ip_tier() {
        let mut config = RateLimitingConfig::default();
        config.token_limits.insert("LIMITONLY".to_string(), 42);
        let resolver = PolicyResolver::from_config(&config);

        assert_eq!(
            resolver.resolve("token:LIMITONLY", true),
            PolicyTier::new(42, 300)
        );
    }

    #[test]
    fn test_with_token_builder() {
        let resolver =
            PolicyResolver::new(PolicyTier::new(2, 300)).with_token("ABC123", PolicyTier::new(5, 1));

        assert_eq!(resolver.resolve("token:ABC123", true), PolicyTier::new(5, 1));
        assert_eq!(resolver.ip_tier(), PolicyTier::new(2, 300));
    }
}
