//! End-to-end decision scenarios against the in-memory backend using the
//! real system clock.

use std::sync::Arc;
use std::time::Duration;

use turnstile::config::TurnstileConfig;
use turnstile::ratelimit::{PolicyResolver, PolicyTier, RateLimiter};
use turnstile::storage::{MemoryStorage, Storage};

fn limiter(resolver: PolicyResolver) -> RateLimiter<MemoryStorage> {
    RateLimiter::new(resolver, Arc::new(MemoryStorage::new()))
}

#[tokio::test]
async fn test_block_then_window_reset() {
    let limiter = limiter(PolicyResolver::new(PolicyTier::new(2, 300)));
    let key = "K";

    assert!(limiter.check_rate_limit(key, false).await.unwrap());
    assert!(limiter.check_rate_limit(key, false).await.unwrap());
    assert!(!limiter.check_rate_limit(key, false).await.unwrap());

    let record = limiter.storage().get(key).await.unwrap().unwrap();
    assert!(record.blocked_at.is_some());

    assert!(!limiter.check_rate_limit(key, false).await.unwrap());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(limiter.check_rate_limit(key, false).await.unwrap());
}

#[tokio::test]
async fn test_token_override_from_environment() {
    let config = TurnstileConfig::from_vars(vec![
        ("IP_RATE_LIMIT".to_string(), "2".to_string()),
        ("TOKEN_ABC123_LIMIT".to_string(), "5".to_string()),
    ]);
    let limiter = limiter(PolicyResolver::from_config(&config.rate_limiting));

    for _ in 0..4 {
        assert!(limiter.check_rate_limit("token:ABC123", true).await.unwrap());
    }

    assert!(limiter.check_rate_limit("203.0.113.1", false).await.unwrap());
    assert!(limiter.check_rate_limit("203.0.113.1", false).await.unwrap());
    assert!(!limiter.check_rate_limit("203.0.113.1", false).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_keys_concurrently() {
    let limiter = Arc::new(limiter(PolicyResolver::new(PolicyTier::new(3, 300))));

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let key = format!("10.0.1.{}", i);
                let mut admitted = 0;
                for _ in 0..3 {
                    if limiter.check_rate_limit(&key, false).await.unwrap() {
                        admitted += 1;
                    }
                }
                admitted
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 3);
    }
    assert_eq!(limiter.storage().len(), 20);
}
