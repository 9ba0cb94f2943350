//! Integration tests for the expiring cache.

use crm_resilience::infrastructure::mocks::MockClock;
use crm_resilience::{ConfigError, ExpiringCache};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_entry_expires_with_real_time() {
    let cache = ExpiringCache::new(Duration::from_secs(1)).unwrap();
    cache.set("entity_defs", vec!["Account", "Contact"]);

    assert_eq!(cache.get("entity_defs"), Some(vec!["Account", "Contact"]));

    thread::sleep(Duration::from_millis(1200));

    assert_eq!(cache.get("entity_defs"), None);
    assert!(cache.is_empty());
}

#[test]
fn test_info_splits_active_and_expired() {
    let clock = MockClock::new(Instant::now());
    let cache = ExpiringCache::with_clock(Duration::from_secs(60), Arc::new(clock.clone())).unwrap();

    cache.set("old", 1);
    clock.advance(Duration::from_secs(45));
    cache.set("new", 2);
    clock.advance(Duration::from_secs(20));

    let info = cache.info();
    assert_eq!(info.total, 2);
    assert_eq!(info.active, 1);
    assert_eq!(info.expired, 1);
    assert_eq!(info.ttl, Duration::from_secs(60));

    assert_eq!(cache.purge_expired(), 1);
    assert_eq!(cache.get("new"), Some(2));
}

#[test]
fn test_entry_at_exact_ttl_is_still_fresh() {
    let clock = MockClock::new(Instant::now());
    let cache = ExpiringCache::with_clock(Duration::from_secs(10), Arc::new(clock.clone())).unwrap();

    cache.set("layout", "detail");
    clock.advance(Duration::from_secs(10));
    assert_eq!(cache.get("layout"), Some("detail"));

    clock.advance(Duration::from_millis(1));
    assert_eq!(cache.get("layout"), None);
}

#[test]
fn test_set_resets_age() {
    let clock = MockClock::new(Instant::now());
    let cache = ExpiringCache::with_clock(Duration::from_secs(10), Arc::new(clock.clone())).unwrap();

    cache.set("k", 1);
    clock.advance(Duration::from_secs(8));
    cache.set("k", 2);
    clock.advance(Duration::from_secs(8));

    assert_eq!(cache.get("k"), Some(2));
}

#[test]
fn test_clear_and_remove() {
    let cache = ExpiringCache::new(Duration::from_secs(60)).unwrap();
    cache.set("a".to_string(), 1);
    cache.set("b".to_string(), 2);

    assert_eq!(cache.remove("a"), Some(1));
    assert_eq!(cache.remove("a"), None);

    cache.clear();
    assert_eq!(cache.info().total, 0);
}

#[test]
fn test_zero_ttl_rejected() {
    let result = ExpiringCache::<String, u32>::new(Duration::ZERO);
    assert!(matches!(result, Err(ConfigError::ZeroTtl)));
}

#[test]
fn test_concurrent_access() {
    let cache = Arc::new(ExpiringCache::new(Duration::from_secs(60)).unwrap());
    let mut handles = vec![];

    for t in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for i in 0..100 {
                cache.set(format!("{}-{}", t, i), i);
                assert_eq!(cache.get(&format!("{}-{}", t, i)), Some(i));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.len(), 800);
}
