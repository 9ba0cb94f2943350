//! Integration tests for sliding-window admission.

use crm_resilience::infrastructure::mocks::MockClock;
use crm_resilience::{Clock, ConfigError, RateGate};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn gate(limit: i64, window: Duration) -> (RateGate, MockClock) {
    let clock = MockClock::new(Instant::now());
    let gate = RateGate::builder()
        .with_limit(Some(limit))
        .with_window(window)
        .with_clock(Arc::new(clock.clone()))
        .with_sleeper(Arc::new(clock.clone()))
        .build()
        .unwrap();
    (gate, clock)
}

#[test]
fn test_burst_is_spread_over_the_window() {
    let (gate, clock) = gate(3, Duration::from_secs(60));
    let start = clock.now();
    let mut admitted_at = Vec::new();

    for _ in 0..7 {
        gate.admit();
        admitted_at.push(clock.now() - start);
    }

    assert_eq!(
        admitted_at,
        vec![
            Duration::ZERO,
            Duration::ZERO,
            Duration::ZERO,
            Duration::from_secs(60),
            Duration::from_secs(60),
            Duration::from_secs(60),
            Duration::from_secs(120),
        ]
    );

    let stats = gate.stats();
    assert_eq!(stats.granted, 7);
    assert_eq!(stats.throttled, 2);
    assert_eq!(stats.total_wait, Duration::from_secs(120));
}

#[test]
fn test_never_more_than_limit_in_any_window() {
    let (gate, clock) = gate(5, Duration::from_secs(10));
    let start = clock.now();
    let mut grants = Vec::new();

    for i in 0..40 {
        if i % 3 == 0 {
            clock.advance(Duration::from_millis(700));
        }
        gate.admit();
        grants.push(clock.now() - start);
    }

    for (i, &t) in grants.iter().enumerate() {
        let in_window = grants[i..]
            .iter()
            .take_while(|&&later| later < t + Duration::from_secs(10))
            .count();
        assert!(in_window <= 5, "{} grants within 10s of {:?}", in_window, t);
    }
}

#[test]
fn test_wait_is_measured_from_oldest_grant() {
    let (gate, clock) = gate(2, Duration::from_secs(60));

    gate.admit();
    clock.advance(Duration::from_secs(15));
    gate.admit();
    clock.advance(Duration::from_secs(5));
    gate.admit();

    assert_eq!(clock.sleeps(), vec![Duration::from_secs(40)]);
    assert_eq!(gate.in_window(), 2);
}

#[test]
fn test_disabled_gate_never_waits() {
    for limit in [None, Some(0)] {
        let clock = MockClock::new(Instant::now());
        let gate = RateGate::builder()
            .with_limit(limit)
            .with_sleeper(Arc::new(clock.clone()))
            .build()
            .unwrap();

        for _ in 0..1000 {
            gate.admit();
        }
        assert!(!gate.is_enabled());
        assert!(clock.sleeps().is_empty());
    }
}

#[test]
fn test_invalid_limits_rejected() {
    assert!(matches!(
        RateGate::new(Some(-1)),
        Err(ConfigError::InvalidRateLimit(-1))
    ));
    assert!(matches!(
        RateGate::new(Some(10_001)),
        Err(ConfigError::InvalidRateLimit(10_001))
    ));
    assert!(RateGate::new(Some(10_000)).is_ok());
}

#[test]
fn test_shared_gate_with_real_time() {
    let gate = Arc::new(
        RateGate::builder()
            .with_limit(Some(4))
            .with_window(Duration::from_millis(300))
            .build()
            .unwrap(),
    );
    let start = Instant::now();

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                for _ in 0..2 {
                    gate.admit();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // 6 grants with a limit of 4 per 300ms need at least one full window
    assert!(start.elapsed() >= Duration::from_millis(290));
    assert_eq!(gate.stats().granted, 6);
}
