//! Guard behaviour over a shared store.
//!
//! The Redis test needs a live server:
//!   REDIS_URL=redis://localhost:6379/0 cargo test -p rate-guard -- --ignored

use chrono::{DateTime, TimeZone, Utc};
use rate_guard::{
    daily_key, CooldownGuard, CounterStore, MemoryCounterStore, RateDecision, RateLimiter,
    RateLimiterConfig, RedisCounterStore, SkipReason,
};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, h, m, 0).unwrap()
}

fn no_type_cooldown() -> RateLimiterConfig {
    RateLimiterConfig {
        type_cooldown: Duration::ZERO,
        ..Default::default()
    }
}

#[tokio::test]
async fn daily_cap_denies_the_51st_alert_and_resets_next_day() {
    let store = Arc::new(MemoryCounterStore::new());
    let limiter = RateLimiter::new(store.clone(), no_type_cooldown());
    let tenant = Uuid::new_v4();

    for i in 0..50 {
        let now = at(3, 8, 0) + chrono::Duration::minutes(i);
        assert!(
            limiter.check(tenant, "assessment", now).await.unwrap().is_allowed(),
            "alert {} should be allowed",
            i + 1
        );
        limiter.record_sent(tenant, "assessment", now).await.unwrap();
    }

    assert_eq!(
        limiter.check(tenant, "assessment", at(3, 20, 0)).await.unwrap(),
        RateDecision::Skip(SkipReason::DailyLimit)
    );
    assert!(limiter.check(tenant, "assessment", at(4, 0, 1)).await.unwrap().is_allowed());

    let ttl = store.ttl(&daily_key(tenant, at(3, 8, 0))).unwrap();
    assert!(ttl > Duration::from_secs(86_400));
}

#[tokio::test]
async fn daily_cap_is_per_tenant() {
    let store = Arc::new(MemoryCounterStore::new());
    let limiter = RateLimiter::new(
        store,
        RateLimiterConfig {
            max_daily: 1,
            ..no_type_cooldown()
        },
    );
    let farm_a = Uuid::new_v4();
    let farm_b = Uuid::new_v4();

    limiter.record_sent(farm_a, "x", at(3, 9, 0)).await.unwrap();
    assert!(!limiter.check(farm_a, "x", at(3, 9, 1)).await.unwrap().is_allowed());
    assert!(limiter.check(farm_b, "x", at(3, 9, 1)).await.unwrap().is_allowed());
}

#[tokio::test]
async fn guards_share_one_store_without_colliding() {
    let store: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
    let cooldown = CooldownGuard::new(store.clone());
    let limiter = RateLimiter::new(store, RateLimiterConfig::default());
    let tenant = Uuid::new_v4();

    cooldown.record_sent(tenant, "assessment", at(3, 9, 0)).await.unwrap();
    assert!(limiter.check(tenant, "assessment", at(3, 9, 1)).await.unwrap().is_allowed());
}

#[tokio::test]
#[serial]
#[ignore]
async fn redis_cooldown_round_trip() {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/0".into());
    let store = Arc::new(RedisCounterStore::connect(&url).await.expect("redis reachable"));
    let guard = CooldownGuard::new(store.clone()).with_window(Duration::from_secs(60));
    let tenant = Uuid::new_v4();
    let now = Utc::now();

    assert!(guard.should_alert(tenant, "cam:fire", 0.9, now).await.unwrap().allow);
    guard.record_sent(tenant, "cam:fire", now).await.unwrap();
    let check = guard.should_alert(tenant, "cam:fire", 0.9, now).await.unwrap();
    assert!(!check.allow);
    assert_eq!(check.cooldown_remaining_secs, 60);

    guard.clear_cooldown(tenant, "cam:fire").await.unwrap();
    assert!(guard.should_alert(tenant, "cam:fire", 0.9, now).await.unwrap().allow);

    assert_eq!(store.incr(&format!("test:{}", tenant)).await.unwrap(), 1);
    store.delete(&format!("test:{}", tenant)).await.unwrap();
}
