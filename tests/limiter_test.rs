// Limiter behavior tests, driven through the clock-injected entry points
// so window transitions never depend on wall time.

use async_trait::async_trait;
use std::sync::Arc;

use tradegate::{
    AbuseEscalation, CounterStore, FlaggedIdentity, GateError, GatedOp, Identity, LimitPolicy,
    MemoryCounterStore, RateLimitRecord, RateLimiter, SecurityEvent, TradeOp, TradingRateLimiter,
};

const NOW: u64 = 1_700_000_000;
const HOUR: u64 = 3600;

fn user(id: &str) -> Identity {
    Identity::User {
        user_id: id.to_string(),
        ip: "10.0.0.1".to_string(),
    }
}

fn anon() -> Identity {
    Identity::Anonymous {
        ip: "10.0.0.9".to_string(),
    }
}

fn trading_limiter(store: Arc<MemoryCounterStore>) -> TradingRateLimiter {
    TradingRateLimiter::new(
        store.clone(),
        AbuseEscalation::new(store),
        LimitPolicy::new(10, HOUR),
        LimitPolicy::new(15, HOUR),
        LimitPolicy::new(20, HOUR),
        50_000.0,
        3,
        true,
    )
}

fn generic_limiter(store: Arc<MemoryCounterStore>) -> RateLimiter {
    RateLimiter::new(
        store.clone(),
        AbuseEscalation::new(store),
        LimitPolicy::new(5, 900),
        LimitPolicy::new(5, HOUR),
        3,
        true,
    )
}

#[tokio::test]
async fn attempts_within_limit_are_all_allowed() {
    let store = Arc::new(MemoryCounterStore::new());
    let limiter = generic_limiter(store.clone());
    let identity = user("user123");

    for i in 0..5 {
        assert!(limiter.check_at(&identity, GatedOp::Auth, NOW + i).await);
    }

    let record = store.counter("user:user123:auth").unwrap();
    assert_eq!(record.count, 5);
    assert_eq!(record.flagged_count, 0);
}

#[tokio::test]
async fn attempt_over_limit_is_denied_and_flag_counted() {
    let store = Arc::new(MemoryCounterStore::new());
    let limiter = generic_limiter(store.clone());
    let identity = user("user123");

    for _ in 0..5 {
        assert!(limiter.check_at(&identity, GatedOp::Auth, NOW).await);
    }
    assert!(!limiter.check_at(&identity, GatedOp::Auth, NOW).await);

    let record = store.counter("user:user123:auth").unwrap();
    assert_eq!(record.count, 6);
    assert_eq!(record.flagged_count, 1);
}

#[tokio::test]
async fn auth_and_payment_counters_are_independent() {
    let store = Arc::new(MemoryCounterStore::new());
    let limiter = generic_limiter(store.clone());
    let identity = user("user123");

    for _ in 0..5 {
        assert!(limiter.check_at(&identity, GatedOp::Auth, NOW).await);
    }
    assert!(!limiter.check_at(&identity, GatedOp::Auth, NOW).await);

    // The auth counter being exhausted does not touch the payment budget.
    assert!(limiter.check_at(&identity, GatedOp::Payment, NOW).await);
}

#[tokio::test]
async fn window_expiry_restores_allowance() {
    let store = Arc::new(MemoryCounterStore::new());
    let limiter = generic_limiter(store.clone());
    let identity = user("user123");

    for _ in 0..6 {
        limiter.check_at(&identity, GatedOp::Auth, NOW).await;
    }
    assert_eq!(store.counter("user:user123:auth").unwrap().count, 6);

    // Past the 15-minute window the counter restarts at 1.
    assert!(limiter.check_at(&identity, GatedOp::Auth, NOW + 901).await);
    let record = store.counter("user:user123:auth").unwrap();
    assert_eq!(record.count, 1);
    assert_eq!(record.first_attempt, NOW + 901);
}

#[tokio::test]
async fn flagged_count_survives_window_expiry() {
    let store = Arc::new(MemoryCounterStore::new());
    let limiter = generic_limiter(store.clone());
    let identity = user("user123");

    for _ in 0..6 {
        limiter.check_at(&identity, GatedOp::Auth, NOW).await;
    }
    assert_eq!(store.counter("user:user123:auth").unwrap().flagged_count, 1);

    assert!(limiter.check_at(&identity, GatedOp::Auth, NOW + 901).await);
    assert_eq!(store.counter("user:user123:auth").unwrap().flagged_count, 1);
}

#[tokio::test]
async fn generic_limiter_flags_user_without_security_event() {
    let store = Arc::new(MemoryCounterStore::new());
    let limiter = generic_limiter(store.clone());
    let identity = user("user123");

    // 5 allowed, then 3 violations to reach the flag threshold.
    for _ in 0..8 {
        limiter.check_at(&identity, GatedOp::Auth, NOW).await;
    }

    let flag = store.flag("user:user123").unwrap();
    assert_eq!(flag.reason, "rate_limit_exceeded");
    assert_eq!(flag.operation.as_deref(), Some("auth"));
    // The audit event log is trading-only.
    assert!(store.events().is_empty());
}

#[tokio::test]
async fn trading_count_threshold_is_independent_of_amount() {
    let store = Arc::new(MemoryCounterStore::new());
    let limiter = trading_limiter(store.clone());
    let identity = user("user123");

    for _ in 0..10 {
        assert!(limiter.check_at(&identity, TradeOp::Create, 0.0, NOW).await);
    }
    assert!(!limiter.check_at(&identity, TradeOp::Create, 0.0, NOW).await);
}

#[tokio::test]
async fn trading_create_example_scenario() {
    let store = Arc::new(MemoryCounterStore::new());
    let limiter = trading_limiter(store.clone());
    let identity = user("user123");

    for i in 0..10 {
        assert!(
            limiter
                .check_at(&identity, TradeOp::Create, 100.0, NOW + i)
                .await
        );
    }

    let record = store.counter("user:user123:trade_create").unwrap();
    assert_eq!(record.count, 10);
    assert_eq!(record.amount, 1000.0);
    assert_eq!(record.flagged_count, 0);

    assert!(
        !limiter
            .check_at(&identity, TradeOp::Create, 100.0, NOW + 60)
            .await
    );
    let record = store.counter("user:user123:trade_create").unwrap();
    assert_eq!(record.count, 11);
    assert_eq!(record.amount, 1100.0);
    assert_eq!(record.flagged_count, 1);
}

#[tokio::test]
async fn trading_amount_crossing_is_denied_under_count_limit() {
    let store = Arc::new(MemoryCounterStore::new());
    let limiter = trading_limiter(store.clone());
    let identity = user("user456");

    // 7 x 7000 = 49000 stays under the cap.
    for _ in 0..7 {
        assert!(
            limiter
                .check_at(&identity, TradeOp::Create, 7_000.0, NOW)
                .await
        );
    }

    // The 8th crosses 50000 with count still at 8 of 10.
    assert!(
        !limiter
            .check_at(&identity, TradeOp::Create, 7_000.0, NOW)
            .await
    );
    let record = store.counter("user:user456:trade_create").unwrap();
    assert_eq!(record.count, 8);
    assert_eq!(record.amount, 56_000.0);
}

#[tokio::test]
async fn trading_single_oversized_amount_is_denied_immediately() {
    let store = Arc::new(MemoryCounterStore::new());
    let limiter = trading_limiter(store.clone());
    let identity = user("user456");

    assert!(
        !limiter
            .check_at(&identity, TradeOp::Create, 60_000.0, NOW)
            .await
    );
    let record = store.counter("user:user456:trade_create").unwrap();
    assert_eq!(record.count, 1);
    assert_eq!(record.flagged_count, 1);
}

#[tokio::test]
async fn trading_window_expiry_resets_count_and_amount() {
    let store = Arc::new(MemoryCounterStore::new());
    let limiter = trading_limiter(store.clone());
    let identity = user("user456");

    assert!(
        !limiter
            .check_at(&identity, TradeOp::Create, 60_000.0, NOW)
            .await
    );

    assert!(
        limiter
            .check_at(&identity, TradeOp::Create, 100.0, NOW + HOUR + 1)
            .await
    );
    let record = store.counter("user:user456:trade_create").unwrap();
    assert_eq!(record.count, 1);
    assert_eq!(record.amount, 100.0);
    assert_eq!(record.flagged_count, 1);
}

#[tokio::test]
async fn trading_operations_have_independent_counters() {
    let store = Arc::new(MemoryCounterStore::new());
    let limiter = trading_limiter(store.clone());
    let identity = user("user123");

    for _ in 0..10 {
        assert!(limiter.check_at(&identity, TradeOp::Create, 0.0, NOW).await);
    }
    assert!(!limiter.check_at(&identity, TradeOp::Create, 0.0, NOW).await);

    // Match and confirm budgets are untouched.
    assert!(limiter.check_at(&identity, TradeOp::Match, 0.0, NOW).await);
    assert!(limiter.check_at(&identity, TradeOp::Confirm, 0.0, NOW).await);
}

#[tokio::test]
async fn trading_escalation_appends_one_event_per_escalation() {
    let store = Arc::new(MemoryCounterStore::new());
    let limiter = trading_limiter(store.clone());
    let identity = user("user123");

    // 10 allowed, then 3 violations: the flag threshold is reached on the
    // third violation, producing the first security event.
    for _ in 0..13 {
        limiter.check_at(&identity, TradeOp::Create, 10.0, NOW).await;
    }

    let flag = store.flag("user:user123").unwrap();
    assert_eq!(flag.reason, "trading_rate_limit_exceeded");
    assert_eq!(flag.operation.as_deref(), Some("trade_create"));
    assert_eq!(flag.limit_triggered.as_deref(), Some("count"));

    let events = store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].user_id, "user123");
    assert_eq!(events[0].event_type, "rate_limit_count_exceeded");
    assert_eq!(events[0].details.operation, "trade_create");
    assert_eq!(events[0].details.limit, 10);
    assert_eq!(events[0].details.amount_limit, 50_000.0);
    assert!(!events[0].reviewed);

    // Every further violation escalates again: new event, same flag slot.
    limiter.check_at(&identity, TradeOp::Create, 10.0, NOW).await;
    assert_eq!(store.events().len(), 2);
}

#[tokio::test]
async fn anonymous_identities_are_never_flagged() {
    let store = Arc::new(MemoryCounterStore::new());
    let limiter = trading_limiter(store.clone());
    let identity = anon();

    for _ in 0..15 {
        limiter.check_at(&identity, TradeOp::Create, 0.0, NOW).await;
    }

    // Denials still happen and are counted, but no review artifacts exist.
    let record = store.counter("ip:10.0.0.9:trade_create").unwrap();
    assert_eq!(record.flagged_count, 5);
    assert!(store.flag("ip:10.0.0.9").is_none());
    assert!(store.events().is_empty());
}

// A store that refuses every operation, for fail-open/fail-closed checks.
struct FailingStore;

#[async_trait]
impl CounterStore for FailingStore {
    async fn load(&self, _key: &str) -> Result<Option<RateLimitRecord>, GateError> {
        Err(GateError::StoreError("store offline".to_string()))
    }

    async fn save(&self, _key: &str, _record: &RateLimitRecord) -> Result<(), GateError> {
        Err(GateError::StoreError("store offline".to_string()))
    }

    async fn upsert_flag(&self, _flag: &FlaggedIdentity) -> Result<(), GateError> {
        Err(GateError::StoreError("store offline".to_string()))
    }

    async fn append_event(&self, _event: &SecurityEvent) -> Result<(), GateError> {
        Err(GateError::StoreError("store offline".to_string()))
    }
}

#[tokio::test]
async fn store_failure_fails_open_by_default() {
    let store = Arc::new(FailingStore);
    let limiter = RateLimiter::new(
        store.clone(),
        AbuseEscalation::new(store),
        LimitPolicy::new(5, 900),
        LimitPolicy::new(5, HOUR),
        3,
        true,
    );

    // Every check is allowed, no matter how many.
    for _ in 0..20 {
        assert!(limiter.check_at(&user("user123"), GatedOp::Auth, NOW).await);
    }
}

#[tokio::test]
async fn store_failure_fails_closed_when_configured() {
    let store = Arc::new(FailingStore);
    let limiter = RateLimiter::new(
        store.clone(),
        AbuseEscalation::new(store),
        LimitPolicy::new(5, 900),
        LimitPolicy::new(5, HOUR),
        3,
        false,
    );

    assert!(!limiter.check_at(&user("user123"), GatedOp::Auth, NOW).await);
}

#[tokio::test]
async fn trading_store_failure_fails_open() {
    let store = Arc::new(FailingStore);
    let limiter = TradingRateLimiter::new(
        store.clone(),
        AbuseEscalation::new(store),
        LimitPolicy::new(10, HOUR),
        LimitPolicy::new(15, HOUR),
        LimitPolicy::new(20, HOUR),
        50_000.0,
        3,
        true,
    );

    assert!(
        limiter
            .check_at(&user("user123"), TradeOp::Create, 99_999.0, NOW)
            .await
    );
}
