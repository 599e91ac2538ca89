use std::sync::Arc;

use crate::config::Config;
use crate::escalation::AbuseEscalation;
use crate::identity::{IdentityResolver, SessionResolver};
use crate::limiter::{LimitPolicy, RateLimiter};
use crate::proxy::AxumProxy;
use crate::store::{CounterStore, MemoryCounterStore};
use crate::trading::TradingRateLimiter;

/// Gate state shared by every request.
///
/// Nothing here mutates after startup: the counter store is internally
/// concurrent and the limiters are immutable, so no outer lock is needed.
pub struct GateState {
    pub gate_id: String,
    pub store: Arc<dyn CounterStore>,
    pub resolver: Arc<dyn IdentityResolver>,
    pub proxy: Arc<AxumProxy>,
    pub limiter: RateLimiter,
    pub trading_limiter: TradingRateLimiter,
    pub upstream_url: String,
    pub login_url: String,
}

/// Shared state for use across async tasks
pub type SharedState = Arc<GateState>;

impl GateState {
    /// Build state around injected store and resolver implementations.
    pub fn new(
        config: &Config,
        store: Arc<dyn CounterStore>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        let escalation = AbuseEscalation::new(store.clone());

        let limiter = RateLimiter::new(
            store.clone(),
            escalation.clone(),
            LimitPolicy::new(config.auth_max_requests, config.auth_window_secs),
            LimitPolicy::new(config.payment_max_requests, config.payment_window_secs),
            config.flag_threshold,
            config.fail_open,
        );

        let trading_limiter = TradingRateLimiter::new(
            store.clone(),
            escalation,
            LimitPolicy::new(config.trade_create_max_requests, config.trading_window_secs),
            LimitPolicy::new(config.trade_match_max_requests, config.trading_window_secs),
            LimitPolicy::new(config.trade_confirm_max_requests, config.trading_window_secs),
            config.amount_threshold,
            config.flag_threshold,
            config.fail_open,
        );

        Self {
            gate_id: uuid::Uuid::new_v4().to_string(),
            store,
            resolver,
            proxy: Arc::new(AxumProxy::new()),
            limiter,
            trading_limiter,
            upstream_url: config.upstream_url.clone(),
            login_url: config.login_url.clone(),
        }
    }

    /// Production wiring: in-memory counter store and the session-cookie
    /// resolver against the configured auth service.
    pub fn from_config(config: &Config) -> Self {
        let store = Arc::new(MemoryCounterStore::new());
        let resolver = Arc::new(SessionResolver::new(config.auth_service_url.clone()));
        Self::new(config, store, resolver)
    }
}
