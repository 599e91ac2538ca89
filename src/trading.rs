//! Trading rate limiter: per-operation counters plus a cumulative
//! monetary-amount threshold.
//!
//! The three trading mutations share one window duration but keep
//! independent counters. A denial fires on either threshold (count OR
//! amount), both evaluated after the attempt is folded in, so a single
//! oversized order is denied on its first attempt.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::classify::TradeOp;
use crate::escalation::{AbuseEscalation, LimitKind};
use crate::identity::Identity;
use crate::limiter::{unix_now, LimitPolicy};
use crate::store::CounterStore;
use crate::window;

pub const DEFAULT_CREATE_MAX_REQUESTS: u32 = 10;
pub const DEFAULT_MATCH_MAX_REQUESTS: u32 = 15;
pub const DEFAULT_CONFIRM_MAX_REQUESTS: u32 = 20;
pub const DEFAULT_TRADING_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Cumulative in-window amount cap, shared by all trading operations.
pub const DEFAULT_AMOUNT_THRESHOLD: f64 = 50_000.0;

pub struct TradingRateLimiter {
    store: Arc<dyn CounterStore>,
    escalation: AbuseEscalation,
    create: LimitPolicy,
    matching: LimitPolicy,
    confirm: LimitPolicy,
    amount_threshold: f64,
    flag_threshold: u32,
    fail_open: bool,
}

impl TradingRateLimiter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn CounterStore>,
        escalation: AbuseEscalation,
        create: LimitPolicy,
        matching: LimitPolicy,
        confirm: LimitPolicy,
        amount_threshold: f64,
        flag_threshold: u32,
        fail_open: bool,
    ) -> Self {
        Self {
            store,
            escalation,
            create,
            matching,
            confirm,
            amount_threshold,
            flag_threshold,
            fail_open,
        }
    }

    fn policy(&self, op: TradeOp) -> LimitPolicy {
        match op {
            TradeOp::Create => self.create,
            TradeOp::Match => self.matching,
            TradeOp::Confirm => self.confirm,
        }
    }

    /// Returns `true` when the attempt is allowed, `false` when over limit.
    pub async fn check_and_consume(&self, identity: &Identity, op: TradeOp, amount: f64) -> bool {
        self.check_at(identity, op, amount, unix_now()).await
    }

    /// Clock-injected variant; `now` is unix seconds.
    pub async fn check_at(
        &self,
        identity: &Identity,
        op: TradeOp,
        amount: f64,
        now: u64,
    ) -> bool {
        let policy = self.policy(op);
        let key = format!("{}:{}", identity.key(), op.key());

        let existing = match self.store.load(&key).await {
            Ok(existing) => existing,
            Err(e) => {
                error!(error = %e, key = %key, "Counter load failed, applying fail-open policy");
                return self.fail_open;
            }
        };

        let mut record = window::apply_attempt(existing, now, policy.window, amount);

        let count_exceeded = record.count > policy.max_requests;
        let amount_exceeded = record.amount > self.amount_threshold;

        if count_exceeded || amount_exceeded {
            record.flagged_count += 1;
            let triggered = if count_exceeded {
                LimitKind::Count
            } else {
                LimitKind::Amount
            };
            warn!(
                policy_decision = "deny",
                reason = "trading_rate_limit_exceeded",
                identity = %identity.key(),
                operation = op.key(),
                limit_triggered = triggered.as_str(),
                count = record.count,
                amount = record.amount,
                limit = policy.max_requests,
                amount_limit = self.amount_threshold,
                flagged_count = record.flagged_count,
                "Request denied: trading rate limit exceeded"
            );

            if record.flagged_count >= self.flag_threshold {
                if let Some(user_id) = identity.user_id() {
                    self.escalation
                        .flag_identity(
                            identity,
                            now,
                            "trading_rate_limit_exceeded",
                            Some(op.key()),
                            Some(triggered),
                        )
                        .await;
                    self.escalation
                        .record_event(
                            user_id,
                            identity.ip(),
                            now,
                            op.key(),
                            record.count,
                            record.amount,
                            policy.max_requests,
                            self.amount_threshold,
                            triggered,
                        )
                        .await;
                }
            }

            if let Err(e) = self.store.save(&key, &record).await {
                error!(error = %e, key = %key, "Counter save failed, applying fail-open policy");
                return self.fail_open;
            }
            return false;
        }

        if let Err(e) = self.store.save(&key, &record).await {
            error!(error = %e, key = %key, "Counter save failed, applying fail-open policy");
            return self.fail_open;
        }
        true
    }
}

/// Monetary amount of a request: JSON body `amount` field, else an
/// `amount` query parameter, else zero. Never fails.
pub fn extract_amount(body: &[u8], query: Option<&str>) -> f64 {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(amount) = value.get("amount").and_then(|a| a.as_f64()) {
            return amount;
        }
    }

    if let Some(query) = query {
        if let Ok(params) = serde_urlencoded::from_str::<HashMap<String, String>>(query) {
            if let Some(amount) = params.get("amount").and_then(|a| a.parse::<f64>().ok()) {
                return amount;
            }
        }
    }

    0.0
}
