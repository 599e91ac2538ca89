//! Generic sliding-window rate limiter for auth and payment endpoints.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, warn};

use crate::classify::GatedOp;
use crate::escalation::{AbuseEscalation, LimitKind};
use crate::identity::Identity;
use crate::store::CounterStore;
use crate::window;

/// Auth endpoints: 5 attempts per 15 minutes.
pub const DEFAULT_AUTH_MAX_REQUESTS: u32 = 5;
pub const DEFAULT_AUTH_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Payment endpoints: 5 attempts per hour.
pub const DEFAULT_PAYMENT_MAX_REQUESTS: u32 = 5;
pub const DEFAULT_PAYMENT_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Violations before an identity is escalated for review.
pub const DEFAULT_FLAG_THRESHOLD: u32 = 3;

/// A count limit over a time window.
#[derive(Debug, Clone, Copy)]
pub struct LimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl LimitPolicy {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Sliding-window limiter over persistent per-identity counters.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    escalation: AbuseEscalation,
    auth: LimitPolicy,
    payment: LimitPolicy,
    flag_threshold: u32,
    fail_open: bool,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn CounterStore>,
        escalation: AbuseEscalation,
        auth: LimitPolicy,
        payment: LimitPolicy,
        flag_threshold: u32,
        fail_open: bool,
    ) -> Self {
        Self {
            store,
            escalation,
            auth,
            payment,
            flag_threshold,
            fail_open,
        }
    }

    /// Returns `true` when the attempt is allowed, `false` when over limit.
    pub async fn check_and_consume(&self, identity: &Identity, op: GatedOp) -> bool {
        self.check_at(identity, op, unix_now()).await
    }

    /// Clock-injected variant; `now` is unix seconds.
    pub async fn check_at(&self, identity: &Identity, op: GatedOp, now: u64) -> bool {
        let policy = match op {
            GatedOp::Auth => self.auth,
            GatedOp::Payment => self.payment,
        };
        let key = format!("{}:{}", identity.key(), op.key());

        let existing = match self.store.load(&key).await {
            Ok(existing) => existing,
            Err(e) => {
                error!(error = %e, key = %key, "Counter load failed, applying fail-open policy");
                return self.fail_open;
            }
        };

        let mut record = window::apply_attempt(existing, now, policy.window, 0.0);

        if record.count > policy.max_requests {
            record.flagged_count += 1;
            warn!(
                policy_decision = "deny",
                reason = "rate_limit_exceeded",
                identity = %identity.key(),
                operation = op.key(),
                count = record.count,
                limit = policy.max_requests,
                flagged_count = record.flagged_count,
                "Request denied: rate limit exceeded"
            );

            if record.flagged_count >= self.flag_threshold && identity.user_id().is_some() {
                self.escalation
                    .flag_identity(
                        identity,
                        now,
                        "rate_limit_exceeded",
                        Some(op.key()),
                        Some(LimitKind::Count),
                    )
                    .await;
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
