//! Abuse escalation: flagged identities and the security-event audit trail.
//!
//! Escalation writes are best-effort auditing. A failed write is logged and
//! never changes the allow/deny decision already taken by the limiter.

use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::identity::Identity;
use crate::store::{CounterStore, FlaggedIdentity, SecurityEvent, SecurityEventDetails};

/// Which threshold tripped a trading denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Count,
    Amount,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKind::Count => "count",
            LimitKind::Amount => "amount",
        }
    }

    fn event_type(&self) -> &'static str {
        match self {
            LimitKind::Count => "rate_limit_count_exceeded",
            LimitKind::Amount => "rate_limit_amount_exceeded",
        }
    }
}

#[derive(Clone)]
pub struct AbuseEscalation {
    store: Arc<dyn CounterStore>,
}

impl AbuseEscalation {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Merge-upsert the current flag state for an identity: repeated
    /// escalations keep one record per identity, updated in place.
    pub async fn flag_identity(
        &self,
        identity: &Identity,
        now: u64,
        reason: &str,
        operation: Option<&str>,
        limit_triggered: Option<LimitKind>,
    ) {
        let flag = FlaggedIdentity {
            identity: identity.key(),
            ip: identity.ip().to_string(),
            flagged_at: now,
            reason: reason.to_string(),
            operation: operation.map(str::to_string),
            limit_triggered: limit_triggered.map(|k| k.as_str().to_string()),
        };

        warn!(
            identity = %flag.identity,
            reason = %flag.reason,
            "Flagging identity for manual review"
        );

        if let Err(e) = self.store.upsert_flag(&flag).await {
            error!(
                error = %e,
                identity = %flag.identity,
                "Failed to record flagged identity"
            );
        }
    }

    /// Append one security event per escalation, naming the threshold that
    /// triggered the denial. Never merged.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_event(
        &self,
        user_id: &str,
        ip: &str,
        now: u64,
        operation: &str,
        count: u32,
        amount: f64,
        limit: u32,
        amount_limit: f64,
        triggered: LimitKind,
    ) {
        let event = SecurityEvent {
            event_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            ip: ip.to_string(),
            event_type: triggered.event_type().to_string(),
            details: SecurityEventDetails {
                operation: operation.to_string(),
                count,
                amount,
                limit,
                amount_limit,
            },
            timestamp: now,
            reviewed: false,
        };

        if let Err(e) = self.store.append_event(&event).await {
            error!(
                error = %e,
                user_id = %event.user_id,
                "Failed to append security event"
            );
        }
    }
}
