//! Route classification into rate-limited operation classes.
//!
//! An explicit route table checked in priority order replaces ad-hoc
//! substring matching; `/auth/payment-callback` must outrank the `/auth/`
//! prefix or callbacks would be throttled under the auth budget.

use axum::http::Method;

/// Trading mutations, each with its own counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeOp {
    Create,
    Match,
    Confirm,
}

impl TradeOp {
    /// Counter-key suffix.
    pub fn key(&self) -> &'static str {
        match self {
            TradeOp::Create => "trade_create",
            TradeOp::Match => "trade_match",
            TradeOp::Confirm => "trade_confirm",
        }
    }

    /// Human-readable subject for denial messages.
    pub fn subject(&self) -> &'static str {
        match self {
            TradeOp::Create => "creating trading tickets",
            TradeOp::Match => "matching trades",
            TradeOp::Confirm => "confirming trades",
        }
    }
}

/// Classes handled by the generic limiter. Denials here fold into the
/// login redirect rather than a 429.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedOp {
    Auth,
    Payment,
}

impl GatedOp {
    pub fn key(&self) -> &'static str {
        match self {
            GatedOp::Auth => "auth",
            GatedOp::Payment => "payment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    Trading(TradeOp),
    Gated(GatedOp),
}

/// Route table, first match wins. `None` method matches any.
const ROUTES: &[(Option<&str>, &str, OperationClass)] = &[
    (
        Some("POST"),
        "/api/trading/create",
        OperationClass::Trading(TradeOp::Create),
    ),
    (
        Some("POST"),
        "/api/tickets/create",
        OperationClass::Trading(TradeOp::Create),
    ),
    (
        Some("POST"),
        "/api/trading/match",
        OperationClass::Trading(TradeOp::Match),
    ),
    (
        Some("POST"),
        "/api/trading/confirm",
        OperationClass::Trading(TradeOp::Confirm),
    ),
    (
        Some("POST"),
        "/api/escrow/release",
        OperationClass::Trading(TradeOp::Confirm),
    ),
    (
        None,
        "/auth/payment-callback",
        OperationClass::Gated(GatedOp::Payment),
    ),
    (None, "/api/payment", OperationClass::Gated(GatedOp::Payment)),
    (None, "/api/auth", OperationClass::Gated(GatedOp::Auth)),
    (None, "/auth/", OperationClass::Gated(GatedOp::Auth)),
];

/// Classify a request; `None` means the path is not rate limited at all.
pub fn classify(method: &Method, path: &str) -> Option<OperationClass> {
    ROUTES
        .iter()
        .find(|(m, prefix, _)| {
            m.map_or(true, |m| m == method.as_str()) && path.starts_with(prefix)
        })
        .map(|(_, _, class)| *class)
}
