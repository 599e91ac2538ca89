pub mod classify;
pub mod config;
pub mod error;
pub mod escalation;
pub mod gate;
pub mod identity;
pub mod limiter;
pub mod proxy;
pub mod state;
pub mod store;
pub mod trading;
pub mod window;

pub use classify::{classify, GatedOp, OperationClass, TradeOp};
pub use config::{CliArgs, Config};
pub use error::GateError;
pub use escalation::{AbuseEscalation, LimitKind};
pub use gate::{router, MAX_REQUEST_BODY_SIZE};
pub use identity::{Identity, IdentityResolver, SessionResolver};
pub use limiter::{
    LimitPolicy, RateLimiter, DEFAULT_AUTH_MAX_REQUESTS, DEFAULT_AUTH_WINDOW,
    DEFAULT_FLAG_THRESHOLD, DEFAULT_PAYMENT_MAX_REQUESTS, DEFAULT_PAYMENT_WINDOW,
};
pub use proxy::{AxumProxy, Proxy};
pub use state::{GateState, SharedState};
pub use store::{
    CounterStore, FlaggedIdentity, MemoryCounterStore, RateLimitRecord, SecurityEvent,
    SecurityEventDetails,
};
pub use trading::{
    extract_amount, TradingRateLimiter, DEFAULT_AMOUNT_THRESHOLD, DEFAULT_CONFIRM_MAX_REQUESTS,
    DEFAULT_CREATE_MAX_REQUESTS, DEFAULT_MATCH_MAX_REQUESTS, DEFAULT_TRADING_WINDOW,
};
pub use window::{apply_attempt, is_expired};
