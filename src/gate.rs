//! The enforcement layer: classify the request, resolve the caller's
//! identity, consult the matching limiter, then forward or deny.
//!
//! Trading denials surface as HTTP 429 with a JSON body naming the
//! operation. Auth and payment denials fold into the login redirect, the
//! same path an unauthenticated caller takes, so probes get no direct
//! rate-limit signal.

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    response::{IntoResponse, Redirect, Response},
    routing::any,
    Router,
};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::classify::{classify, OperationClass};
use crate::error::GateError;
use crate::proxy::Proxy;
use crate::state::SharedState;
use crate::trading::extract_amount;

/// Request bodies are buffered once (amount extraction plus forwarding);
/// this caps the buffer.
pub const MAX_REQUEST_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Catch-all router: every inbound request goes through the gate.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/*path", any(gate_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn gate_layer(
    State(state): State<SharedState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    req: axum::extract::Request,
) -> Result<Response, GateError> {
    let (parts, body) = req.into_parts();
    let method_str = parts.method.to_string();
    let path = parts.uri.path().to_string();

    // Honor a caller-provided correlation ID only when it is a well-formed
    // UUID; otherwise mint a fresh one.
    let correlation_id = parts
        .headers
        .get("X-Correlation-ID")
        .and_then(|h| h.to_str().ok())
        .filter(|s| Uuid::parse_str(s).is_ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let span = tracing::span!(
        tracing::Level::INFO,
        "request",
        correlation_id = %correlation_id,
        method = %method_str,
        path = %path
    );

    handle(state, parts, body, ip).instrument(span).await
}

async fn handle(
    state: SharedState,
    parts: axum::http::request::Parts,
    body: Body,
    ip: String,
) -> Result<Response, GateError> {
    let path = parts.uri.path().to_string();

    let Some(class) = classify(&parts.method, &path) else {
        // Unmatched paths are forwarded without touching any limiter.
        let body_bytes = read_body(body).await?;
        return state
            .proxy
            .forward(&parts, body_bytes, &state.upstream_url)
            .await;
    };

    let identity = state.resolver.resolve(&parts.headers, &ip).await;
    let body_bytes = read_body(body).await?;

    match class {
        OperationClass::Trading(op) => {
            let amount = extract_amount(&body_bytes, parts.uri.query());
            if !state
                .trading_limiter
                .check_and_consume(&identity, op, amount)
                .await
            {
                return Err(GateError::RateLimited(op.subject().to_string()));
            }
        }
        OperationClass::Gated(op) => {
            if !state.limiter.check_and_consume(&identity, op).await {
                // Folds into the unauthenticated path; no 429 here.
                return Ok(Redirect::temporary(&state.login_url).into_response());
            }
        }
    }

    info!("Request allowed, forwarding to upstream");
    state
        .proxy
        .forward(&parts, body_bytes, &state.upstream_url)
        .await
}

async fn read_body(body: Body) -> Result<Bytes, GateError> {
    axum::body::to_bytes(body, MAX_REQUEST_BODY_SIZE)
        .await
        .map_err(|_| GateError::BodyTooLarge)
}
