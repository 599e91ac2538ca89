//! Identity resolution for rate-limit keying.
//!
//! Counters are keyed by verified user id when a session cookie checks out
//! against the auth service, and by client IP otherwise. Verification is
//! best-effort: any failure degrades to the anonymous identity and is
//! logged, never surfaced to the caller.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::GateError;

/// Resolved request identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User { user_id: String, ip: String },
    Anonymous { ip: String },
}

impl Identity {
    /// Stable counter-key prefix: at most one live record per
    /// `(identity, operation class)`.
    pub fn key(&self) -> String {
        match self {
            Identity::User { user_id, .. } => format!("user:{}", user_id),
            Identity::Anonymous { ip } => format!("ip:{}", ip),
        }
    }

    pub fn ip(&self) -> &str {
        match self {
            Identity::User { ip, .. } => ip,
            Identity::Anonymous { ip } => ip,
        }
    }

    /// `Some` only for verified sessions; escalation skips anonymous
    /// identities.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Identity::User { user_id, .. } => Some(user_id),
            Identity::Anonymous { .. } => None,
        }
    }
}

/// Injected identity capability, decoupling the limiters from any
/// particular auth backend.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Never fails: verification problems fall back to the IP identity.
    async fn resolve(&self, headers: &HeaderMap, client_ip: &str) -> Identity;
}

#[derive(Debug, Serialize)]
struct VerifySessionRequest<'a> {
    session: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifySessionResponse {
    user_id: String,
}

/// Production resolver: verifies the `session` cookie against the auth
/// service's `/session/verify` endpoint.
pub struct SessionResolver {
    client: reqwest::Client,
    auth_service_url: String,
}

impl SessionResolver {
    pub fn new(auth_service_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            auth_service_url,
        }
    }

    async fn verify(&self, session: &str) -> Result<String, GateError> {
        let url = format!("{}/session/verify", self.auth_service_url);
        let response = self
            .client
            .post(&url)
            .json(&VerifySessionRequest { session })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GateError::InternalError(format!(
                "session verification returned status: {}",
                response.status()
            )));
        }

        let body: VerifySessionResponse = response.json().await.map_err(|e| {
            GateError::InternalError(format!("failed to parse verification response: {}", e))
        })?;

        Ok(body.user_id)
    }
}

#[async_trait]
impl IdentityResolver for SessionResolver {
    async fn resolve(&self, headers: &HeaderMap, client_ip: &str) -> Identity {
        let Some(session) = session_cookie(headers) else {
            return Identity::Anonymous {
                ip: client_ip.to_string(),
            };
        };

        match self.verify(&session).await {
            Ok(user_id) => Identity::User {
                user_id,
                ip: client_ip.to_string(),
            },
            Err(e) => {
                warn!(
                    error = %e,
                    "Session verification failed, falling back to IP identity"
                );
                Identity::Anonymous {
                    ip: client_ip.to_string(),
                }
            }
        }
    }
}

/// Extract the `session` cookie value, if present.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "session").then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn identity_keys_distinguish_users_from_ips() {
        let user = Identity::User {
            user_id: "user123".to_string(),
            ip: "1.2.3.4".to_string(),
        };
        let anon = Identity::Anonymous {
            ip: "1.2.3.4".to_string(),
        };

        assert_eq!(user.key(), "user:user123");
        assert_eq!(anon.key(), "ip:1.2.3.4");
        assert_eq!(user.user_id(), Some("user123"));
        assert_eq!(anon.user_id(), None);
        assert_eq!(user.ip(), "1.2.3.4");
    }

    #[test]
    fn session_cookie_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=tok-123; lang=en"),
        );
        assert_eq!(session_cookie(&headers).as_deref(), Some("tok-123"));
    }

    #[test]
    fn session_cookie_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark"));
        assert_eq!(session_cookie(&headers), None);
        assert_eq!(session_cookie(&HeaderMap::new()), None);
    }
}
