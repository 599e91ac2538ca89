use axum::{
    body::{Body, Bytes},
    http::{HeaderValue, Method, Response, StatusCode, Uri},
};
use reqwest::Client;
use std::str::FromStr;

use crate::error::GateError;

/// HTTP proxy trait for future framework abstraction.
///
/// Accepts pre-read request parts and body bytes to avoid double body reads
/// (the gate already buffered the body for amount extraction).
#[allow(async_fn_in_trait)] // Known limitation: async fn in traits, but needed for trait abstraction
pub trait Proxy: Send + Sync {
    async fn forward(
        &self,
        parts: &axum::http::request::Parts,
        body_bytes: Bytes,
        upstream_url: &str,
    ) -> Result<Response<Body>, GateError>;
}

/// Axum-based HTTP proxy implementation
pub struct AxumProxy {
    client: Client,
}

impl AxumProxy {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Proxy for AxumProxy {
    async fn forward(
        &self,
        parts: &axum::http::request::Parts,
        body_bytes: Bytes,
        upstream_url: &str,
    ) -> Result<Response<Body>, GateError> {
        // Build upstream URL
        let path = parts.uri.path();
        let query = parts.uri.query().unwrap_or("");
        let upstream_uri = if query.is_empty() {
            format!("{}{}", upstream_url, path)
        } else {
            format!("{}{}?{}", upstream_url, path, query)
        };

        let uri = Uri::from_str(&upstream_uri)
            .map_err(|e| GateError::ProxyError(format!("Invalid upstream URL: {}", e)))?;

        // Build reqwest request — body bytes are already read and validated
        let reqwest_method = match parts.method {
            Method::GET => reqwest::Method::GET,
            Method::POST => reqwest::Method::POST,
            Method::PUT => reqwest::Method::PUT,
            Method::DELETE => reqwest::Method::DELETE,
            Method::PATCH => reqwest::Method::PATCH,
            _ => {
                return Err(GateError::ProxyError(format!(
                    "Unsupported HTTP method: {}",
                    parts.method
                )));
            }
        };

        let mut reqwest_req = self
            .client
            .request(reqwest_method, uri.to_string())
            .body(body_bytes);

        // Copy headers; the upstream platform handles its own auth, so the
        // Authorization header passes through untouched.
        for (name, value) in &parts.headers {
            if name.as_str() == "host" {
                continue; // Will be set by reqwest
            }

            if let Ok(value_str) = value.to_str() {
                reqwest_req = reqwest_req.header(name.as_str(), value_str);
            }
        }

        // Execute request
        let response = reqwest_req
            .send()
            .await
            .map_err(|e| GateError::ProxyError(format!("Upstream request failed: {}", e)))?;

        // Convert reqwest::Response to axum::Response
        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|_| GateError::ProxyError("Invalid status code from upstream".to_string()))?;

        let mut axum_response = Response::builder().status(status);

        // Copy response headers
        for (name, value) in response.headers() {
            if let Ok(value_str) = value.to_str() {
                axum_response = axum_response.header(
                    name.as_str(),
                    HeaderValue::from_str(value_str)
                        .map_err(|e| GateError::ProxyError(format!("Invalid header value: {}", e)))?,
                );
            }
        }

        // Convert response body
        let body_bytes = response
            .bytes()
            .await
            .map_err(|e| GateError::ProxyError(format!("Failed to read response body: {}", e)))?;

        let body = Body::from(body_bytes);

        axum_response
            .body(body)
            .map_err(|e| GateError::ProxyError(format!("Failed to build response: {}", e)))
    }
}

impl Default for AxumProxy {
    fn default() -> Self {
        Self::new()
    }
}
