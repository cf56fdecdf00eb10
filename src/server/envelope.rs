//! Response envelope.
//!
//! Every response leaving the server goes through [`ResponseFormatter`], which
//! sets the content type and a fixed set of security headers:
//!
//! - `Strict-Transport-Security: max-age=31536000`
//! - `Content-Security-Policy: default-src 'self'; frame-ancestors <list>`
//! - `X-Content-Type-Options: nosniff`
//! - `Referrer-Policy: same-origin`
//!
//! With base64 transport enabled, binary bodies are sent base64 encoded and
//! marked with `Content-Transfer-Encoding: base64`, which is what API gateways
//! in front of the server expect. Envelopes are logged at debug level; binary
//! bodies appear in logs as a `<binary N bytes>` marker.

use axum::body::Body;
use axum::http::header::{
    HeaderName, CONTENT_SECURITY_POLICY, CONTENT_TYPE, REFERRER_POLICY,
    STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::{ErrorKind, TileError};

use super::handlers::ErrorResponse;

pub const HSTS_VALUE: &str = "max-age=31536000";
pub const NOSNIFF_VALUE: &str = "nosniff";
pub const REFERRER_POLICY_VALUE: &str = "same-origin";

/// Default `frame-ancestors` source list: no embedding.
pub const DEFAULT_FRAME_ANCESTORS: &str = "'none'";

/// Marks a base64-encoded binary body.
pub const CONTENT_TRANSFER_ENCODING: HeaderName =
    HeaderName::from_static("content-transfer-encoding");

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Longest text body written to the debug log.
const MAX_LOGGED_BODY: usize = 1024;

/// HTTP status for an error category.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Builds response envelopes with the security headers attached.
#[derive(Debug, Clone)]
pub struct ResponseFormatter {
    frame_ancestors: String,
    policy: HeaderValue,
    base64_transport: bool,
}

impl ResponseFormatter {
    /// Formatter whose CSP allows framing by `frame_ancestors`.
    ///
    /// A source list that cannot appear in a header falls back to
    /// [`DEFAULT_FRAME_ANCESTORS`].
    pub fn new(frame_ancestors: &str) -> Self {
        let frame_ancestors = frame_ancestors.trim();
        let (frame_ancestors, policy) = match HeaderValue::from_str(&default_policy(frame_ancestors))
        {
            Ok(policy) if !frame_ancestors.is_empty() => (frame_ancestors.to_string(), policy),
            _ => {
                warn!(
                    frame_ancestors,
                    "Invalid frame-ancestors list, falling back to {}", DEFAULT_FRAME_ANCESTORS
                );
                (
                    DEFAULT_FRAME_ANCESTORS.to_string(),
                    HeaderValue::from_static("default-src 'self'; frame-ancestors 'none'"),
                )
            }
        };

        Self {
            frame_ancestors,
            policy,
            base64_transport: false,
        }
    }

    pub fn with_base64_transport(mut self, enabled: bool) -> Self {
        self.base64_transport = enabled;
        self
    }

    pub fn frame_ancestors(&self) -> &str {
        &self.frame_ancestors
    }

    pub fn base64_transport(&self) -> bool {
        self.base64_transport
    }

    /// The `Content-Security-Policy` value sent with every response.
    pub fn content_security_policy(&self) -> &HeaderValue {
        &self.policy
    }

    /// Serialize `value` as a JSON body.
    pub fn json<T: Serialize>(&self, status: StatusCode, value: &T) -> Response {
        match serde_json::to_string(value) {
            Ok(body) => {
                self.log_text(status, JSON_CONTENT_TYPE, &body);
                self.envelope(
                    status,
                    HeaderValue::from_static(JSON_CONTENT_TYPE),
                    Body::from(body),
                    HeaderMap::new(),
                    None,
                )
            }
            Err(err) => self.error(&TileError::Internal {
                message: format!("cannot serialize response: {}", err),
            }),
        }
    }

    /// HTML page with its own script/style policy. `frame-ancestors` is
    /// appended to `policy` so embedding rules stay the same.
    pub fn html(&self, status: StatusCode, body: String, policy: &str) -> Response {
        self.log_text(status, HTML_CONTENT_TYPE, &body);

        let policy = format!("{}; frame-ancestors {}", policy, self.frame_ancestors);
        let policy = HeaderValue::from_str(&policy).ok();
        self.envelope(
            status,
            HeaderValue::from_static(HTML_CONTENT_TYPE),
            Body::from(body),
            HeaderMap::new(),
            policy,
        )
    }

    /// Binary payload (JPEG). `extra` headers are added as-is.
    pub fn binary(
        &self,
        status: StatusCode,
        content_type: &'static str,
        data: Bytes,
        mut extra: HeaderMap,
    ) -> Response {
        debug!(
            status = status.as_u16(),
            content_type,
            base64 = self.base64_transport,
            body = %format_args!("<binary {} bytes>", data.len()),
            "Response envelope"
        );

        let body = if self.base64_transport {
            extra.insert(CONTENT_TRANSFER_ENCODING, HeaderValue::from_static("base64"));
            Body::from(STANDARD.encode(&data))
        } else {
            Body::from(data)
        };

        self.envelope(
            status,
            HeaderValue::from_static(content_type),
            body,
            extra,
            None,
        )
    }

    /// Map a resolver error to its HTTP envelope.
    ///
    /// Server errors are logged at ERROR, 404s at DEBUG and other client
    /// errors at WARN. The underlying cause is only ever logged at DEBUG;
    /// the body carries the sanitized message.
    pub fn error(&self, err: &TileError) -> Response {
        let status = status_for(err.kind());
        let error_type = err.error_type();
        let message = err.to_string();

        if status.is_server_error() {
            error!(
                error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }
        if let Some(detail) = err.detail() {
            debug!(error_type, detail = %detail, "Error detail");
        }

        let body = ErrorResponse::with_status(error_type, message, status);
        match serde_json::to_string(&body) {
            Ok(json) => {
                self.log_text(status, JSON_CONTENT_TYPE, &json);
                self.envelope(
                    status,
                    HeaderValue::from_static(JSON_CONTENT_TYPE),
                    Body::from(json),
                    HeaderMap::new(),
                    None,
                )
            }
            Err(_) => self.envelope(
                StatusCode::INTERNAL_SERVER_ERROR,
                HeaderValue::from_static("text/plain; charset=utf-8"),
                Body::from("Internal error"),
                HeaderMap::new(),
                None,
            ),
        }
    }

    fn envelope(
        &self,
        status: StatusCode,
        content_type: HeaderValue,
        body: Body,
        extra: HeaderMap,
        policy: Option<HeaderValue>,
    ) -> Response {
        let mut response = Response::new(body);
        *response.status_mut() = status;

        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, content_type);
        headers.insert(
            STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static(HSTS_VALUE),
        );
        headers.insert(
            CONTENT_SECURITY_POLICY,
            policy.unwrap_or_else(|| self.policy.clone()),
        );
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static(NOSNIFF_VALUE));
        headers.insert(
            REFERRER_POLICY,
            HeaderValue::from_static(REFERRER_POLICY_VALUE),
        );
        headers.extend(extra);

        response
    }

    fn log_text(&self, status: StatusCode, content_type: &str, body: &str) {
        if body.len() > MAX_LOGGED_BODY {
            let head: String = body.chars().take(MAX_LOGGED_BODY).collect();
            debug!(
                status = status.as_u16(),
                content_type,
                body = %head,
                truncated = true,
                "Response envelope"
            );
        } else {
            debug!(
                status = status.as_u16(),
                content_type,
                body,
                "Response envelope"
            );
        }
    }
}

impl Default for ResponseFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_ANCESTORS)
    }
}

fn default_policy(frame_ancestors: &str) -> String {
    format!("default-src 'self'; frame-ancestors {}", frame_ancestors)
}
