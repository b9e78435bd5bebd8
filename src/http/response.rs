//! Response handling and transformation.
//!
//! # Responsibilities
//! - Convert every per-request failure into a structured JSON body
//! - Map failures to stable HTTP statuses and error codes
//! - Strip hop-by-hop headers from backend responses
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Error bodies never carry internal error details
//! - Backend timeouts result in 504 Gateway Timeout

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use hyper::body::Incoming;
use serde::Serialize;

use crate::http::upstream::UpstreamError;

/// Failure outcomes produced while admitting or dispatching a request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("path contains a dot segment: {path}")]
    InvalidPath { path: String },

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("authentication required")]
    Unauthorized,

    #[error("rate limit exceeded for class {class}")]
    RateLimited { class: String },

    #[error("no route for {path}")]
    RouteNotFound { path: String },

    #[error("{service} is currently unavailable")]
    ServiceUnavailable { service: String },

    #[error("no backend address for {service}")]
    NoUpstream { service: String },

    #[error("upstream request failed: {0}")]
    BadGateway(#[source] hyper_util::client::legacy::Error),

    #[error("upstream did not respond within {0:?}")]
    GatewayTimeout(Duration),

    #[error("internal gateway error: {0}")]
    Internal(&'static str),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidPath { .. } => StatusCode::BAD_REQUEST,
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::ServiceUnavailable { .. } | GatewayError::NoUpstream { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            GatewayError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::InvalidPath { .. } => "INVALID_PATH",
            GatewayError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            GatewayError::Unauthorized => "UNAUTHORIZED",
            GatewayError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            GatewayError::RouteNotFound { .. } => "ROUTE_NOT_FOUND",
            GatewayError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            GatewayError::NoUpstream { .. } => "NO_UPSTREAM",
            GatewayError::BadGateway(_) => "BAD_GATEWAY",
            GatewayError::GatewayTimeout(_) => "GATEWAY_TIMEOUT",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message shown to the caller.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::InvalidPath { .. } => "Request path must not contain '.' or '..' segments".to_string(),
            GatewayError::MethodNotAllowed => "Method not allowed for this endpoint".to_string(),
            GatewayError::Unauthorized => "Full authentication is required to access this resource".to_string(),
            GatewayError::RateLimited { .. } => "Too many requests. Please try again later.".to_string(),
            GatewayError::RouteNotFound { path } => format!("No route matches {path}"),
            GatewayError::ServiceUnavailable { service } => {
                format!("{service} is currently unavailable. Please try again later.")
            }
            GatewayError::NoUpstream { .. } => "No backend is available for this request".to_string(),
            GatewayError::BadGateway(_) => "The upstream service could not be reached".to_string(),
            GatewayError::GatewayTimeout(_) => "The upstream service did not respond in time".to_string(),
            GatewayError::Internal(_) => "Internal gateway error".to_string(),
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Connect(e) => GatewayError::BadGateway(e),
            UpstreamError::Timeout(after) => GatewayError::GatewayTimeout(after),
        }
    }
}

/// Structured error body shared by every gateway-generated failure.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub error_code: &'static str,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            message: self.public_message(),
            error_code: self.error_code(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Headers meaningful only for a single transport hop.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in HOP_BY_HOP.iter().copied().chain(listed.iter().map(String::as_str)) {
        headers.remove(name);
    }
}

/// Convert a backend response into a client response, streaming the body.
///
/// Upgrade responses keep their `Connection`/`Upgrade` headers so the
/// client can complete the protocol switch.
pub fn from_upstream(response: hyper::Response<Incoming>) -> Response {
    let (mut parts, body) = response.into_parts();
    if parts.status != StatusCode::SWITCHING_PROTOCOLS {
        strip_hop_by_hop(&mut parts.headers);
    }
    Response::from_parts(parts, Body::new(body))
}
