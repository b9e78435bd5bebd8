//! Authentication filter and path-level authorization.
//!
//! The filter never rejects: a missing or invalid token leaves the request
//! unauthenticated and the authorization check decides whether the path
//! may be reached anonymously.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request},
};
use uuid::Uuid;

use crate::observability::metrics;
use crate::routing::matcher::PathPattern;
use crate::security::token::{TokenKind, TokenService};

/// Header carrying the authenticated subject to backend services.
pub static X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");

const BEARER_PREFIX: &str = "Bearer ";

/// Identity attached to authenticated requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityContext {
    pub subject: Uuid,
    pub roles: Vec<String>,
}

/// Extract the bearer credential from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Per-request authentication filter.
#[derive(Debug, Clone)]
pub struct Authenticator {
    tokens: Arc<TokenService>,
}

impl Authenticator {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }

    /// Resolve the caller's identity and propagate it to the forwarded request.
    ///
    /// A client-supplied `X-User-ID` is always removed; it is only set again
    /// from a verified access token.
    pub fn authenticate(&self, request: &mut Request<Body>) -> Option<IdentityContext> {
        request.headers_mut().remove(&X_USER_ID);

        let token = bearer_token(request.headers())?;
        let claims = match self.tokens.decode_verified(token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "Bearer token rejected, continuing unauthenticated");
                metrics::record_auth_failure("invalid_token");
                return None;
            }
        };

        if claims.kind != TokenKind::Access {
            tracing::debug!("Refresh token presented as bearer credential");
            metrics::record_auth_failure("refresh_token");
            return None;
        }

        let subject = match Uuid::parse_str(&claims.sub) {
            Ok(subject) => subject,
            Err(e) => {
                tracing::warn!(error = %e, "Signed token carries a malformed subject");
                metrics::record_auth_failure("malformed_subject");
                return None;
            }
        };

        let identity = IdentityContext {
            subject,
            roles: claims.roles,
        };

        if let Ok(value) = HeaderValue::from_str(&subject.to_string()) {
            request.headers_mut().insert(X_USER_ID.clone(), value);
        }
        request.extensions_mut().insert(identity.clone());

        Some(identity)
    }
}

/// Paths that may be reached without a verified identity.
#[derive(Debug, Clone, Default)]
pub struct ExemptPaths {
    patterns: Vec<PathPattern>,
}

impl ExemptPaths {
    /// Compile the configured patterns. Invalid entries are rejected by
    /// config validation and skipped here.
    pub fn from_config(patterns: &[String]) -> Self {
        Self {
            patterns: patterns.iter().filter_map(|p| PathPattern::parse(p)).collect(),
        }
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }
}
