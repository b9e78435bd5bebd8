//! Cross-origin resource sharing.
//!
//! The layer wraps the whole router, so preflight requests are answered
//! before authentication or rate limiting see them. A `"*"` header list
//! mirrors the requested headers, which lets browsers send `Authorization`.

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer, ExposeHeaders};

use crate::config::CorsConfig;

const WILDCARD: &str = "*";

/// Build the CORS layer, or `None` when CORS handling is disabled.
///
/// Entries that fail to parse are skipped with a warning.
pub fn cors_layer(config: &CorsConfig) -> Option<CorsLayer> {
    if !config.enabled {
        return None;
    }

    let origins = if is_wildcard(&config.allowed_origins) {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(parse_all(&config.allowed_origins, "origin", parse_origin))
    };
    let headers = if is_wildcard(&config.allowed_headers) {
        AllowHeaders::mirror_request()
    } else {
        AllowHeaders::list(parse_all(&config.allowed_headers, "header", parse_header_name))
    };
    let methods = parse_all(&config.allowed_methods, "method", parse_method);
    let exposed = parse_all(&config.exposed_headers, "exposed header", parse_header_name);

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(AllowMethods::list(methods))
            .allow_headers(headers)
            .expose_headers(ExposeHeaders::list(exposed))
            .max_age(Duration::from_secs(config.max_age_secs)),
    )
}

pub(crate) fn is_wildcard(values: &[String]) -> bool {
    values.iter().any(|v| v.trim() == WILDCARD)
}

pub(crate) fn parse_origin(value: &str) -> Option<HeaderValue> {
    let value = value.trim();
    if value.is_empty() || value == WILDCARD {
        return None;
    }
    HeaderValue::from_str(value).ok()
}

pub(crate) fn parse_method(value: &str) -> Option<Method> {
    Method::from_bytes(value.trim().to_ascii_uppercase().as_bytes()).ok()
}

pub(crate) fn parse_header_name(value: &str) -> Option<HeaderName> {
    HeaderName::from_bytes(value.trim().as_bytes()).ok()
}

fn parse_all<T>(values: &[String], kind: &str, parse: impl Fn(&str) -> Option<T>) -> Vec<T> {
    values
        .iter()
        .filter_map(|value| {
            let parsed = parse(value);
            if parsed.is_none() {
                tracing::warn!(kind, value = %value, "Ignoring invalid CORS entry");
            }
            parsed
        })
        .collect()
}
