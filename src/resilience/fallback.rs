//! Fallback responder for open circuits.
//!
//! Returns a fixed 503 naming the degraded backend. It never calls an
//! upstream and cannot fail.

use axum::{
    extract::Path,
    response::{IntoResponse, Response},
};

use crate::http::response::GatewayError;

/// Route prefix under which fallbacks are also reachable directly.
pub const FALLBACK_PREFIX: &str = "/fallback/";

/// Build the fallback response for `service` (e.g. `chat-service`).
pub fn fallback_response(service: &str) -> Response {
    GatewayError::ServiceUnavailable {
        service: display_name(service),
    }
    .into_response()
}

/// Service named by a fallback path such as `/fallback/user-service`.
pub fn service_from_fallback_path(path: &str) -> Option<&str> {
    path.strip_prefix(FALLBACK_PREFIX)
        .filter(|service| !service.is_empty() && !service.contains('/'))
}

/// `user-service` → `User service`.
pub fn display_name(service: &str) -> String {
    let words = service.replace(['-', '_'], " ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Handler for `/fallback/{service}`.
pub async fn fallback_handler(Path(service): Path<String>) -> Response {
    fallback_response(&service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("user-service"), "User service");
        assert_eq!(display_name("notification-service"), "Notification service");
        assert_eq!(display_name(""), "");
    }

    #[test]
    fn test_service_from_fallback_path() {
        assert_eq!(service_from_fallback_path("/fallback/chat-service"), Some("chat-service"));
        assert_eq!(service_from_fallback_path("/fallback/"), None);
        assert_eq!(service_from_fallback_path("/fallback/a/b"), None);
        assert_eq!(service_from_fallback_path("/other/chat-service"), None);
    }

    #[tokio::test]
    async fn test_fallback_body() {
        let response = fallback_response("media-service");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errorCode"], "SERVICE_UNAVAILABLE");
        assert_eq!(
            json["message"],
            "Media service is currently unavailable. Please try again later."
        );
    }
}
