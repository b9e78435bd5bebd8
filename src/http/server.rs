//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the gateway-local endpoints and the catch-all
//! - Wire up middleware (CORS, request ID, tracing)
//! - Bind server to listener with graceful shutdown
//! - Run background maintenance (idle bucket eviction)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{CorsConfig, GatewayConfig};
use crate::http::pipeline::Gateway;
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};
use crate::http::response::GatewayError;
use crate::observability::metrics;
use crate::resilience::fallback::fallback_handler;
use crate::security::{cors_layer, token::TokenError, RateLimiter, TokenService};

/// Fatal problems detected while assembling the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("token service: {0}")]
    Token(#[from] TokenError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub prometheus: Option<&'static PrometheusHandle>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    limiter: Arc<RateLimiter>,
}

impl HttpServer {
    /// Assemble every subsystem from a validated configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, StartupError> {
        let tokens = Arc::new(TokenService::new(&config.auth)?);
        let gateway = Arc::new(Gateway::new(&config, tokens));

        let prometheus = if config.observability.metrics_enabled {
            metrics::init_metrics()
        } else {
            None
        };

        let limiter = gateway.limiter().clone();
        let state = AppState { gateway, prometheus };
        let router = Self::build_router(state, &config.cors);

        Ok(Self {
            router,
            config,
            limiter,
        })
    }

    fn build_router(state: AppState, cors: &CorsConfig) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(X_REQUEST_ID.clone(), MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID.clone()));

        let router = Router::new()
            .route("/health/live", get(liveness))
            .route("/health/metrics", get(metrics_endpoint))
            .route("/fallback/{service}", any(fallback_handler))
            .method_not_allowed_fallback(method_not_allowed)
            .fallback(gateway_handler)
            .with_state(state)
            .layer(middleware);

        // Outermost, so preflights never enter the admission pipeline.
        match cors_layer(cors) {
            Some(layer) => router.layer(layer),
            None => router,
        }
    }

    /// The assembled router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, routes = self.config.routes.len(), "HTTP server starting");

        if self.config.rate_limit.enabled {
            let idle = Duration::from_secs(self.config.rate_limit.idle_eviction_secs);
            tokio::spawn(evict_idle_buckets(self.limiter.clone(), idle, shutdown.resubscribe()));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Periodically drop buckets that have been idle for `idle`.
async fn evict_idle_buckets(limiter: Arc<RateLimiter>, idle: Duration, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(idle.max(Duration::from_secs(1)));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = limiter.store().evict_idle(idle);
                if evicted > 0 {
                    tracing::debug!(evicted, "Evicted idle rate-limit buckets");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

async fn liveness() -> Json<serde_json::Value> {
    Json(json!({ "status": "UP" }))
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

async fn method_not_allowed() -> GatewayError {
    GatewayError::MethodNotAllowed
}

/// Catch-all handler running the admission pipeline.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    state.gateway.handle(request, peer).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    fn server() -> HttpServer {
        let mut config = GatewayConfig::default();
        config.auth.jwt_secret = "server-test-secret-with-enough-bytes-for-hs512".to_string();
        config.observability.metrics_enabled = false;
        HttpServer::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_liveness() {
        let response = server()
            .router()
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(&X_REQUEST_ID));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], br#"{"status":"UP"}"#);
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let response = server()
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/users/me")
                    .header(&X_REQUEST_ID, "client-chosen-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[&X_REQUEST_ID], "client-chosen-id");
    }

    #[tokio::test]
    async fn test_fallback_endpoint_any_method() {
        let response = server()
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/fallback/chat-service")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_wrong_method_on_local_endpoint_is_structured() {
        let response = server()
            .router()
            .oneshot(Request::builder().method("POST").uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["errorCode"], "METHOD_NOT_ALLOWED");
    }

    #[tokio::test]
    async fn test_preflight_skips_authentication() {
        let response = server()
            .router()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/users/me")
                    .header("origin", "https://app.example.com")
                    .header("access-control-request-method", "PATCH")
                    .header("access-control-request-headers", "authorization,content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-headers"], "authorization,content-type");
        assert_eq!(headers["access-control-max-age"], "3600");
    }

    #[tokio::test]
    async fn test_disabled_cors_leaves_options_to_the_pipeline() {
        let mut config = GatewayConfig::default();
        config.auth.jwt_secret = "server-test-secret-with-enough-bytes-for-hs512".to_string();
        config.observability.metrics_enabled = false;
        config.cors.enabled = false;

        let response = HttpServer::new(config)
            .unwrap()
            .router()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/users/me")
                    .header("origin", "https://app.example.com")
                    .header("access-control-request-method", "PATCH")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!response.headers().contains_key("access-control-allow-origin"));
    }

    #[test]
    fn test_weak_secret_is_fatal() {
        let config = GatewayConfig::default();
        assert!(matches!(HttpServer::new(config), Err(StartupError::Token(_))));
    }
}
