//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.
//! `GatewayConfig::default()` reproduces the stock route table so a
//! development gateway only needs a signing secret.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration for the edge gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Token service and authentication settings.
    pub auth: AuthConfig,

    /// Rate limiter classes.
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker settings shared by every breaker-wrapped route.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Route table, evaluated in declaration order.
    pub routes: Vec<RouteConfig>,

    /// Backend services addressed by name from the route table.
    pub services: Vec<ServiceConfig>,

    /// Cross-origin resource sharing, answered ahead of the admission pipeline.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            timeouts: TimeoutConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            routes: default_routes(),
            services: default_services(),
            cors: CorsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TCP connect timeout in milliseconds.
    pub connect_ms: u64,

    /// Bound on the whole upstream exchange (until response headers) in milliseconds.
    pub upstream_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 1_000,
            upstream_ms: 5_000,
        }
    }
}

/// Token service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Symmetric HMAC secret. Overridden by the `JWT_SECRET` environment variable.
    pub jwt_secret: String,

    /// Access token lifetime in seconds.
    pub access_token_ttl_secs: i64,

    /// Refresh token lifetime in seconds.
    pub refresh_token_ttl_secs: i64,

    /// Path patterns reachable without a verified identity.
    pub exempt_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_ttl_secs: 24 * 60 * 60,
            refresh_token_ttl_secs: 7 * 24 * 60 * 60,
            exempt_paths: vec![
                "/api/auth/**".to_string(),
                "/health/**".to_string(),
                "/fallback/**".to_string(),
                "/ws/**".to_string(),
            ],
        }
    }
}

/// How a limiter class derives its bucket key from a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStrategy {
    /// Request path.
    Path,
    /// Authenticated subject, or the anonymous sentinel.
    User,
    /// Peer IP address.
    Ip,
}

/// A single independently configured token bucket class.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimiterClassConfig {
    /// Burst capacity.
    pub capacity: u32,

    /// Sustained refill rate in tokens per second.
    pub rate_per_second: f64,

    /// Key resolution strategy.
    pub key: KeyStrategy,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Buckets untouched for this long are evicted once they have refilled
    /// to capacity.
    pub idle_eviction_secs: u64,

    /// Limiter classes by name. Routes refer to these names.
    pub classes: BTreeMap<String, LimiterClassConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut classes = BTreeMap::new();
        classes.insert(
            "general".to_string(),
            LimiterClassConfig {
                capacity: 20,
                rate_per_second: 10.0,
                key: KeyStrategy::User,
            },
        );
        classes.insert(
            "auth".to_string(),
            LimiterClassConfig {
                capacity: 5,
                rate_per_second: 3.0,
                key: KeyStrategy::User,
            },
        );
        classes.insert(
            "media".to_string(),
            LimiterClassConfig {
                capacity: 5,
                rate_per_second: 2.0,
                key: KeyStrategy::User,
            },
        );

        Self {
            enabled: true,
            idle_eviction_secs: 300,
            classes,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// How long the circuit stays open before probing, in milliseconds.
    pub open_duration_ms: u64,

    /// Concurrent probe calls admitted while half-open.
    pub half_open_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration_ms: 30_000,
            half_open_probes: 1,
        }
    }
}

/// Path rewrite: the remainder after `prefix` replaces `{segment}` in `template`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RewriteConfig {
    pub prefix: String,
    pub template: String,
}

/// Route configuration mapping a path pattern to a backend service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path pattern, either exact or `/prefix/**`.
    pub path: String,

    /// Optional path rewrite.
    #[serde(default)]
    pub rewrite: Option<RewriteConfig>,

    /// Target service name.
    pub service: String,

    /// Circuit breaker name; routes without one are never short-circuited.
    #[serde(default)]
    pub circuit_breaker: Option<String>,

    /// Fallback path, `/fallback/<service>`.
    #[serde(default)]
    pub fallback: Option<String>,

    /// Limiter class applied to this route.
    #[serde(default = "default_limiter_class")]
    pub rate_limit: String,
}

fn default_limiter_class() -> String {
    "general".to_string()
}

/// Backend service addresses.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Service name referenced by routes.
    pub name: String,

    /// Backend addresses (`host:port`), balanced round-robin.
    pub addresses: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Install the Prometheus recorder and serve `/health/metrics`.
    pub metrics_enabled: bool,
}

/// CORS policy applied to every path, local endpoints included.
///
/// A single `"*"` entry in `allowed_origins` or `allowed_headers` allows any value.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,

    /// How long browsers may cache a preflight answer.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS", "PATCH"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_headers: vec!["*".to_string()],
            exposed_headers: ["Authorization", "Content-Type", "X-Total-Count"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_age_secs: 3600,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "edge_gateway=info,tower_http=info".to_string(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

const BACKEND_SERVICES: [(&str, &str, &str); 5] = [
    ("user-service", "users", "userServiceCircuitBreaker"),
    ("chat-service", "chats", "chatServiceCircuitBreaker"),
    ("presence-service", "presence", "presenceServiceCircuitBreaker"),
    ("notification-service", "notifications", "notificationServiceCircuitBreaker"),
    ("media-service", "media", "mediaServiceCircuitBreaker"),
];

fn default_routes() -> Vec<RouteConfig> {
    let mut routes = vec![RouteConfig {
        name: "auth".to_string(),
        path: "/api/auth/**".to_string(),
        rewrite: Some(RewriteConfig {
            prefix: "/api/auth/".to_string(),
            template: "/api/v1/auth/{segment}".to_string(),
        }),
        service: "user-service".to_string(),
        circuit_breaker: Some("authCircuitBreaker".to_string()),
        fallback: Some("/fallback/user-service".to_string()),
        rate_limit: "auth".to_string(),
    }];

    for (service, resource, breaker) in BACKEND_SERVICES {
        routes.push(RouteConfig {
            name: service.to_string(),
            path: format!("/api/{resource}/**"),
            rewrite: Some(RewriteConfig {
                prefix: format!("/api/{resource}/"),
                template: format!("/api/v1/{resource}/{{segment}}"),
            }),
            service: service.to_string(),
            circuit_breaker: Some(breaker.to_string()),
            fallback: Some(format!("/fallback/{service}")),
            rate_limit: if service == "media-service" {
                "media".to_string()
            } else {
                default_limiter_class()
            },
        });
    }

    routes.push(RouteConfig {
        name: "websocket".to_string(),
        path: "/ws/**".to_string(),
        rewrite: None,
        service: "chat-service".to_string(),
        circuit_breaker: None,
        fallback: None,
        rate_limit: default_limiter_class(),
    });

    routes
}

fn default_services() -> Vec<ServiceConfig> {
    BACKEND_SERVICES
        .iter()
        .enumerate()
        .map(|(i, (service, _, _))| ServiceConfig {
            name: service.to_string(),
            addresses: vec![format!("127.0.0.1:{}", 8081 + i)],
        })
        .collect()
}
