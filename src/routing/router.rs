//! Route lookup and path rewriting.
//!
//! # Responsibilities
//! - Store compiled routes in declaration order
//! - Look up the first route whose pattern matches the path
//! - Produce the rewritten upstream path
//!
//! # Design Decisions
//! - Immutable after construction; breaker state lives behind its own lock
//! - O(n) ordered scan (acceptable for typical route counts)
//! - Explicit no-match rather than silent default

use std::sync::Arc;

use crate::config::{CircuitBreakerConfig, RouteConfig};
use crate::resilience::fallback::service_from_fallback_path;
use crate::resilience::{BreakerSettings, CircuitBreaker};
use crate::routing::matcher::{PathPattern, RewriteRule};

/// A compiled route entry.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pattern: PathPattern,
    rewrite: Option<RewriteRule>,
    /// Target service name, resolved by the service registry.
    pub service: String,
    pub breaker: Option<Arc<CircuitBreaker>>,
    /// Service whose fallback answers while the breaker is open.
    pub fallback_service: String,
    /// Limiter class applied to this route.
    pub limiter: String,
}

impl Route {
    fn compile(config: &RouteConfig, breaker_settings: BreakerSettings) -> Option<Self> {
        let Some(pattern) = PathPattern::parse(&config.path) else {
            tracing::warn!(route = %config.name, path = %config.path, "Skipping route with invalid pattern");
            return None;
        };

        let fallback_service = config
            .fallback
            .as_deref()
            .and_then(service_from_fallback_path)
            .unwrap_or(&config.service)
            .to_string();

        Some(Self {
            name: config.name.clone(),
            pattern,
            rewrite: config
                .rewrite
                .as_ref()
                .map(|r| RewriteRule::new(r.prefix.clone(), r.template.clone())),
            service: config.service.clone(),
            breaker: config
                .circuit_breaker
                .as_ref()
                .map(|name| Arc::new(CircuitBreaker::new(name.clone(), breaker_settings))),
            fallback_service,
            limiter: config.rate_limit.clone(),
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.pattern.matches(path)
    }

    /// Upstream path for `path`. Paths outside the rewrite prefix pass unchanged.
    pub fn rewrite_path(&self, path: &str) -> String {
        self.rewrite
            .as_ref()
            .and_then(|rule| rule.apply(path))
            .unwrap_or_else(|| path.to_string())
    }
}

/// Ordered, first-match-wins route table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Arc<Route>>,
}

impl Router {
    pub fn from_config(routes: &[RouteConfig], breaker: &CircuitBreakerConfig) -> Self {
        let settings = BreakerSettings::from(breaker);
        let routes: Vec<_> = routes
            .iter()
            .filter_map(|config| Route::compile(config, settings))
            .map(Arc::new)
            .collect();

        tracing::info!(routes = routes.len(), "Route table compiled");
        Self { routes }
    }

    /// First route matching `path`, in declaration order.
    pub fn match_path(&self, path: &str) -> Option<&Arc<Route>> {
        self.routes.iter().find(|route| route.matches(path))
    }
}
