//! Request admission pipeline.
//!
//! # Data Flow
//! ```text
//! Request
//!     → CheckPath    (reject `.`/`..` segments, escaped or not)
//!     → Authenticate (bearer token → IdentityContext, X-User-ID)
//!     → Authorize    (exempt path, or identity required)
//!     → RateLimit    (route's limiter class, keyed bucket)
//!     → Route        (first matching route, path rewrite)
//!     → Dispatch     (breaker admission → upstream call → outcome report)
//! ```
//!
//! Each stage either lets the exchange continue or answers it. Dispatch
//! always answers.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use hyper::upgrade::OnUpgrade;

use crate::config::GatewayConfig;
use crate::http::request::{prepare_forward, request_id};
use crate::http::response::{from_upstream, GatewayError};
use crate::http::upstream::Upstream;
use crate::http::websocket::{is_upgrade_request, spawn_tunnel};
use crate::load_balancer::ServiceRegistry;
use crate::observability::metrics;
use crate::resilience::fallback::fallback_response;
use crate::routing::matcher::has_dot_segment;
use crate::routing::{Route, Router};
use crate::security::{Admission, Authenticator, ExemptPaths, IdentityContext, RateLimiter, TokenService};

/// Limiter class applied to requests that match no route.
pub const DEFAULT_LIMITER_CLASS: &str = "general";

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckPath,
    Authenticate,
    Authorize,
    RateLimit,
    Route,
    Dispatch,
}

pub const STAGES: [Stage; 6] = [
    Stage::CheckPath,
    Stage::Authenticate,
    Stage::Authorize,
    Stage::RateLimit,
    Stage::Route,
    Stage::Dispatch,
];

enum Step {
    Continue,
    Respond(Response),
}

/// Per-request state threaded through the stages.
struct Exchange {
    request: Option<Request<Body>>,
    request_id: String,
    path: String,
    peer: Option<IpAddr>,
    identity: Option<IdentityContext>,
    route: Option<Option<Arc<Route>>>,
    upstream_path: Option<String>,
}

impl Exchange {
    fn new(request: Request<Body>, peer: Option<IpAddr>) -> Self {
        Self {
            request_id: request_id(&request),
            path: request.uri().path().to_string(),
            request: Some(request),
            peer,
            identity: None,
            route: None,
            upstream_path: None,
        }
    }

    /// Route lookup, resolved once and shared by the later stages.
    fn route(&mut self, router: &Router) -> Option<Arc<Route>> {
        let path = &self.path;
        self.route
            .get_or_insert_with(|| router.match_path(path).cloned())
            .clone()
    }

    fn route_name(&self) -> &str {
        match &self.route {
            Some(Some(route)) => &route.name,
            _ => "none",
        }
    }
}

/// Everything needed to admit and dispatch a request.
#[derive(Debug)]
pub struct Gateway {
    authenticator: Authenticator,
    exempt: ExemptPaths,
    limiter: Arc<RateLimiter>,
    router: Router,
    registry: ServiceRegistry,
    upstream: Upstream,
}

impl Gateway {
    pub fn new(config: &GatewayConfig, tokens: Arc<TokenService>) -> Self {
        Self {
            authenticator: Authenticator::new(tokens),
            exempt: ExemptPaths::from_config(&config.auth.exempt_paths),
            limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            router: Router::from_config(&config.routes, &config.circuit_breaker),
            registry: ServiceRegistry::new(&config.services),
            upstream: Upstream::new(&config.timeouts),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Run `request` through every stage and produce the client response.
    pub async fn handle(&self, request: Request<Body>, peer: Option<IpAddr>) -> Response {
        let started = Instant::now();
        let mut exchange = Exchange::new(request, peer);

        let mut response = None;
        for stage in STAGES {
            let step = match stage {
                Stage::CheckPath => self.check_path(&exchange),
                Stage::Authenticate => self.authenticate(&mut exchange),
                Stage::Authorize => self.authorize(&exchange),
                Stage::RateLimit => self.rate_limit(&mut exchange),
                Stage::Route => self.route(&mut exchange),
                Stage::Dispatch => self.dispatch(&mut exchange).await,
            };
            if let Step::Respond(r) = step {
                response = Some(r);
                break;
            }
        }

        let response = response
            .unwrap_or_else(|| GatewayError::Internal("pipeline ended without a response").into_response());

        metrics::record_request(exchange.route_name(), response.status().as_u16(), started);
        tracing::debug!(
            request_id = %exchange.request_id,
            path = %exchange.path,
            route = exchange.route_name(),
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request completed"
        );
        response
    }

    /// Exemptions and routes match raw prefixes; paths that resolve
    /// elsewhere after normalization are refused here.
    fn check_path(&self, exchange: &Exchange) -> Step {
        if !has_dot_segment(&exchange.path) {
            return Step::Continue;
        }
        tracing::info!(request_id = %exchange.request_id, path = %exchange.path, "Rejected path with dot segment");
        Step::Respond(
            GatewayError::InvalidPath {
                path: exchange.path.clone(),
            }
            .into_response(),
        )
    }

    fn authenticate(&self, exchange: &mut Exchange) -> Step {
        if let Some(request) = exchange.request.as_mut() {
            exchange.identity = self.authenticator.authenticate(request);
        }
        Step::Continue
    }

    fn authorize(&self, exchange: &Exchange) -> Step {
        if exchange.identity.is_some() || self.exempt.is_exempt(&exchange.path) {
            return Step::Continue;
        }
        tracing::debug!(request_id = %exchange.request_id, path = %exchange.path, "Unauthenticated request to protected path");
        Step::Respond(GatewayError::Unauthorized.into_response())
    }

    fn rate_limit(&self, exchange: &mut Exchange) -> Step {
        let class = exchange
            .route(&self.router)
            .map(|route| route.limiter.clone())
            .unwrap_or_else(|| DEFAULT_LIMITER_CLASS.to_string());

        match self
            .limiter
            .check(&class, &exchange.path, exchange.identity.as_ref(), exchange.peer)
        {
            Admission::Admitted => Step::Continue,
            Admission::Rejected { class, key } => {
                tracing::info!(request_id = %exchange.request_id, class = %class, key = %key, "Rate limit exceeded");
                metrics::record_rate_limited(&class);
                Step::Respond(GatewayError::RateLimited { class }.into_response())
            }
        }
    }

    fn route(&self, exchange: &mut Exchange) -> Step {
        match exchange.route(&self.router) {
            Some(route) => {
                exchange.upstream_path = Some(route.rewrite_path(&exchange.path));
                Step::Continue
            }
            None => {
                tracing::debug!(request_id = %exchange.request_id, path = %exchange.path, "No route matched");
                Step::Respond(
                    GatewayError::RouteNotFound {
                        path: exchange.path.clone(),
                    }
                    .into_response(),
                )
            }
        }
    }

    async fn dispatch(&self, exchange: &mut Exchange) -> Step {
        let (Some(Some(route)), Some(upstream_path), Some(mut request)) = (
            exchange.route.clone(),
            exchange.upstream_path.take(),
            exchange.request.take(),
        ) else {
            return Step::Respond(GatewayError::Internal("dispatch without a routed request").into_response());
        };

        let permit = match &route.breaker {
            Some(breaker) => match breaker.try_acquire() {
                Some(permit) => Some(permit),
                None => {
                    tracing::debug!(
                        request_id = %exchange.request_id,
                        breaker = %breaker.name(),
                        "Circuit open, serving fallback"
                    );
                    return Step::Respond(fallback_response(&route.fallback_service));
                }
            },
            None => None,
        };

        let Some(backend) = self.registry.resolve(&route.service) else {
            tracing::error!(request_id = %exchange.request_id, service = %route.service, "Service has no backend address");
            return Step::Respond(
                GatewayError::NoUpstream {
                    service: route.service.clone(),
                }
                .into_response(),
            );
        };

        let client_upgrade = if is_upgrade_request(&request) {
            request.extensions_mut().remove::<OnUpgrade>()
        } else {
            None
        };

        if let Err(e) = prepare_forward(&mut request, &backend, &upstream_path, exchange.peer) {
            tracing::error!(request_id = %exchange.request_id, error = %e, "Failed to build upstream request");
            return Step::Respond(GatewayError::Internal("invalid upstream request").into_response());
        }

        tracing::debug!(
            request_id = %exchange.request_id,
            route = %route.name,
            backend = %backend,
            upstream_path = %upstream_path,
            "Forwarding request"
        );

        match self.upstream.send(request).await {
            Ok(mut response) => {
                let status = response.status();
                let upgraded = status == StatusCode::SWITCHING_PROTOCOLS;

                if status.is_success() || upgraded {
                    if let Some(permit) = permit {
                        permit.success();
                    }
                } else {
                    metrics::record_upstream_failure(&route.service, "status");
                    if let Some(permit) = permit {
                        permit.failure();
                    }
                }

                if upgraded {
                    if let Some(client) = client_upgrade {
                        let backend_upgrade = hyper::upgrade::on(&mut response);
                        spawn_tunnel(client, backend_upgrade, exchange.request_id.clone());
                    }
                }

                Step::Respond(from_upstream(response))
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %exchange.request_id,
                    service = %route.service,
                    backend = %backend,
                    error = %e,
                    "Upstream call failed"
                );
                metrics::record_upstream_failure(&route.service, e.kind());
                if let Some(permit) = permit {
                    permit.failure();
                }
                Step::Respond(GatewayError::from(e).into_response())
            }
        }
    }
}
