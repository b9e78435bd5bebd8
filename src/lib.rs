//! Edge gateway library: authentication, rate limiting, routing and
//! circuit breaking in front of the backend services.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
