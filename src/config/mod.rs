//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or built-in defaults
//!     → loader.rs (parse, deserialize, JWT_SECRET override)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → compiled once into router, limiter, breakers, token service
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, CircuitBreakerConfig, CorsConfig, GatewayConfig, KeyStrategy, LimiterClassConfig,
    ListenerConfig, ObservabilityConfig, RateLimitConfig, RewriteConfig, RouteConfig,
    ServiceConfig, TimeoutConfig,
};
