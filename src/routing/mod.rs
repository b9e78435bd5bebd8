//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming path
//!     → router.rs (ordered route lookup)
//!     → matcher.rs (evaluate path patterns, apply rewrite)
//!     → Return: matched Route + upstream path, or NoMatch
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Compile patterns and rewrite rules
//!     → Attach one circuit breaker per route
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (declaration order)

pub mod matcher;
pub mod router;

pub use matcher::{PathPattern, RewriteRule};
pub use router::{Route, Router};
