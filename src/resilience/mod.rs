//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → circuit_breaker.rs (admit, or short-circuit when open)
//!     → upstream call bounded by timeouts.upstream_ms
//!     → circuit_breaker.rs (record success / failure)
//!     → fallback.rs (fixed 503 while the circuit is open)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - The gateway never retries; retries belong to the caller
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;
pub mod fallback;

pub use circuit_breaker::{BreakerPermit, BreakerSettings, BreakerState, CircuitBreaker};
