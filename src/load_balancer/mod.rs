//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → target service name identified
//!     → pool.rs (look up the service's backend addresses)
//!     → round_robin.rs (rotate through addresses)
//!     → Return backend authority or error
//! ```
//!
//! # Design Decisions
//! - Service addresses are static configuration
//! - Algorithm selection per service behind the `LoadBalancer` trait
//! - Failure isolation is the circuit breaker's job, not the balancer's

pub mod pool;
pub mod round_robin;

use axum::http::uri::Authority;

pub use pool::ServiceRegistry;
pub use round_robin::RoundRobin;

/// Strategy for picking one backend out of a service's addresses.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    fn next_server<'a>(&self, backends: &'a [Authority]) -> Option<&'a Authority>;
}
