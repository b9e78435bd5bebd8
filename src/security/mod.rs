//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cors.rs (preflight answered, response headers added)
//!     → access_control.rs (bearer token → IdentityContext + X-User-ID)
//!     → access_control.rs (exempt path or identity required)
//!     → rate_limit.rs (per-class, per-key token bucket)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Stateless identity: the token is re-verified on every request
//! - Fail closed: unverifiable tokens never produce an identity
//! - Limiter state is the only shared mutable state here, locked per key

pub mod access_control;
pub mod cors;
pub mod rate_limit;
pub mod token;

pub use access_control::{Authenticator, ExemptPaths, IdentityContext, X_USER_ID};
pub use cors::cors_layer;
pub use rate_limit::{Admission, BucketStore, InMemoryBucketStore, RateLimiter};
pub use token::{TokenError, TokenService};
