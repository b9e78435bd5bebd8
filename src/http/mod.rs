//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, local endpoints)
//!     → pipeline.rs (authenticate → authorize → rate limit → route → dispatch)
//!     → request.rs (rewrite URI, forwarding headers)
//!     → upstream.rs (bounded backend call) / websocket.rs (upgrade tunnel)
//!     → response.rs (structured errors, hop-by-hop cleanup)
//!     → Send to client
//! ```

pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;
pub mod upstream;
pub mod websocket;

pub use pipeline::{Gateway, Stage, STAGES};
pub use request::X_REQUEST_ID;
pub use response::GatewayError;
pub use server::{HttpServer, StartupError};
