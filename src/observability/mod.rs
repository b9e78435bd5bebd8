//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (human-readable or JSON lines)
//!     → /health/metrics (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through logs and upstream requests
//! - Metrics are cheap (atomic increments); without a recorder they are no-ops

pub mod logging;
pub mod metrics;
