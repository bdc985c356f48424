//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! reconciler, admin actions, http layer produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON optional) for machine parsing
//! - Request ID flows through the trace span of every request
//! - Metric calls are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
