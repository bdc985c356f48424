//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID)
//!     → reconcile.rs (before-request pass, every route)
//!     → handler reads the live map
//!     → admin routes mounted under /api/editable-config
//! ```

pub mod reconcile;
pub mod request;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
