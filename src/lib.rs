//! Runtime-editable configuration overrides.

// Declarations and persistence
pub mod config;
pub mod registry;
pub mod store;

// Engine
pub mod reconcile;
pub mod runtime;

// Surfaces
pub mod admin;
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::Settings;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use runtime::{Engine, LiveConfig};
