//! Settings management subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Settings (validated, read once at startup)
//!     → [options] flattened by source.rs into StaticOptions
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs re-parses [options]
//!     → live entries without an override take the new file values
//!     → StaticSource swaps in the new snapshot
//!     → reconciler uses it for the next removed override
//! ```
//!
//! # Design Decisions
//! - Engine switches are startup-only; only static options hot reload
//! - All fields have defaults to allow minimal settings files
//! - Validation separates syntactic (serde) from semantic checks
//! - `EDITABLE_CONFIG_DISABLED` in the environment disables the engine

pub mod loader;
pub mod schema;
pub mod source;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_static_options, parse_config, ConfigError};
pub use schema::{
    AdminConfig, EditableConfig, ObservabilityConfig, RegistryConfig, ServerConfig, Settings,
    StoreConfig,
};
pub use source::{StaticOptions, StaticSource};

/// Environment variable that turns the engine off for the process.
pub const DISABLE_ENV: &str = "EDITABLE_CONFIG_DISABLED";

/// Whether the kill switch is set to a truthy value.
pub fn disabled_by_env() -> bool {
    std::env::var(DISABLE_ENV)
        .map(|value| is_truthy(&value))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
