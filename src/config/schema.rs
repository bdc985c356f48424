//! Settings schema definitions.
//!
//! The settings file carries both the engine's own switches and the
//! application's static options (`[options]`). All sections derive Serde
//! traits and default every field, so an empty file is a valid one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::registry::EditablePolicy;

/// Root of the settings file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Application HTTP listener.
    pub server: ServerConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Override store location.
    pub store: StoreConfig,

    /// Declarations file location.
    pub registry: RegistryConfig,

    /// Editability and reconciliation switches.
    pub editable: EditableConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Static application options. Nested tables become dotted keys.
    pub options: toml::Table,
}

impl Settings {
    /// Make relative file paths relative to `base` (the settings file's directory).
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.registry.path.is_relative() {
            self.registry.path = base.join(&self.registry.path);
        }
        if !self.store.is_in_memory() && Path::new(&self.store.path).is_relative() {
            self.store.path = base.join(&self.store.path).to_string_lossy().into_owned();
        }
    }
}

/// Application listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Override store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path, or `:memory:`.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "editable-config.db".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

/// Declarations file configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Path to the TOML file of `[[option]]` declarations.
    pub path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("declarations.toml"),
        }
    }
}

/// Editability and reconciliation switches. Read once at startup.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EditableConfig {
    /// When non-empty, keys outside this list are never editable.
    #[serde(deserialize_with = "key_list")]
    pub whitelist: Vec<String>,

    /// Keys never editable.
    #[serde(deserialize_with = "key_list")]
    pub blacklist: Vec<String>,

    /// Keys made editable in addition to their declaration.
    #[serde(deserialize_with = "key_list")]
    pub extra_editable: Vec<String>,

    /// Minimum seconds between before-request passes. 0 checks every request.
    pub charge_timeout: u64,

    /// Extra validators per key, space separated, appended to the declared chain.
    pub additional_validators: HashMap<String, String>,
}

impl EditableConfig {
    pub fn policy(&self) -> EditablePolicy {
        EditablePolicy {
            whitelist: self.whitelist.clone(),
            blacklist: self.blacklist.clone(),
            extra_editable: self.extra_editable.clone(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyList {
    List(Vec<String>),
    Text(String),
}

/// Accept `["a", "b"]` or `"a b"`.
fn key_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match KeyList::deserialize(deserializer)? {
        KeyList::List(keys) => keys,
        KeyList::Text(text) => text.split_whitespace().map(str::to_string).collect(),
    })
}
