//! Declared-option registry.
//!
//! # Data Flow
//! ```text
//! declarations file (TOML)
//!     → declaration.rs (entries → DeclaredOption, defaults canonicalized)
//!     → Registry::new (duplicate check)
//!     → with_validators (per-key validator attachments from settings)
//!     → with_policy (editable flag snapshot, policy.rs)
//!     → Arc<Registry>, read-only for the rest of the process
//! ```
//!
//! # Design Decisions
//! - Flags are resolved once at startup; there is no runtime mutation of a
//!   shared declaration
//! - Every value stored anywhere (file, override table, live map) is a
//!   canonical string; the validator chain is the only way back to a typed value

pub mod declaration;
pub mod policy;
pub mod validators;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde_json::Value;

pub use declaration::{DeclaredOption, OptionFlags};
pub use policy::EditablePolicy;
pub use validators::Validator;

use declaration::DeclarationsFile;
use validators::{parse_chain, render};

/// Error messages keyed by configuration key.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Errors raised while building the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read declarations: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse declarations: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("option {key} is declared twice")]
    Duplicate { key: String },

    #[error("option {key}: {message}")]
    Declaration { key: String, message: String },
}

/// Catalog of every known configuration key.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    options: BTreeMap<String, DeclaredOption>,
}

impl Registry {
    pub fn new(options: impl IntoIterator<Item = DeclaredOption>) -> Result<Self, RegistryError> {
        let mut map = BTreeMap::new();
        for option in options {
            let key = option.key().to_string();
            if map.insert(key.clone(), option).is_some() {
                return Err(RegistryError::Duplicate { key });
            }
        }
        Ok(Self { options: map })
    }

    /// Parse a declarations document.
    pub fn from_toml_str(content: &str) -> Result<Self, RegistryError> {
        let file: DeclarationsFile = toml::from_str(content)?;
        let options = file
            .options
            .into_iter()
            .map(|entry| entry.into_declared())
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(options)
    }

    /// Load declarations from disk.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Append validators named in `attachments` (key → space separated names).
    ///
    /// Undeclared keys and unknown validator names are logged and skipped.
    pub fn with_validators(mut self, attachments: &HashMap<String, String>) -> Self {
        for (key, names) in attachments {
            let Some(option) = self.options.get_mut(key) else {
                tracing::warn!(key = %key, "Option is not declared, ignoring additional validators");
                continue;
            };
            match parse_chain(names) {
                Ok(chain) => option.push_validators(chain),
                Err(e) => tracing::warn!(key = %key, error = %e, "Ignoring additional validators"),
            }
        }
        self
    }

    /// Bake the resolved editable set into the declarations.
    pub fn with_policy(mut self, policy: &EditablePolicy) -> Self {
        let editable = policy.resolve(&self);
        for (key, option) in self.options.iter_mut() {
            option.set_flag(OptionFlags::EDITABLE, editable.contains(key));
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&DeclaredOption> {
        self.options.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    /// A key is a legal override target iff it is declared and editable.
    pub fn is_editable(&self, key: &str) -> bool {
        self.get(key)
            .is_some_and(|option| option.has_flag(OptionFlags::EDITABLE))
    }

    /// Declared options in key order.
    pub fn iter(&self) -> impl Iterator<Item = &DeclaredOption> {
        self.options.values()
    }

    pub fn editable_keys(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|option| option.has_flag(OptionFlags::EDITABLE))
            .map(DeclaredOption::key)
    }

    pub fn default_value(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(DeclaredOption::default_value)
    }

    /// Canonical string form of `value` for `key`.
    ///
    /// Falls back to plain string conversion for undeclared keys, or when the
    /// chain rejects the value (validation reports that separately).
    pub fn canonicalize(&self, key: &str, value: &Value) -> String {
        let Some(option) = self.get(key) else {
            tracing::warn!(key = %key, "Option is not declared, using generic string conversion");
            return render(value);
        };
        match option.convert(value.clone()) {
            Ok(typed) => render(&typed),
            Err(_) => render(value),
        }
    }

    /// Parse a canonical string through the key's chain.
    pub fn parse(&self, key: &str, raw: &str) -> Result<Value, String> {
        match self.get(key) {
            Some(option) => option.convert(Value::String(raw.to_string())),
            None => Ok(Value::String(raw.to_string())),
        }
    }

    /// Validate `keys` against a merged configuration view.
    ///
    /// `lookup` resolves the value each key would have after the pending
    /// change; a missing value is validated as empty.
    pub fn validate<'a, F>(&self, keys: impl IntoIterator<Item = &'a str>, lookup: F) -> FieldErrors
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut errors = FieldErrors::new();
        for key in keys {
            let Some(option) = self.get(key) else {
                errors
                    .entry(key.to_string())
                    .or_default()
                    .push("Option is not declared".to_string());
                continue;
            };
            let value = lookup(key).map(Value::String).unwrap_or(Value::Null);
            if let Err(message) = option.convert(value) {
                errors.entry(key.to_string()).or_default().push(message);
            }
        }
        errors
    }
}
