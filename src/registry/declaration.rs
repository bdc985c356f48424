//! Declared options and the declarations file format.
//!
//! ```toml
//! [[option]]
//! key = "site.title"
//! default = "Untitled"
//! validators = "not_empty unicode_safe"
//! editable = true
//! description = "Title shown in the page header"
//! ```

use std::ops::{BitOr, BitOrAssign};

use serde::Deserialize;
use serde_json::Value;

use crate::registry::validators::{parse_chain, render, run_chain, Validator};
use crate::registry::RegistryError;

/// Capability flags of a declared option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionFlags(u8);

impl OptionFlags {
    /// The option may be overridden at runtime.
    pub const EDITABLE: Self = Self(1);
    /// Empty values are rejected regardless of the validator chain.
    pub const REQUIRED: Self = Self(1 << 1);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for OptionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OptionFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

/// A configuration key known to the registry.
#[derive(Debug, Clone)]
pub struct DeclaredOption {
    key: String,
    default: Option<String>,
    validators: Vec<Validator>,
    flags: OptionFlags,
    description: Option<String>,
}

impl DeclaredOption {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            default: None,
            validators: Vec::new(),
            flags: OptionFlags::empty(),
            description: None,
        }
    }

    /// Set the default, stored in canonical string form.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_validators(mut self, validators: impl IntoIterator<Item = Validator>) -> Self {
        self.validators.extend(validators);
        self
    }

    pub fn with_flag(mut self, flag: OptionFlags) -> Self {
        self.flags.insert(flag);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn editable(self) -> Self {
        self.with_flag(OptionFlags::EDITABLE)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn flags(&self) -> OptionFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: OptionFlags) -> bool {
        self.flags.contains(flag)
    }

    pub(crate) fn set_flag(&mut self, flag: OptionFlags, enabled: bool) {
        if enabled {
            self.flags.insert(flag);
        } else {
            self.flags.remove(flag);
        }
    }

    pub(crate) fn push_validators(&mut self, validators: impl IntoIterator<Item = Validator>) {
        self.validators.extend(validators);
    }

    /// Run `value` through the full chain, honouring [`OptionFlags::REQUIRED`].
    pub fn convert(&self, value: Value) -> Result<Value, String> {
        if self.has_flag(OptionFlags::REQUIRED) && super::validators::is_empty(&value) {
            return Err("Missing value".to_string());
        }
        run_chain(&self.validators, value)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeclarationsFile {
    #[serde(default, rename = "option")]
    pub options: Vec<OptionEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OptionEntry {
    pub key: String,
    #[serde(default)]
    pub default: Option<toml::Value>,
    #[serde(default)]
    pub validators: String,
    #[serde(default)]
    pub editable: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl OptionEntry {
    pub fn into_declared(self) -> Result<DeclaredOption, RegistryError> {
        let validators = parse_chain(&self.validators).map_err(|e| RegistryError::Declaration {
            key: self.key.clone(),
            message: e.to_string(),
        })?;

        let mut option = DeclaredOption::new(self.key).with_validators(validators);
        if self.editable {
            option = option.with_flag(OptionFlags::EDITABLE);
        }
        if self.required {
            option = option.with_flag(OptionFlags::REQUIRED);
        }
        if let Some(description) = self.description {
            option = option.with_description(description);
        }

        if let Some(default) = self.default {
            let raw = toml_to_json(default);
            let typed = run_chain(option.validators(), raw).map_err(|message| {
                RegistryError::Declaration {
                    key: option.key().to_string(),
                    message: format!("invalid default: {}", message),
                }
            })?;
            option = option.with_default(render(&typed));
        }

        Ok(option)
    }
}

pub(crate) fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flags() {
        let mut flags = OptionFlags::EDITABLE | OptionFlags::REQUIRED;
        assert!(flags.contains(OptionFlags::EDITABLE));
        flags.remove(OptionFlags::EDITABLE);
        assert!(!flags.contains(OptionFlags::EDITABLE));
        assert!(flags.contains(OptionFlags::REQUIRED));
    }

    #[test]
    fn test_required_rejects_empty() {
        let option = DeclaredOption::new("site.title").with_flag(OptionFlags::REQUIRED);
        assert!(option.convert(json!("")).is_err());
        assert_eq!(option.convert(json!("x")).unwrap(), json!("x"));
    }

    #[test]
    fn test_entry_default_is_canonical() {
        let entry: OptionEntry = toml::from_str(
            r#"
            key = "app.plugins"
            default = ["text_view", "image_view"]
            validators = "as_list"
            "#,
        )
        .unwrap();
        let option = entry.into_declared().unwrap();
        assert_eq!(option.default_value(), Some("text_view image_view"));
        assert!(!option.has_flag(OptionFlags::EDITABLE));
    }

    #[test]
    fn test_entry_invalid_default() {
        let entry: OptionEntry = toml::from_str(
            r#"
            key = "search.rows"
            default = "many"
            validators = "int_validator"
            "#,
        )
        .unwrap();
        assert!(matches!(
            entry.into_declared(),
            Err(RegistryError::Declaration { .. })
        ));
    }
}
