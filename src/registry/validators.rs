//! Validator chain attached to declared options.
//!
//! Validators turn loosely typed input (JSON values from the admin API, raw
//! strings from the settings file or the override table) into the declared
//! type. The chain runs in declaration order and every step receives the
//! output of the previous one.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

/// A single named validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Validator {
    /// Rejects null, empty strings and empty lists.
    NotEmpty,
    /// Stops the chain when the value is empty.
    IgnoreEmpty,
    /// Coerces any non-null value into its string form.
    UnicodeSafe,
    /// Parses integers. Empty input becomes null.
    IntValidator,
    /// Integer greater than zero.
    IsPositiveInteger,
    /// Parses the usual truthy spellings, anything else is `false`.
    BooleanValidator,
    /// Whitespace separated list of strings.
    AsList,
    /// Absolute `http`/`https` URL. Empty input passes.
    UrlValidator,
}

impl Validator {
    pub fn name(&self) -> &'static str {
        match self {
            Validator::NotEmpty => "not_empty",
            Validator::IgnoreEmpty => "ignore_empty",
            Validator::UnicodeSafe => "unicode_safe",
            Validator::IntValidator => "int_validator",
            Validator::IsPositiveInteger => "is_positive_integer",
            Validator::BooleanValidator => "boolean_validator",
            Validator::AsList => "as_list",
            Validator::UrlValidator => "url_validator",
        }
    }

    fn apply(&self, value: Value) -> Result<Value, String> {
        match self {
            Validator::NotEmpty => {
                if is_empty(&value) {
                    Err("Missing value".to_string())
                } else {
                    Ok(value)
                }
            }
            // Handled by `run_chain`.
            Validator::IgnoreEmpty => Ok(value),
            Validator::UnicodeSafe => Ok(match value {
                Value::Null => Value::Null,
                Value::String(s) => Value::String(s),
                other => Value::String(render(&other)),
            }),
            Validator::IntValidator => as_integer(value),
            Validator::IsPositiveInteger => match as_integer(value)? {
                Value::Number(n) if n.as_i64().is_some_and(|i| i >= 1) => Ok(Value::Number(n)),
                _ => Err("Must be a positive integer".to_string()),
            },
            Validator::BooleanValidator => Ok(Value::Bool(as_bool(&value))),
            Validator::AsList => Ok(as_list(value)),
            Validator::UrlValidator => match value {
                Value::Null => Ok(Value::Null),
                Value::String(s) if s.is_empty() => Ok(Value::String(s)),
                Value::String(s) if is_url(&s) => Ok(Value::String(s)),
                _ => Err("Please provide a valid URL".to_string()),
            },
        }
    }
}

impl fmt::Display for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validator name that doesn't match any known validator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown validator: {0}")]
pub struct UnknownValidator(pub String);

impl FromStr for Validator {
    type Err = UnknownValidator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_empty" => Ok(Validator::NotEmpty),
            "ignore_empty" => Ok(Validator::IgnoreEmpty),
            "unicode_safe" => Ok(Validator::UnicodeSafe),
            "int_validator" => Ok(Validator::IntValidator),
            "is_positive_integer" => Ok(Validator::IsPositiveInteger),
            "boolean_validator" => Ok(Validator::BooleanValidator),
            "as_list" | "aslist" => Ok(Validator::AsList),
            "url_validator" => Ok(Validator::UrlValidator),
            other => Err(UnknownValidator(other.to_string())),
        }
    }
}

/// Parse a space separated list of validator names.
pub fn parse_chain(names: &str) -> Result<Vec<Validator>, UnknownValidator> {
    names.split_whitespace().map(str::parse).collect()
}

/// Run `value` through `chain`, returning the converted value or the first
/// error message.
pub fn run_chain(chain: &[Validator], value: Value) -> Result<Value, String> {
    let mut current = value;
    for validator in chain {
        if *validator == Validator::IgnoreEmpty && is_empty(&current) {
            return Ok(current);
        }
        current = validator.apply(current)?;
    }
    Ok(current)
}

/// Canonical string form of a typed value.
///
/// Lists are joined with a single space so that `as_list` parses them back
/// into the same items.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(render).collect::<Vec<_>>().join(" "),
        Value::Object(_) => value.to_string(),
    }
}

pub(crate) fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn as_integer(value: Value) -> Result<Value, String> {
    let invalid = || "Invalid integer".to_string();
    match value {
        Value::Null => Ok(Value::Null),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Ok(Value::Number(n))
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                        Ok(Value::from(f as i64))
                    }
                    _ => Err(invalid()),
                }
            }
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(Value::Null);
            }
            trimmed.parse::<i64>().map(Value::from).map_err(|_| invalid())
        }
        _ => Err(invalid()),
    }
}

fn as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "t" | "y" | "1" | "on"
        ),
        _ => false,
    }
}

fn as_list(value: Value) -> Value {
    match value {
        Value::Null => Value::Array(Vec::new()),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Value::String(s),
                    other => Value::String(render(&other)),
                })
                .collect(),
        ),
        Value::String(s) => Value::Array(
            s.split_whitespace()
                .map(|part| Value::String(part.to_string()))
                .collect(),
        ),
        other => Value::Array(vec![Value::String(render(&other))]),
    }
}

fn is_url(s: &str) -> bool {
    let rest = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
            !host.is_empty() && !host.contains(char::is_whitespace)
        }
        None => false,
    }
}
