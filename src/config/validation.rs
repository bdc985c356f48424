//! Settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//! - Bound the reconciliation throttle
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Settings → Result<(), Vec<ValidationError>>
//! - Declared keys are not checked here; the registry warns about unknown keys

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::Settings;
use crate::registry::validators::parse_chain;

/// A single semantic problem in the settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Upper bound for `editable.charge_timeout`: one year.
pub const MAX_CHARGE_TIMEOUT_SECS: u64 = 365 * 24 * 60 * 60;

pub fn validate_settings(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("invalid socket address '{}'", settings.server.bind_address),
        ));
    }
    if settings.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "server.request_timeout_secs",
            "must be greater than zero",
        ));
    }

    if settings.admin.enabled && settings.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must not be empty"));
    }

    if settings.store.path.trim().is_empty() {
        errors.push(ValidationError::new("store.path", "must not be empty"));
    }

    let editable = &settings.editable;
    if editable.charge_timeout > MAX_CHARGE_TIMEOUT_SECS {
        errors.push(ValidationError::new(
            "editable.charge_timeout",
            format!("must be at most {} seconds", MAX_CHARGE_TIMEOUT_SECS),
        ));
    }

    let mut attachments: Vec<_> = editable.additional_validators.iter().collect();
    attachments.sort();
    for (key, names) in attachments {
        if let Err(e) = parse_chain(names) {
            errors.push(ValidationError::new(
                format!("editable.additional_validators.{}", key),
                e.to_string(),
            ));
        }
    }

    let observability = &settings.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address '{}'", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
