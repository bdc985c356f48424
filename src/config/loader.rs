//! Settings loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::Settings;
use crate::config::source::StaticOptions;
use crate::config::validation::{validate_settings, ValidationError};

/// Error type for settings loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate settings from a TOML file.
///
/// Relative registry and store paths are resolved against the file's directory.
pub fn load_config(path: &Path) -> Result<Settings, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut settings = parse_config(&content)?;
    if let Some(base) = path.parent() {
        settings.resolve_paths(base);
    }
    Ok(settings)
}

/// Parse and validate settings from TOML text.
pub fn parse_config(content: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = toml::from_str(content)?;
    validate_settings(&settings).map_err(ConfigError::Validation)?;
    Ok(settings)
}

/// Re-read only the `[options]` table of the settings file.
pub fn load_static_options(path: &Path) -> Result<StaticOptions, ConfigError> {
    let settings = load_config(path)?;
    Ok(StaticOptions::from_table(&settings.options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [editable]
            charge_timeout = 10

            [options]
            "site.title" = "Portal"
            "search.rows" = 20
            "#
        )
        .unwrap();

        let settings = load_config(file.path()).unwrap();
        assert_eq!(settings.editable.charge_timeout, 10);

        let options = load_static_options(file.path()).unwrap();
        assert_eq!(options.get("site.title"), Some("Portal"));
        assert_eq!(options.get("search.rows"), Some("20"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/settings.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config("[editable\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_error() {
        let err = parse_config("[server]\nbind_address = \"nowhere\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
    }
}
