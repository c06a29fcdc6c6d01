//! Configuration handling for schema_plan

use serde::{Deserialize, Serialize};
use std::fs;

use crate::error::{Error, Result};

/// Load configuration from a TOML file
pub fn load_from_file(path: &str) -> Result<Config> {
    let config_str = fs::read_to_string(path)
        .map_err(|e| Error::ConfigError(format!("Failed to read config file: {}", e)))?;

    let config: Config = toml::from_str(&config_str)
        .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?;

    Ok(config)
}

/// Represents the complete schema_plan configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub diff: DiffConfig,
    pub database: DatabaseConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// How `diff` renders its result
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DiffFormat {
    /// Wrapped forward script
    #[default]
    Sql,
    /// goose migration with Up and Down sections
    Goose,
    /// Line diff of the CREATE TABLE text of both sides
    Diff,
}

impl DiffFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffFormat::Sql => "sql",
            DiffFormat::Goose => "goose",
            DiffFormat::Diff => "diff",
        }
    }
}

/// Schema comparison settings
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DiffConfig {
    /// Compare references and emit foreign key constraints
    pub foreign_key: bool,
    /// Tables left out of every loaded schema
    pub ignore_tables: Vec<String>,
    pub format: DiffFormat,
}

/// Database connection configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Seconds to keep retrying the initial connection
    pub timeout_seconds: u64,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 180,
            pool_size: 1,
        }
    }
}

/// Output destination configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output path; stdout when unset
    pub directory: Option<String>,
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `text` or `json`
    pub format: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "text".to_string(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.diff.foreign_key);
        assert_eq!(config.diff.format, DiffFormat::Sql);
        assert_eq!(config.database.timeout_seconds, 180);
        assert_eq!(config.logging.level, "warn");
        assert!(config.output.directory.is_none());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[diff]
foreign_key = true
ignore_tables = ["schema_migrations"]
format = "goose"

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = load_from_file(file.path().to_str().unwrap()).unwrap();
        assert!(config.diff.foreign_key);
        assert_eq!(config.diff.ignore_tables, vec!["schema_migrations"]);
        assert_eq!(config.diff.format, DiffFormat::Goose);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "text");
        assert_eq!(config.database.timeout_seconds, 180);
    }

    #[test]
    fn test_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[diff]\nformat = \"xml\"\n").unwrap();

        let err = load_from_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));

        let err = load_from_file("/nonexistent/schema_plan.toml").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
