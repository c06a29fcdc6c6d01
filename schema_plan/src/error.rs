//! Error types for schema_plan

use thiserror::Error;

/// Result type for schema_plan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for schema_plan
#[derive(Error, Debug)]
pub enum Error {
    #[error("{kind} `{name}` not found ({context})")]
    NotFound {
        kind: &'static str,
        name: String,
        context: String,
    },

    #[error("duplicate {kind} name `{name}` ({context})")]
    DuplicateName {
        kind: &'static str,
        name: String,
        context: String,
    },

    #[error("reference must be 'table_name.column_name'. table:{table}, column:{column}, ref:{reference}")]
    MalformedReference {
        table: String,
        column: String,
        reference: String,
    },

    #[error("unknown column type: {0}")]
    InvalidType(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Spreadsheet error: {0}")]
    SpreadsheetError(String),

    #[error("Template error: {0}")]
    TemplateError(String),
}

/// Coarse classification of an [`Error`], for callers that branch on the failure mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    DuplicateName,
    MalformedReference,
    InvalidType,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::DuplicateName { .. } => ErrorKind::DuplicateName,
            Error::MalformedReference { .. } => ErrorKind::MalformedReference,
            Error::InvalidType(_) => ErrorKind::InvalidType,
            _ => ErrorKind::Other,
        }
    }
}

/// Convert Serde JSON errors to schema_plan errors
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert YAML errors to schema_plan errors
impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert TOML deserialization errors to schema_plan errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}

/// Convert spreadsheet read errors to schema_plan errors
impl From<calamine::XlsxError> for Error {
    fn from(error: calamine::XlsxError) -> Self {
        Error::SpreadsheetError(error.to_string())
    }
}

/// Convert spreadsheet write errors to schema_plan errors
impl From<rust_xlsxwriter::XlsxError> for Error {
    fn from(error: rust_xlsxwriter::XlsxError) -> Self {
        Error::SpreadsheetError(error.to_string())
    }
}

impl From<minijinja::Error> for Error {
    fn from(error: minijinja::Error) -> Self {
        Error::TemplateError(error.to_string())
    }
}
