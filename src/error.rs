//! Error types for RAML loading and parsing

use thiserror::Error;

use crate::schema::ValidationReport;

/// Result type for parser operations
pub type Result<T> = std::result::Result<T, RamlError>;

/// Fatal parse errors. Any of these aborts the whole parse.
#[derive(Error, Debug)]
pub enum RamlError {
    #[error("Invalid RAML header: {0}")]
    Header(String),

    #[error("No such file {0} found")]
    NotFound(String),

    #[error("Invalid document structure: {0}")]
    Structural(String),

    #[error("Validation failed: {0}")]
    Validation(ValidationReport),

    #[error("Duplicate key {0} in mapping")]
    DuplicateKey(String),

    #[error("Include cycle detected: {0}")]
    IncludeCycle(String),

    #[error("Includes nested deeper than {0} levels")]
    IncludeDepth(usize),

    #[error("Invalid URI {uri}: {message}")]
    InvalidUri { uri: String, message: String },

    #[error("Failed to fetch {uri}: {message}")]
    Fetch { uri: String, message: String },

    #[error("Fetching {uri} returned HTTP {status}")]
    HttpStatus { uri: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(serde_yaml::Error),
}

impl RamlError {
    pub(crate) fn structural(message: impl Into<String>) -> Self {
        RamlError::Structural(message.into())
    }
}

impl From<serde_yaml::Error> for RamlError {
    fn from(err: serde_yaml::Error) -> Self {
        // serde_yaml rejects repeated keys while building a Mapping; surface
        // that as its own error kind. Matches the 0.9.x message format
        // `duplicate entry with key "title" at line 3 column 1`.
        let message = err.to_string();
        match message.strip_prefix("duplicate entry ") {
            Some(rest) => {
                let detail = rest.split(" at line").next().unwrap_or(rest);
                let key = detail
                    .strip_prefix("with key ")
                    .unwrap_or(detail)
                    .trim_matches(|c| c == '"' || c == '`');
                RamlError::DuplicateKey(key.to_string())
            }
            None => RamlError::Yaml(err),
        }
    }
}

impl From<ValidationReport> for RamlError {
    fn from(report: ValidationReport) -> Self {
        RamlError::Validation(report)
    }
}

/// Errors raised while defining entity schemas
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Entity `{0}` is defined twice")]
    DuplicateEntity(String),

    #[error("Entity `{entity}` references unknown entity `{target}`")]
    UnknownReference { entity: String, target: String },

    #[error("Entity `{entity}` extends unknown entity `{parent}`")]
    UnknownParent { entity: String, parent: String },

    #[error("Inheritance cycle through entity `{0}`")]
    InheritanceCycle(String),

    #[error("Field `{field}` of entity `{entity}`: Or requires at least 2 variants but got {count}")]
    TooFewVariants {
        entity: String,
        field: String,
        count: usize,
    },
}
