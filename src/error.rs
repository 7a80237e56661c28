use std::path::PathBuf;

use thiserror::Error;

/// Main application error type for everything outside a validation run.
///
/// A run itself never fails: every failure inside it is turned into a
/// finding. These errors come from loading properties and configuration,
/// reading input documents and rendering reports.
#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Properties error: {0}")]
    Properties(#[from] PropertiesError),

    #[error("Report rendering error: {0}")]
    Report(#[from] ReportError),

    #[error("File system traversal error: {path} - {reason}")]
    FileSystemTraversal { path: PathBuf, reason: String },

    #[error("Concurrent operation error: {details}")]
    Concurrency { details: String },
}

/// Errors raised while loading a rule configuration source
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Cannot read configuration file {path}: {details}")]
    Read { path: PathBuf, details: String },

    #[error("Invalid configuration format in {path}: {details}")]
    InvalidFormat { path: PathBuf, details: String },

    #[error("Unknown step kind '{kind}' in validation '{schema}' version '{version}'")]
    UnknownStepKind {
        kind: String,
        schema: String,
        version: String,
    },

    #[error("FILTER step in validation '{schema}' version '{version}' has no rule attribute")]
    MissingFilterRule { schema: String, version: String },
}

/// Errors raised while loading validator properties
#[derive(Error, Debug)]
pub enum PropertiesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Properties validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported properties file format: {0}")]
    UnsupportedFormat(String),
}

/// A document that cannot enter the pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Document is empty")]
    Empty,

    #[error("Document is not well-formed at byte {position}: {details}")]
    NotWellFormed { position: u64, details: String },

    #[error("Document has no root element")]
    MissingRoot,
}

/// Internal failure of a structural, rule or predicate capability.
///
/// The pipeline converts every `StepError` into a fatal finding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("Resource not found: {path}")]
    ResourceNotFound { path: PathBuf },

    #[error("Cannot load resource {path}: {details}")]
    ResourceLoad { path: PathBuf, details: String },

    #[error("Transformation with {resource} failed: {details}")]
    Transformation { resource: PathBuf, details: String },

    #[error("Cannot interpret output of {resource}: {details}")]
    InvalidOutput { resource: PathBuf, details: String },

    #[error("Schema validation internal error: {details}")]
    Engine { details: String },
}

/// LibXML2-specific error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibXml2Error {
    #[error("Schema parsing failed for {path}: {details}")]
    SchemaParseFailed { path: PathBuf, details: String },

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("Document parsing failed: {details}")]
    DocumentParseFailed { details: String },

    #[error("Validation failed with internal code {code}")]
    ValidationFailed { code: i32 },

    #[error("Invalid resource path: {path}")]
    InvalidPath { path: PathBuf },
}

/// Errors raised while rendering a report
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("XML serialization failed: {0}")]
    Xml(String),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<LibXml2Error> for StepError {
    fn from(err: LibXml2Error) -> Self {
        match err {
            LibXml2Error::SchemaParseFailed { path, details } => {
                StepError::ResourceLoad { path, details }
            }
            LibXml2Error::InvalidPath { path } => StepError::ResourceNotFound { path },
            other => StepError::Engine {
                details: other.to_string(),
            },
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ValidatorError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Capability result type alias
pub type StepResult<T> = std::result::Result<T, StepError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_config_error_display() {
        let unknown = ConfigError::UnknownStepKind {
            kind: "XQUERY".to_string(),
            schema: "INVOICE".to_string(),
            version: "2.0".to_string(),
        };
        let text = unknown.to_string();
        assert!(text.contains("Unknown step kind"));
        assert!(text.contains("XQUERY"));
        assert!(text.contains("INVOICE"));

        let missing = ConfigError::MissingFilterRule {
            schema: "INVOICE".to_string(),
            version: "2.0".to_string(),
        };
        assert!(missing.to_string().contains("no rule attribute"));
    }

    #[test]
    fn test_step_error_display() {
        let not_found = StepError::ResourceNotFound {
            path: PathBuf::from("/data/xsd/missing.xsd"),
        };
        assert!(not_found.to_string().contains("missing.xsd"));

        let transform = StepError::Transformation {
            resource: PathBuf::from("rules.xsl"),
            details: "exit status 6".to_string(),
        };
        assert!(transform.to_string().contains("rules.xsl"));
        assert!(transform.to_string().contains("exit status 6"));
    }

    #[test]
    fn test_libxml2_error_into_step_error() {
        let err: StepError = LibXml2Error::SchemaParseFailed {
            path: PathBuf::from("broken.xsd"),
            details: "Start tag expected".to_string(),
        }
        .into();
        assert_eq!(
            err,
            StepError::ResourceLoad {
                path: PathBuf::from("broken.xsd"),
                details: "Start tag expected".to_string(),
            }
        );

        let err: StepError = LibXml2Error::ValidationFailed { code: -1 }.into();
        assert!(matches!(err, StepError::Engine { .. }));
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let validator_error = ValidatorError::Io(io_error);

        let source = validator_error.source().unwrap();
        assert_eq!(source.to_string(), "File not found");
    }

    #[test]
    fn test_document_error_display() {
        let err = DocumentError::NotWellFormed {
            position: 42,
            details: "mismatched end tag".to_string(),
        };
        assert!(err.to_string().contains("byte 42"));
        assert_eq!(DocumentError::Empty.to_string(), "Document is empty");
    }
}
