use crate::types::Field;
use thiserror::Error;

/// Rule configuration problems. Fatal at load time, before any document runs.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("invalid pattern for field {field}: `{pattern}`: {source}")]
    InvalidPattern {
        field: Field,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule #{index} for field {field} has no patterns, keywords or position")]
    EmptyRule { field: Field, index: usize },

    #[error("field {0} is the catch-all and cannot carry rules")]
    CatchAllRules(Field),

    #[error("{name} must be within {min}..={max}, got {value}")]
    InvalidThreshold {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("failed to read config {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    Malformed { path: String, message: String },
}

/// A document's runs could not be produced
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("extraction failed for {source_id}: {message}")]
pub struct ExtractionError {
    pub source_id: String,
    pub message: String,
}

impl ExtractionError {
    pub fn new(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            message: message.into(),
        }
    }
}

/// Error half of a batch entry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("batch cancelled before {0} was processed")]
    Cancelled(String),

    #[error("processing {source_id} panicked: {message}")]
    Panicked { source_id: String, message: String },
}

/// Non-fatal findings attached to a processed document
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
pub enum DocumentWarning {
    #[error("no classifiable fragments; record is empty")]
    EmptyDocument,

    #[error("{field} already filled; discarded fragment `{preview}`")]
    DiscardedFragment { field: Field, preview: String },
}
