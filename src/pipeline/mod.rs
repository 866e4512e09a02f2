pub mod types;
pub mod extraction;
pub mod patient;
pub mod prompt;
pub mod simplification;
pub mod ollama;
pub mod reinjection;
pub mod orchestrator;

pub use types::*;
pub use extraction::*;
pub use patient::*;
pub use prompt::*;
pub use simplification::*;
pub use ollama::*;
pub use reinjection::*;
pub use orchestrator::*;

use serde::Serialize;
use thiserror::Error;

use crate::fhir::path::PathError;
use crate::markup::MarkupError;

#[derive(Error, Debug)]
pub enum LensError {
    // Configuration
    #[error("Unrecognized language code: {0:?}")]
    UnrecognizedLanguage(String),

    #[error("Unsupported model selector: {0:?}")]
    UnsupportedModel(String),

    // Parse
    #[error("Malformed narrative in subsection {section}: {source}")]
    MarkupParse {
        section: usize,
        #[source]
        source: MarkupError,
    },

    #[error("Path query failed: {0}")]
    PathQuery(#[from] PathError),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    // Validation
    #[error("The number of responses does not match the number of inputs: expected {expected}, got {actual}")]
    CardinalityMismatch { expected: usize, actual: usize },

    #[error("Extraction item {index} contains the delimiter '{delimiter}'")]
    DelimiterInItem { index: usize, delimiter: char },

    #[error("Anchor for item {index} no longer points at a target element in subsection {section}")]
    AnchorMismatch { index: usize, section: usize },

    #[error("No Patient resource in patient summary")]
    PatientNotFound,

    #[error("Patient summary holds {count} Patient resources, expected exactly one")]
    AmbiguousPatient { count: usize },

    #[error("Invalid or missing birth date: {0:?}")]
    InvalidBirthDate(String),

    #[error("{resource} is missing {field}")]
    MissingField { resource: String, field: String },

    // Upstream
    #[error("Simplification service is not reachable at {0}")]
    ServiceUnavailable(String),

    #[error("Simplification service returned error (status {status}): {body}")]
    ServiceError { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Malformed simplification response: {0}")]
    MalformedResponse(String),
}

/// Failure category, for callers rendering diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Parse,
    Validation,
    Upstream,
}

impl LensError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnrecognizedLanguage(_) | Self::UnsupportedModel(_) => ErrorKind::Configuration,
            Self::MarkupParse { .. } | Self::PathQuery(_) | Self::MalformedDocument(_) => {
                ErrorKind::Parse
            }
            Self::CardinalityMismatch { .. }
            | Self::DelimiterInItem { .. }
            | Self::AnchorMismatch { .. }
            | Self::PatientNotFound
            | Self::AmbiguousPatient { .. }
            | Self::InvalidBirthDate(_)
            | Self::MissingField { .. } => ErrorKind::Validation,
            Self::ServiceUnavailable(_)
            | Self::ServiceError { .. }
            | Self::HttpClient(_)
            | Self::MalformedResponse(_) => ErrorKind::Upstream,
        }
    }
}
