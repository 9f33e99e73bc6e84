use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Construction-time errors. A pipeline that builds never fails for these
/// reasons while processing a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Step name must not be empty")]
    EmptyStepName,

    #[error("Step '{0}' is registered more than once")]
    DuplicateStep(String),

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Circular dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    #[error("Step '{step}' requires capability '{capability}' which no earlier step provides")]
    MissingCapability { step: String, capability: String },

    #[error("Unknown step '{0}' in step filter")]
    UnknownStep(String),
}

/// Failure reported by a step processor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error("Invalid front matter: {0}")]
    Yaml(String),

    #[error("Import failed for '{path}': {reason}")]
    Import { path: String, reason: String },

    #[error("Metadata export failed: {0}")]
    Export(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Step timed out after {0:?}")]
    Timeout(Duration),

    #[error("Step panicked: {0}")]
    Panic(String),

    #[error("{0}")]
    Other(String),
}

impl StepError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StepError::Yaml(_) => ErrorCode::YamlParse,
            StepError::Import { .. } => ErrorCode::Import,
            StepError::Export(_) => ErrorCode::Export,
            StepError::Template(_) => ErrorCode::Template,
            StepError::Timeout(_) => ErrorCode::Timeout,
            StepError::Panic(_) => ErrorCode::Critical,
            StepError::Other(_) => ErrorCode::StepFailed,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            StepError::Panic(_) => Severity::Critical,
            _ => Severity::Error,
        }
    }

    /// Only panics are unrecoverable.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, StepError::Panic(_))
    }
}

impl From<serde_yaml::Error> for StepError {
    fn from(e: serde_yaml::Error) -> Self {
        StepError::Yaml(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    YamlParse,
    Import,
    Export,
    Template,
    Timeout,
    StepFailed,
    Aborted,
    Configuration,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

/// An error recorded in a pipeline result. Never thrown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingError {
    pub code: ErrorCode,
    pub message: String,
    pub step_name: Option<String>,
    pub severity: Severity,
    pub recoverable: bool,
}

impl ProcessingError {
    pub fn from_step(step_name: &str, error: &StepError) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
            step_name: Some(step_name.to_string()),
            severity: error.severity(),
            recoverable: error.is_recoverable(),
        }
    }

    /// A run rejected before any step executed.
    pub fn configuration(error: &PipelineError) -> Self {
        Self {
            code: ErrorCode::Configuration,
            message: error.to_string(),
            step_name: None,
            severity: Severity::Critical,
            recoverable: false,
        }
    }

    pub fn aborted() -> Self {
        Self {
            code: ErrorCode::Aborted,
            message: "Pipeline aborted".to_string(),
            step_name: None,
            severity: Severity::Error,
            recoverable: false,
        }
    }
}
