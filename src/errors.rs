//! Error types for stepwise
//!
//! Every step returns a [`Result`]; the first error aborts the step and,
//! by convention, the scenario that contains it.

use thiserror::Error;

/// Main error type for step execution
#[derive(Error, Debug)]
pub enum StepError {
    #[error("Template syntax error: {0}")]
    TemplateSyntax(String),

    #[error("Property '{path}' not found")]
    PropertyNotFound { path: String },

    #[error("Value mismatch at '{path}': expected {expected} but got {actual}")]
    ValueMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Command failed: {message}\nStdout: {stdout}\nStderr: {stderr}")]
    Command {
        message: String,
        stdout: String,
        stderr: String,
    },

    #[error("Command timed out after {seconds:.1} seconds: {command}")]
    Timeout { seconds: f64, command: String },

    #[error("Command cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid data specification: {0}")]
    InvalidSpec(String),

    #[error("No response available, send a request first")]
    NoResponse,

    #[error("Invalid response JSON: {0}")]
    InvalidResponse(String),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Undefined step: {0}")]
    UndefinedStep(String),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl StepError {
    /// Build a mismatch error from anything displayable
    pub fn mismatch(
        path: impl Into<String>,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        StepError::ValueMismatch {
            path: path.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Whether this error came from an assertion rather than from running a step
    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            StepError::PropertyNotFound { .. } | StepError::ValueMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_message_names_path() {
        let err = StepError::mismatch("data.id", 1, 2);
        assert_eq!(err.to_string(), "Value mismatch at 'data.id': expected 1 but got 2");
        assert!(err.is_assertion());
    }

    #[test]
    fn test_timeout_message() {
        let err = StepError::Timeout { seconds: 1.0, command: "sleep 2".to_string() };
        assert_eq!(err.to_string(), "Command timed out after 1.0 seconds: sleep 2");
        assert!(!err.is_assertion());
    }
}
