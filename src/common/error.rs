//! Error types for crash
//!
//! Errors fall into three groups: compile errors (bad scripts or plan
//! structure), evaluation errors (raised while running a check or an
//! interpolation), and I/O or configuration errors from the outer layers.
//! Ordinary check failures are not errors at all; they are `false` results.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for crash
#[derive(Error, Debug)]
pub enum Error {
    // === Script Errors ===
    #[error("[{line}:{col}] {message}")]
    Parse { line: usize, col: usize, message: String },

    #[error("unexpected end of input: {0}")]
    UnexpectedEof(String),

    // === Evaluation Errors ===
    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation not found: {0}")]
    UnknownOperator(String),

    #[error("'{op}' {message}")]
    Arity { op: String, message: String },

    #[error("type cannot be converted to {target}: {type_name}")]
    Coercion { target: String, type_name: String },

    #[error("cannot compare types: {left}, {right}")]
    Incomparable { left: String, right: String },

    // === Plan Compile Errors ===
    #[error("{0}")]
    Compile(String),

    #[error("invalid timeout '{value}': {reason}")]
    InvalidTimeout { value: String, reason: String },

    #[error("unknown action type: {0}")]
    UnknownAction(String),

    // === Action Errors ===
    #[error("{action}: {param} parameter required")]
    MissingParam { action: String, param: String },

    #[error("{action} failed: {message}")]
    ActionFailed { action: String, message: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an arity error for an operator
    pub fn arity(op: &str, message: impl Into<String>) -> Self {
        Self::Arity {
            op: op.to_string(),
            message: message.into(),
        }
    }

    /// Create a coercion error naming the source type
    pub fn coercion(target: &str, type_name: &str) -> Self {
        Self::Coercion {
            target: target.to_string(),
            type_name: type_name.to_string(),
        }
    }

    /// Create an action failure; the step fails but the run continues
    pub fn action_failed(action: &str, message: impl Into<String>) -> Self {
        Self::ActionFailed {
            action: action.to_string(),
            message: message.into(),
        }
    }

    /// Create a missing parameter error
    pub fn missing_param(action: &str, param: &str) -> Self {
        Self::MissingParam {
            action: action.to_string(),
            param: param.to_string(),
        }
    }

    /// Whether an action returned an ordinary failure rather than an error
    /// that should abort the run
    pub fn is_action_failure(&self) -> bool {
        matches!(self, Error::ActionFailed { .. })
    }

    /// Process exit code for a run aborted by this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        assert_eq!(Error::NotFound("missing".into()).to_string(), "not found: missing");
    }

    #[test]
    fn test_action_failure_classification() {
        assert!(Error::action_failed("http", "connection refused").is_action_failure());
        assert!(!Error::missing_param("http", "url").is_action_failure());
        assert!(!Error::NotFound("x".into()).is_action_failure());
    }

    #[test]
    fn test_arity_message() {
        let e = Error::arity("gt", "accepts only one argument, found 2");
        assert_eq!(e.to_string(), "'gt' accepts only one argument, found 2");
    }
}
