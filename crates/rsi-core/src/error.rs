//! Error types for RSI Core
//!
//! This module defines all error types used throughout the RSI engine.
//! We use `thiserror` for ergonomic error definitions with automatic Display/Error implementations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for RSI operations
pub type Result<T> = std::result::Result<T, RsiError>;

/// Main error type for RSI operations
#[derive(Error, Debug)]
pub enum RsiError {
    /// Safety gate violations (fatal to the current cycle)
    #[error("Safety violation: {0}")]
    Safety(#[from] SafetyViolation),

    /// Knowledge base lookups
    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    /// Change ledger errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Another process holds the state lock
    #[error("State directory is locked by another run: {}", .0.display())]
    Locked(PathBuf),

    /// An external check command could not be started
    #[error("Check command failed to start: {0}")]
    Check(String),

    /// Version-control errors
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<RsiError>,
    },
}

/// Preconditions that must hold before any automated mutation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SafetyViolation {
    #[error("working tree has uncommitted changes")]
    DirtyWorkingTree,

    #[error("build check is failing{}", selector_suffix(.selector))]
    ChecksFailing { selector: Option<String> },
}

fn selector_suffix(selector: &Option<String>) -> String {
    match selector {
        Some(s) => format!(" for {}", s),
        None => String::new(),
    }
}

/// Errors related to Knowledge Store operations
#[derive(Error, Debug, Clone)]
pub enum KnowledgeError {
    #[error("Error entry not found: {0}")]
    ErrorNotFound(String),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),
}

/// Errors related to Change Ledger operations
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("Change record not found: {0}")]
    ChangeNotFound(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("No applied change to roll back")]
    NothingToRollBack,
}

impl RsiError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True when the error aborts a whole cycle rather than a single suggestion
    pub fn is_safety_violation(&self) -> bool {
        match self {
            RsiError::Safety(_) => true,
            RsiError::WithContext { source, .. } => source.is_safety_violation(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<RsiError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let err = KnowledgeError::ErrorNotFound("err-1".to_string());
        let err = RsiError::from(err);
        let err = err.context("Failed to append fix");

        assert!(err.to_string().contains("Failed to append fix"));
        assert!(err.to_string().contains("err-1"));
    }

    #[test]
    fn test_result_ext_on_io_error() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let result = result.context("Writing change ledger");

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Writing change ledger"));
    }

    #[test]
    fn test_safety_violation_survives_context() {
        let err = RsiError::from(SafetyViolation::DirtyWorkingTree).context("cycle aborted");
        assert!(err.is_safety_violation());
        assert!(!RsiError::Config("x".into()).is_safety_violation());
    }

    #[test]
    fn test_checks_failing_display() {
        let err = SafetyViolation::ChecksFailing {
            selector: Some("src/app.ts".to_string()),
        };
        assert_eq!(err.to_string(), "build check is failing for src/app.ts");
        let err = SafetyViolation::ChecksFailing { selector: None };
        assert_eq!(err.to_string(), "build check is failing");
    }
}
