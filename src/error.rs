//! Error types for the review gate.
//!
//! Library seams return these typed errors; the binary wraps them in
//! `anyhow` with context.

use crate::workflow::Stage;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Classification of everything that can go wrong during a review run.
///
/// Only `InvalidInput` and `TotalDispatchFailure` end a run in `ERRORED`;
/// the other two are recorded and the run continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewErrorKind {
    /// Malformed or empty work unit, or the change set could not be acquired.
    InvalidInput,
    /// A single analyzer errored or timed out.
    AnalyzerFailure,
    /// Every registered analyzer failed.
    TotalDispatchFailure,
    /// The notifier could not deliver a message.
    NotificationFailure,
}

impl ReviewErrorKind {
    /// Whether this kind drives the workflow to `ERRORED`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReviewErrorKind::InvalidInput | ReviewErrorKind::TotalDispatchFailure
        )
    }
}

impl fmt::Display for ReviewErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewErrorKind::InvalidInput => write!(f, "INVALID_INPUT"),
            ReviewErrorKind::AnalyzerFailure => write!(f, "ANALYZER_FAILURE"),
            ReviewErrorKind::TotalDispatchFailure => write!(f, "TOTAL_DISPATCH_FAILURE"),
            ReviewErrorKind::NotificationFailure => write!(f, "NOTIFICATION_FAILURE"),
        }
    }
}

/// A work unit that cannot be reviewed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("work unit contains no files")]
    EmptyFileSet,

    #[error("file #{index} has an empty path")]
    EmptyPath { index: usize },

    #[error("duplicate file path in work unit: {path}")]
    DuplicatePath { path: String },
}

/// A score schema that cannot be registered.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("score key must not be empty")]
    EmptyKey,

    #[error("score key declared twice: {key}")]
    DuplicateKey { key: String },

    #[error("score '{key}' has an invalid range [{min}, {max}]")]
    InvalidRange { key: String, min: f64, max: f64 },
}

/// Registering an analyzer failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("analyzer name must not be empty")]
    EmptyName,

    #[error("analyzer already registered: {name}")]
    DuplicateName { name: String },

    #[error("analyzer '{analyzer}' declares an invalid schema: {source}")]
    InvalidSchema {
        analyzer: String,
        #[source]
        source: SchemaError,
    },
}

/// Fetching a change set failed.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid repository identifier: {0}")]
    InvalidRepoId(String),

    #[error("source directory not found: {0}")]
    NotFound(String),

    #[error("failed to scan change set: {0}")]
    Scan(String),
}

/// Delivering a notification failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("delivery timed out after {0}s")]
    Timeout(u64),
}

/// A configuration value outside its allowed range.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} must be at least 1 second")]
    ZeroTimeout { field: String },
}

/// Errors raised by the workflow driver itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    #[error("illegal stage transition {from} -> {to}")]
    IllegalTransition { from: Stage, to: Stage },

    #[error("review is already terminal ({stage}) and cannot be modified")]
    Terminal { stage: Stage },

    #[error("threshold '{threshold}' is bound to unregistered analyzer '{analyzer}'")]
    UnboundAnalyzer {
        threshold: &'static str,
        analyzer: String,
    },

    #[error("threshold '{threshold}' reads score '{key}' which analyzer '{analyzer}' does not declare")]
    UndeclaredScore {
        threshold: &'static str,
        analyzer: String,
        key: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(ReviewErrorKind::InvalidInput.is_fatal());
        assert!(ReviewErrorKind::TotalDispatchFailure.is_fatal());
        assert!(!ReviewErrorKind::AnalyzerFailure.is_fatal());
        assert!(!ReviewErrorKind::NotificationFailure.is_fatal());
    }

    #[test]
    fn test_registry_error_mentions_schema_problem() {
        let err = RegistryError::InvalidSchema {
            analyzer: "quality".to_string(),
            source: SchemaError::DuplicateKey {
                key: "score".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("quality"));
        assert!(msg.contains("score"));
    }

    #[test]
    fn test_illegal_transition_display() {
        let err = WorkflowError::IllegalTransition {
            from: Stage::Decided,
            to: Stage::Dispatched,
        };
        assert_eq!(err.to_string(), "illegal stage transition DECIDED -> DISPATCHED");
    }
}
