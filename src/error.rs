//! Error types for osf-expression

use thiserror::Error;

use crate::types::ClassId;

/// A packet that does not match the fixed wire layout.
///
/// Never fatal: the offending packet is dropped and the stream continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Wrong packet length: expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("Packet truncated at offset {offset} while reading {field}")]
    Truncated { field: &'static str, offset: usize },
}

/// The trainer could not produce a model from the assembled dataset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Training failed: {0}")]
pub struct TrainingError(pub String);

/// Errors that abort a collection/training/inference run
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Malformed packet: {0}")]
    Format(#[from] FormatError),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error(transparent)]
    Training(#[from] TrainingError),

    #[error("Class id {0} has no entry in the label table")]
    UnknownLabel(ClassId),

    #[error("Invalid transition: cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
