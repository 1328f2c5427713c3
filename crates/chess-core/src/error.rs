//! Error types for game decoding, ingestion and opening aggregation

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GameError {
    #[error("Malformed game at ply {ply}: {reason}")]
    MalformedGame { ply: usize, reason: String },

    #[error("Incomplete record: missing or invalid field '{field}'")]
    IncompleteRecord { field: &'static str },

    #[error("Duplicate game id {0}")]
    DuplicateId(u64),

    #[error("Invalid opening path: {0}")]
    InvalidPath(String),

    #[error("Invalid mistake thresholds: {0}")]
    InvalidThresholds(String),

    #[error("Invalid opening table: {0}")]
    InvalidOpeningTable(String),

    #[error("Opening tree invariant violated at '{path}': {reason}")]
    TreeInvariant { path: String, reason: String },
}

impl GameError {
    pub(crate) fn malformed(ply: usize, reason: impl Into<String>) -> Self {
        GameError::MalformedGame {
            ply,
            reason: reason.into(),
        }
    }

    /// Invariant violations are defects, never per-record failures.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GameError::InvalidPath(_) | GameError::TreeInvariant { .. }
        )
    }
}
