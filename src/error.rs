//! Error taxonomy for the import pipeline.
//!
//! Fatal conditions surface as [`ImportError`] values; row-level problems are
//! absorbed into an import job's failure list as [`FailureReason`] entries and
//! never abort a run on their own.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Column mapping is empty")]
    EmptyMapping,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Batch submission failed: {0}")]
    BatchFailed(String),

    #[error("Import cancelled")]
    Cancelled,

    #[error("An import job is already in progress")]
    JobInProgress,
}

/// Why a single row was not imported. Recorded per row, reported in
/// aggregate when the job completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Cell count disagreed with the mapping length; the row was skipped.
    ShapeMismatch,
    /// The store rejected the row, with its message.
    BatchFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    /// Zero-based index into the data rows (header excluded).
    pub row_index: usize,
    pub reason: FailureReason,
}

impl RowFailure {
    pub fn new(row_index: usize, reason: FailureReason) -> Self {
        Self { row_index, reason }
    }
}
