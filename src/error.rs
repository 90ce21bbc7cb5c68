use thiserror::Error;

use crate::{dao::storage::StorageError, services::calculator::CalcError};

/// Errors that can occur while recalculating one unit of work.
///
/// None of these escape the pipeline: the orchestrator logs them and moves on to sibling work.
#[derive(Debug, Error)]
pub enum RecalcError {
    /// Storage backend is unavailable or returned bad data.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// The performance calculator rejected the play or the beatmap.
    #[error("performance calculation failed")]
    Calculation(#[source] CalcError),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl From<StorageError> for RecalcError {
    fn from(err: StorageError) -> Self {
        RecalcError::Unavailable(err)
    }
}

impl From<CalcError> for RecalcError {
    fn from(err: CalcError) -> Self {
        match err {
            CalcError::Timeout => RecalcError::Timeout,
            other => RecalcError::Calculation(other),
        }
    }
}
