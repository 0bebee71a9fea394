//! Error types for store and session operations.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Commit was requested with no active strokes.
    #[error("nothing to commit: the active stroke set is empty")]
    EmptyStep,

    /// Hydration was requested while strokes are still being drawn.
    #[error("cannot hydrate while {0} active strokes are uncommitted")]
    ActiveStrokesPresent(usize),

    /// Hydration data is internally inconsistent.
    #[error("invalid hydration data: {0}")]
    InvalidHydration(String),
}
