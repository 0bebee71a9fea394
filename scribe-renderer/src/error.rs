//! Renderer error types.

use thiserror::Error;

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that can occur during snapshot export.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Rasterization or encoding failed.
    #[error("Export failed: {0}")]
    Export(String),

    /// Every export attempt failed or produced zero bytes.
    #[error("No encoding produced after {attempts} attempts")]
    NoEncoding {
        /// Number of attempts made.
        attempts: u32,
    },

    /// Artifact could not be written.
    #[error("Artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
}
