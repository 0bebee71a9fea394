//! Raster and step-row upload with retries.
//!
//! Each attempt writes the raster (unless an earlier attempt already did)
//! and then upserts the step row. Any failure waits out the backoff and
//! tries again, so a row failure after a stored raster only repeats the row.

use std::sync::Arc;
use std::time::Duration;

use scribe_core::{AttemptId, OwnerId, PersistedStep, StepId, Stroke};
use scribe_renderer::ImageFormat;
use tracing::{debug, warn};

use crate::backend::AttemptBackend;
use crate::error::{BackendError, UploadError};
use crate::metrics;
use crate::retry::RetryConfig;

/// Storage path of a step raster: `{owner}/{attempt}/{index}.png`.
#[must_use]
pub fn object_path(owner: &OwnerId, attempt_id: AttemptId, step_index: u32) -> String {
    format!("{owner}/{attempt_id}/{step_index}.png")
}

/// What to upload for one step.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    /// Owning learner.
    pub owner: &'a OwnerId,
    /// Attempt the step belongs to.
    pub attempt_id: AttemptId,
    /// Step position.
    pub step_index: u32,
    /// PNG bytes.
    pub png: &'a [u8],
    /// Strokes of the step.
    pub strokes: &'a [Stroke],
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Row id of the step.
    pub step_id: StepId,
    /// Storage path of the raster.
    pub raster_path: String,
    /// Attempts used.
    pub attempts: u32,
}

/// Uploads step rasters and rows.
#[derive(Clone)]
pub struct Uploader {
    backend: Arc<dyn AttemptBackend>,
    retry: RetryConfig,
}

impl Uploader {
    /// Create an uploader writing to `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn AttemptBackend>, retry: RetryConfig) -> Self {
        Self { backend, retry }
    }

    /// Upload the raster, then upsert the row.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Failed`] with the last backend error once all
    /// attempts are used.
    pub async fn upload(&self, request: UploadRequest<'_>) -> Result<UploadReceipt, UploadError> {
        let raster_path = object_path(request.owner, request.attempt_id, request.step_index);
        let row = PersistedStep::new(
            request.attempt_id,
            request.step_index,
            raster_path.clone(),
            request.strokes.to_vec(),
        );
        let content_type = ImageFormat::Png.mime_type();
        let max_attempts = self.retry.attempts();

        let mut stored = false;
        let mut last_error: Option<BackendError> = None;

        for attempt in 0..max_attempts {
            let delay = self.retry.delay_for_attempt(attempt);
            if attempt > 0 {
                warn!(
                    "Upload of step {} failed (attempt {}/{}), retrying in {}ms: {}",
                    request.step_index,
                    attempt,
                    max_attempts,
                    delay,
                    last_error
                        .as_ref()
                        .map_or_else(String::new, ToString::to_string)
                );
                if delay > 0 {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }

            if !stored {
                let result = self
                    .backend
                    .put_object(&raster_path, request.png, content_type)
                    .await;
                metrics::record_upload_attempt("storage", result.is_ok());
                if let Err(e) = result {
                    last_error = Some(e);
                    continue;
                }
                stored = true;
            }

            let result = self.backend.upsert_step(&row).await;
            metrics::record_upload_attempt("row", result.is_ok());
            match result {
                Ok(step_id) => {
                    debug!(
                        "Uploaded step {} as {} after {} attempt(s)",
                        request.step_index,
                        step_id,
                        attempt + 1
                    );
                    return Ok(UploadReceipt {
                        step_id,
                        raster_path,
                        attempts: attempt + 1,
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(UploadError::Failed {
            attempts: max_attempts,
            source: last_error
                .unwrap_or_else(|| BackendError::Transport("no upload attempt was made".into())),
        })
    }
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
