//! Persistence and object storage for attempts and steps.
//!
//! Everything the pipeline persists goes through [`AttemptBackend`]:
//! attempt rows, step rows keyed by `(attempt_id, step_index)`, problem
//! statements, and raster objects.

mod http;
mod local;

pub use http::HttpBackend;
pub use local::LocalBackend;

use async_trait::async_trait;
use scribe_core::{Attempt, AttemptId, OwnerId, PersistedStep, StepId, StepPatch};

use crate::error::BackendError;

/// Durable store for attempts, steps and rasters.
#[async_trait]
pub trait AttemptBackend: Send + Sync {
    /// Latest in-progress attempt of the owner.
    async fn find_in_progress(&self, owner: &OwnerId) -> Result<Option<Attempt>, BackendError>;

    /// Create an in-progress attempt.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Conflict`] if the owner already has one.
    async fn create_attempt(
        &self,
        owner: &OwnerId,
        problem_id: Option<&str>,
    ) -> Result<Attempt, BackendError>;

    /// Mark an attempt completed, optionally unlinking its problem.
    async fn complete_attempt(
        &self,
        attempt_id: AttemptId,
        unlink_problem: bool,
    ) -> Result<(), BackendError>;

    /// Body of a stored problem.
    async fn problem_body(&self, problem_id: &str) -> Result<Option<String>, BackendError>;

    /// Write an object, replacing any existing one at `path`.
    async fn put_object(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BackendError>;

    /// Insert a step row, or return the id of the row already stored for
    /// the same `(attempt_id, step_index)`.
    async fn upsert_step(&self, row: &PersistedStep) -> Result<StepId, BackendError>;

    /// Apply a partial update to a step row.
    async fn update_step(&self, step_id: StepId, patch: &StepPatch) -> Result<(), BackendError>;

    /// All steps of an attempt in ascending index order.
    async fn list_steps(&self, attempt_id: AttemptId) -> Result<Vec<PersistedStep>, BackendError>;

    /// One step of an attempt.
    async fn get_step(
        &self,
        attempt_id: AttemptId,
        step_index: u32,
    ) -> Result<Option<PersistedStep>, BackendError>;
}
