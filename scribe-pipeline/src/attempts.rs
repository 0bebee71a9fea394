//! Resolving the learner's current attempt and its problem.

use scribe_core::{Attempt, OwnerId};
use tracing::{debug, info};

use crate::backend::AttemptBackend;
use crate::error::BackendError;

/// Return the owner's in-progress attempt, creating one if needed.
///
/// A concurrent create surfaces as [`BackendError::Conflict`]; the attempt
/// that won the race is then read back and used.
///
/// # Errors
///
/// Returns the backend error if lookup or creation fails.
pub async fn ensure_attempt(
    backend: &dyn AttemptBackend,
    owner: &OwnerId,
    problem_id: Option<&str>,
) -> Result<Attempt, BackendError> {
    if let Some(attempt) = backend.find_in_progress(owner).await? {
        debug!("Resuming attempt {} for {}", attempt.id, owner);
        return Ok(attempt);
    }

    match backend.create_attempt(owner, problem_id).await {
        Ok(attempt) => {
            info!("Created attempt {} for {}", attempt.id, owner);
            Ok(attempt)
        }
        Err(BackendError::Conflict(message)) => {
            debug!("Attempt create raced for {}: {}", owner, message);
            backend
                .find_in_progress(owner)
                .await?
                .ok_or(BackendError::Conflict(message))
        }
        Err(e) => Err(e),
    }
}

/// Resolve the problem statement known before any recognition.
///
/// An explicit statement wins; otherwise the attempt's linked problem body
/// is looked up. Step 0 capture happens later, in the session view.
///
/// # Errors
///
/// Returns the backend error if the linked problem lookup fails.
pub async fn resolve_problem(
    backend: &dyn AttemptBackend,
    explicit: Option<&str>,
    attempt: &Attempt,
) -> Result<Option<String>, BackendError> {
    if let Some(text) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(Some(text.to_string()));
    }
    match &attempt.linked_problem_id {
        Some(problem_id) => Ok(backend
            .problem_body(problem_id)
            .await?
            .map(|body| body.trim().to_string())
            .filter(|body| !body.is_empty())),
        None => Ok(None),
    }
}
