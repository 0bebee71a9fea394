//! In-process backend with optional on-disk persistence.
//!
//! Rows live in memory behind a lock. With a data directory, every mutation
//! rewrites `state.json` and objects are written under `objects/`, so a
//! later process can resume from the same directory.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use scribe_core::{Attempt, AttemptId, AttemptStatus, OwnerId, PersistedStep, StepId, StepPatch};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::AttemptBackend;
use crate::error::BackendError;

const STATE_FILE: &str = "state.json";
const OBJECTS_DIR: &str = "objects";

#[derive(Debug, Default, Serialize, Deserialize)]
struct LocalState {
    attempts: Vec<Attempt>,
    steps: Vec<PersistedStep>,
    problems: BTreeMap<String, String>,
}

/// Backend kept in memory, optionally mirrored to a directory.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend {
    state: Arc<RwLock<LocalState>>,
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    data_dir: Option<PathBuf>,
}

impl LocalBackend {
    /// Create an in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend persisted under `data_dir`, loading any existing state.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing
    /// state file cannot be read or parsed.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(data_dir.join(OBJECTS_DIR))?;

        let state_path = data_dir.join(STATE_FILE);
        let state = if state_path.exists() {
            let json = std::fs::read_to_string(&state_path)?;
            let state: LocalState = serde_json::from_str(&json)?;
            debug!(
                "Loaded {} attempts and {} steps from {}",
                state.attempts.len(),
                state.steps.len(),
                state_path.display()
            );
            state
        } else {
            LocalState::default()
        };

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            objects: Arc::default(),
            data_dir: Some(data_dir),
        })
    }

    /// Store a problem statement.
    pub fn insert_problem(&self, problem_id: impl Into<String>, body: impl Into<String>) {
        self.write_state(|state| {
            state.problems.insert(problem_id.into(), body.into());
        });
    }

    /// Read back a stored object.
    #[must_use]
    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        let cached = self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned();
        cached.or_else(|| {
            let file = self.object_file(path)?;
            std::fs::read(file).ok()
        })
    }

    /// Snapshot of every attempt, oldest first.
    #[must_use]
    pub fn attempts(&self) -> Vec<Attempt> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .attempts
            .clone()
    }

    fn read_state<R>(&self, f: impl FnOnce(&LocalState) -> R) -> R {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    fn write_state<R>(&self, f: impl FnOnce(&mut LocalState) -> R) -> R {
        let result = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut state)
        };
        self.persist_state();
        result
    }

    fn persist_state(&self) {
        let Some(ref data_dir) = self.data_dir else {
            return;
        };
        let json = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            match serde_json::to_string_pretty(&*state) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Failed to serialize backend state: {e}");
                    return;
                }
            }
        };
        let path = data_dir.join(STATE_FILE);
        if let Err(e) = std::fs::write(&path, json) {
            warn!("Failed to persist backend state to {}: {e}", path.display());
        }
    }

    fn object_file(&self, path: &str) -> Option<PathBuf> {
        let data_dir = self.data_dir.as_ref()?;
        Some(object_file(data_dir, path))
    }
}

fn object_file(data_dir: &Path, path: &str) -> PathBuf {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(sanitize_segment)
        .fold(data_dir.join(OBJECTS_DIR), |acc, segment| acc.join(segment))
}

fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        cleaned.replace('.', "_")
    } else {
        cleaned
    }
}

#[async_trait]
impl AttemptBackend for LocalBackend {
    async fn find_in_progress(&self, owner: &OwnerId) -> Result<Option<Attempt>, BackendError> {
        Ok(self.read_state(|state| {
            state
                .attempts
                .iter()
                .rev()
                .find(|a| &a.owner_id == owner && a.is_in_progress())
                .cloned()
        }))
    }

    async fn create_attempt(
        &self,
        owner: &OwnerId,
        problem_id: Option<&str>,
    ) -> Result<Attempt, BackendError> {
        self.write_state(|state| {
            if state
                .attempts
                .iter()
                .any(|a| &a.owner_id == owner && a.is_in_progress())
            {
                return Err(BackendError::Conflict(format!(
                    "{owner} already has an attempt in progress"
                )));
            }
            let mut attempt = Attempt::new(owner.clone());
            attempt.linked_problem_id = problem_id.map(str::to_string);
            state.attempts.push(attempt.clone());
            Ok(attempt)
        })
    }

    async fn complete_attempt(
        &self,
        attempt_id: AttemptId,
        unlink_problem: bool,
    ) -> Result<(), BackendError> {
        self.write_state(|state| {
            let attempt = state
                .attempts
                .iter_mut()
                .find(|a| a.id == attempt_id)
                .ok_or_else(|| BackendError::NotFound(format!("attempt {attempt_id}")))?;
            attempt.status = AttemptStatus::Completed;
            if unlink_problem {
                attempt.linked_problem_id = None;
            }
            Ok(())
        })
    }

    async fn problem_body(&self, problem_id: &str) -> Result<Option<String>, BackendError> {
        Ok(self.read_state(|state| state.problems.get(problem_id).cloned()))
    }

    async fn put_object(
        &self,
        path: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<(), BackendError> {
        if let Some(file) = self.object_file(path) {
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&file, bytes)?;
        }
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn upsert_step(&self, row: &PersistedStep) -> Result<StepId, BackendError> {
        self.write_state(|state| {
            if !state.attempts.iter().any(|a| a.id == row.attempt_id) {
                return Err(BackendError::NotFound(format!("attempt {}", row.attempt_id)));
            }
            if let Some(existing) = state
                .steps
                .iter_mut()
                .find(|s| s.attempt_id == row.attempt_id && s.step_index == row.step_index)
            {
                existing.raster_path.clone_from(&row.raster_path);
                existing.vector_data.clone_from(&row.vector_data);
                return Ok(existing.id);
            }
            state.steps.push(row.clone());
            Ok(row.id)
        })
    }

    async fn update_step(&self, step_id: StepId, patch: &StepPatch) -> Result<(), BackendError> {
        self.write_state(|state| {
            let step = state
                .steps
                .iter_mut()
                .find(|s| s.id == step_id)
                .ok_or_else(|| BackendError::NotFound(format!("step {step_id}")))?;
            step.apply(patch);
            Ok(())
        })
    }

    async fn list_steps(&self, attempt_id: AttemptId) -> Result<Vec<PersistedStep>, BackendError> {
        let mut steps: Vec<PersistedStep> = self.read_state(|state| {
            state
                .steps
                .iter()
                .filter(|s| s.attempt_id == attempt_id)
                .cloned()
                .collect()
        });
        steps.sort_by_key(|s| s.step_index);
        Ok(steps)
    }

    async fn get_step(
        &self,
        attempt_id: AttemptId,
        step_index: u32,
    ) -> Result<Option<PersistedStep>, BackendError> {
        Ok(self.read_state(|state| {
            state
                .steps
                .iter()
                .find(|s| s.attempt_id == attempt_id && s.step_index == step_index)
                .cloned()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::{Transcription, ValidationResult, ValidationStatus};

    fn owner() -> OwnerId {
        OwnerId::new("learner-1")
    }

    #[tokio::test]
    async fn test_single_in_progress_attempt_per_owner() {
        let backend = LocalBackend::new();
        let first = backend.create_attempt(&owner(), Some("p1")).await.expect("create");
        assert_eq!(first.linked_problem_id.as_deref(), Some("p1"));
        assert!(matches!(
            backend.create_attempt(&owner(), None).await,
            Err(BackendError::Conflict(_))
        ));

        backend.complete_attempt(first.id, true).await.expect("complete");
        assert!(backend.find_in_progress(&owner()).await.expect("find").is_none());
        assert_eq!(backend.attempts()[0].linked_problem_id, None);

        let second = backend.create_attempt(&owner(), None).await.expect("create");
        assert_eq!(
            backend.find_in_progress(&owner()).await.expect("find").map(|a| a.id),
            Some(second.id)
        );
    }

    #[tokio::test]
    async fn test_upsert_is_keyed_by_attempt_and_index() {
        let backend = LocalBackend::new();
        let attempt = backend.create_attempt(&owner(), None).await.expect("create");

        let row = PersistedStep::new(attempt.id, 0, "learner-1/a/0.png", Vec::new());
        let id = backend.upsert_step(&row).await.expect("upsert");
        let again = PersistedStep::new(attempt.id, 0, "learner-1/a/0.png", Vec::new());
        assert_eq!(backend.upsert_step(&again).await.expect("upsert"), id);
        assert_eq!(backend.list_steps(attempt.id).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_requires_attempt() {
        let backend = LocalBackend::new();
        let row = PersistedStep::new(AttemptId::new(), 0, "x/0.png", Vec::new());
        assert!(matches!(
            backend.upsert_step(&row).await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_list_order() {
        let backend = LocalBackend::new();
        let attempt = backend.create_attempt(&owner(), None).await.expect("create");
        for index in [2, 0, 1] {
            let row = PersistedStep::new(attempt.id, index, format!("o/{index}.png"), Vec::new());
            backend.upsert_step(&row).await.expect("upsert");
        }
        let step = backend.get_step(attempt.id, 1).await.expect("get").expect("row");
        let transcription = Transcription {
            latex: "x=2".into(),
            confidence: 0.9,
        };
        backend
            .update_step(step.id, &StepPatch::transcription(&transcription))
            .await
            .expect("update");
        let result = ValidationResult {
            status: ValidationStatus::CorrectUseful,
            reason: "done".into(),
            solver_metadata: None,
        };
        backend
            .update_step(step.id, &StepPatch::validation(&result, None))
            .await
            .expect("update");

        let steps = backend.list_steps(attempt.id).await.expect("list");
        let indices: Vec<u32> = steps.iter().map(|s| s.step_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(steps[1].ocr_latex.as_deref(), Some("x=2"));
        assert_eq!(steps[1].validation_status, Some(ValidationStatus::CorrectUseful));
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let attempt = {
            let backend = LocalBackend::with_data_dir(dir.path()).expect("backend");
            backend.insert_problem("p1", "2x=4");
            let attempt = backend.create_attempt(&owner(), Some("p1")).await.expect("create");
            let row = PersistedStep::new(attempt.id, 0, "learner-1/a/0.png", Vec::new());
            backend.upsert_step(&row).await.expect("upsert");
            backend
                .put_object("learner-1/a/0.png", &[1, 2, 3], "image/png")
                .await
                .expect("put");
            attempt
        };

        let reloaded = LocalBackend::with_data_dir(dir.path()).expect("reload");
        assert_eq!(
            reloaded.find_in_progress(&owner()).await.expect("find"),
            Some(attempt.clone())
        );
        assert_eq!(reloaded.list_steps(attempt.id).await.expect("list").len(), 1);
        assert_eq!(
            reloaded.problem_body("p1").await.expect("problem").as_deref(),
            Some("2x=4")
        );
        assert_eq!(reloaded.object("learner-1/a/0.png"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_object_paths_stay_inside_data_dir() {
        let base = Path::new("/data");
        assert_eq!(
            object_file(base, "u/a/0.png"),
            PathBuf::from("/data/objects/u/a/0.png")
        );
        assert_eq!(
            object_file(base, "../../etc/passwd"),
            PathBuf::from("/data/objects/__/__/etc/passwd")
        );
    }
}
