//! Shared harness for pipeline integration tests.
//!
//! Provides a scripted function transport, a backend wrapper that injects
//! failures, and a pipeline wired to both with immediate retries.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use scribe_core::{
    Attempt, AttemptId, OwnerId, PersistedStep, Point, StepId, StepPatch, StrokeId,
};
use scribe_pipeline::{
    AttemptBackend, BackendError, FunctionTransport, LocalBackend, Pipeline, PipelineConfig,
    ProblemRef, RetryPolicies, ServiceError, Session,
};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const RECOGNITION: &str = "ocr-latex";
pub const VALIDATION: &str = "solve-step";
pub const SPEECH: &str = "tts-speak";

pub fn owner() -> OwnerId {
    OwnerId::new("learner-1")
}

// ===========================================================================
// Scripted function transport
// ===========================================================================

/// Answers each function from a queue of canned responses and records every
/// request body. Unscripted calls are rejected with a 404.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<Value, ServiceError>>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    pub fn push(&self, function: &str, response: Result<Value, ServiceError>) {
        self.responses
            .lock()
            .expect("responses lock")
            .entry(function.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn recognizes(&self, latex: &str) {
        self.push(RECOGNITION, Ok(json!({ "latex": latex, "confidence": 0.95 })));
    }

    pub fn judges(&self, status: &str, reason: &str) {
        self.push(VALIDATION, Ok(json!({ "status": status, "reason": reason })));
    }

    pub fn speaks(&self, storage_path: &str) {
        self.push(
            SPEECH,
            Ok(json!({
                "audioUrl": format!("https://cdn.test/{storage_path}?token=1"),
                "storagePath": storage_path,
            })),
        );
    }

    pub fn fails(&self, function: &str, error: ServiceError) {
        self.push(function, Err(error));
    }

    /// Request bodies sent to `function`, oldest first.
    pub fn calls(&self, function: &str) -> Vec<Value> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|(name, _)| name == function)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }
}

#[async_trait]
impl FunctionTransport for ScriptedTransport {
    async fn invoke(&self, function: &str, body: Value) -> Result<Value, ServiceError> {
        // Suspend like a real request so concurrent callers interleave.
        tokio::task::yield_now().await;

        self.calls
            .lock()
            .expect("calls lock")
            .push((function.to_string(), body));
        self.responses
            .lock()
            .expect("responses lock")
            .get_mut(function)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(ServiceError::Rejected {
                    status: 404,
                    message: format!("no scripted response for {function}"),
                })
            })
    }
}

// ===========================================================================
// Failure-injecting backend
// ===========================================================================

/// Counts calls and fails a configurable number of them.
#[derive(Debug, Default)]
struct Faults {
    remaining: AtomicU32,
    calls: AtomicU32,
}

impl Faults {
    fn hit(&self, what: &str) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            Err(BackendError::Http {
                status: 503,
                message: format!("{what} unavailable"),
            })
        } else {
            Ok(())
        }
    }
}

/// [`LocalBackend`] with injectable write failures.
#[derive(Debug, Default)]
pub struct FlakyBackend {
    pub inner: LocalBackend,
    put: Faults,
    upsert: Faults,
    update: Faults,
}

impl FlakyBackend {
    pub fn new(inner: LocalBackend) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn fail_puts(&self, n: u32) {
        self.put.remaining.store(n, Ordering::SeqCst);
    }

    pub fn fail_upserts(&self, n: u32) {
        self.upsert.remaining.store(n, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, n: u32) {
        self.update.remaining.store(n, Ordering::SeqCst);
    }

    pub fn put_calls(&self) -> u32 {
        self.put.calls.load(Ordering::SeqCst)
    }

    pub fn upsert_calls(&self) -> u32 {
        self.upsert.calls.load(Ordering::SeqCst)
    }

    pub async fn rows(&self, attempt_id: AttemptId) -> Vec<PersistedStep> {
        self.inner.list_steps(attempt_id).await.expect("list steps")
    }
}

#[async_trait]
impl AttemptBackend for FlakyBackend {
    async fn find_in_progress(&self, owner: &OwnerId) -> Result<Option<Attempt>, BackendError> {
        self.inner.find_in_progress(owner).await
    }

    async fn create_attempt(
        &self,
        owner: &OwnerId,
        problem_id: Option<&str>,
    ) -> Result<Attempt, BackendError> {
        self.inner.create_attempt(owner, problem_id).await
    }

    async fn complete_attempt(
        &self,
        attempt_id: AttemptId,
        unlink_problem: bool,
    ) -> Result<(), BackendError> {
        self.inner.complete_attempt(attempt_id, unlink_problem).await
    }

    async fn problem_body(&self, problem_id: &str) -> Result<Option<String>, BackendError> {
        self.inner.problem_body(problem_id).await
    }

    async fn put_object(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BackendError> {
        self.put.hit("storage")?;
        self.inner.put_object(path, bytes, content_type).await
    }

    async fn upsert_step(&self, row: &PersistedStep) -> Result<StepId, BackendError> {
        self.upsert.hit("rows")?;
        self.inner.upsert_step(row).await
    }

    async fn update_step(&self, step_id: StepId, patch: &StepPatch) -> Result<(), BackendError> {
        self.update.hit("rows")?;
        self.inner.update_step(step_id, patch).await
    }

    async fn list_steps(&self, attempt_id: AttemptId) -> Result<Vec<PersistedStep>, BackendError> {
        self.inner.list_steps(attempt_id).await
    }

    async fn get_step(
        &self,
        attempt_id: AttemptId,
        step_index: u32,
    ) -> Result<Option<PersistedStep>, BackendError> {
        self.inner.get_step(attempt_id, step_index).await
    }
}

// ===========================================================================
// Harness
// ===========================================================================

/// A pipeline over a [`FlakyBackend`] and a [`ScriptedTransport`].
pub struct Harness {
    pub backend: Arc<FlakyBackend>,
    pub transport: Arc<ScriptedTransport>,
    pub pipeline: Pipeline,
    pub artifacts: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(LocalBackend::new(), |_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut PipelineConfig)) -> Self {
        Self::build(LocalBackend::new(), adjust)
    }

    pub fn build(local: LocalBackend, adjust: impl FnOnce(&mut PipelineConfig)) -> Self {
        let artifacts = tempfile::tempdir().expect("tempdir");
        let mut config = PipelineConfig {
            artifact_dir: artifacts.path().join("snapshots"),
            retry: RetryPolicies::immediate(),
            ..PipelineConfig::default()
        };
        adjust(&mut config);

        let backend = Arc::new(FlakyBackend::new(local));
        let transport = Arc::new(ScriptedTransport::default());
        let pipeline = Pipeline::new(backend.clone(), transport.clone(), &config);
        Self {
            backend,
            transport,
            pipeline,
            artifacts,
        }
    }

    pub fn session(&self, problem: ProblemRef) -> Session {
        Session::new(self.pipeline.clone(), owner(), problem)
    }

    pub async fn resume(&self, problem: ProblemRef) -> (Session, scribe_pipeline::ResumeReport) {
        Session::resume(self.pipeline.clone(), owner(), problem)
            .await
            .expect("resume")
    }
}

/// Draw a horizontal line at height `y`.
pub fn draw_line(session: &Session, y: f32) -> StrokeId {
    session.draw_stroke([Point::new(40.0, y), Point::new(120.0, y), Point::new(220.0, y)])
}
