//! The commit orchestrator.
//!
//! [`Session::finish_line`] is the single entry point that turns the ink on
//! the surface into a validated step:
//!
//! ```text
//! commit ─► export ─► attempt ─► upload ─► recognize ─► persist
//!                                                         │
//!                       step 0: capture problem ◄─────────┤
//!                       step n: validate ─► hint ─► speak ┘─► persist
//! ```
//!
//! The step is committed locally first. Every later stage may fail; failures
//! are reported as [`PipelineWarning`]s and never roll the commit back. At
//! most one commit runs per session; overlapping calls are skipped.

use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeMap;

use scribe_core::{
    Attempt, AttemptStatus, HintResult, OwnerId, Point, SessionView, Step, StepId, StepPatch,
    StepStore, Stroke, StrokeId, ToolMode, Transcription, ValidationResult,
};
use scribe_renderer::{Snapshot, StrokeSurface};
use tracing::{debug, info, warn};

use crate::attempts::{ensure_attempt, resolve_problem};
use crate::engine::{StepContext, StepTexts};
use crate::error::{BackendError, PipelineError, PipelineWarning};
use crate::hydrator::{hydrate, Hydration};
use crate::metrics;
use crate::pipeline::Pipeline;
use crate::speech::SpeechClip;
use crate::upload::UploadRequest;

/// The problem a session starts with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProblemRef {
    /// Problem statement given directly.
    pub text: Option<String>,
    /// Stored problem to link new attempts to.
    pub problem_id: Option<String>,
}

impl ProblemRef {
    /// A problem given as text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            problem_id: None,
        }
    }

    /// A stored problem.
    #[must_use]
    pub fn stored(problem_id: impl Into<String>) -> Self {
        Self {
            text: None,
            problem_id: Some(problem_id.into()),
        }
    }

    /// The given statement, trimmed; `None` when absent or blank.
    fn statement(&self) -> Option<String> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }
}

/// Why `finish_line` did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another commit is in flight.
    Busy,
    /// There are no active strokes.
    NothingToCommit,
    /// The attempt is already solved.
    AttemptSolved,
}

impl SkipReason {
    /// Metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::NothingToCommit => "nothing_to_commit",
            Self::AttemptSolved => "attempt_solved",
        }
    }
}

/// What a commit achieved.
#[derive(Debug, Default)]
pub struct CommitReport {
    /// Index of the committed step.
    pub step_index: u32,
    /// Row id, once uploaded.
    pub step_id: Option<StepId>,
    /// Encoded snapshot size.
    pub snapshot_bytes: Option<usize>,
    /// Storage path of the raster, once uploaded.
    pub raster_path: Option<String>,
    /// Recognized text.
    pub transcription: Option<Transcription>,
    /// Whether step 0 supplied the problem statement.
    pub problem_captured: bool,
    /// Validation verdict.
    pub validation: Option<ValidationResult>,
    /// Hint shown for the verdict.
    pub hint: Option<HintResult>,
    /// Spoken hint.
    pub hint_audio: Option<SpeechClip>,
    /// Whether this step solved the problem.
    pub solved: bool,
    /// Stages that failed.
    pub warnings: Vec<PipelineWarning>,
}

impl CommitReport {
    fn new(step_index: u32) -> Self {
        Self {
            step_index,
            ..Self::default()
        }
    }

    fn warn(&mut self, kind: &'static str, warning: PipelineWarning) {
        warn!("Step {}: {}", self.step_index, warning);
        metrics::record_warning(kind);
        self.warnings.push(warning);
    }

    /// Whether every stage that ran succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Result of `finish_line`.
#[derive(Debug)]
pub enum CommitOutcome {
    /// Nothing was committed.
    Skipped(SkipReason),
    /// A step was committed locally; the report says how far it got.
    Committed(Box<CommitReport>),
}

impl CommitOutcome {
    /// The report, if a step was committed.
    #[must_use]
    pub fn report(&self) -> Option<&CommitReport> {
        match self {
            Self::Committed(report) => Some(report),
            Self::Skipped(_) => None,
        }
    }
}

/// What resuming restored.
#[derive(Debug)]
pub struct ResumeReport {
    /// Number of steps restored.
    pub steps: usize,
    /// Freshly signed audio for the current hint.
    pub hint_audio: Option<SpeechClip>,
    /// Non-fatal problems.
    pub warnings: Vec<PipelineWarning>,
}

/// Releases the busy flag on drop, including on early return.
struct BusyGuard<'a>(&'a Cell<bool>);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// One learner's active session.
///
/// Methods take `&self`; state lives in cells so drawing can continue while
/// a commit is awaiting the network. A session is driven from one task.
#[derive(Debug)]
pub struct Session {
    pipeline: Pipeline,
    owner: OwnerId,
    problem: ProblemRef,
    store: RefCell<StepStore>,
    view: RefCell<SessionView>,
    attempt: RefCell<Option<Attempt>>,
    transcripts: RefCell<BTreeMap<u32, String>>,
    busy: Cell<bool>,
}

impl Session {
    /// Start a fresh session. The attempt is resolved on first commit.
    #[must_use]
    pub fn new(pipeline: Pipeline, owner: OwnerId, problem: ProblemRef) -> Self {
        let store = StepStore::new(pipeline.surface);
        let view = SessionView::new(problem.statement());
        Self {
            pipeline,
            owner,
            problem,
            store: RefCell::new(store),
            view: RefCell::new(view),
            attempt: RefCell::new(None),
            transcripts: RefCell::new(BTreeMap::new()),
            busy: Cell::new(false),
        }
    }

    /// Resume the owner's in-progress attempt, creating one if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt or its steps cannot be loaded.
    pub async fn resume(
        pipeline: Pipeline,
        owner: OwnerId,
        problem: ProblemRef,
    ) -> Result<(Self, ResumeReport), PipelineError> {
        let Hydration {
            attempt,
            store,
            view,
            transcripts,
            hint_audio,
            warnings,
        } = hydrate(
            &pipeline,
            &owner,
            problem.text.as_deref(),
            problem.problem_id.as_deref(),
        )
        .await?;

        let report = ResumeReport {
            steps: store.committed_steps().len(),
            hint_audio,
            warnings,
        };
        let session = Self {
            pipeline,
            owner,
            problem,
            store: RefCell::new(store),
            view: RefCell::new(view),
            attempt: RefCell::new(Some(attempt)),
            transcripts: RefCell::new(transcripts),
            busy: Cell::new(false),
        };
        Ok((session, report))
    }

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    /// Begin a stroke with the current tool.
    pub fn start_stroke(&self) -> StrokeId {
        self.store.borrow_mut().start_stroke()
    }

    /// Extend a stroke. Returns whether the point was kept.
    pub fn add_point(&self, stroke_id: StrokeId, point: Point) -> bool {
        self.store.borrow_mut().add_point(stroke_id, point)
    }

    /// Draw a whole stroke at once. Returns its ID.
    pub fn draw_stroke(&self, points: impl IntoIterator<Item = Point>) -> StrokeId {
        let mut store = self.store.borrow_mut();
        let id = store.start_stroke();
        for point in points {
            store.add_point(id, point);
        }
        id
    }

    /// Remove the last active stroke.
    pub fn undo(&self) -> Option<Stroke> {
        self.store.borrow_mut().undo()
    }

    /// Switch between pen and eraser.
    pub fn set_tool_mode(&self, mode: ToolMode) {
        self.store.borrow_mut().set_tool_mode(mode);
    }

    /// Set the pen color.
    pub fn set_color(&self, color: impl Into<String>) {
        self.store.borrow_mut().set_color(color);
    }

    /// Set the stroke width.
    pub fn set_stroke_width(&self, width: f32) {
        self.store.borrow_mut().set_stroke_width(width);
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    /// Owning learner.
    #[must_use]
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Strokes and committed steps.
    #[must_use]
    pub fn store(&self) -> Ref<'_, StepStore> {
        self.store.borrow()
    }

    /// Display state.
    #[must_use]
    pub fn view(&self) -> Ref<'_, SessionView> {
        self.view.borrow()
    }

    /// The attempt steps are written to, once resolved.
    #[must_use]
    pub fn attempt(&self) -> Option<Attempt> {
        self.attempt.borrow().clone()
    }

    /// Whether a commit is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    /// Commit the active strokes and run them through the pipeline.
    pub async fn finish_line(&self) -> CommitOutcome {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            return skipped(SkipReason::Busy);
        };
        if self.view.borrow().is_solved() {
            return skipped(SkipReason::AttemptSolved);
        }
        let Ok(step) = self.store.borrow_mut().commit() else {
            return skipped(SkipReason::NothingToCommit);
        };

        metrics::record_commit();
        let mut report = CommitReport::new(step.index());
        self.run_stages(&step, &mut report).await;
        if report.is_clean() {
            info!("Step {} committed", step.index());
        } else {
            info!(
                "Step {} committed with {} warning(s)",
                step.index(),
                report.warnings.len()
            );
        }
        CommitOutcome::Committed(Box::new(report))
    }

    async fn run_stages(&self, step: &Step, report: &mut CommitReport) {
        let snapshot = match self.capture(step).await {
            Ok(snapshot) => snapshot,
            Err(e) => return report.warn("capture", PipelineWarning::Capture(e)),
        };
        report.snapshot_bytes = Some(snapshot.bytes.len());

        let attempt = match self.current_attempt(report).await {
            Ok(attempt) => attempt,
            Err(e) => return report.warn("attempt", PipelineWarning::Attempt(e)),
        };

        let upload = UploadRequest {
            owner: &self.owner,
            attempt_id: attempt.id,
            step_index: step.index(),
            png: &snapshot.bytes,
            strokes: step.strokes(),
        };
        let receipt = match self.pipeline.uploader.upload(upload).await {
            Ok(receipt) => receipt,
            Err(e) => return report.warn("upload", PipelineWarning::Upload(e)),
        };
        report.step_id = Some(receipt.step_id);
        report.raster_path = Some(receipt.raster_path);

        let context = StepContext {
            attempt_id: attempt.id,
            step_id: receipt.step_id,
            step_index: step.index(),
        };

        let transcription = match self
            .pipeline
            .recognition
            .recognize(attempt.id, receipt.step_id, &snapshot.bytes)
            .await
        {
            Ok(t) => t,
            Err(e) => return report.warn("recognition", PipelineWarning::Recognition(e)),
        };
        self.persist(
            report,
            "transcription",
            context,
            &StepPatch::transcription(&transcription),
        )
        .await;
        self.transcripts
            .borrow_mut()
            .insert(step.index(), transcription.latex.clone());
        self.view
            .borrow_mut()
            .record_transcription(transcription.clone());
        report.transcription = Some(transcription.clone());

        if step.is_first() {
            report.problem_captured = self.view.borrow_mut().capture_problem(&transcription.latex);
            if report.problem_captured {
                debug!("Captured problem from step 0");
            }
            return;
        }

        self.validate(context, &transcription.latex, report).await;
        if report.solved {
            self.complete_solved(attempt, report).await;
        }
    }

    async fn capture(&self, step: &Step) -> Result<Snapshot, scribe_renderer::RenderError> {
        let mut surface = StrokeSurface::new(step.strokes().to_vec(), self.pipeline.surface);
        if let Some(padding) = self.pipeline.crop_padding {
            surface = surface.with_crop(padding);
        }
        let exporter = self.pipeline.exporter.clone();

        let mut snapshot = tokio::task::spawn_blocking(move || exporter.export(&surface))
            .await
            .map_err(|e| scribe_renderer::RenderError::Export(e.to_string()))??;
        let removed = snapshot.discard_superseded();
        if removed > 0 {
            debug!("Discarded {} oversized snapshot(s)", removed);
        }
        metrics::record_snapshot(snapshot.bytes.len(), snapshot.attempts);
        Ok(snapshot)
    }

    /// The cached in-progress attempt, resolving it on first use.
    async fn current_attempt(&self, report: &mut CommitReport) -> Result<Attempt, BackendError> {
        let cached = self.attempt.borrow().clone();
        if let Some(attempt) = cached.filter(Attempt::is_in_progress) {
            return Ok(attempt);
        }

        let backend = self.pipeline.backend.as_ref();
        let attempt =
            ensure_attempt(backend, &self.owner, self.problem.problem_id.as_deref()).await?;
        *self.attempt.borrow_mut() = Some(attempt.clone());

        if self.view.borrow().problem().is_none() {
            match resolve_problem(backend, None, &attempt).await {
                Ok(Some(problem)) => {
                    self.view.borrow_mut().provide_problem(&problem);
                }
                Ok(None) => {}
                Err(e) => report.warn("lookup", PipelineWarning::Lookup(e)),
            }
        }
        Ok(attempt)
    }

    async fn validate(&self, context: StepContext, current: &str, report: &mut CommitReport) {
        let Some(problem) = self.view.borrow().problem().map(str::to_string) else {
            return report.warn("validation", PipelineWarning::MissingProblem);
        };
        let previous = self.previous_latex(context, report).await;
        let ladder = self.view.borrow().ladder();

        let texts = StepTexts {
            previous: previous.as_deref(),
            current,
            problem: &problem,
        };
        let evaluation = match self.pipeline.engine.evaluate(context, ladder, texts).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                return report.warn("validation", PipelineWarning::ValidationUnavailable(e));
            }
        };
        report.warnings.extend(evaluation.warnings);

        let hint = {
            let mut view = self.view.borrow_mut();
            let hint = view.record_validation(evaluation.result.clone());
            if let Some(clip) = &evaluation.audio {
                view.record_hint_audio(clip.storage_path.clone());
            }
            hint
        };

        let mut patch = StepPatch::validation(&evaluation.result, hint.as_ref());
        patch.speech_audio_path = evaluation.audio.as_ref().map(|c| c.storage_path.clone());
        self.persist(report, "validation", context, &patch).await;

        report.solved = self.view.borrow().is_solved();
        report.validation = Some(evaluation.result);
        report.hint = hint;
        report.hint_audio = evaluation.audio;
    }

    /// Previous step's text: from memory, else from its stored row.
    async fn previous_latex(
        &self,
        context: StepContext,
        report: &mut CommitReport,
    ) -> Option<String> {
        let index = context.step_index.checked_sub(1)?;
        let known = self.transcripts.borrow().get(&index).cloned();
        if known.is_some() {
            return known;
        }
        match self
            .pipeline
            .backend
            .get_step(context.attempt_id, index)
            .await
        {
            Ok(row) => row.and_then(|r| r.ocr_latex),
            Err(e) => {
                report.warn("lookup", PipelineWarning::Lookup(e));
                None
            }
        }
    }

    async fn complete_solved(&self, attempt: Attempt, report: &mut CommitReport) {
        match self
            .pipeline
            .backend
            .complete_attempt(attempt.id, false)
            .await
        {
            Ok(()) => {
                info!("Attempt {} solved", attempt.id);
                *self.attempt.borrow_mut() = Some(Attempt {
                    status: AttemptStatus::Completed,
                    ..attempt
                });
            }
            Err(e) => report.warn(
                "persist",
                PipelineWarning::Persist {
                    stage: "completion",
                    source: e,
                },
            ),
        }
    }

    async fn persist(
        &self,
        report: &mut CommitReport,
        stage: &'static str,
        context: StepContext,
        patch: &StepPatch,
    ) {
        if let Err(e) = self
            .pipeline
            .backend
            .update_step(context.step_id, patch)
            .await
        {
            report.warn("persist", PipelineWarning::Persist { stage, source: e });
        }
    }

    // -----------------------------------------------------------------------
    // Clear
    // -----------------------------------------------------------------------

    /// Discard all ink and state and close the current attempt.
    ///
    /// Local state is cleared even if the backend update fails; the next
    /// commit starts a new attempt.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Busy`] while a commit is in flight, or the
    /// backend error if the attempt could not be closed.
    pub async fn clear_session(&self) -> Result<(), PipelineError> {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            return Err(PipelineError::Busy);
        };

        self.store.borrow_mut().clear_all();
        *self.view.borrow_mut() = SessionView::new(self.problem.statement());
        self.transcripts.borrow_mut().clear();
        let cached = self.attempt.borrow_mut().take();

        let backend = self.pipeline.backend.as_ref();
        let attempt = match cached.filter(Attempt::is_in_progress) {
            Some(attempt) => Some(attempt),
            None => backend.find_in_progress(&self.owner).await?,
        };
        if let Some(attempt) = attempt {
            backend.complete_attempt(attempt.id, true).await?;
            info!("Cleared attempt {}", attempt.id);
        }
        Ok(())
    }
}

fn skipped(reason: SkipReason) -> CommitOutcome {
    debug!("finish_line skipped: {}", reason.as_str());
    metrics::record_commit_skipped(reason.as_str());
    CommitOutcome::Skipped(reason)
}
