//! Validation and hint engine.
//!
//! Given a step's text, the previous step's text and the problem, the
//! engine asks the validation service for a verdict, derives the next hint
//! from the escalation ladder, and speaks the hint once it reaches level 2.
//!
//! ```text
//!   non-progress ──► counter + 1 ──► hint level min(counter, 3)
//!   progress     ──► counter = 0 ──► no hint
//! ```
//!
//! The engine does not mutate session state; callers apply the verdict to
//! their `SessionView` once they decide to keep it.

use scribe_core::{last_line, AttemptId, HintLadder, HintResult, StepId, ValidationResult};
use tracing::{debug, warn};

use crate::error::{PipelineWarning, ServiceError};
use crate::metrics;
use crate::speech::{SpeechClient, SpeechClip};
use crate::validation::{ValidationClient, ValidationRequest};

/// Identity of the step being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepContext {
    /// Owning attempt.
    pub attempt_id: AttemptId,
    /// Row id of the step.
    pub step_id: StepId,
    /// Step position.
    pub step_index: u32,
}

/// Texts a step is judged on.
#[derive(Debug, Clone, Copy)]
pub struct StepTexts<'a> {
    /// Previous step's transcription, if known.
    pub previous: Option<&'a str>,
    /// This step's transcription.
    pub current: &'a str,
    /// Problem statement.
    pub problem: &'a str,
}

/// Verdict on one step.
#[derive(Debug)]
pub struct Evaluation {
    /// Service verdict.
    pub result: ValidationResult,
    /// Ladder state after this verdict.
    pub ladder: HintLadder,
    /// Hint to show, if any.
    pub hint: Option<HintResult>,
    /// Spoken hint, if synthesized.
    pub audio: Option<SpeechClip>,
    /// Non-fatal failures (speech).
    pub warnings: Vec<PipelineWarning>,
}

/// Validates steps and escalates hints.
#[derive(Debug, Clone)]
pub struct ValidationEngine {
    validation: ValidationClient,
    speech: Option<SpeechClient>,
}

impl ValidationEngine {
    /// Create an engine; `speech` is `None` when hints are not spoken.
    #[must_use]
    pub fn new(validation: ValidationClient, speech: Option<SpeechClient>) -> Self {
        Self { validation, speech }
    }

    /// Whether escalated hints are spoken.
    #[must_use]
    pub fn speaks_hints(&self) -> bool {
        self.speech.is_some()
    }

    /// Evaluate one step against the ladder state before it.
    ///
    /// Multi-line transcriptions are reduced to their last non-empty line.
    ///
    /// # Errors
    ///
    /// Returns the validation service error; no hint is derived in that case.
    pub async fn evaluate(
        &self,
        step: StepContext,
        ladder: HintLadder,
        texts: StepTexts<'_>,
    ) -> Result<Evaluation, ServiceError> {
        let request = ValidationRequest {
            prev_latex: texts
                .previous
                .map(last_line)
                .filter(|line| !line.is_empty()),
            curr_latex: last_line(texts.current),
            problem: texts.problem.to_string(),
        };

        let result = self.validation.validate(&request).await?;
        metrics::record_validation(result.status.as_str());

        let (ladder, hint) = ladder.advanced(result.status);
        metrics::set_hint_level(hint.as_ref().map_or(0, |h| h.level));
        debug!(
            "Step {} judged {} (non-progress streak {})",
            step.step_index,
            result.status,
            ladder.consecutive_non_progress()
        );

        let mut warnings = Vec::new();
        let mut audio = None;
        if let (Some(speech), Some(hint)) = (&self.speech, &hint) {
            if hint.wants_speech() {
                match speech
                    .synthesize(step.attempt_id, step.step_id, &hint.text)
                    .await
                {
                    Ok(clip) => audio = Some(clip),
                    Err(e) => {
                        warn!("Hint speech for step {} failed: {}", step.step_index, e);
                        metrics::record_warning("speech");
                        warnings.push(PipelineWarning::Speech(e));
                    }
                }
            }
        }

        Ok(Evaluation {
            result,
            ladder,
            hint,
            audio,
            warnings,
        })
    }
}
