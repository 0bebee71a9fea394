//! Derived per-session display state.
//!
//! A [`SessionView`] is what the learner sees besides the ink: the problem
//! being solved, the latest transcription and validation, the current hint
//! and its audio, and the hint escalation counter. The commit pipeline
//! updates it step by step; [`SessionView::reconstruct`] derives the same
//! value directly from persisted rows when a session resumes.

use serde::Serialize;

use crate::attempt::{PersistedStep, Transcription, ValidationResult, ValidationStatus};
use crate::hint::{compute_hint, HintLadder, HintResult};
use crate::latex::last_line;

/// Display state of one attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionView {
    problem: Option<String>,
    last_transcription: Option<Transcription>,
    last_validation: Option<ValidationResult>,
    last_hint: Option<HintResult>,
    hint_audio_path: Option<String>,
    ladder: HintLadder,
    solved: bool,
}

impl SessionView {
    /// Empty view, optionally seeded with a known problem statement.
    #[must_use]
    pub fn new(problem: Option<String>) -> Self {
        Self {
            problem: problem.filter(|p| !p.trim().is_empty()),
            ..Self::default()
        }
    }

    /// Derive the view from an attempt's persisted steps.
    ///
    /// `problem` is the statement resolved before recognition (explicit or
    /// linked); when absent the collapsed transcription of step 0 is used.
    /// The result equals the view produced by committing the same steps live.
    #[must_use]
    pub fn reconstruct(steps: &[PersistedStep], problem: Option<String>) -> Self {
        let mut view = Self::new(problem);

        if let Some(first) = steps.iter().find(|s| s.step_index == 0) {
            if let Some(latex) = &first.ocr_latex {
                view.capture_problem(latex);
            }
        }

        view.last_transcription = steps.iter().rev().find_map(PersistedStep::transcription);
        view.ladder = HintLadder::from_history(steps.iter().map(|s| s.validation_status));

        if let Some(validated) = steps.iter().rev().find(|s| s.validation_status.is_some()) {
            view.last_validation = validated.validation();
            if let Some(status) = validated.validation_status {
                view.last_hint = compute_hint(status, view.ladder.consecutive_non_progress());
                view.solved = status == ValidationStatus::CorrectUseful;
            }
            view.hint_audio_path = validated.speech_audio_path.clone();
        }
        view
    }

    /// Problem statement being solved.
    #[must_use]
    pub fn problem(&self) -> Option<&str> {
        self.problem.as_deref()
    }

    /// Most recent transcription.
    #[must_use]
    pub fn last_transcription(&self) -> Option<&Transcription> {
        self.last_transcription.as_ref()
    }

    /// Most recent validation result.
    #[must_use]
    pub fn last_validation(&self) -> Option<&ValidationResult> {
        self.last_validation.as_ref()
    }

    /// Hint shown for the most recent validation.
    #[must_use]
    pub fn last_hint(&self) -> Option<&HintResult> {
        self.last_hint.as_ref()
    }

    /// Storage path of the current hint's audio.
    #[must_use]
    pub fn hint_audio_path(&self) -> Option<&str> {
        self.hint_audio_path.as_deref()
    }

    /// Hint escalation state.
    #[must_use]
    pub const fn ladder(&self) -> HintLadder {
        self.ladder
    }

    /// Whether the last validated step solved the problem.
    #[must_use]
    pub const fn is_solved(&self) -> bool {
        self.solved
    }

    /// Record a transcription.
    pub fn record_transcription(&mut self, transcription: Transcription) {
        self.last_transcription = Some(transcription);
    }

    /// Use a step-0 transcription as the problem if none is known.
    ///
    /// Returns whether the problem was captured.
    pub fn capture_problem(&mut self, latex: &str) -> bool {
        self.provide_problem(&last_line(latex))
    }

    /// Set the problem statement if none is known and `text` is not blank.
    ///
    /// Returns whether the problem was set.
    pub fn provide_problem(&mut self, text: &str) -> bool {
        let text = text.trim();
        if self.problem.is_some() || text.is_empty() {
            return false;
        }
        self.problem = Some(text.to_string());
        true
    }

    /// Record a validation result, advancing the hint ladder.
    ///
    /// Clears any previous hint audio. Returns the hint to show.
    pub fn record_validation(&mut self, result: ValidationResult) -> Option<HintResult> {
        let hint = self.ladder.record(result.status);
        self.solved = result.status == ValidationStatus::CorrectUseful;
        self.last_validation = Some(result);
        self.last_hint.clone_from(&hint);
        self.hint_audio_path = None;
        hint
    }

    /// Attach audio to the current hint.
    pub fn record_hint_audio(&mut self, path: impl Into<String>) {
        self.hint_audio_path = Some(path.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::{AttemptId, StepPatch};

    fn validated(attempt: AttemptId, index: u32, latex: &str, status: ValidationStatus) -> PersistedStep {
        let mut row = PersistedStep::new(attempt, index, format!("o/a/{index}.png"), Vec::new());
        let transcription = Transcription {
            latex: latex.into(),
            confidence: 0.8,
        };
        row.apply(&StepPatch::transcription(&transcription));
        let result = ValidationResult {
            status,
            reason: status.to_string(),
            solver_metadata: None,
        };
        row.apply(&StepPatch::validation(&result, None));
        row
    }

    #[test]
    fn test_capture_problem_only_once() {
        let mut view = SessionView::new(None);
        assert!(view.capture_problem("x+1=2 \\\\ 2x=4"));
        assert!(!view.capture_problem("y=1"));
        assert_eq!(view.problem(), Some("2x=4"));
    }

    #[test]
    fn test_explicit_problem_wins() {
        let mut view = SessionView::new(Some("3x=9".into()));
        assert!(!view.capture_problem("2x=4"));
        assert_eq!(view.problem(), Some("3x=9"));
    }

    #[test]
    fn test_blank_capture_ignored() {
        let mut view = SessionView::new(Some("  ".into()));
        assert!(!view.capture_problem(" \n "));
        assert_eq!(view.problem(), None);
    }

    #[test]
    fn test_provided_problem_is_not_collapsed() {
        let mut view = SessionView::new(None);
        assert!(view.provide_problem(" Solve for x: \\\\ 2x=4 "));
        assert_eq!(view.problem(), Some("Solve for x: \\\\ 2x=4"));
        assert!(!view.capture_problem("y=1"));
    }

    #[test]
    fn test_record_validation_clears_audio_and_sets_solved() {
        let mut view = SessionView::new(None);
        let hint = view.record_validation(ValidationResult {
            status: ValidationStatus::Incorrect,
            reason: "no".into(),
            solver_metadata: None,
        });
        assert_eq!(hint.as_ref().map(|h| h.level), Some(1));
        view.record_hint_audio("audio/1.mp3");

        let hint = view.record_validation(ValidationResult {
            status: ValidationStatus::CorrectUseful,
            reason: "yes".into(),
            solver_metadata: None,
        });
        assert!(hint.is_none());
        assert!(view.hint_audio_path().is_none());
        assert!(view.is_solved());
        assert_eq!(view.ladder().consecutive_non_progress(), 0);
    }

    #[test]
    fn test_reconstruct_empty() {
        assert_eq!(SessionView::reconstruct(&[], None), SessionView::new(None));
    }

    #[test]
    fn test_reconstruct_uses_latest_validated_step() {
        let attempt = AttemptId::new();
        let mut problem = PersistedStep::new(attempt, 0, "o/a/0.png", Vec::new());
        problem.ocr_latex = Some("2x=4".into());
        problem.ocr_confidence = Some(0.9);

        let mut second = validated(attempt, 2, "x=5", ValidationStatus::Incorrect);
        second.speech_audio_path = Some("tts/2.mp3".into());
        let mut unvalidated = PersistedStep::new(attempt, 3, "o/a/3.png", Vec::new());
        unvalidated.ocr_latex = Some("x=".into());
        unvalidated.ocr_confidence = Some(0.2);

        let steps = vec![
            problem,
            validated(attempt, 1, "x=3", ValidationStatus::Uncertain),
            second,
            unvalidated,
        ];
        let view = SessionView::reconstruct(&steps, None);

        assert_eq!(view.problem(), Some("2x=4"));
        assert_eq!(view.last_transcription().map(|t| t.latex.as_str()), Some("x="));
        assert_eq!(
            view.last_validation().map(|v| v.status),
            Some(ValidationStatus::Incorrect)
        );
        assert_eq!(view.ladder().consecutive_non_progress(), 2);
        assert_eq!(view.last_hint().map(|h| h.level), Some(2));
        assert_eq!(view.hint_audio_path(), Some("tts/2.mp3"));
        assert!(!view.is_solved());
    }
}
