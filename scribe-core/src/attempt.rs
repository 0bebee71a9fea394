//! Attempt and persisted-step records.
//!
//! These are the durable shapes the backend stores: one [`Attempt`] per
//! learner session and one [`PersistedStep`] row per committed [`Step`],
//! keyed by `(attempt_id, step_index)` and patched in place as recognition
//! and validation results arrive.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::hint::HintResult;
use crate::store::Step;
use crate::stroke::Stroke;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new unique ID.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an attempt.
    AttemptId
);

uuid_id!(
    /// Unique identifier for a persisted step row.
    StepId
);

/// The learner who owns attempts. Issued by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wrap an owner identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attempt lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Accepting new steps.
    InProgress,
    /// Cleared or solved.
    Completed,
}

/// One learner's end-to-end session solving one problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Unique identifier.
    pub id: AttemptId,
    /// Owning learner.
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
    /// Lifecycle status.
    pub status: AttemptStatus,
    /// Problem this attempt is linked to, if any.
    #[serde(rename = "problem_id", default)]
    pub linked_problem_id: Option<String>,
}

impl Attempt {
    /// A fresh in-progress attempt for the owner.
    #[must_use]
    pub fn new(owner_id: OwnerId) -> Self {
        Self {
            id: AttemptId::new(),
            owner_id,
            status: AttemptStatus::InProgress,
            linked_problem_id: None,
        }
    }

    /// Link the attempt to a problem.
    #[must_use]
    pub fn with_problem(mut self, problem_id: impl Into<String>) -> Self {
        self.linked_problem_id = Some(problem_id.into());
        self
    }

    /// Whether the attempt still accepts steps.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status == AttemptStatus::InProgress
    }
}

/// Classification returned by the step-validation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Correct and moves the solution forward.
    CorrectUseful,
    /// Correct but makes no progress.
    CorrectNotUseful,
    /// Mathematically wrong.
    Incorrect,
    /// The service could not judge the step.
    Uncertain,
}

impl ValidationStatus {
    /// All statuses, in wire order.
    pub const ALL: [Self; 4] = [
        Self::CorrectUseful,
        Self::CorrectNotUseful,
        Self::Incorrect,
        Self::Uncertain,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CorrectUseful => "correct_useful",
            Self::CorrectNotUseful => "correct_not_useful",
            Self::Incorrect => "incorrect",
            Self::Uncertain => "uncertain",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// Whether this status counts as progress and resets hint escalation.
    #[must_use]
    pub const fn is_progress(self) -> bool {
        matches!(self, Self::CorrectUseful)
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Judgement on one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Classification.
    pub status: ValidationStatus,
    /// Human-readable explanation.
    pub reason: String,
    /// Opaque solver output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver_metadata: Option<Value>,
}

/// Recognized text for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    /// Recognized LaTeX, possibly multi-line.
    pub latex: String,
    /// Recognition confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Durable record of a committed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedStep {
    /// Row identifier.
    pub id: StepId,
    /// Owning attempt.
    pub attempt_id: AttemptId,
    /// Position within the attempt.
    pub step_index: u32,
    /// Object-storage path of the raster snapshot.
    #[serde(rename = "png_storage_path")]
    pub raster_path: String,
    /// Strokes the step was drawn with.
    #[serde(rename = "vector_json", default, deserialize_with = "null_as_default")]
    pub vector_data: Vec<Stroke>,
    /// Recognized LaTeX.
    #[serde(default)]
    pub ocr_latex: Option<String>,
    /// Recognition confidence.
    #[serde(default)]
    pub ocr_confidence: Option<f64>,
    /// Validation classification.
    #[serde(default)]
    pub validation_status: Option<ValidationStatus>,
    /// Validation explanation.
    #[serde(default)]
    pub validation_reason: Option<String>,
    /// Opaque solver output.
    #[serde(default)]
    pub solver_metadata: Option<Value>,
    /// Hint level shown for this step, 0 when none.
    #[serde(default, deserialize_with = "null_as_default")]
    pub hint_level: u8,
    /// Hint text shown for this step.
    #[serde(default)]
    pub hint_text: Option<String>,
    /// Storage path of the synthesized hint audio.
    #[serde(rename = "hint_audio_path", default)]
    pub speech_audio_path: Option<String>,
}

impl PersistedStep {
    /// A fresh row for a just-uploaded step.
    #[must_use]
    pub fn new(
        attempt_id: AttemptId,
        step_index: u32,
        raster_path: impl Into<String>,
        vector_data: Vec<Stroke>,
    ) -> Self {
        Self {
            id: StepId::new(),
            attempt_id,
            step_index,
            raster_path: raster_path.into(),
            vector_data,
            ocr_latex: None,
            ocr_confidence: None,
            validation_status: None,
            validation_reason: None,
            solver_metadata: None,
            hint_level: 0,
            hint_text: None,
            speech_audio_path: None,
        }
    }

    /// Rebuild the in-memory step.
    #[must_use]
    pub fn to_step(&self) -> Step {
        Step::from_strokes(self.step_index, self.vector_data.clone())
    }

    /// Recognized text, when both fields were stored.
    #[must_use]
    pub fn transcription(&self) -> Option<Transcription> {
        Some(Transcription {
            latex: self.ocr_latex.clone()?,
            confidence: self.ocr_confidence?,
        })
    }

    /// Validation result, when a status was stored.
    #[must_use]
    pub fn validation(&self) -> Option<ValidationResult> {
        Some(ValidationResult {
            status: self.validation_status?,
            reason: self.validation_reason.clone().unwrap_or_default(),
            solver_metadata: self.solver_metadata.clone(),
        })
    }

    /// Apply an in-place update.
    pub fn apply(&mut self, patch: &StepPatch) {
        if let Some(latex) = &patch.ocr_latex {
            self.ocr_latex = Some(latex.clone());
        }
        if let Some(confidence) = patch.ocr_confidence {
            self.ocr_confidence = Some(confidence);
        }
        if let Some(status) = patch.validation_status {
            self.validation_status = Some(status);
        }
        if let Some(reason) = &patch.validation_reason {
            self.validation_reason = Some(reason.clone());
        }
        if let Some(metadata) = &patch.solver_metadata {
            self.solver_metadata = Some(metadata.clone());
        }
        if let Some(level) = patch.hint_level {
            self.hint_level = level;
        }
        if let Some(text) = &patch.hint_text {
            self.hint_text = Some(text.clone());
        }
        if let Some(path) = &patch.speech_audio_path {
            self.speech_audio_path = Some(path.clone());
        }
    }
}

/// Rows fetched with every column carry `null` for unset ones.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Partial update of a [`PersistedStep`]. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepPatch {
    /// Recognized LaTeX.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_latex: Option<String>,
    /// Recognition confidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f64>,
    /// Validation classification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_status: Option<ValidationStatus>,
    /// Validation explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_reason: Option<String>,
    /// Opaque solver output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver_metadata: Option<Value>,
    /// Hint level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint_level: Option<u8>,
    /// Hint text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint_text: Option<String>,
    /// Hint audio storage path.
    #[serde(rename = "hint_audio_path", skip_serializing_if = "Option::is_none")]
    pub speech_audio_path: Option<String>,
}

impl StepPatch {
    /// Patch carrying a transcription.
    #[must_use]
    pub fn transcription(transcription: &Transcription) -> Self {
        Self {
            ocr_latex: Some(transcription.latex.clone()),
            ocr_confidence: Some(transcription.confidence),
            ..Self::default()
        }
    }

    /// Patch carrying a validation result and the hint derived from it.
    ///
    /// The hint level is always written, 0 when no hint was shown.
    #[must_use]
    pub fn validation(result: &ValidationResult, hint: Option<&HintResult>) -> Self {
        Self {
            validation_status: Some(result.status),
            validation_reason: Some(result.reason.clone()),
            solver_metadata: result.solver_metadata.clone(),
            hint_level: Some(hint.map_or(0, |h| h.level)),
            hint_text: hint.map(|h| h.text.clone()),
            ..Self::default()
        }
    }

    /// Patch carrying a hint audio path.
    #[must_use]
    pub fn speech(path: impl Into<String>) -> Self {
        Self {
            speech_audio_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Whether the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
