//! Rebuilding session state from the backend.
//!
//! Resuming finds (or creates) the learner's in-progress attempt, loads its
//! step rows, and derives the same [`StepStore`] and [`SessionView`] that
//! committing those steps live would have produced.

use std::collections::BTreeMap;

use scribe_core::{Attempt, OwnerId, PersistedStep, SessionView, StepStore};
use tracing::{info, warn};

use crate::attempts::{ensure_attempt, resolve_problem};
use crate::error::{PipelineError, PipelineWarning};
use crate::metrics;
use crate::pipeline::Pipeline;
use crate::speech::SpeechClip;

/// Session state restored from the backend.
#[derive(Debug)]
pub struct Hydration {
    /// The in-progress attempt.
    pub attempt: Attempt,
    /// Committed steps and the next index.
    pub store: StepStore,
    /// Derived display state.
    pub view: SessionView,
    /// Known transcriptions by step index.
    pub transcripts: BTreeMap<u32, String>,
    /// Freshly signed audio for the current hint.
    pub hint_audio: Option<SpeechClip>,
    /// Non-fatal problems found while resuming.
    pub warnings: Vec<PipelineWarning>,
}

/// Restore the owner's in-progress attempt.
///
/// # Errors
///
/// Returns an error if the attempt or its steps cannot be loaded, or if the
/// rows cannot be placed into a step store.
pub async fn hydrate(
    pipeline: &Pipeline,
    owner: &OwnerId,
    problem: Option<&str>,
    problem_id: Option<&str>,
) -> Result<Hydration, PipelineError> {
    let backend = pipeline.backend.as_ref();
    let attempt = ensure_attempt(backend, owner, problem_id).await?;

    let mut rows = backend.list_steps(attempt.id).await?;
    rows.sort_by_key(|row| row.step_index);
    rows.dedup_by_key(|row| row.step_index);

    let mut warnings = Vec::new();
    if let Some(gap) = describe_gap(&rows) {
        warn!("Attempt {} has missing steps: {}", attempt.id, gap);
        warnings.push(PipelineWarning::StepGap(gap));
    }

    let resolved = match resolve_problem(backend, problem, &attempt).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!("Problem lookup for attempt {} failed: {}", attempt.id, e);
            warnings.push(PipelineWarning::Lookup(e));
            None
        }
    };

    let mut store = StepStore::new(pipeline.surface);
    let next_index = rows.last().map_or(0, |row| row.step_index + 1);
    store.hydrate(rows.iter().map(PersistedStep::to_step).collect(), next_index)?;

    let view = SessionView::reconstruct(&rows, resolved);
    let transcripts = rows
        .iter()
        .filter_map(|row| Some((row.step_index, row.ocr_latex.clone()?)))
        .collect();

    let hint_audio = match view.hint_audio_path() {
        Some(path) => match pipeline.speech.refresh(path).await {
            Ok(clip) => Some(clip),
            Err(e) => {
                warn!("Could not re-sign hint audio {}: {}", path, e);
                warnings.push(PipelineWarning::Speech(e));
                None
            }
        },
        None => None,
    };

    metrics::record_hydration(rows.len());
    info!(
        "Resumed attempt {} with {} step(s), next index {}",
        attempt.id,
        rows.len(),
        next_index
    );

    Ok(Hydration {
        attempt,
        store,
        view,
        transcripts,
        hint_audio,
        warnings,
    })
}

/// Describe missing indices in rows sorted by index, if any.
fn describe_gap(rows: &[PersistedStep]) -> Option<String> {
    let mut expected = 0;
    let mut missing = Vec::new();
    for row in rows {
        missing.extend((expected..row.step_index).map(|i| i.to_string()));
        expected = row.step_index + 1;
    }
    (!missing.is_empty()).then(|| missing.join(", "))
}
