//! Hint escalation.
//!
//! Every validated step that is not `correct_useful` bumps a per-attempt
//! counter; the counter picks one of three escalating messages for the
//! step's status. A `correct_useful` step resets it.

use serde::{Deserialize, Serialize};

use crate::attempt::ValidationStatus;

/// Highest hint level.
pub const MAX_HINT_LEVEL: u8 = 3;

const CORRECT_NOT_USEFUL: [&str; 3] = [
    "This step is right, but it doesn\u{2019}t move you forward yet. Try applying the result to the next part of the equation.",
    "Look at what the solver expects next: can you isolate a variable, combine like terms, or simplify a fraction?",
    "Write out the exact transformation you need. For example, if the goal is to isolate x, divide both sides by the coefficient in front of x.",
];

const INCORRECT: [&str; 3] = [
    "Something changed incorrectly. Re-check the algebra for this line and compare it to the previous one.",
    "Focus on the operation you just attempted. Did you apply it to both sides? Try rewriting the previous line and carefully redo the move.",
    "Walk through the fix step-by-step: copy the previous line, highlight the term you want to move, and perform the inverse operation on both sides.",
];

const UNCERTAIN: [&str; 3] = [
    "Hard to judge this step. Rewrite it clearly or add more detail so the system can follow your work.",
    "Clarify the transformation. Spell out the operation (e.g., \u{201c}subtract 2 from both sides\u{201d}) to make the logic explicit.",
    "Detail the move explicitly: rewrite the previous line and show the exact algebraic manipulation you intend.",
];

const CORRECT_USEFUL: [&str; 3] = ["", "", ""];

/// Copy for `(status, level)`. Empty when there is nothing to say.
#[must_use]
pub fn hint_copy(status: ValidationStatus, level: u8) -> &'static str {
    let table = match status {
        ValidationStatus::CorrectUseful => &CORRECT_USEFUL,
        ValidationStatus::CorrectNotUseful => &CORRECT_NOT_USEFUL,
        ValidationStatus::Incorrect => &INCORRECT,
        ValidationStatus::Uncertain => &UNCERTAIN,
    };
    match level {
        1..=MAX_HINT_LEVEL => table[usize::from(level - 1)],
        _ => "",
    }
}

/// A hint shown after a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintResult {
    /// Escalation level, 1 to 3.
    pub level: u8,
    /// Hint copy.
    pub text: String,
    /// Status the hint responds to.
    pub status: ValidationStatus,
}

impl HintResult {
    /// Whether this hint should be read aloud.
    #[must_use]
    pub const fn wants_speech(&self) -> bool {
        self.level >= 2
    }
}

/// Hint for a status given the counter value after recording it.
///
/// Returns `None` at level 0 or when the copy table has no text.
#[must_use]
pub fn compute_hint(status: ValidationStatus, consecutive_non_progress: u32) -> Option<HintResult> {
    let level = u8::try_from(consecutive_non_progress.min(u32::from(MAX_HINT_LEVEL))).ok()?;
    if level == 0 {
        return None;
    }
    let text = hint_copy(status, level);
    if text.is_empty() {
        return None;
    }
    Some(HintResult {
        level,
        text: text.to_string(),
        status,
    })
}

/// The `ConsecutiveNonProgress` counter for one attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HintLadder {
    consecutive_non_progress: u32,
}

impl HintLadder {
    /// Start at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            consecutive_non_progress: 0,
        }
    }

    /// Rebuild from the statuses of an attempt's steps, oldest first.
    ///
    /// Scans backward from the newest status, counting non-progress statuses
    /// until a `correct_useful` one or the start. Steps without a status are
    /// skipped.
    #[must_use]
    pub fn from_history<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = Option<ValidationStatus>>,
        I::IntoIter: DoubleEndedIterator,
    {
        let count = statuses
            .into_iter()
            .rev()
            .flatten()
            .take_while(|status| !status.is_progress())
            .count();
        Self {
            consecutive_non_progress: u32::try_from(count).unwrap_or(u32::MAX),
        }
    }

    /// Current counter value.
    #[must_use]
    pub const fn consecutive_non_progress(&self) -> u32 {
        self.consecutive_non_progress
    }

    /// Level the next non-progress hint would be capped to.
    #[must_use]
    pub fn level(&self) -> u8 {
        u8::try_from(self.consecutive_non_progress.min(u32::from(MAX_HINT_LEVEL)))
            .unwrap_or(MAX_HINT_LEVEL)
    }

    /// Record a validated status and return the hint to show, if any.
    pub fn record(&mut self, status: ValidationStatus) -> Option<HintResult> {
        if status.is_progress() {
            self.consecutive_non_progress = 0;
            return None;
        }
        self.consecutive_non_progress = self.consecutive_non_progress.saturating_add(1);
        compute_hint(status, self.consecutive_non_progress)
    }

    /// Like [`record`](Self::record) but leaves `self` untouched.
    #[must_use]
    pub fn advanced(self, status: ValidationStatus) -> (Self, Option<HintResult>) {
        let mut next = self;
        let hint = next.record(status);
        (next, hint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_sequence() {
        let mut ladder = HintLadder::new();
        let statuses = [
            ValidationStatus::Incorrect,
            ValidationStatus::CorrectNotUseful,
            ValidationStatus::CorrectUseful,
        ];
        let mut counters = Vec::new();
        let mut levels = Vec::new();
        for status in statuses {
            let hint = ladder.record(status);
            counters.push(ladder.consecutive_non_progress());
            levels.push(hint.map(|h| h.level));
        }
        assert_eq!(counters, vec![1, 2, 0]);
        assert_eq!(levels, vec![Some(1), Some(2), None]);
    }

    #[test]
    fn test_level_caps_at_three() {
        let mut ladder = HintLadder::new();
        let mut last = None;
        for _ in 0..7 {
            last = ladder.record(ValidationStatus::Uncertain);
        }
        assert_eq!(ladder.consecutive_non_progress(), 7);
        let hint = last.expect("hint");
        assert_eq!(hint.level, 3);
        assert_eq!(hint.text, UNCERTAIN[2]);
    }

    #[test]
    fn test_hint_text_follows_status_of_current_step() {
        let mut ladder = HintLadder::new();
        ladder.record(ValidationStatus::Incorrect);
        let hint = ladder
            .record(ValidationStatus::CorrectNotUseful)
            .expect("hint");
        assert_eq!(hint.status, ValidationStatus::CorrectNotUseful);
        assert_eq!(hint.text, CORRECT_NOT_USEFUL[1]);
        assert!(hint.wants_speech());
    }

    #[test]
    fn test_compute_hint_level_zero_is_none() {
        assert!(compute_hint(ValidationStatus::Incorrect, 0).is_none());
        assert!(compute_hint(ValidationStatus::CorrectUseful, 2).is_none());
    }

    #[test]
    fn test_advanced_does_not_mutate() {
        let ladder = HintLadder::new();
        let (next, hint) = ladder.advanced(ValidationStatus::Incorrect);
        assert_eq!(ladder.consecutive_non_progress(), 0);
        assert_eq!(next.consecutive_non_progress(), 1);
        assert!(!hint.expect("hint").wants_speech());
    }

    #[test]
    fn test_from_history_stops_at_progress_and_skips_gaps() {
        let history = vec![
            Some(ValidationStatus::Incorrect),
            Some(ValidationStatus::CorrectUseful),
            Some(ValidationStatus::Uncertain),
            None,
            Some(ValidationStatus::Incorrect),
        ];
        assert_eq!(HintLadder::from_history(history).consecutive_non_progress(), 2);

        let solved = vec![
            Some(ValidationStatus::Incorrect),
            Some(ValidationStatus::Uncertain),
            Some(ValidationStatus::CorrectUseful),
        ];
        assert_eq!(HintLadder::from_history(solved).consecutive_non_progress(), 0);
    }

    #[test]
    fn test_every_non_progress_status_has_copy() {
        for status in [
            ValidationStatus::CorrectNotUseful,
            ValidationStatus::Incorrect,
            ValidationStatus::Uncertain,
        ] {
            for level in 1..=MAX_HINT_LEVEL {
                assert!(!hint_copy(status, level).is_empty());
            }
        }
        assert!(hint_copy(ValidationStatus::Incorrect, 4).is_empty());
    }
}
