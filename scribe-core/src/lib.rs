//! # Scribe Core
//!
//! Pure domain logic for handwritten step-by-step math solutions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 scribe-core                 │
//! ├─────────────────────────────────────────────┤
//! │  StepStore        │  Records                │
//! │  - Tool state     │  - Attempt              │
//! │  - Active strokes │  - PersistedStep        │
//! │  - Committed steps│  - ValidationResult     │
//! ├─────────────────────────────────────────────┤
//! │  HintLadder       │  SessionView            │
//! │  - Copy table     │  - Live updates         │
//! │  - Escalation     │  - Hydration rebuild    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Nothing in this crate performs I/O. Rendering lives in `scribe-renderer`
//! and the network pipeline in `scribe-pipeline`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attempt;
pub mod error;
pub mod hint;
pub mod latex;
pub mod session;
pub mod store;
pub mod stroke;

pub use attempt::{
    Attempt, AttemptId, AttemptStatus, OwnerId, PersistedStep, StepId, StepPatch, Transcription,
    ValidationResult, ValidationStatus,
};
pub use error::{CoreError, CoreResult};
pub use hint::{compute_hint, hint_copy, HintLadder, HintResult, MAX_HINT_LEVEL};
pub use latex::last_line;
pub use session::SessionView;
pub use store::{Step, StepStore, DEFAULT_MIN_POINT_DISTANCE};
pub use stroke::{Point, Stroke, StrokeId, SurfaceBounds, ToolMode, ToolSettings};

/// Scribe core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
