//! # Scribe Pipeline
//!
//! Turns committed handwriting steps into recognized, validated and hinted
//! steps, and restores sessions from the backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  Session (orchestrator)                │
//! │   busy gate · StepStore · SessionView · attempt cache  │
//! └───────┬──────────────┬───────────────┬─────────────────┘
//!         │              │               │
//!   SnapshotExporter  Uploader     ValidationEngine
//!   (scribe-renderer)    │          ├─ ValidationClient
//!         │              │          └─ SpeechClient
//!         │              │               │
//!         │       AttemptBackend   FunctionTransport
//!         │       (Local / Http)   (HttpFunctions)
//!         └──── RecognitionClient ───────┘
//! ```
//!
//! A [`Pipeline`] holds the shared services; each learner session is a
//! [`Session`]. Stage failures after the local commit are reported as
//! [`PipelineWarning`]s on the [`CommitReport`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attempts;
pub mod backend;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod hydrator;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod recognition;
pub mod retry;
pub mod speech;
pub mod transport;
pub mod upload;
pub mod validation;

pub use backend::{AttemptBackend, HttpBackend, LocalBackend};
pub use config::{FunctionNames, PipelineConfig, RetryPolicies};
pub use engine::{Evaluation, StepContext, StepTexts, ValidationEngine};
pub use error::{BackendError, PipelineError, PipelineWarning, ServiceError, UploadError};
pub use orchestrator::{
    CommitOutcome, CommitReport, ProblemRef, ResumeReport, Session, SkipReason,
};
pub use pipeline::Pipeline;
pub use recognition::RecognitionClient;
pub use retry::{run_with_retry, RetryConfig};
pub use speech::{SpeechClient, SpeechClip, MAX_SPEECH_CHARS};
pub use transport::{FunctionTransport, HttpFunctions};
pub use upload::{object_path, UploadReceipt, UploadRequest, Uploader};
pub use validation::{ValidationClient, ValidationRequest};

/// Scribe pipeline version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
