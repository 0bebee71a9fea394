//! Pipeline configuration.
//!
//! Defaults match the hosted backend; every knob can be overridden from the
//! environment via [`PipelineConfig::from_env`].

use std::path::PathBuf;

use scribe_core::SurfaceBounds;
use scribe_renderer::{ExportConfig, DEFAULT_BYTE_BUDGET};

use crate::retry::RetryConfig;

/// Default backend base URL (local development stack).
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:54321";

/// Default object storage bucket for step rasters.
pub const DEFAULT_BUCKET: &str = "attempts";

/// Default padding around cropped ink, in surface units.
pub const DEFAULT_CROP_PADDING: f32 = 24.0;

/// Remote function names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionNames {
    /// Handwriting recognition.
    pub recognition: String,
    /// Step validation.
    pub validation: String,
    /// Hint speech synthesis and re-signing.
    pub speech: String,
}

impl Default for FunctionNames {
    fn default() -> Self {
        Self {
            recognition: "ocr-latex".to_string(),
            validation: "solve-step".to_string(),
            speech: "tts-speak".to_string(),
        }
    }
}

/// Retry policy per remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicies {
    /// Raster and row upload.
    pub upload: RetryConfig,
    /// Recognition requests.
    pub recognition: RetryConfig,
    /// Validation requests.
    pub validation: RetryConfig,
    /// Speech requests.
    pub speech: RetryConfig,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            upload: RetryConfig::upload(),
            recognition: RetryConfig::recognition(),
            validation: RetryConfig::validation(),
            speech: RetryConfig::speech(),
        }
    }
}

impl RetryPolicies {
    /// Same attempt counts with no waits or timeouts, for tests and tools.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            upload: RetryConfig::immediate(4),
            recognition: RetryConfig::immediate(3),
            validation: RetryConfig::immediate(3),
            speech: RetryConfig::immediate(1),
        }
    }
}

/// Everything needed to assemble a [`crate::Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Backend base URL for functions, rows and storage.
    pub backend_url: String,
    /// Bearer key sent with every request.
    pub api_key: Option<String>,
    /// Object storage bucket for rasters.
    pub bucket: String,
    /// Remote function names.
    pub functions: FunctionNames,
    /// Drawing surface size.
    pub surface: SurfaceBounds,
    /// Crop snapshots to the ink plus this padding; `None` exports the full surface.
    pub crop_padding: Option<f32>,
    /// Snapshot size limit in bytes.
    pub snapshot_budget: usize,
    /// Directory for snapshot artifacts.
    pub artifact_dir: PathBuf,
    /// Whether escalated hints are spoken.
    pub voice_hints: bool,
    /// Voice requested from the speech service.
    pub voice: Option<String>,
    /// Retry policy per remote call.
    pub retry: RetryPolicies,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            api_key: None,
            bucket: DEFAULT_BUCKET.to_string(),
            functions: FunctionNames::default(),
            surface: SurfaceBounds::default(),
            crop_padding: Some(DEFAULT_CROP_PADDING),
            snapshot_budget: DEFAULT_BYTE_BUDGET,
            artifact_dir: ExportConfig::default().artifact_dir,
            voice_hints: true,
            voice: None,
            retry: RetryPolicies::default(),
        }
    }
}

impl PipelineConfig {
    /// Read overrides from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`, falling back to defaults for
    /// missing or unparseable values.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            backend_url: value("SCRIBE_BACKEND_URL").unwrap_or(defaults.backend_url),
            api_key: value("SCRIBE_API_KEY"),
            bucket: value("SCRIBE_BUCKET").unwrap_or(defaults.bucket),
            artifact_dir: value("SCRIBE_ARTIFACT_DIR").map_or(defaults.artifact_dir, PathBuf::from),
            snapshot_budget: value("SCRIBE_SNAPSHOT_BUDGET")
                .and_then(|v| v.parse().ok())
                .filter(|b| *b > 0)
                .unwrap_or(defaults.snapshot_budget),
            voice_hints: value("SCRIBE_VOICE_HINTS")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.voice_hints),
            voice: value("SCRIBE_VOICE"),
            ..defaults
        }
    }

    /// Snapshot exporter settings derived from this configuration.
    #[must_use]
    pub fn export_config(&self) -> ExportConfig {
        ExportConfig {
            byte_budget: self.snapshot_budget,
            artifact_dir: self.artifact_dir.clone(),
            ..ExportConfig::default()
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
