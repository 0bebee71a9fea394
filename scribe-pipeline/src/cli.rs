//! Command-line interface of the `scribe` binary.

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};
use scribe_core::Point;
use serde::Deserialize;

use crate::config::PipelineConfig;
use crate::orchestrator::ProblemRef;

/// Command-line arguments for `scribe`.
#[derive(Debug, Clone, Parser)]
#[command(name = "scribe")]
#[command(about = "Commit handwritten math steps for recognition and validation")]
#[command(version)]
pub struct CliArgs {
    /// Learner whose attempt is used
    #[arg(long, env = "SCRIBE_OWNER")]
    pub owner: String,

    /// Keep attempts and rasters in this directory instead of the hosted backend
    #[arg(long, env = "SCRIBE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Backend base URL (e.g., <http://127.0.0.1:54321>)
    #[arg(long, env = "SCRIBE_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Key sent with every backend request
    #[arg(long, env = "SCRIBE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Object storage bucket for step rasters
    #[arg(long, env = "SCRIBE_BUCKET")]
    pub bucket: Option<String>,

    /// Directory for snapshot artifacts
    #[arg(long, env = "SCRIBE_ARTIFACT_DIR")]
    pub artifact_dir: Option<PathBuf>,

    /// Snapshot size limit in bytes
    #[arg(long, env = "SCRIBE_SNAPSHOT_BUDGET", value_parser = clap::value_parser!(u64).range(1..))]
    pub snapshot_budget: Option<u64>,

    /// Speak escalated hints (true/false, on/off, yes/no)
    #[arg(long, env = "SCRIBE_VOICE_HINTS", value_parser = BoolishValueParser::new())]
    pub voice_hints: Option<bool>,

    /// Voice requested from the speech service
    #[arg(long, env = "SCRIBE_VOICE")]
    pub voice: Option<String>,

    /// Problem statement to solve
    #[arg(long)]
    pub problem: Option<String>,

    /// Stored problem to link new attempts to
    #[arg(long)]
    pub problem_id: Option<String>,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// `scribe` subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Restore the in-progress attempt and print its state
    Resume,
    /// Commit strokes read from a JSON file as the next step
    Commit {
        /// File holding `[[{"x":..,"y":..}, ..], ..]`, one array per stroke
        #[arg(long)]
        strokes: PathBuf,
    },
    /// Close the in-progress attempt and discard its state
    Clear,
}

impl CliArgs {
    /// Pipeline configuration: environment first, then flags.
    #[must_use]
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::from_env();
        if let Some(url) = &self.backend_url {
            config.backend_url.clone_from(url);
        }
        if self.api_key.is_some() {
            config.api_key.clone_from(&self.api_key);
        }
        if let Some(bucket) = &self.bucket {
            config.bucket.clone_from(bucket);
        }
        if let Some(dir) = &self.artifact_dir {
            config.artifact_dir.clone_from(dir);
        }
        if let Some(budget) = self.snapshot_budget.and_then(|b| usize::try_from(b).ok()) {
            config.snapshot_budget = budget;
        }
        if let Some(enabled) = self.voice_hints {
            config.voice_hints = enabled;
        }
        if self.voice.is_some() {
            config.voice.clone_from(&self.voice);
        }
        config
    }

    /// Problem the session starts with.
    #[must_use]
    pub fn problem_ref(&self) -> ProblemRef {
        ProblemRef {
            text: self.problem.clone(),
            problem_id: self.problem_id.clone(),
        }
    }
}

/// Strokes to draw, one list of points per stroke.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct StrokeInput(pub Vec<Vec<Point>>);

impl StrokeInput {
    /// Parse the stroke file format.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not match the format.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commit() {
        let args = CliArgs::try_parse_from([
            "scribe",
            "--owner",
            "u1",
            "--problem",
            "2x=4",
            "commit",
            "--strokes",
            "line.json",
        ])
        .expect("parse");
        assert_eq!(args.owner, "u1");
        assert_eq!(args.problem_ref(), ProblemRef::text("2x=4"));
        assert!(matches!(args.command, Command::Commit { ref strokes } if strokes == &PathBuf::from("line.json")));
    }

    #[test]
    fn test_backend_flag_overrides() {
        let args = CliArgs::try_parse_from([
            "scribe",
            "--owner",
            "u1",
            "--backend-url",
            "https://api.example.com",
            "clear",
        ])
        .expect("parse");
        assert_eq!(args.pipeline_config().backend_url, "https://api.example.com");
    }

    #[test]
    fn test_config_flags_override() {
        let args = CliArgs::try_parse_from([
            "scribe",
            "--owner",
            "u1",
            "--api-key",
            "k-1",
            "--bucket",
            "steps",
            "--artifact-dir",
            "/tmp/scribe",
            "--snapshot-budget",
            "750000",
            "--voice-hints",
            "off",
            "--voice",
            "alloy",
            "resume",
        ])
        .expect("parse");
        let config = args.pipeline_config();
        assert_eq!(config.api_key.as_deref(), Some("k-1"));
        assert_eq!(config.bucket, "steps");
        assert_eq!(config.artifact_dir, PathBuf::from("/tmp/scribe"));
        assert_eq!(config.snapshot_budget, 750_000);
        assert!(!config.voice_hints);
        assert_eq!(config.voice.as_deref(), Some("alloy"));
    }

    #[test]
    fn test_config_flags_reject_bad_values() {
        for (flag, value) in [
            ("--snapshot-budget", "0"),
            ("--snapshot-budget", "lots"),
            ("--voice-hints", "maybe"),
        ] {
            let parsed = CliArgs::try_parse_from(["scribe", "--owner", "u1", flag, value, "resume"]);
            assert!(parsed.is_err(), "{flag} {value} should be rejected");
        }
    }

    #[test]
    fn test_stroke_input() {
        let input = StrokeInput::from_json(r#"[[{"x":1,"y":2},{"x":5,"y":2}],[{"x":3,"y":0}]]"#)
            .expect("parse");
        assert_eq!(input.0.len(), 2);
        assert_eq!(input.0[0][1], Point::new(5.0, 2.0));
        assert!(StrokeInput::from_json(r#"{"x":1}"#).is_err());
    }
}
