//! # Scribe
//!
//! Command-line driver for the commit pipeline: resume an attempt, commit a
//! step drawn from a stroke file, or clear the session.

use std::sync::Arc;

use clap::Parser;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scribe_core::OwnerId;
use scribe_pipeline::cli::{CliArgs, Command, StrokeInput};
use scribe_pipeline::{CommitOutcome, LocalBackend, Pipeline, ResumeReport, Session};

/// Initialize structured tracing with optional JSON format.
///
/// Set `RUST_LOG` to control log levels (default: info,scribe_pipeline=debug).
/// Set `RUST_LOG_FORMAT=json` for JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,scribe_pipeline=debug,scribe_core=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    let config = args.pipeline_config();

    let pipeline = match &args.data_dir {
        Some(dir) => {
            tracing::info!("Using local backend at {}", dir.display());
            Pipeline::with_backend(Arc::new(LocalBackend::with_data_dir(dir)?), &config)?
        }
        None => {
            tracing::info!("Using backend at {}", config.backend_url);
            Pipeline::from_config(&config)?
        }
    };

    let owner = OwnerId::new(args.owner.clone());
    let output = match &args.command {
        Command::Clear => {
            let session = Session::new(pipeline, owner, args.problem_ref());
            session.clear_session().await?;
            json!({ "cleared": true })
        }
        Command::Commit { strokes } => {
            let input = StrokeInput::from_json(&std::fs::read_to_string(strokes)?)?;
            let (session, _) = resume(pipeline, owner, &args).await?;
            for points in input.0 {
                session.draw_stroke(points);
            }
            commit_summary(&session.finish_line().await)
        }
        Command::Resume => {
            let (session, resumed) = resume(pipeline, owner, &args).await?;
            json!({
                "attempt": session.attempt(),
                "steps": resumed.steps,
                "view": &*session.view(),
                "hintAudioUrl": resumed.hint_audio.map(|clip| clip.audio_url),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn resume(
    pipeline: Pipeline,
    owner: OwnerId,
    args: &CliArgs,
) -> anyhow::Result<(Session, ResumeReport)> {
    let (session, report) = Session::resume(pipeline, owner, args.problem_ref()).await?;
    for warning in &report.warnings {
        tracing::warn!("Resume: {}", warning);
    }
    Ok((session, report))
}

fn commit_summary(outcome: &CommitOutcome) -> Value {
    match outcome {
        CommitOutcome::Skipped(reason) => json!({ "skipped": reason.as_str() }),
        CommitOutcome::Committed(report) => json!({
            "stepIndex": report.step_index,
            "stepId": report.step_id,
            "rasterPath": report.raster_path,
            "snapshotBytes": report.snapshot_bytes,
            "transcription": report.transcription,
            "problemCaptured": report.problem_captured,
            "validation": report.validation,
            "hint": report.hint,
            "hintAudio": report.hint_audio,
            "solved": report.solved,
            "warnings": report
                .warnings
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
        }),
    }
}
