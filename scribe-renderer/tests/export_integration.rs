//! Integration tests for snapshot export (scribe-renderer).
//!
//! Covers the downscaling loop against a byte budget, artifact bookkeeping,
//! and failure handling.

use std::cell::RefCell;

use proptest::prelude::*;
use scribe_core::{Point, Stroke, SurfaceBounds, ToolSettings};
use scribe_renderer::{
    EncodedImage, ExportConfig, ImageFormat, RenderError, RenderResult, SnapshotExporter,
    SnapshotSurface, StrokeSurface,
};

/// Surface whose encoded size is proportional to scale squared.
struct SizedSurface {
    full_size: usize,
    scales: RefCell<Vec<f32>>,
}

impl SizedSurface {
    fn new(full_size: usize) -> Self {
        Self {
            full_size,
            scales: RefCell::new(Vec::new()),
        }
    }
}

impl SnapshotSurface for SizedSurface {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn encode(&self, scale: f32) -> RenderResult<EncodedImage> {
        self.scales.borrow_mut().push(scale);
        let len = ((self.full_size as f32) * scale * scale).max(1.0) as usize;
        let mut bytes = vec![0u8; len];
        bytes[..4.min(len)].copy_from_slice(&[0x89, 0x50, 0x4E, 0x47][..4.min(len)]);
        Ok(EncodedImage {
            bytes,
            width: 10,
            height: 10,
        })
    }
}

/// Surface that fails or returns nothing for the first `bad` attempts.
struct FlakySurface {
    bad: usize,
    calls: RefCell<usize>,
}

impl SnapshotSurface for FlakySurface {
    fn encode(&self, _scale: f32) -> RenderResult<EncodedImage> {
        let mut calls = self.calls.borrow_mut();
        *calls += 1;
        if *calls <= self.bad {
            if *calls % 2 == 0 {
                return Ok(EncodedImage {
                    bytes: Vec::new(),
                    width: 0,
                    height: 0,
                });
            }
            return Err(RenderError::Export("boom".to_string()));
        }
        Ok(EncodedImage {
            bytes: vec![1, 2, 3],
            width: 1,
            height: 1,
        })
    }
}

fn exporter(dir: &tempfile::TempDir, budget: usize) -> SnapshotExporter {
    SnapshotExporter::new(ExportConfig {
        byte_budget: budget,
        artifact_dir: dir.path().to_path_buf(),
        ..ExportConfig::default()
    })
}

fn count_files(dir: &tempfile::TempDir) -> usize {
    std::fs::read_dir(dir.path()).expect("read_dir").count()
}

// ==========================================================================
// Budget loop
// ==========================================================================

#[test]
fn test_fits_first_try() {
    let dir = tempfile::tempdir().expect("tempdir");
    let surface = SizedSurface::new(1_000);
    let snapshot = exporter(&dir, 2_000).export(&surface).expect("export");

    assert_eq!(snapshot.attempts, 1);
    assert!((snapshot.scale - 1.0).abs() < f32::EPSILON);
    assert!(snapshot.superseded.is_empty());
    assert_eq!(count_files(&dir), 1);
    assert!(snapshot.path.exists());
}

#[test]
fn test_downscales_until_within_budget() {
    let dir = tempfile::tempdir().expect("tempdir");
    let surface = SizedSurface::new(1_000);
    // 1000, 722, 522 -> third attempt fits 600
    let mut snapshot = exporter(&dir, 600).export(&surface).expect("export");

    assert_eq!(snapshot.attempts, 3);
    assert!(snapshot.within_budget(600));
    assert_eq!(snapshot.superseded.len(), 2);
    assert_eq!(count_files(&dir), 3);

    assert_eq!(snapshot.discard_superseded(), 2);
    assert_eq!(count_files(&dir), 1);
    assert!(snapshot.path.exists());
}

#[test]
fn test_returns_smallest_attempt_when_never_fits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let surface = SizedSurface::new(1_000_000);
    let snapshot = exporter(&dir, 10).export(&surface).expect("export");

    let scales = surface.scales.borrow();
    assert_eq!(scales.len(), 6);
    assert!(scales.iter().all(|s| *s >= 0.4));
    assert!((snapshot.scale - scales[5]).abs() < f32::EPSILON);
    assert!(!snapshot.within_budget(10));
    assert_eq!(count_files(&dir), 6);
}

#[test]
fn test_min_scale_stops_before_attempt_limit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let surface = SizedSurface::new(1_000_000);
    let exporter = SnapshotExporter::new(ExportConfig {
        byte_budget: 10,
        scale_step: 0.5,
        min_scale: 0.2,
        artifact_dir: dir.path().to_path_buf(),
        ..ExportConfig::default()
    });
    let snapshot = exporter.export(&surface).expect("export");
    // 1.0, 0.5, 0.25 then 0.125 < 0.2
    assert_eq!(snapshot.attempts, 3);
}

// ==========================================================================
// Failures
// ==========================================================================

#[test]
fn test_failed_attempts_are_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let surface = FlakySurface {
        bad: 2,
        calls: RefCell::new(0),
    };
    let snapshot = exporter(&dir, 100).export(&surface).expect("export");
    assert_eq!(snapshot.attempts, 3);
    assert_eq!(snapshot.bytes, vec![1, 2, 3]);
    assert_eq!(count_files(&dir), 1);
}

#[test]
fn test_no_encoding_is_distinct_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let surface = FlakySurface {
        bad: usize::MAX,
        calls: RefCell::new(0),
    };
    let err = exporter(&dir, 100).export(&surface).unwrap_err();
    assert!(matches!(err, RenderError::NoEncoding { attempts: 6 }));
    assert_eq!(count_files(&dir), 0);
}

// ==========================================================================
// Real strokes
// ==========================================================================

#[test]
fn test_stroke_snapshot_is_png() {
    let dir = tempfile::tempdir().expect("tempdir");
    let strokes = vec![Stroke::new(&ToolSettings::default()).with_points([
        Point::new(20.0, 40.0),
        Point::new(80.0, 60.0),
        Point::new(140.0, 40.0),
    ])];
    let surface = StrokeSurface::new(strokes, SurfaceBounds::new(400.0, 200.0)).with_crop(12.0);
    let snapshot = exporter(&dir, 2_000_000).export(&surface).expect("export");

    assert_eq!(snapshot.format(), ImageFormat::Png);
    assert!(!snapshot.bytes.is_empty());
    assert_eq!(std::fs::read(&snapshot.path).expect("read"), snapshot.bytes);
    assert!(snapshot.width < 400);
}

proptest! {
    #[test]
    fn prop_result_fits_or_is_last_attempt(full_size in 1usize..200_000, budget in 1usize..150_000) {
        let dir = tempfile::tempdir().expect("tempdir");
        let surface = SizedSurface::new(full_size);
        let snapshot = exporter(&dir, budget).export(&surface).expect("export");

        let scales = surface.scales.borrow();
        prop_assert!(!snapshot.bytes.is_empty());
        prop_assert!(snapshot.within_budget(budget) || scales.len() == 6);
        prop_assert!((snapshot.scale - *scales.last().expect("scale")).abs() < f32::EPSILON);
    }
}
