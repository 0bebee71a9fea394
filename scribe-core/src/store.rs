//! Stroke/step storage for one drawing session.
//!
//! [`StepStore`] owns the in-progress strokes and the history of committed
//! steps. Committed steps are immutable: once [`StepStore::commit`] moves the
//! active strokes into a [`Step`], nothing can add to, undo, or re-index them.
//! [`StepStore::clear_all`] and [`StepStore::hydrate`] replace the history
//! wholesale.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::stroke::{Point, Stroke, StrokeId, SurfaceBounds, ToolMode, ToolSettings};

/// Minimum distance between consecutive points of a stroke.
pub const DEFAULT_MIN_POINT_DISTANCE: f32 = 1.5;

/// An immutable, committed line of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    index: u32,
    strokes: Vec<Stroke>,
}

impl Step {
    /// Build a step from persisted vector data.
    #[must_use]
    pub fn from_strokes(index: u32, strokes: Vec<Stroke>) -> Self {
        Self { index, strokes }
    }

    /// Position of this step within its attempt, starting at 0.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Strokes in drawing order.
    #[must_use]
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    /// Whether this is the problem-capture step.
    #[must_use]
    pub const fn is_first(&self) -> bool {
        self.index == 0
    }
}

/// Mutable drawing state for one session.
#[derive(Debug, Clone)]
pub struct StepStore {
    tool: ToolSettings,
    bounds: SurfaceBounds,
    min_point_distance: f32,
    active: Vec<Stroke>,
    committed: Vec<Step>,
    next_index: u32,
}

impl StepStore {
    /// Create an empty store for a surface of the given size.
    #[must_use]
    pub fn new(bounds: SurfaceBounds) -> Self {
        Self {
            tool: ToolSettings::default(),
            bounds,
            min_point_distance: DEFAULT_MIN_POINT_DISTANCE,
            active: Vec::new(),
            committed: Vec::new(),
            next_index: 0,
        }
    }

    /// Override the jitter threshold.
    #[must_use]
    pub fn with_min_point_distance(mut self, distance: f32) -> Self {
        self.min_point_distance = distance.max(0.0);
        self
    }

    // -----------------------------------------------------------------------
    // Tool
    // -----------------------------------------------------------------------

    /// Current tool settings.
    #[must_use]
    pub fn tool(&self) -> &ToolSettings {
        &self.tool
    }

    /// Switch between pen and eraser.
    pub fn set_tool_mode(&mut self, mode: ToolMode) {
        self.tool.mode = mode;
    }

    /// Set the color for subsequent strokes.
    pub fn set_color(&mut self, color: impl Into<String>) {
        self.tool.color = color.into();
    }

    /// Set the width for subsequent strokes.
    pub fn set_stroke_width(&mut self, width: f32) {
        self.tool.width = width;
    }

    /// Surface bounds points are clamped to.
    #[must_use]
    pub const fn bounds(&self) -> SurfaceBounds {
        self.bounds
    }

    // -----------------------------------------------------------------------
    // Active strokes
    // -----------------------------------------------------------------------

    /// Begin a new stroke with the current tool and return its ID.
    ///
    /// Call once per physical touch-down.
    pub fn start_stroke(&mut self) -> StrokeId {
        let stroke = Stroke::new(&self.tool);
        let id = stroke.id;
        self.active.push(stroke);
        id
    }

    /// Append a point to an active stroke.
    ///
    /// The point is clamped to the surface and dropped when it lies within the
    /// jitter threshold of the stroke's last point. Unknown or already
    /// committed stroke IDs are ignored. Returns whether the point was stored.
    pub fn add_point(&mut self, stroke_id: StrokeId, point: Point) -> bool {
        let point = self.bounds.clamp(point);
        let Some(stroke) = self.active.iter_mut().find(|s| s.id == stroke_id) else {
            tracing::trace!(%stroke_id, "add_point on inactive stroke ignored");
            return false;
        };
        if let Some(last) = stroke.last_point() {
            if last.distance_to(point) < self.min_point_distance {
                return false;
            }
        }
        stroke.points.push(point);
        true
    }

    /// Remove the most recently started active stroke.
    ///
    /// Committed steps are never affected.
    pub fn undo(&mut self) -> Option<Stroke> {
        self.active.pop()
    }

    /// Strokes of the line currently being written.
    #[must_use]
    pub fn active_strokes(&self) -> &[Stroke] {
        &self.active
    }

    /// Whether there is anything to commit.
    #[must_use]
    pub fn has_active_strokes(&self) -> bool {
        !self.active.is_empty()
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    /// Freeze the active strokes into a new step at the next index.
    ///
    /// This is the only operation that advances the step index.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyStep`] if there are no active strokes.
    pub fn commit(&mut self) -> CoreResult<Step> {
        if self.active.is_empty() {
            return Err(CoreError::EmptyStep);
        }
        let step = Step {
            index: self.next_index,
            strokes: std::mem::take(&mut self.active),
        };
        self.committed.push(step.clone());
        self.next_index += 1;
        tracing::debug!(
            step_index = step.index,
            strokes = step.strokes.len(),
            "Committed step"
        );
        Ok(step)
    }

    /// Committed steps in index order.
    #[must_use]
    pub fn committed_steps(&self) -> &[Step] {
        &self.committed
    }

    /// Index the next commit will receive.
    #[must_use]
    pub const fn next_step_index(&self) -> u32 {
        self.next_index
    }

    /// Discard active strokes and all committed steps.
    pub fn clear_all(&mut self) {
        self.active.clear();
        self.committed.clear();
        self.next_index = 0;
    }

    /// Replace committed steps and the next index wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ActiveStrokesPresent`] if strokes are being drawn,
    /// or [`CoreError::InvalidHydration`] if steps are out of order or
    /// `next_index` does not follow the last step.
    pub fn hydrate(&mut self, steps: Vec<Step>, next_index: u32) -> CoreResult<()> {
        if !self.active.is_empty() {
            return Err(CoreError::ActiveStrokesPresent(self.active.len()));
        }
        if steps.windows(2).any(|w| w[0].index >= w[1].index) {
            return Err(CoreError::InvalidHydration(
                "steps are not in ascending index order".into(),
            ));
        }
        if let Some(last) = steps.last() {
            if next_index <= last.index {
                return Err(CoreError::InvalidHydration(format!(
                    "next index {next_index} does not follow last step {}",
                    last.index
                )));
            }
        }
        self.committed = steps;
        self.next_index = next_index;
        Ok(())
    }
}

impl Default for StepStore {
    fn default() -> Self {
        Self::new(SurfaceBounds::default())
    }
}
