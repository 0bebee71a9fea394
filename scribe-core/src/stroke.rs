//! Strokes - the ink gestures a step is made of.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default pen color.
pub const DEFAULT_COLOR: &str = "#111111";

/// Default pen width in surface units.
pub const DEFAULT_WIDTH: f32 = 6.0;

/// Unique identifier for a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrokeId(Uuid);

impl StrokeId {
    /// Create a new unique stroke ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for StrokeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StrokeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X position (surface units from left).
    pub x: f32,
    /// Y position (surface units from top).
    pub y: f32,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance_to(self, other: Self) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Drawing tool mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMode {
    /// Ink.
    #[default]
    Pen,
    /// Erases ink beneath it.
    Eraser,
}

/// The tool a new stroke is drawn with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Pen or eraser.
    pub mode: ToolMode,
    /// Stroke color as hex.
    pub color: String,
    /// Stroke width in surface units.
    pub width: f32,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            mode: ToolMode::Pen,
            color: DEFAULT_COLOR.to_string(),
            width: DEFAULT_WIDTH,
        }
    }
}

/// One continuous pen or eraser gesture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    /// Unique identifier.
    pub id: StrokeId,
    /// Points in drawing order.
    pub points: Vec<Point>,
    /// Stroke color as hex.
    pub color: String,
    /// Stroke width in surface units.
    pub width: f32,
    /// Whether this stroke erases.
    pub is_eraser: bool,
}

impl Stroke {
    /// Create an empty stroke drawn with the given tool.
    #[must_use]
    pub fn new(tool: &ToolSettings) -> Self {
        Self {
            id: StrokeId::new(),
            points: Vec::new(),
            color: tool.color.clone(),
            width: tool.width,
            is_eraser: tool.mode == ToolMode::Eraser,
        }
    }

    /// Add points, builder style.
    #[must_use]
    pub fn with_points(mut self, points: impl IntoIterator<Item = Point>) -> Self {
        self.points.extend(points);
        self
    }

    /// Last point drawn, if any.
    #[must_use]
    pub fn last_point(&self) -> Option<Point> {
        self.points.last().copied()
    }

    /// Axis-aligned bounds `(min_x, min_y, max_x, max_y)` including half the stroke width.
    #[must_use]
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let first = self.points.first()?;
        let half = self.width / 2.0;
        let init = (first.x, first.y, first.x, first.y);
        let (min_x, min_y, max_x, max_y) = self.points.iter().fold(init, |acc, p| {
            (acc.0.min(p.x), acc.1.min(p.y), acc.2.max(p.x), acc.3.max(p.y))
        });
        Some((min_x - half, min_y - half, max_x + half, max_y + half))
    }
}

/// Drawable surface size; incoming points are clamped to it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceBounds {
    /// Width in surface units.
    pub width: f32,
    /// Height in surface units.
    pub height: f32,
}

impl SurfaceBounds {
    /// Create bounds of the given size.
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Clamp a point into `[0, width] x [0, height]`.
    #[must_use]
    pub fn clamp(&self, point: Point) -> Point {
        Point {
            x: point.x.clamp(0.0, self.width.max(0.0)),
            y: point.y.clamp(0.0, self.height.max(0.0)),
        }
    }
}

impl Default for SurfaceBounds {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eraser_tool_marks_stroke() {
        let tool = ToolSettings {
            mode: ToolMode::Eraser,
            ..ToolSettings::default()
        };
        let stroke = Stroke::new(&tool);
        assert!(stroke.is_eraser);
        assert_eq!(stroke.color, DEFAULT_COLOR);
    }

    #[test]
    fn test_bounds_include_half_width() {
        let stroke = Stroke::new(&ToolSettings::default())
            .with_points([Point::new(10.0, 10.0), Point::new(20.0, 30.0)]);
        let (min_x, min_y, max_x, max_y) = stroke.bounds().expect("bounds");
        assert!((min_x - 7.0).abs() < f32::EPSILON);
        assert!((min_y - 7.0).abs() < f32::EPSILON);
        assert!((max_x - 23.0).abs() < f32::EPSILON);
        assert!((max_y - 33.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_clamp_to_surface() {
        let bounds = SurfaceBounds::new(100.0, 50.0);
        assert_eq!(bounds.clamp(Point::new(-5.0, 70.0)), Point::new(0.0, 50.0));
        assert_eq!(bounds.clamp(Point::new(42.0, 7.0)), Point::new(42.0, 7.0));
    }

    #[test]
    fn test_stroke_wire_format_is_camel_case() {
        let stroke = Stroke::new(&ToolSettings::default()).with_points([Point::new(1.0, 2.0)]);
        let json = serde_json::to_value(&stroke).expect("serialize");
        assert_eq!(json["isEraser"], serde_json::Value::Bool(false));
        assert_eq!(json["points"][0]["x"], serde_json::json!(1.0));
    }
}
