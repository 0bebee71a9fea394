//! Step snapshot export.
//!
//! Renders a committed step's strokes to PNG using an SVG intermediate
//! representation and the resvg/tiny-skia rasterization pipeline, then
//! shrinks the output until it fits a byte budget.
//!
//! Only the strokes handed to [`StrokeSurface`] are drawn; earlier steps
//! never appear in a snapshot.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder};
use scribe_core::{Stroke, SurfaceBounds};
use uuid::Uuid;

use crate::error::{RenderError, RenderResult};
use crate::image::ImageFormat;

/// Default byte budget for one snapshot.
pub const DEFAULT_BYTE_BUDGET: usize = 2_000_000;

/// One encoded raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Encoded bytes.
    pub bytes: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Something that can be rasterized at a given scale.
pub trait SnapshotSurface {
    /// Encode the surface at `scale` (1.0 = native size).
    ///
    /// # Errors
    ///
    /// Returns an error if rasterization or encoding fails.
    fn encode(&self, scale: f32) -> RenderResult<EncodedImage>;
}

/// The strokes of one step on a drawing surface.
#[derive(Debug, Clone)]
pub struct StrokeSurface {
    strokes: Vec<Stroke>,
    bounds: SurfaceBounds,
    background: [u8; 4],
    crop_padding: Option<f32>,
}

impl StrokeSurface {
    /// Full-surface rendering of the given strokes on white.
    #[must_use]
    pub fn new(strokes: Vec<Stroke>, bounds: SurfaceBounds) -> Self {
        Self {
            strokes,
            bounds,
            background: [255, 255, 255, 255],
            crop_padding: None,
        }
    }

    /// Background color as RGBA bytes. Eraser strokes paint this color.
    #[must_use]
    pub fn with_background(mut self, background: [u8; 4]) -> Self {
        self.background = background;
        self
    }

    /// Crop the output to the ink plus `padding` surface units.
    #[must_use]
    pub fn with_crop(mut self, padding: f32) -> Self {
        self.crop_padding = Some(padding.max(0.0));
        self
    }

    /// Region to render as `(x, y, width, height)` in surface units.
    #[must_use]
    pub fn viewport(&self) -> (f32, f32, f32, f32) {
        let full_w = self.bounds.width.max(1.0);
        let full_h = self.bounds.height.max(1.0);
        let full = (0.0, 0.0, full_w, full_h);

        let Some(padding) = self.crop_padding else {
            return full;
        };
        let ink = self
            .strokes
            .iter()
            .filter(|s| !s.is_eraser)
            .filter_map(Stroke::bounds)
            .reduce(|a, b| (a.0.min(b.0), a.1.min(b.1), a.2.max(b.2), a.3.max(b.3)));
        let Some((min_x, min_y, max_x, max_y)) = ink else {
            return full;
        };

        let x0 = (min_x - padding).clamp(0.0, full_w);
        let y0 = (min_y - padding).clamp(0.0, full_h);
        let x1 = (max_x + padding).clamp(0.0, full_w);
        let y1 = (max_y + padding).clamp(0.0, full_h);
        (x0, y0, (x1 - x0).max(1.0), (y1 - y0).max(1.0))
    }

    /// Render to an SVG document at `scale`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn render_to_svg(&self, scale: f32) -> String {
        let (vx, vy, vw, vh) = self.viewport();
        let out_w = (vw * scale).round().max(1.0) as u32;
        let out_h = (vh * scale).round().max(1.0) as u32;

        let mut svg = String::with_capacity(1024 + self.strokes.len() * 256);
        let _ = write!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{out_w}\" height=\"{out_h}\" viewBox=\"{vx} {vy} {vw} {vh}\">",
        );

        let background = rgba(self.background);
        let _ = write!(
            svg,
            "<rect x=\"{vx}\" y=\"{vy}\" width=\"{vw}\" height=\"{vh}\" fill=\"{background}\"/>",
        );

        for stroke in &self.strokes {
            let color = if stroke.is_eraser {
                background.clone()
            } else {
                escape_xml(&stroke.color)
            };
            render_stroke_svg(&mut svg, stroke, &color);
        }

        svg.push_str("</svg>");
        svg
    }
}

impl SnapshotSurface for StrokeSurface {
    fn encode(&self, scale: f32) -> RenderResult<EncodedImage> {
        let svg = self.render_to_svg(scale);
        let pixmap = rasterize_svg(&svg)?;
        encode_png(&pixmap)
    }
}

/// Render a single stroke into SVG.
fn render_stroke_svg(svg: &mut String, stroke: &Stroke, color: &str) {
    let width = stroke.width;
    match stroke.points.as_slice() {
        [] => {}
        [p] => {
            let r = width / 2.0;
            let _ = write!(
                svg,
                "<circle cx=\"{}\" cy=\"{}\" r=\"{r}\" fill=\"{color}\"/>",
                p.x, p.y,
            );
        }
        points => {
            svg.push_str("<polyline points=\"");
            for p in points {
                let _ = write!(svg, "{},{} ", p.x, p.y);
            }
            let _ = write!(
                svg,
                "\" fill=\"none\" stroke=\"{color}\" stroke-width=\"{width}\" stroke-linecap=\"round\" stroke-linejoin=\"round\"/>",
            );
        }
    }
}

fn rgba(color: [u8; 4]) -> String {
    let alpha = f32::from(color[3]) / 255.0;
    format!("rgba({},{},{},{alpha})", color[0], color[1], color[2])
}

/// Rasterize an SVG string to a tiny-skia Pixmap.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn rasterize_svg(svg_string: &str) -> RenderResult<tiny_skia::Pixmap> {
    let opt = usvg::Options::default();
    let tree = usvg::Tree::from_str(svg_string, &opt)
        .map_err(|e| RenderError::Export(format!("SVG parsing failed: {e}")))?;

    let px_w = tree.size().width().round() as u32;
    let px_h = tree.size().height().round() as u32;

    let mut pixmap = tiny_skia::Pixmap::new(px_w.max(1), px_h.max(1))
        .ok_or_else(|| RenderError::Export("Failed to create pixmap".to_string()))?;

    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    Ok(pixmap)
}

/// Encode a pixmap as PNG with maximum compression.
fn encode_png(pixmap: &tiny_skia::Pixmap) -> RenderResult<EncodedImage> {
    let (width, height) = (pixmap.width(), pixmap.height());
    let mut rgba_data = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        rgba_data.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }

    let mut buf = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive);
    encoder
        .write_image(&rgba_data, width, height, ExtendedColorType::Rgba8)
        .map_err(|e| RenderError::Export(format!("PNG encoding failed: {e}")))?;

    Ok(EncodedImage {
        bytes: buf,
        width,
        height,
    })
}

/// Escape special XML characters.
fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Configuration for snapshot export.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Target maximum encoded size in bytes.
    pub byte_budget: usize,
    /// Factor applied to the scale after an over-budget attempt.
    pub scale_step: f32,
    /// Maximum number of encode attempts.
    pub max_attempts: u32,
    /// Scale below which no further attempt is made.
    pub min_scale: f32,
    /// Directory artifacts are written to.
    pub artifact_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            byte_budget: DEFAULT_BYTE_BUDGET,
            scale_step: 0.85,
            max_attempts: 6,
            min_scale: 0.4,
            artifact_dir: std::env::temp_dir().join("scribe-snapshots"),
        }
    }
}

/// Result of a snapshot export.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Encoded bytes of the chosen attempt.
    pub bytes: Vec<u8>,
    /// Artifact written for the chosen attempt.
    pub path: PathBuf,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Scale the chosen attempt was rendered at.
    pub scale: f32,
    /// Number of encode attempts made.
    pub attempts: u32,
    /// Artifacts written by earlier attempts of the same export.
    pub superseded: Vec<PathBuf>,
}

impl Snapshot {
    /// Whether the chosen encoding fits `budget`.
    #[must_use]
    pub fn within_budget(&self, budget: usize) -> bool {
        self.bytes.len() <= budget
    }

    /// Detected format of the encoded bytes.
    #[must_use]
    pub fn format(&self) -> ImageFormat {
        ImageFormat::from_magic_bytes(&self.bytes)
    }

    /// Delete superseded artifacts. Returns how many were removed.
    pub fn discard_superseded(&mut self) -> usize {
        let mut removed = 0;
        for path in self.superseded.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove superseded snapshot");
                }
            }
        }
        removed
    }
}

/// Encodes surfaces under a byte budget, shrinking as needed.
#[derive(Debug, Clone)]
pub struct SnapshotExporter {
    config: ExportConfig,
}

impl SnapshotExporter {
    /// Create a new exporter with the given configuration.
    #[must_use]
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    /// Create an exporter with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(ExportConfig::default())
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export `surface`, retrying at smaller scales while over budget.
    ///
    /// Starts at scale 1.0 and multiplies by the scale step after each
    /// over-budget attempt, stopping at the attempt limit or once the scale
    /// drops below the minimum. The last successful encoding is returned even
    /// if it is still over budget. Each successful attempt writes one
    /// artifact.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::NoEncoding`] if no attempt produced bytes, or
    /// an I/O error if the artifact directory cannot be created.
    pub fn export<S>(&self, surface: &S) -> RenderResult<Snapshot>
    where
        S: SnapshotSurface + ?Sized,
    {
        std::fs::create_dir_all(&self.config.artifact_dir)?;

        let mut scale = 1.0_f32;
        let mut attempts = 0;
        let mut written: Vec<PathBuf> = Vec::new();
        let mut best: Option<(EncodedImage, PathBuf, f32)> = None;

        while attempts < self.config.max_attempts && scale >= self.config.min_scale {
            attempts += 1;
            match self.attempt(surface, scale) {
                Ok((image, path)) => {
                    let size = image.bytes.len();
                    tracing::debug!(attempt = attempts, scale, bytes = size, "Snapshot encoded");
                    if let Some((_, previous, _)) = best.take() {
                        written.push(previous);
                    }
                    best = Some((image, path, scale));
                    if size <= self.config.byte_budget {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt = attempts, scale, error = %e, "Snapshot attempt failed");
                }
            }
            scale *= self.config.scale_step;
        }

        let Some((image, path, scale)) = best else {
            return Err(RenderError::NoEncoding { attempts });
        };
        if image.bytes.len() > self.config.byte_budget {
            tracing::warn!(
                bytes = image.bytes.len(),
                budget = self.config.byte_budget,
                scale,
                "Snapshot still over budget at smallest scale"
            );
        }

        Ok(Snapshot {
            bytes: image.bytes,
            path,
            width: image.width,
            height: image.height,
            scale,
            attempts,
            superseded: written,
        })
    }

    fn attempt<S>(&self, surface: &S, scale: f32) -> RenderResult<(EncodedImage, PathBuf)>
    where
        S: SnapshotSurface + ?Sized,
    {
        let image = surface.encode(scale)?;
        if image.bytes.is_empty() {
            return Err(RenderError::Export("encoder produced zero bytes".to_string()));
        }
        let path = artifact_path(&self.config.artifact_dir, &image.bytes);
        std::fs::write(&path, &image.bytes)?;
        Ok((image, path))
    }
}

fn artifact_path(dir: &Path, bytes: &[u8]) -> PathBuf {
    let ext = ImageFormat::from_magic_bytes(bytes).extension();
    dir.join(format!("step-{}.{ext}", Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::{Point, ToolSettings};

    fn line(from: (f32, f32), to: (f32, f32)) -> Stroke {
        Stroke::new(&ToolSettings::default())
            .with_points([Point::new(from.0, from.1), Point::new(to.0, to.1)])
    }

    #[test]
    fn test_viewport_full_surface_without_crop() {
        let surface = StrokeSurface::new(vec![line((10.0, 10.0), (50.0, 10.0))], SurfaceBounds::new(300.0, 200.0));
        assert_eq!(surface.viewport(), (0.0, 0.0, 300.0, 200.0));
    }

    #[test]
    fn test_viewport_crops_to_ink() {
        let surface = StrokeSurface::new(
            vec![line((100.0, 100.0), (200.0, 120.0))],
            SurfaceBounds::new(800.0, 600.0),
        )
        .with_crop(10.0);
        let (x, y, w, h) = surface.viewport();
        assert!((x - 87.0).abs() < 1e-4);
        assert!((y - 87.0).abs() < 1e-4);
        assert!((w - 126.0).abs() < 1e-4);
        assert!((h - 46.0).abs() < 1e-4);
    }

    #[test]
    fn test_viewport_crop_ignores_eraser_and_empty() {
        let mut eraser = line((0.0, 0.0), (700.0, 500.0));
        eraser.is_eraser = true;
        let surface = StrokeSurface::new(vec![eraser], SurfaceBounds::new(800.0, 600.0)).with_crop(5.0);
        assert_eq!(surface.viewport(), (0.0, 0.0, 800.0, 600.0));
    }

    #[test]
    fn test_svg_paints_eraser_with_background() {
        let mut eraser = line((0.0, 0.0), (10.0, 10.0));
        eraser.is_eraser = true;
        let surface = StrokeSurface::new(vec![line((5.0, 5.0), (20.0, 5.0)), eraser], SurfaceBounds::new(50.0, 50.0))
            .with_background([250, 250, 250, 255]);
        let svg = surface.render_to_svg(1.0);
        assert!(svg.contains("stroke=\"#111111\""));
        assert!(svg.contains("stroke=\"rgba(250,250,250,1)\""));
    }

    #[test]
    fn test_svg_single_point_is_dot_and_colors_escaped() {
        let mut dot = Stroke::new(&ToolSettings::default()).with_points([Point::new(4.0, 4.0)]);
        dot.color = "\"><script>".to_string();
        let surface = StrokeSurface::new(vec![dot], SurfaceBounds::new(20.0, 20.0));
        let svg = surface.render_to_svg(2.0);
        assert!(svg.contains("<circle cx=\"4\" cy=\"4\" r=\"3\""));
        assert!(svg.contains("width=\"40\" height=\"40\""));
        assert!(!svg.contains("<script>"));
    }

    #[test]
    fn test_encode_produces_png_at_scale() {
        let surface = StrokeSurface::new(vec![line((5.0, 5.0), (60.0, 30.0))], SurfaceBounds::new(100.0, 80.0));
        let image = surface.encode(0.5).expect("encode");
        assert_eq!((image.width, image.height), (50, 40));
        assert_eq!(ImageFormat::from_magic_bytes(&image.bytes), ImageFormat::Png);
    }
}
