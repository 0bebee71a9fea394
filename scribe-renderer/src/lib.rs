//! # Scribe Renderer
//!
//! Rasterizes a committed step into a size-bounded PNG snapshot.
//!
//! ```text
//! strokes ──► SVG ──► usvg tree ──► tiny-skia pixmap ──► PNG
//!                                                        │
//!                         over budget? scale × 0.85 ◄────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod export;
pub mod image;

pub use error::{RenderError, RenderResult};
pub use export::{
    EncodedImage, ExportConfig, Snapshot, SnapshotExporter, SnapshotSurface, StrokeSurface,
    DEFAULT_BYTE_BUDGET,
};
pub use image::{encode_base64, ImageFormat};
