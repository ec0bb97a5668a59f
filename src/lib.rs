//! Rendering core for 2D plotting backends.
//!
//! This crate converts abstract path descriptions (vertex sequences with
//! optional per-vertex operation tags), affine transforms, and style
//! attributes into concrete drawing commands on a graphics device. It
//! provides:
//! - the path-to-device geometry pipeline: coordinate transform,
//!   numeric-range clipping, and pixel snapping;
//! - a sub-pixel marker stamp cache and a path-collection stamp cache
//!   that amortize repeated rendering;
//! - a nested graphics-state stack kept in lockstep with the device's
//!   native save/restore stack;
//! - a tiny-skia raster device and a command-recording device behind one
//!   capability-queried interface.
//!
//! Text shaping, font resolution, and output-file creation are external
//! collaborators.
//!
//! # Example
//!
//! ```rust,ignore
//! use figrender::{RenderConfig, RenderingContext, Path, TransformSource};
//!
//! let mut ctx = RenderingContext::new_raster(400, 300, 72.0, RenderConfig::default())?;
//! let gc = ctx.gc();
//! ctx.set_foreground("#1f77b4")?;
//! ctx.set_linewidth(1.5);
//! let line = Path::polyline(vec![[10.0, 10.0], [390.0, 290.0]]);
//! ctx.draw_path(&gc, &line, &TransformSource::identity(), None)?;
//! ```

mod color;
mod config;
mod context;
mod device;
mod error;
mod hatch;
mod marker_cache;
mod path;
mod path_loader;
mod pattern_cache;
mod raster;
mod recording;
mod state;
mod text;
mod transform;

// Re-export public API
pub use color::{resolve_color, Rgba};
pub use config::RenderConfig;
pub use context::{
    Dashes, GcHandle, OffsetPosition, PathCollectionParams, QuadMeshParams, Region,
    RenderingContext,
};
pub use device::{
    AlphaStamp, AntialiasMode, CapStyle, DeviceContext, DrawOp, JoinStyle, MeshTriangle, Rect,
    Stamp,
};
pub use error::{RenderError, RenderResult};
pub use hatch::hatch_path;
pub use path::{Path, PathCode};
pub use path_loader::{load_path, load_polyline, COORD_LIMIT};
pub use raster::RasterDevice;
pub use recording::{DeviceCommand, RecordingDevice};
pub use state::{Antialias, ClipPath, GraphicsState, GraphicsStateStack, SketchParams};
pub use text::{FontProperties, FontWeight, TextMetrics, TextShaper, TextSpan};
pub use transform::{Affine2D, TransformSource};
