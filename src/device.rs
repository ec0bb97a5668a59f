//! The abstract device interface that draw commands are issued against.
//!
//! Devices expose stateful path construction and painting plus
//! capability queries; clipping/snapping policy upstream is driven by
//! `is_raster`/`is_vector`, never by downcasting to a concrete backend.

use crate::color::Rgba;
use crate::error::{RenderError, RenderResult};
use crate::raster::RasterDevice;

/// Antialiasing modes understood by the devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AntialiasMode {
    None,
    Fast,
    Good,
    Best,
}

/// Line cap style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapStyle {
    #[default]
    Butt,
    Round,
    Projecting,
}

impl CapStyle {
    pub fn from_name(name: &str) -> RenderResult<Self> {
        match name {
            "butt" => Ok(CapStyle::Butt),
            "round" => Ok(CapStyle::Round),
            "projecting" => Ok(CapStyle::Projecting),
            _ => Err(RenderError::InvalidArgument(format!(
                "invalid capstyle: {}",
                name
            ))),
        }
    }
}

/// Line join style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinStyle {
    #[default]
    Miter,
    Round,
    Bevel,
}

impl JoinStyle {
    pub fn from_name(name: &str) -> RenderResult<Self> {
        match name {
            "miter" => Ok(JoinStyle::Miter),
            "round" => Ok(JoinStyle::Round),
            "bevel" => Ok(JoinStyle::Bevel),
            _ => Err(RenderError::InvalidArgument(format!(
                "invalid joinstyle: {}",
                name
            ))),
        }
    }
}

/// An axis-aligned rectangle in device coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = (self.x + self.width).max(other.x + other.width);
        let y1 = (self.y + self.height).max(other.y + other.height);
        Rect::from_xywh(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn expand(&self, margin: f64) -> Rect {
        Rect::from_xywh(
            self.x - margin,
            self.y - margin,
            self.width + 2.0 * margin,
            self.height + 2.0 * margin,
        )
    }
}

/// Which painting operation a cached stamp was rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawOp {
    Fill,
    Stroke,
}

/// A prerendered, reusable image of a shape fixed at a given sub-pixel
/// alignment. Pixels are premultiplied RGBA.
#[derive(Debug, Clone)]
pub struct Stamp {
    pub(crate) pixmap: tiny_skia::Pixmap,
}

impl Stamp {
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }
}

/// An alpha-coverage stamp, painted through the current source color at
/// composite time so one stamp serves any number of item colors.
#[derive(Debug, Clone)]
pub struct AlphaStamp {
    pub(crate) coverage: Vec<u8>,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

/// One Gouraud-shaded triangle in device coordinates.
#[derive(Debug, Clone, Copy)]
pub struct MeshTriangle {
    pub points: [[f64; 2]; 3],
    pub colors: [Rgba; 3],
}

/// The device context: target surface plus drawing state that path and
/// paint commands are issued against.
///
/// Devices keep their own save/restore stack; callers are responsible for
/// keeping it balanced (the rendering context does so through its scoped
/// draw helper).
pub trait DeviceContext {
    // --- Capabilities ---

    fn is_raster(&self) -> bool;
    fn is_vector(&self) -> bool;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Access to the concrete backend, for callers that own the device
    /// through the trait.
    fn as_any(&self) -> &dyn std::any::Any;

    // --- Path construction ---

    /// Discard the current path.
    fn new_path(&mut self);
    fn move_to(&mut self, x: f64, y: f64);
    /// Without a current point this behaves as a move-to.
    fn line_to(&mut self, x: f64, y: f64);
    fn curve_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64);
    fn close_path(&mut self);
    /// Pen up: end the current subpath without starting a new one.
    fn new_subpath(&mut self);
    fn current_point(&self) -> Option<(f64, f64)>;

    // --- Graphics state ---

    fn save(&mut self);
    fn restore(&mut self);
    fn stack_depth(&self) -> usize;
    fn set_source_rgba(&mut self, color: Rgba);
    fn source_rgba(&self) -> Rgba;
    fn set_line_width(&mut self, width: f64);
    fn line_width(&self) -> f64;
    fn set_miter_limit(&mut self, limit: f64);
    fn set_cap_style(&mut self, cap: CapStyle);
    fn cap_style(&self) -> CapStyle;
    fn set_join_style(&mut self, join: JoinStyle);
    fn join_style(&self) -> JoinStyle;
    fn set_dash(&mut self, dashes: &[f64], offset: f64);
    fn dash(&self) -> (Vec<f64>, f64);
    fn set_antialias(&mut self, mode: AntialiasMode);
    fn antialias(&self) -> AntialiasMode;

    // --- Clipping ---

    /// Intersect the clip region with a device-space rectangle.
    fn clip_rect(&mut self, rect: Rect);
    /// Intersect the clip region with the current path.
    fn clip_current_path(&mut self, preserve: bool);

    // --- Painting ---

    fn fill_current_path(&mut self, preserve: bool);
    fn stroke_current_path(&mut self, preserve: bool);
    /// Paint the whole clip region with a repeating tile.
    fn paint_tiled(&mut self, tile: &Stamp);

    // --- Extents of the current path ---

    fn fill_extents(&self) -> Option<Rect>;
    fn stroke_extents(&self) -> Option<Rect>;

    // --- Compositing ---

    /// Composite a prerendered stamp, nearest-neighbor, at an integer
    /// pixel position.
    fn composite_stamp(&mut self, stamp: &Stamp, x: i32, y: i32);
    /// Paint the current source through an alpha stamp at an integer
    /// pixel position.
    fn composite_alpha_stamp(&mut self, stamp: &AlphaStamp, x: i32, y: i32);
    /// Composite premultiplied RGBA rows at a device position.
    fn composite_image(&mut self, data: &[u8], width: u32, height: u32, x: f64, y: f64);
    /// Draw Gouraud-shaded triangles.
    fn draw_mesh_gradient(&mut self, triangles: &[MeshTriangle]);

    // --- Raster access ---

    /// A scratch raster surface for rendering stamps, or None when the
    /// device cannot provide one.
    fn new_stamp_surface(&self, width: u32, height: u32) -> Option<RasterDevice>;
    /// The canvas as fixed-stride rows of 4-byte pixels (raster only).
    fn image_data(&self) -> Option<&[u8]>;
    fn image_data_mut(&mut self) -> Option<&mut [u8]>;
    /// Row stride in bytes (raster only).
    fn stride(&self) -> Option<usize>;
}
