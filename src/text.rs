//! The text-shaping collaborator interface.
//!
//! Shaping, layout, and font metrics live outside this crate. The
//! resolution is threaded through every call as an explicit argument;
//! there is no process-wide "current resolution" value for the shaper to
//! discover.

use crate::color::Rgba;
use crate::device::DeviceContext;
use crate::error::RenderResult;

/// A loadable font described either by a file path or by a
/// family/weight/size descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FontProperties {
    pub family: String,
    pub weight: FontWeight,
    /// Size in points.
    pub size: f64,
    /// Explicit font file, overriding family/weight resolution.
    pub file: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

/// Width, height, and descent of a laid-out string, in pixels. Height
/// includes the descent, and descent is normally positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    pub width: f64,
    pub height: f64,
    pub descent: f64,
}

/// One text-drawing request, positioned at a device-space anchor with a
/// counterclockwise rotation in degrees.
#[derive(Debug, Clone)]
pub struct TextSpan<'a> {
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub text: &'a str,
    pub font: &'a FontProperties,
    pub color: Rgba,
}

/// External collaborator that shapes and renders text.
pub trait TextShaper {
    /// Measure a string at the given resolution.
    fn measure(&mut self, text: &str, font: &FontProperties, dpi: f64)
        -> RenderResult<TextMetrics>;

    /// Draw a span onto the device at the given resolution.
    fn draw(
        &mut self,
        device: &mut dyn DeviceContext,
        span: &TextSpan<'_>,
        dpi: f64,
    ) -> RenderResult<()>;
}
