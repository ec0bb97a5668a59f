//! RGBA colors and color-specification resolution.

use crate::error::{RenderError, RenderResult};

/// An RGBA color with components in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };

    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// Return this color with its alpha channel replaced, if an override
    /// is set.
    pub fn with_alpha_override(self, alpha: Option<f64>) -> Self {
        match alpha {
            Some(a) => Self { a, ..self },
            None => self,
        }
    }
}

impl From<Rgba> for tiny_skia::Color {
    fn from(c: Rgba) -> Self {
        tiny_skia::Color::from_rgba(
            c.r.clamp(0.0, 1.0) as f32,
            c.g.clamp(0.0, 1.0) as f32,
            c.b.clamp(0.0, 1.0) as f32,
            c.a.clamp(0.0, 1.0) as f32,
        )
        .unwrap_or(tiny_skia::Color::BLACK)
    }
}

/// Resolve a CSS-style color specification plus an optional alpha override
/// to an RGBA quadruple.
pub fn resolve_color(spec: &str, alpha: Option<f64>) -> RenderResult<Rgba> {
    let parsed = csscolorparser::parse(spec)
        .map_err(|e| RenderError::ColorParse(format!("{}: {}", spec, e)))?;
    let [r, g, b, a] = parsed.to_array();
    Ok(Rgba::new(r as f64, g as f64, b as f64, a as f64).with_alpha_override(alpha))
}
