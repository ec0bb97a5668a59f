//! Affine transforms and the path-space to device-space mapping.
//!
//! Path space has its origin at the bottom-left; device space at the
//! top-left. The vertical flip and canvas-height offset are folded into
//! the transform coefficients up front, never applied per vertex.

use crate::error::{RenderError, RenderResult};

/// A transform as exposed by the host: a 3x3 matrix plus an affine
/// capability flag. Non-affine transforms are rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformSource {
    pub matrix: [[f64; 3]; 3],
    pub is_affine: bool,
}

impl TransformSource {
    /// An affine transform from its 3x3 matrix.
    pub fn affine(matrix: [[f64; 3]; 3]) -> Self {
        Self {
            matrix,
            is_affine: true,
        }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self::affine([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    fn checked(&self) -> RenderResult<&[[f64; 3]; 3]> {
        if !self.is_affine {
            return Err(RenderError::InvalidArgument(
                "only affine transforms are handled".to_string(),
            ));
        }
        Ok(&self.matrix)
    }
}

/// A 6-coefficient 2D affine matrix, coefficients named (xx, yx, xy,
/// yy, x0, y0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine2D {
    pub xx: f64,
    pub yx: f64,
    pub xy: f64,
    pub yy: f64,
    pub x0: f64,
    pub y0: f64,
}

impl Affine2D {
    pub const IDENTITY: Affine2D = Affine2D {
        xx: 1.0,
        yx: 0.0,
        xy: 0.0,
        yy: 1.0,
        x0: 0.0,
        y0: 0.0,
    };

    /// Build a device-space matrix from a host transform, folding in the
    /// vertical flip at the given canvas height.
    pub fn for_device(source: &TransformSource, height: f64) -> RenderResult<Self> {
        let m = source.checked()?;
        Ok(Self {
            xx: m[0][0],
            yx: -m[1][0],
            xy: m[0][1],
            yy: -m[1][1],
            x0: m[0][2],
            y0: height - m[1][2],
        })
    }

    /// Compose a child transform with a master matrix whose flip has
    /// already been applied.
    pub fn compose(source: &TransformSource, master: &Affine2D) -> RenderResult<Self> {
        let m = source.checked()?;
        let child = Self {
            xx: m[0][0],
            yx: m[1][0],
            xy: m[0][1],
            yy: m[1][1],
            x0: m[0][2],
            y0: m[1][2],
        };
        Ok(child.then(master))
    }

    /// Apply `self`, then `other`.
    pub fn then(&self, other: &Affine2D) -> Self {
        Self {
            xx: self.xx * other.xx + self.yx * other.xy,
            yx: self.xx * other.yx + self.yx * other.yy,
            xy: self.xy * other.xx + self.yy * other.xy,
            yy: self.xy * other.yx + self.yy * other.yy,
            x0: self.x0 * other.xx + self.y0 * other.xy + other.x0,
            y0: self.x0 * other.yx + self.y0 * other.yy + other.y0,
        }
    }

    /// This matrix followed by a device-space translation.
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self {
            x0: self.x0 + dx,
            y0: self.y0 + dy,
            ..*self
        }
    }

    pub fn transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.xx * x + self.xy * y + self.x0,
            self.yx * x + self.yy * y + self.y0,
        )
    }
}
