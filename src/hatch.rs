//! Named hatch patterns as unit-square paths.
//!
//! A pattern string combines single-character primitives; repeating a
//! character increases its density. The resulting path tiles seamlessly
//! when repeated.

use crate::error::{RenderError, RenderResult};
use crate::path::{Path, PathCode};

// Kappa for the quarter-circle cubic Bezier approximation.
const K: f64 = 0.552_284_749_830_793_4;

struct HatchBuilder {
    vertices: Vec<[f64; 2]>,
    codes: Vec<PathCode>,
}

impl HatchBuilder {
    fn new() -> Self {
        Self {
            vertices: Vec::new(),
            codes: Vec::new(),
        }
    }

    fn line(&mut self, from: [f64; 2], to: [f64; 2]) {
        self.vertices.push(from);
        self.codes.push(PathCode::MoveTo);
        self.vertices.push(to);
        self.codes.push(PathCode::LineTo);
    }

    fn circle(&mut self, cx: f64, cy: f64, r: f64) {
        let k = K * r;
        self.vertices.push([cx + r, cy]);
        self.codes.push(PathCode::MoveTo);
        for [c1, c2, end] in [
            [[cx + r, cy + k], [cx + k, cy + r], [cx, cy + r]],
            [[cx - k, cy + r], [cx - r, cy + k], [cx - r, cy]],
            [[cx - r, cy - k], [cx - k, cy - r], [cx, cy - r]],
            [[cx + k, cy - r], [cx + r, cy - k], [cx + r, cy]],
        ] {
            self.vertices.extend([c1, c2, end]);
            self.codes
                .extend([PathCode::Curve4, PathCode::Curve4, PathCode::Curve4]);
        }
        self.vertices.push([cx + r, cy]);
        self.codes.push(PathCode::ClosePoly);
    }

    fn finish(self) -> RenderResult<Path> {
        Path::new(self.vertices, Some(self.codes))
    }
}

// Each diagonal appears as two half-lines that join up when the unit
// square is tiled.
fn add_diagonals(builder: &mut HatchBuilder, density: usize, ascending: bool) {
    let d = density as f64;
    for i in 0..density {
        let c = i as f64 / d;
        if ascending {
            builder.line([0.0, c], [1.0 - c, 1.0]);
            if i > 0 {
                builder.line([1.0 - c, 0.0], [1.0, c]);
            }
        } else {
            builder.line([c, 1.0], [1.0, c]);
            if i > 0 {
                builder.line([0.0, c], [c, 0.0]);
            }
        }
    }
}

fn add_vertical(builder: &mut HatchBuilder, density: usize) {
    for i in 0..density {
        let x = i as f64 / density as f64;
        builder.line([x, 0.0], [x, 1.0]);
    }
}

fn add_horizontal(builder: &mut HatchBuilder, density: usize) {
    for i in 0..density {
        let y = i as f64 / density as f64;
        builder.line([0.0, y], [1.0, y]);
    }
}

fn add_circles(builder: &mut HatchBuilder, density: usize, radius: f64) {
    let d = density as f64;
    for i in 0..density {
        for j in 0..density {
            builder.circle(
                (i as f64 + 0.5) / d,
                (j as f64 + 0.5) / d,
                radius / d,
            );
        }
    }
}

/// Build the unit path for a hatch pattern name.
///
/// Unrecognized characters are invalid arguments.
pub fn hatch_path(pattern: &str) -> RenderResult<Path> {
    let mut counts = [0usize; 8];
    for c in pattern.chars() {
        let slot = match c {
            '/' => 0,
            '\\' => 1,
            '|' => 2,
            '-' => 3,
            '+' => 4,
            'x' | 'X' => 5,
            '.' => 6,
            'o' | 'O' | '*' => 7,
            _ => {
                return Err(RenderError::InvalidArgument(format!(
                    "invalid hatch pattern: {}",
                    pattern
                )))
            }
        };
        counts[slot] += 1;
    }

    let mut builder = HatchBuilder::new();
    if counts[0] + counts[5] > 0 {
        add_diagonals(&mut builder, counts[0] + counts[5], true);
    }
    if counts[1] + counts[5] > 0 {
        add_diagonals(&mut builder, counts[1] + counts[5], false);
    }
    if counts[2] + counts[4] > 0 {
        add_vertical(&mut builder, counts[2] + counts[4]);
    }
    if counts[3] + counts[4] > 0 {
        add_horizontal(&mut builder, counts[3] + counts[4]);
    }
    if counts[6] > 0 {
        add_circles(&mut builder, counts[6] + 1, 0.1);
    }
    if counts[7] > 0 {
        add_circles(&mut builder, counts[7], 0.35);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;

    #[test]
    fn test_unknown_pattern_rejected() {
        assert!(matches!(
            hatch_path("?"),
            Err(RenderError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_density_scales_with_repetition() {
        let sparse = hatch_path("|").unwrap();
        let dense = hatch_path("|||").unwrap();
        assert!(dense.len() > sparse.len());
    }

    #[test]
    fn test_plus_combines_vertical_and_horizontal() {
        let plus = hatch_path("+").unwrap();
        let bar = hatch_path("|").unwrap();
        let dash = hatch_path("-").unwrap();
        assert_eq!(plus.len(), bar.len() + dash.len());
    }

    #[test]
    fn test_circles_are_closed_curves() {
        let path = hatch_path("o").unwrap();
        let codes = path.codes().unwrap();
        assert!(codes.contains(&PathCode::Curve4));
        assert!(codes.contains(&PathCode::ClosePoly));
    }
}
