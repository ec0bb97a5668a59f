//! Loading abstract paths into device path commands.
//!
//! Vertices are transformed, clamped to the device numeric range, and
//! optionally snapped to the pixel grid. Coded paths get per-vertex
//! clamping only; codeless polylines get per-segment Cohen–Sutherland
//! clipping. Quadratic curves are promoted to the cubic device primitive.

use crate::color::Rgba;
use crate::device::DeviceContext;
use crate::error::{RenderError, RenderResult};
use crate::path::{Path, PathCode};
use crate::state::SketchParams;
use crate::transform::Affine2D;

/// Device numeric-range limit: coordinates must fit a 24-bit signed
/// fixed-point value, so they are kept within ±2²².
pub const COORD_LIMIT: f64 = (1 << 22) as f64;

/// Pixel-grid snapping policy for a given line width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Snapper {
    Disabled,
    /// `floor(x) + 0.5`: center the stroke on a pixel row/column.
    PixelCenter,
    /// `round(x)`: snap between pixels, when the line width is zero (the
    /// edge is defined by the fill) or rounds to an even value
    /// (minimizing the alpha due to antialiasing).
    PixelEdge,
}

impl Snapper {
    pub(crate) fn for_line_width(line_width: f64) -> Self {
        if line_width > 0.0 && (line_width < 1.0 || (line_width.round() as i64) % 2 == 1) {
            Snapper::PixelCenter
        } else {
            Snapper::PixelEdge
        }
    }

    fn resolve(device: &dyn DeviceContext, snap: bool) -> Self {
        // Snapping applies to raster devices only.
        if snap && device.is_raster() {
            Self::for_line_width(device.line_width())
        } else {
            Snapper::Disabled
        }
    }

    pub(crate) fn apply(self, v: f64) -> f64 {
        match self {
            Snapper::Disabled => v,
            Snapper::PixelCenter => v.floor() + 0.5,
            Snapper::PixelEdge => v.round(),
        }
    }

    fn active(self) -> bool {
        self != Snapper::Disabled
    }
}

/// Set the device's current path to `path` transformed by `transform`.
///
/// Non-finite vertices break the current subpath and never raise.
pub fn load_path(
    device: &mut dyn DeviceContext,
    path: &Path,
    transform: &Affine2D,
    snap: bool,
    sketch: Option<&SketchParams>,
) -> RenderResult<()> {
    let snapper = Snapper::resolve(device, snap);
    match path.codes() {
        Some(codes) => load_coded_with(device, path.vertices(), codes, transform, snapper),
        None => load_polyline_with(
            device,
            path.vertices(),
            0,
            path.len(),
            transform,
            snapper,
            sketch,
        ),
    }
}

/// Set the device's current path to a window of a codeless polyline.
///
/// Exposing `start` and `stop` supports chunked stroking of long lines.
pub fn load_polyline(
    device: &mut dyn DeviceContext,
    vertices: &[[f64; 2]],
    start: usize,
    stop: usize,
    transform: &Affine2D,
    snap: bool,
    sketch: Option<&SketchParams>,
) -> RenderResult<()> {
    let snapper = Snapper::resolve(device, snap);
    load_polyline_with(device, vertices, start, stop, transform, snapper, sketch)
}

fn clamp_coord(v: f64) -> f64 {
    v.clamp(-COORD_LIMIT, COORD_LIMIT)
}

// The general case. Curve bodies are not line-clipped, only their
// control and end points are clamped; a curve leaving the numeric range
// far enough to bend back would be distorted. Proper handling would
// require clipping of polygons and of Beziers.
fn load_coded_with(
    device: &mut dyn DeviceContext,
    vertices: &[[f64; 2]],
    codes: &[PathCode],
    transform: &Affine2D,
    snapper: Snapper,
) -> RenderResult<()> {
    device.new_path();
    let n = vertices.len();
    let mut i = 0;
    while i < n {
        let (mut x0, mut y0) = transform.transform_point(vertices[i][0], vertices[i][1]);
        let is_finite = x0.is_finite() && y0.is_finite();
        x0 = clamp_coord(x0);
        y0 = clamp_coord(y0);
        match codes[i] {
            PathCode::Stop => {}
            PathCode::MoveTo => {
                if is_finite {
                    device.move_to(snapper.apply(x0), snapper.apply(y0));
                } else {
                    device.new_subpath();
                }
            }
            PathCode::LineTo => {
                if is_finite {
                    device.line_to(snapper.apply(x0), snapper.apply(y0));
                } else {
                    device.new_subpath();
                }
            }
            // A non-finite final point forces a subpath break; if only the
            // final point is finite, a new subpath starts there.
            PathCode::Curve3 => {
                let [vx, vy] = *vertices
                    .get(i + 1)
                    .ok_or_else(|| truncated_curve(i))?;
                let (mut x1, mut y1) = transform.transform_point(vx, vy);
                i += 1;
                let last_finite = x1.is_finite() && y1.is_finite();
                if last_finite {
                    x1 = clamp_coord(x1);
                    y1 = clamp_coord(y1);
                    let prev = if is_finite { device.current_point() } else { None };
                    if let Some((px, py)) = prev {
                        // Promote the quadratic to the cubic device
                        // primitive.
                        device.curve_to(
                            (px + 2.0 * x0) / 3.0,
                            (py + 2.0 * y0) / 3.0,
                            (2.0 * x0 + x1) / 3.0,
                            (2.0 * y0 + y1) / 3.0,
                            snapper.apply(x1),
                            snapper.apply(y1),
                        );
                    } else {
                        device.move_to(snapper.apply(x1), snapper.apply(y1));
                    }
                } else {
                    device.new_subpath();
                }
            }
            PathCode::Curve4 => {
                let [v1x, v1y] = *vertices
                    .get(i + 1)
                    .ok_or_else(|| truncated_curve(i))?;
                let [v2x, v2y] = *vertices
                    .get(i + 2)
                    .ok_or_else(|| truncated_curve(i))?;
                let (mut x1, mut y1) = transform.transform_point(v1x, v1y);
                let (mut x2, mut y2) = transform.transform_point(v2x, v2y);
                i += 2;
                let last_finite = x2.is_finite() && y2.is_finite();
                if last_finite {
                    x1 = clamp_coord(x1);
                    y1 = clamp_coord(y1);
                    x2 = clamp_coord(x2);
                    y2 = clamp_coord(y2);
                    let controls_finite = is_finite && x1.is_finite() && y1.is_finite();
                    let prev = if controls_finite { device.current_point() } else { None };
                    if prev.is_some() {
                        device.curve_to(x0, y0, x1, y1, snapper.apply(x2), snapper.apply(y2));
                    } else {
                        device.move_to(snapper.apply(x2), snapper.apply(y2));
                    }
                } else {
                    device.new_subpath();
                }
            }
            PathCode::ClosePoly => device.close_path(),
        }
        i += 1;
    }
    Ok(())
}

fn truncated_curve(index: usize) -> RenderError {
    RenderError::InvalidArgument(format!("curve at vertex {} exceeds the vertex array", index))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Move,
    Line,
}

// The codeless case: an implicit connected polyline. Segments get
// Cohen–Sutherland clipping since most are expected to lie within the
// numeric-range box, and the device runs its own clipping afterwards.
fn load_polyline_with(
    device: &mut dyn DeviceContext,
    vertices: &[[f64; 2]],
    start: usize,
    stop: usize,
    transform: &Affine2D,
    snapper: Snapper,
    sketch: Option<&SketchParams>,
) -> RenderResult<()> {
    if start > stop || stop > vertices.len() {
        return Err(RenderError::InvalidArgument(
            "invalid bounds for sub-path".to_string(),
        ));
    }
    device.new_path();

    const LEFT: u8 = 1 << 0;
    const RIGHT: u8 = 1 << 1;
    const BOTTOM: u8 = 1 << 2;
    const TOP: u8 = 1 << 3;
    let outcode = |x: f64, y: f64| -> u8 {
        let mut code = 0;
        if x < -COORD_LIMIT {
            code |= LEFT;
        } else if x > COORD_LIMIT {
            code |= RIGHT;
        }
        if y < -COORD_LIMIT {
            code |= BOTTOM;
        } else if y > COORD_LIMIT {
            code |= TOP;
        }
        code
    };

    let mut data: Vec<(Op, f64, f64)> = Vec::with_capacity(stop - start);
    // The previous point, if any, before clipping and snapping.
    let mut prev: Option<(f64, f64)> = None;

    for vertex in &vertices[start..stop] {
        let (mut x, mut y) = transform.transform_point(vertex[0], vertex[1]);
        if !(x.is_finite() && y.is_finite()) {
            prev = None;
            continue;
        }
        if let Some((px, py)) = prev {
            let (mut x_prev, mut y_prev) = (px, py);
            prev = Some((x, y));
            let mut op = Op::Line;
            let mut code0 = outcode(x_prev, y_prev);
            let mut code1 = outcode(x, y);
            let mut accept = false;
            let mut update_prev = false;
            loop {
                if code0 | code1 == 0 {
                    accept = true;
                    break;
                }
                if code0 & code1 != 0 {
                    break;
                }
                let code = if code0 != 0 { code0 } else { code1 };
                let (xc, yc) = if code & TOP != 0 {
                    (
                        x_prev + (x - x_prev) * (COORD_LIMIT - y_prev) / (y - y_prev),
                        COORD_LIMIT,
                    )
                } else if code & BOTTOM != 0 {
                    (
                        x_prev + (x - x_prev) * (-COORD_LIMIT - y_prev) / (y - y_prev),
                        -COORD_LIMIT,
                    )
                } else if code & RIGHT != 0 {
                    (
                        COORD_LIMIT,
                        y_prev + (y - y_prev) * (COORD_LIMIT - x_prev) / (x - x_prev),
                    )
                } else {
                    (
                        -COORD_LIMIT,
                        y_prev + (y - y_prev) * (-COORD_LIMIT - x_prev) / (x - x_prev),
                    )
                };
                if code == code0 {
                    update_prev = true;
                    x_prev = xc;
                    y_prev = yc;
                    code0 = outcode(x_prev, y_prev);
                } else {
                    x = xc;
                    y = yc;
                    code1 = outcode(x, y);
                }
            }
            if accept {
                // The segment survives; if its start moved, pen-up to the
                // clipped start first.
                if update_prev {
                    data.push((Op::Move, x_prev, y_prev));
                }
            } else {
                // Rejected segments still pen-up to the raw destination so
                // the snapping below keeps a defined reference point.
                op = Op::Move;
            }
            if snapper.active() && (x == x_prev || y == y_prev) {
                // Exactly horizontal or vertical: snap both endpoints.
                // Snapping only orthogonally to the displacement would make
                // independently drawn axis spines fail to line up.
                if let Some(last) = data.last_mut() {
                    last.1 = snapper.apply(x_prev);
                    last.2 = snapper.apply(y_prev);
                }
                data.push((op, snapper.apply(x), snapper.apply(y)));
            } else {
                data.push((op, x, y));
            }
        } else {
            prev = Some((x, y));
            data.push((Op::Move, x, y));
        }
    }

    if let Some(params) = sketch {
        apply_sketch(&mut data, params);
    }
    for (op, x, y) in data {
        match op {
            Op::Move => device.move_to(x, y),
            Op::Line => device.line_to(x, y),
        }
    }
    Ok(())
}

/// Perturb line segments perpendicular to their direction with a
/// deterministic wobble.
fn apply_sketch(data: &mut [(Op, f64, f64)], params: &SketchParams) {
    let wavelength = if params.length > 0.0 { params.length } else { 1.0 };
    let mut rng: u64 = 0x9e37_79b9_7f4a_7c15 ^ params.randomness.to_bits();
    let mut next_unit = move || {
        rng = rng
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (rng >> 33) as f64 / (1u64 << 31) as f64 - 1.0
    };
    let mut phase = 0.0;
    let mut prev: Option<(f64, f64)> = None;
    for (op, x, y) in data.iter_mut() {
        let original = (*x, *y);
        if *op == Op::Line {
            if let Some((px, py)) = prev {
                let (dx, dy) = (*x - px, *y - py);
                let len = dx.hypot(dy);
                if len > 0.0 {
                    phase += 2.0 * std::f64::consts::PI * len / wavelength;
                    let wobble = params.scale * (phase + params.randomness * next_unit()).sin();
                    *x += -dy / len * wobble;
                    *y += dx / len * wobble;
                }
            }
        }
        prev = Some(original);
    }
}

/// Fill and/or stroke `path` on the device, with the device state saved
/// around the call.
pub(crate) fn fill_and_stroke(
    device: &mut dyn DeviceContext,
    path: &Path,
    transform: &Affine2D,
    fill: Option<Rgba>,
    stroke: Option<Rgba>,
) -> RenderResult<()> {
    device.save();
    let result = (|| {
        let mut loaded = false;
        if let Some(color) = fill {
            device.set_source_rgba(color);
            load_path(device, path, transform, false, None)?;
            loaded = true;
            device.fill_current_path(true);
        }
        if let Some(color) = stroke {
            device.set_source_rgba(color);
            if !loaded {
                load_path(device, path, transform, false, None)?;
            }
            device.stroke_current_path(true);
        }
        Ok(())
    })();
    device.restore();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{DeviceCommand, RecordingDevice};
    use rstest::rstest;

    fn identity() -> Affine2D {
        Affine2D::IDENTITY
    }

    #[rstest]
    #[case(0.5, 5.7, 5.5)] // width in (0, 1): pixel center
    #[case(2.0, 5.7, 6.0)] // rounds even: pixel edge
    #[case(3.0, 5.7, 5.5)] // rounds odd: pixel center
    #[case(0.0, 5.7, 6.0)] // zero width: edge defined by the fill
    fn test_snapper_policy(#[case] line_width: f64, #[case] input: f64, #[case] expected: f64) {
        assert_eq!(Snapper::for_line_width(line_width).apply(input), expected);
    }

    #[test]
    fn test_horizontal_segment_snaps_both_endpoints() {
        let mut device = RecordingDevice::new(100, 100);
        load_polyline_with(
            &mut device,
            &[[10.2, 5.7], [20.2, 5.7]],
            0,
            2,
            &identity(),
            Snapper::PixelCenter,
            None,
        )
        .unwrap();
        assert_eq!(
            device.path_commands(),
            vec![
                &DeviceCommand::MoveTo(10.5, 5.5),
                &DeviceCommand::LineTo(20.5, 5.5),
            ]
        );
    }

    #[test]
    fn test_diagonal_segment_left_unsnapped() {
        let mut device = RecordingDevice::new(100, 100);
        load_polyline_with(
            &mut device,
            &[[10.2, 5.7], [20.2, 8.7]],
            0,
            2,
            &identity(),
            Snapper::PixelCenter,
            None,
        )
        .unwrap();
        assert_eq!(
            device.path_commands(),
            vec![
                &DeviceCommand::MoveTo(10.2, 5.7),
                &DeviceCommand::LineTo(20.2, 8.7),
            ]
        );
    }

    #[test]
    fn test_segment_outside_box_rejected_with_pen_up() {
        let far = COORD_LIMIT * 2.0;
        let mut device = RecordingDevice::new(100, 100);
        load_polyline_with(
            &mut device,
            &[[far, 0.0], [far, 10.0], [5.0, 5.0]],
            0,
            3,
            &identity(),
            Snapper::Disabled,
            None,
        )
        .unwrap();
        let commands = device.path_commands();
        // The fully-outside segment becomes a pen-up to its raw
        // destination; drawing resumes from there.
        assert_eq!(commands[1], &DeviceCommand::MoveTo(far, 10.0));
        assert!(matches!(commands[2], DeviceCommand::MoveTo(..)));
    }

    #[test]
    fn test_straddling_segment_clipped_to_boundary() {
        let mut device = RecordingDevice::new(100, 100);
        load_polyline_with(
            &mut device,
            &[[0.0, 0.0], [COORD_LIMIT * 2.0, 0.0]],
            0,
            2,
            &identity(),
            Snapper::Disabled,
            None,
        )
        .unwrap();
        assert_eq!(
            device.path_commands(),
            vec![
                &DeviceCommand::MoveTo(0.0, 0.0),
                &DeviceCommand::LineTo(COORD_LIMIT, 0.0),
            ]
        );
    }

    #[test]
    fn test_clipped_start_emits_move_to_boundary() {
        let mut device = RecordingDevice::new(100, 100);
        load_polyline_with(
            &mut device,
            &[[-COORD_LIMIT * 3.0, 0.0], [0.0, 0.0]],
            0,
            2,
            &identity(),
            Snapper::Disabled,
            None,
        )
        .unwrap();
        let commands = device.path_commands();
        assert_eq!(commands[1], &DeviceCommand::MoveTo(-COORD_LIMIT, 0.0));
        assert_eq!(commands[2], &DeviceCommand::LineTo(0.0, 0.0));
    }

    #[test]
    fn test_non_finite_vertex_breaks_subpath_once() {
        let mut device = RecordingDevice::new(100, 100);
        load_polyline_with(
            &mut device,
            &[[0.0, 0.0], [f64::NAN, 5.0], [10.0, 10.0], [12.0, 14.0]],
            0,
            4,
            &identity(),
            Snapper::Disabled,
            None,
        )
        .unwrap();
        assert_eq!(
            device.path_commands(),
            vec![
                &DeviceCommand::MoveTo(0.0, 0.0),
                &DeviceCommand::MoveTo(10.0, 10.0),
                &DeviceCommand::LineTo(12.0, 14.0),
            ]
        );
    }

    #[test]
    fn test_coded_non_finite_line_breaks_subpath() {
        let path = Path::new(
            vec![[0.0, 0.0], [f64::NAN, 5.0], [10.0, 10.0]],
            Some(vec![PathCode::MoveTo, PathCode::LineTo, PathCode::LineTo]),
        )
        .unwrap();
        let mut device = RecordingDevice::new(100, 100);
        load_path(&mut device, &path, &identity(), false, None).unwrap();
        // Exactly one break: two independent command groups.
        assert_eq!(
            device.path_commands(),
            vec![
                &DeviceCommand::MoveTo(0.0, 0.0),
                &DeviceCommand::NewSubpath,
                &DeviceCommand::MoveTo(10.0, 10.0),
            ]
        );
    }

    #[test]
    fn test_quadratic_promoted_to_cubic() {
        let path = Path::new(
            vec![[0.0, 0.0], [3.0, 6.0], [6.0, 0.0]],
            Some(vec![PathCode::MoveTo, PathCode::Curve3, PathCode::Curve3]),
        )
        .unwrap();
        let mut device = RecordingDevice::new(100, 100);
        load_path(&mut device, &path, &identity(), false, None).unwrap();
        // Control points follow the 2/3 interior construction.
        assert_eq!(
            device.path_commands(),
            vec![
                &DeviceCommand::MoveTo(0.0, 0.0),
                &DeviceCommand::CurveTo(2.0, 4.0, 4.0, 4.0, 6.0, 0.0),
            ]
        );
    }

    #[test]
    fn test_curve_with_non_finite_end_starts_new_subpath() {
        let path = Path::new(
            vec![
                [0.0, 0.0],
                [f64::NAN, 0.0],
                [2.0, 2.0],
                [4.0, 0.0],
                [5.0, 5.0],
            ],
            Some(vec![
                PathCode::MoveTo,
                PathCode::Curve3,
                PathCode::Curve3,
                PathCode::LineTo,
                PathCode::LineTo,
            ]),
        )
        .unwrap();
        let mut device = RecordingDevice::new(100, 100);
        load_path(&mut device, &path, &identity(), false, None).unwrap();
        // The finite end point of the degenerate curve seeds a new
        // subpath.
        assert_eq!(device.path_commands()[1], &DeviceCommand::MoveTo(2.0, 2.0));
    }

    #[test]
    fn test_coded_vertices_clamped_to_numeric_range() {
        let path = Path::new(
            vec![[0.0, 0.0], [COORD_LIMIT * 4.0, 0.0]],
            Some(vec![PathCode::MoveTo, PathCode::LineTo]),
        )
        .unwrap();
        let mut device = RecordingDevice::new(100, 100);
        load_path(&mut device, &path, &identity(), false, None).unwrap();
        assert_eq!(
            device.path_commands()[1],
            &DeviceCommand::LineTo(COORD_LIMIT, 0.0)
        );
    }

    #[test]
    fn test_truncated_curve_is_invalid_argument() {
        let path = Path::new(
            vec![[0.0, 0.0], [1.0, 1.0]],
            Some(vec![PathCode::MoveTo, PathCode::Curve4]),
        )
        .unwrap();
        let mut device = RecordingDevice::new(100, 100);
        assert!(matches!(
            load_path(&mut device, &path, &identity(), false, None),
            Err(RenderError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_polyline_bounds_checked() {
        let mut device = RecordingDevice::new(100, 100);
        assert!(matches!(
            load_polyline(&mut device, &[[0.0, 0.0]], 0, 2, &identity(), false, None),
            Err(RenderError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_sketch_is_deterministic() {
        let params = SketchParams {
            scale: 1.0,
            length: 20.0,
            randomness: 0.5,
        };
        let vertices = [[0.0, 0.0], [30.0, 0.0], [60.0, 0.0]];
        let mut first = RecordingDevice::new(100, 100);
        let mut second = RecordingDevice::new(100, 100);
        for device in [&mut first, &mut second] {
            load_polyline_with(
                device,
                &vertices,
                0,
                3,
                &identity(),
                Snapper::Disabled,
                Some(&params),
            )
            .unwrap();
        }
        assert_eq!(first.path_commands(), second.path_commands());
        // And it actually moved something off the straight line.
        assert_ne!(
            first.path_commands()[1],
            &DeviceCommand::LineTo(30.0, 0.0)
        );
    }
}
