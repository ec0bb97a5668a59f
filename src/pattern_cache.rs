//! Stamp cache for batched path-collection drawing.
//!
//! Entries are keyed by path identity, transform coefficients, draw
//! operation, and — for strokes — line width and dash pattern, since
//! those change the stamp's geometry rather than merely its color. The
//! stamps themselves are alpha masks painted through the per-item source
//! color, quantized on the same sub-pixel grid as marker stamps.

use crate::color::Rgba;
use crate::device::{AlphaStamp, DeviceContext, DrawOp, Rect};
use crate::error::RenderResult;
use crate::path::{Path, PathKey};
use crate::path_loader::load_path;
use crate::transform::Affine2D;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PatternKey {
    path: PathKey,
    matrix: [u64; 6],
    op: DrawOp,
    line_width: u64,
    dash: Option<(Vec<u64>, u64)>,
}

impl PatternKey {
    fn new(
        path: &Arc<Path>,
        matrix: &Affine2D,
        op: DrawOp,
        line_width: f64,
        dash: &Option<(Vec<f64>, f64)>,
    ) -> Self {
        Self {
            path: PathKey::of(path),
            matrix: [
                matrix.xx.to_bits(),
                matrix.yx.to_bits(),
                matrix.xy.to_bits(),
                matrix.yy.to_bits(),
                matrix.x0.to_bits(),
                matrix.y0.to_bits(),
            ],
            op,
            line_width: line_width.to_bits(),
            dash: dash.as_ref().map(|(segments, offset)| {
                (
                    segments.iter().map(|d| d.to_bits()).collect(),
                    offset.to_bits(),
                )
            }),
        }
    }
}

pub(crate) struct PatternCache {
    n_subpix: u32,
    bboxes: HashMap<PatternKey, Option<Rect>>,
    stamps: HashMap<(PatternKey, u32, u32), AlphaStamp>,
}

impl PatternCache {
    /// A threshold of zero (vector-capable devices) or below 1/16
    /// disables stamping: every item is drawn directly at full precision.
    pub(crate) fn new(simplify_threshold: f64) -> Self {
        let n_subpix = if simplify_threshold >= 1.0 / 16.0 {
            (1.0 / simplify_threshold).ceil() as u32
        } else {
            0
        };
        Self {
            n_subpix,
            bboxes: HashMap::new(),
            stamps: HashMap::new(),
        }
    }

    /// Paint one instance of (path, transform, op) with the device's
    /// current source at device offset (x, y).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn mask(
        &mut self,
        device: &mut dyn DeviceContext,
        path: &Arc<Path>,
        matrix: &Affine2D,
        op: DrawOp,
        line_width: f64,
        dash: &Option<(Vec<f64>, f64)>,
        x: f64,
        y: f64,
    ) -> RenderResult<()> {
        if self.n_subpix == 0 {
            return draw_direct(device, path, matrix, op, line_width, dash, x, y);
        }
        let key = PatternKey::new(path, matrix, op, line_width, dash);

        let bbox = match self.bboxes.get(&key) {
            Some(bbox) => *bbox,
            None => {
                load_path(device, path, matrix, false, None)?;
                let bbox = match op {
                    DrawOp::Fill => device.fill_extents(),
                    DrawOp::Stroke => device.fill_extents().map(|r| r.expand(line_width / 2.0)),
                };
                device.new_path();
                self.bboxes.insert(key.clone(), bbox);
                bbox
            }
        };
        let Some(bbox) = bbox else {
            return Ok(());
        };

        let target_x = x + bbox.x;
        let target_y = y + bbox.y;
        if !(target_x.is_finite() && target_y.is_finite()) {
            return Ok(());
        }
        let int_x = target_x.floor();
        let int_y = target_y.floor();
        let n = self.n_subpix as f64;
        let cell_x = ((n * (target_x - int_x)) as u32).min(self.n_subpix - 1);
        let cell_y = ((n * (target_y - int_y)) as u32).min(self.n_subpix - 1);

        let stamp_key = (key, cell_x, cell_y);
        if !self.stamps.contains_key(&stamp_key) {
            let Some(stamp) = render_stamp(
                &*device,
                path,
                matrix,
                op,
                line_width,
                dash,
                &bbox,
                (cell_x, cell_y),
                self.n_subpix,
            )?
            else {
                // No scratch surface available; fall back to the slow path.
                return draw_direct(device, path, matrix, op, line_width, dash, x, y);
            };
            self.stamps.insert(stamp_key.clone(), stamp);
        }
        device.composite_alpha_stamp(&self.stamps[&stamp_key], int_x as i32, int_y as i32);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn stamp_count(&self) -> usize {
        self.stamps.len()
    }
}

fn draw_direct(
    device: &mut dyn DeviceContext,
    path: &Path,
    matrix: &Affine2D,
    op: DrawOp,
    line_width: f64,
    dash: &Option<(Vec<f64>, f64)>,
    x: f64,
    y: f64,
) -> RenderResult<()> {
    device.save();
    let result = (|| {
        if op == DrawOp::Stroke {
            device.set_line_width(line_width);
            if let Some((segments, offset)) = dash {
                device.set_dash(segments, *offset);
            }
        }
        load_path(device, path, &matrix.offset(x, y), false, None)?;
        match op {
            DrawOp::Fill => device.fill_current_path(false),
            DrawOp::Stroke => device.stroke_current_path(false),
        }
        Ok(())
    })();
    device.restore();
    result
}

#[allow(clippy::too_many_arguments)]
fn render_stamp(
    device: &dyn DeviceContext,
    path: &Path,
    matrix: &Affine2D,
    op: DrawOp,
    line_width: f64,
    dash: &Option<(Vec<f64>, f64)>,
    bbox: &Rect,
    cell: (u32, u32),
    n_subpix: u32,
) -> RenderResult<Option<AlphaStamp>> {
    let width = (bbox.width + 1.0).ceil().max(1.0) as u32;
    let height = (bbox.height + 1.0).ceil().max(1.0) as u32;
    let Some(mut scratch) = device.new_stamp_surface(width, height) else {
        return Ok(None);
    };
    scratch.set_antialias(device.antialias());
    scratch.set_source_rgba(Rgba::new(1.0, 1.0, 1.0, 1.0));
    if op == DrawOp::Stroke {
        scratch.set_line_width(line_width);
        scratch.set_cap_style(device.cap_style());
        scratch.set_join_style(device.join_style());
        if let Some((segments, offset)) = dash {
            scratch.set_dash(segments, *offset);
        }
    }
    let n = n_subpix as f64;
    let offset_matrix = matrix.offset(
        -bbox.x + cell.0 as f64 / n,
        -bbox.y + cell.1 as f64 / n,
    );
    load_path(&mut scratch, path, &offset_matrix, false, None)?;
    match op {
        DrawOp::Fill => scratch.fill_current_path(false),
        DrawOp::Stroke => scratch.stroke_current_path(false),
    }
    Ok(Some(scratch.alpha_snapshot()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::RasterDevice;
    use crate::recording::{DeviceCommand, RecordingDevice};

    fn unit_square() -> Arc<Path> {
        Arc::new(Path::polyline(vec![
            [0.0, 0.0],
            [4.0, 0.0],
            [4.0, 4.0],
            [0.0, 4.0],
            [0.0, 0.0],
        ]))
    }

    #[test]
    fn test_stroke_keys_include_width_and_dash() {
        let path = unit_square();
        let fill_a = PatternKey::new(&path, &Affine2D::IDENTITY, DrawOp::Fill, 1.0, &None);
        let fill_b = PatternKey::new(&path, &Affine2D::IDENTITY, DrawOp::Fill, 2.0, &None);
        // Fill stamps ignore color but not geometry; width is geometry
        // only for strokes, yet it participates in the key as passed.
        assert_ne!(fill_a, fill_b);

        let stroke_thin = PatternKey::new(&path, &Affine2D::IDENTITY, DrawOp::Stroke, 1.0, &None);
        let stroke_wide = PatternKey::new(&path, &Affine2D::IDENTITY, DrawOp::Stroke, 2.0, &None);
        assert_ne!(stroke_thin, stroke_wide);

        let dashed = PatternKey::new(
            &path,
            &Affine2D::IDENTITY,
            DrawOp::Stroke,
            1.0,
            &Some((vec![2.0, 1.0], 0.0)),
        );
        assert_ne!(stroke_thin, dashed);
    }

    #[test]
    fn test_identity_not_value_keying() {
        let a = unit_square();
        let b = unit_square();
        let key_a = PatternKey::new(&a, &Affine2D::IDENTITY, DrawOp::Fill, 0.0, &None);
        let key_b = PatternKey::new(&b, &Affine2D::IDENTITY, DrawOp::Fill, 0.0, &None);
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn test_zero_threshold_draws_directly() {
        let mut cache = PatternCache::new(0.0);
        let mut device = RecordingDevice::new(50, 50);
        cache
            .mask(
                &mut device,
                &unit_square(),
                &Affine2D::IDENTITY,
                DrawOp::Fill,
                0.0,
                &None,
                10.0,
                10.0,
            )
            .unwrap();
        assert!(device
            .commands()
            .iter()
            .any(|c| matches!(c, DeviceCommand::Fill { .. })));
        assert_eq!(cache.stamp_count(), 0);
    }

    #[test]
    fn test_stamps_reused_within_a_cell() {
        let mut cache = PatternCache::new(1.0 / 4.0);
        let mut device = RasterDevice::new(64, 64).unwrap();
        let path = unit_square();
        for x in [10.0, 20.0, 30.0] {
            // Identical fractional offsets land in the same cell.
            cache
                .mask(
                    &mut device,
                    &path,
                    &Affine2D::IDENTITY,
                    DrawOp::Fill,
                    0.0,
                    &None,
                    x,
                    10.0,
                )
                .unwrap();
        }
        assert_eq!(cache.stamp_count(), 1);

        // A different sub-pixel cell renders a second stamp.
        cache
            .mask(
                &mut device,
                &path,
                &Affine2D::IDENTITY,
                DrawOp::Fill,
                0.0,
                &None,
                10.6,
                10.0,
            )
            .unwrap();
        assert_eq!(cache.stamp_count(), 2);
    }
}
