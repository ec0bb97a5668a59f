//! Sub-pixel stamp cache for batched marker drawing.
//!
//! Rendering the same marker at many positions is amortized by
//! prerendering it once per cell of an N×N sub-pixel grid and
//! compositing the matching stamp at integer pixel positions. The cache
//! lives for a single batched draw call.

use crate::color::Rgba;
use crate::device::{DeviceContext, Stamp};
use crate::error::RenderResult;
use crate::path::Path;
use crate::path_loader::{fill_and_stroke, load_path};
use crate::transform::Affine2D;

/// Copy the pen state relevant to marker stamping onto a scratch surface.
pub(crate) fn copy_for_marker_stamping(src: &dyn DeviceContext, dst: &mut dyn DeviceContext) {
    dst.set_antialias(src.antialias());
    dst.set_cap_style(src.cap_style());
    dst.set_join_style(src.join_style());
    dst.set_line_width(src.line_width());
    let (dashes, offset) = src.dash();
    dst.set_dash(&dashes, offset);
    dst.set_source_rgba(src.source_rgba());
}

pub(crate) struct MarkerStampCache {
    n_subpix: u32,
    origin: (f64, f64),
    stamps: Vec<Stamp>,
}

impl MarkerStampCache {
    /// Build the stamp grid for a marker, or return None when direct
    /// drawing is cheaper or the device cannot provide stamp surfaces.
    pub(crate) fn build(
        device: &mut dyn DeviceContext,
        simplify_threshold: f64,
        marker_count: usize,
        marker_path: &Path,
        marker_transform: &Affine2D,
        fill: Option<Rgba>,
        stroke: Rgba,
    ) -> RenderResult<Option<Self>> {
        if simplify_threshold < 1.0 / 16.0 {
            return Ok(None);
        }
        // The grid size bounds the sub-pixel positioning error to the
        // threshold.
        let n_subpix = (1.0 / simplify_threshold).ceil() as u32;
        if (n_subpix as usize).pow(2) >= marker_count {
            // Fewer markers than stamps: direct drawing is cheaper.
            return Ok(None);
        }

        // Measure the marker's combined fill+stroke extents once.
        // Extents ignore surface dimensions and clipping.
        load_path(device, marker_path, marker_transform, false, None)?;
        let Some(mut extents) = device.stroke_extents() else {
            device.new_path();
            return Ok(None);
        };
        if fill.is_some() {
            if let Some(fill_extents) = device.fill_extents() {
                extents = extents.union(&fill_extents);
            }
        }
        device.new_path();

        let width = (extents.width + 1.0).ceil().max(1.0) as u32;
        let height = (extents.height + 1.0).ceil().max(1.0) as u32;
        let Some(mut scratch) = device.new_stamp_surface(width, height) else {
            return Ok(None);
        };
        copy_for_marker_stamping(&*device, &mut scratch);

        let n = n_subpix as f64;
        let mut stamps = Vec::with_capacity((n_subpix * n_subpix) as usize);
        for i in 0..n_subpix {
            for j in 0..n_subpix {
                scratch.clear();
                let matrix = marker_transform
                    .offset(-extents.x + i as f64 / n, -extents.y + j as f64 / n);
                fill_and_stroke(&mut scratch, marker_path, &matrix, fill, Some(stroke))?;
                stamps.push(scratch.snapshot());
            }
        }
        Ok(Some(Self {
            n_subpix,
            origin: (extents.x, extents.y),
            stamps,
        }))
    }

    /// Composite the stamp for one device-space anchor. Non-finite
    /// anchors are skipped.
    pub(crate) fn stamp(&self, device: &mut dyn DeviceContext, x: f64, y: f64) {
        let target_x = x + self.origin.0;
        let target_y = y + self.origin.1;
        if !(target_x.is_finite() && target_y.is_finite()) {
            return;
        }
        let int_x = target_x.floor();
        let int_y = target_y.floor();
        let n = self.n_subpix as f64;
        let cell_x = ((n * (target_x - int_x)) as u32).min(self.n_subpix - 1);
        let cell_y = ((n * (target_y - int_y)) as u32).min(self.n_subpix - 1);
        let stamp = &self.stamps[(cell_x * self.n_subpix + cell_y) as usize];
        device.composite_stamp(stamp, int_x as i32, int_y as i32);
    }

    #[cfg(test)]
    pub(crate) fn grid_size(&self) -> u32 {
        self.n_subpix
    }
}
