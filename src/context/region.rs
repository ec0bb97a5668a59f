//! Pixel-region copy/restore for partial redraw, and raw buffer access.

use super::RenderingContext;
use crate::device::{DeviceContext, Rect};
use crate::error::{RenderError, RenderResult};
use std::sync::Arc;

/// A rectangular snapshot of canvas pixels. The backing buffer is
/// shared: a caller may retain a region past the producing call, and it
/// is released with the last reference.
#[derive(Debug, Clone)]
pub struct Region {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    buf: Arc<[u8]>,
}

impl Region {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The snapshot bytes: `height` rows of `width` 4-byte pixels.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }
}

impl RenderingContext {
    /// The canvas as fixed-stride rows of 4-byte pixels.
    pub fn buffer(&self) -> RenderResult<&[u8]> {
        self.device.image_data().ok_or(RenderError::UnsupportedTarget {
            operation: "buffer access",
        })
    }

    /// Row stride of the canvas buffer, in bytes.
    pub fn buffer_stride(&self) -> RenderResult<usize> {
        self.device.stride().ok_or(RenderError::UnsupportedTarget {
            operation: "buffer access",
        })
    }

    /// Snapshot a rectangle of canvas pixels (device rows, 4 bytes per
    /// pixel throughout). Raster devices only.
    pub fn copy_from_bbox(&self, bbox: Rect) -> RenderResult<Region> {
        let data = self.device.image_data().ok_or_else(non_raster_region)?;
        let stride = self.device.stride().ok_or_else(non_raster_region)?;
        let x0 = bbox.x.floor();
        let y0 = bbox.y.floor();
        let x1 = (bbox.x + bbox.width).ceil();
        let y1 = (bbox.y + bbox.height).ceil();
        if !(x0 >= 0.0
            && x0 <= x1
            && x1 <= self.width as f64
            && y0 >= 0.0
            && y0 <= y1
            && y1 <= self.height as f64)
        {
            return Err(RenderError::InvalidArgument("invalid bbox".to_string()));
        }
        let (x0, y0) = (x0 as u32, y0 as u32);
        let width = x1 as u32 - x0;
        let height = y1 as u32 - y0;

        let mut buf = Vec::with_capacity((width * height * 4) as usize);
        for row in y0..y0 + height {
            let offset = row as usize * stride + x0 as usize * 4;
            buf.extend_from_slice(&data[offset..offset + width as usize * 4]);
        }
        Ok(Region {
            x: x0,
            y: y0,
            width,
            height,
            buf: buf.into(),
        })
    }

    /// Write a previously copied region back at its original position.
    /// Raster devices only.
    pub fn restore_region(&mut self, region: &Region) -> RenderResult<()> {
        let stride = self.device.stride().ok_or_else(non_raster_region)?;
        let data = self.device.image_data_mut().ok_or_else(non_raster_region)?;
        let row_bytes = region.width as usize * 4;
        for row in 0..region.height {
            let src = row as usize * row_bytes;
            let dst = (region.y + row) as usize * stride + region.x as usize * 4;
            data[dst..dst + row_bytes].copy_from_slice(&region.buf[src..src + row_bytes]);
        }
        Ok(())
    }
}

fn non_raster_region() -> RenderError {
    RenderError::InvalidArgument("region operations require a raster device".to_string())
}
