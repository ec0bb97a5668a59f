//! The tiny-skia backed raster device.

use crate::color::Rgba;
use crate::device::{
    AlphaStamp, AntialiasMode, CapStyle, DeviceContext, JoinStyle, MeshTriangle, Rect, Stamp,
};
use crate::error::{RenderError, RenderResult};
use std::sync::Arc;
use tiny_skia::{Mask, Paint, PathBuilder, Pixmap, PixmapPaint, PixmapRef, Transform};

/// Maximum canvas dimension.
const MAX_DIMENSION: u32 = 32767;

#[derive(Debug, Clone)]
struct DeviceState {
    source: Rgba,
    line_width: f64,
    miter_limit: f64,
    cap: CapStyle,
    join: JoinStyle,
    dashes: Vec<f64>,
    dash_offset: f64,
    antialias: AntialiasMode,
    clip: Option<Arc<Mask>>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            source: Rgba::BLACK,
            line_width: 1.0,
            miter_limit: 10.0,
            cap: CapStyle::Butt,
            join: JoinStyle::Miter,
            dashes: Vec::new(),
            dash_offset: 0.0,
            antialias: AntialiasMode::Good,
            clip: None,
        }
    }
}

impl From<CapStyle> for tiny_skia::LineCap {
    fn from(cap: CapStyle) -> Self {
        match cap {
            CapStyle::Butt => tiny_skia::LineCap::Butt,
            CapStyle::Round => tiny_skia::LineCap::Round,
            CapStyle::Projecting => tiny_skia::LineCap::Square,
        }
    }
}

impl From<JoinStyle> for tiny_skia::LineJoin {
    fn from(join: JoinStyle) -> Self {
        match join {
            JoinStyle::Miter => tiny_skia::LineJoin::Miter,
            JoinStyle::Round => tiny_skia::LineJoin::Round,
            JoinStyle::Bevel => tiny_skia::LineJoin::Bevel,
        }
    }
}

/// A raster device context over a premultiplied RGBA pixel buffer.
#[derive(Debug)]
pub struct RasterDevice {
    pixmap: Pixmap,
    builder: PathBuilder,
    has_current: bool,
    current: (f64, f64),
    subpath_start: (f64, f64),
    state_stack: Vec<DeviceState>,
}

impl RasterDevice {
    /// Create a raster device with the given dimensions, cleared to
    /// transparent.
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(RenderError::InvalidDimensions { width, height });
        }
        let pixmap =
            Pixmap::new(width, height).ok_or(RenderError::InvalidDimensions { width, height })?;
        Ok(Self {
            pixmap,
            builder: PathBuilder::new(),
            has_current: false,
            current: (0.0, 0.0),
            subpath_start: (0.0, 0.0),
            state_stack: vec![DeviceState::default()],
        })
    }

    /// Clear the canvas to transparent, keeping the state stack.
    pub fn clear(&mut self) {
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
    }

    /// Snapshot the canvas as a reusable stamp.
    pub fn snapshot(&self) -> Stamp {
        Stamp {
            pixmap: self.pixmap.clone(),
        }
    }

    /// Snapshot the canvas alpha channel as a coverage stamp.
    pub fn alpha_snapshot(&self) -> AlphaStamp {
        AlphaStamp {
            coverage: self.pixmap.data().iter().skip(3).step_by(4).copied().collect(),
            width: self.pixmap.width(),
            height: self.pixmap.height(),
        }
    }

    fn state(&self) -> &DeviceState {
        self.state_stack.last().expect("device state stack is never empty")
    }

    fn state_mut(&mut self) -> &mut DeviceState {
        self.state_stack.last_mut().expect("device state stack is never empty")
    }

    fn solid_paint(state: &DeviceState) -> Paint<'static> {
        let mut paint = Paint {
            anti_alias: state.antialias != AntialiasMode::None,
            force_hq_pipeline: state.antialias == AntialiasMode::Best,
            ..Paint::default()
        };
        paint.set_color(state.source.into());
        paint
    }

    fn finished_path(&self) -> Option<tiny_skia::Path> {
        self.builder.clone().finish()
    }

    fn drop_path(&mut self) {
        self.builder = PathBuilder::new();
        self.has_current = false;
    }

    /// Intersect the current clip with a freshly filled mask.
    fn intersect_clip(&mut self, mut mask: Mask) {
        if let Some(existing) = &self.state().clip {
            let existing = Arc::clone(existing);
            for (m, e) in mask.data_mut().iter_mut().zip(existing.data()) {
                *m = ((*m as u16 * *e as u16 + 127) / 255) as u8;
            }
        }
        self.state_mut().clip = Some(Arc::new(mask));
    }

    /// Source-over blend of a premultiplied color onto one pixel.
    fn blend_pixel(data: &mut [u8], idx: usize, src: [f64; 4]) {
        let inv = 1.0 - src[3];
        for c in 0..4 {
            let dst = data[idx + c] as f64 / 255.0;
            let out = src[c] + dst * inv;
            data[idx + c] = (out * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }
}

impl DeviceContext for RasterDevice {
    fn is_raster(&self) -> bool {
        true
    }

    fn is_vector(&self) -> bool {
        false
    }

    fn width(&self) -> u32 {
        self.pixmap.width()
    }

    fn height(&self) -> u32 {
        self.pixmap.height()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn new_path(&mut self) {
        self.drop_path();
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.builder.move_to(x as f32, y as f32);
        self.current = (x, y);
        self.subpath_start = (x, y);
        self.has_current = true;
    }

    fn line_to(&mut self, x: f64, y: f64) {
        if !self.has_current {
            self.move_to(x, y);
            return;
        }
        self.builder.line_to(x as f32, y as f32);
        self.current = (x, y);
    }

    fn curve_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) {
        if !self.has_current {
            self.move_to(x1, y1);
        }
        self.builder.cubic_to(
            x1 as f32, y1 as f32, x2 as f32, y2 as f32, x3 as f32, y3 as f32,
        );
        self.current = (x3, y3);
        self.has_current = true;
    }

    fn close_path(&mut self) {
        if self.has_current {
            self.builder.close();
            self.current = self.subpath_start;
        }
    }

    fn new_subpath(&mut self) {
        self.has_current = false;
    }

    fn current_point(&self) -> Option<(f64, f64)> {
        self.has_current.then_some(self.current)
    }

    fn save(&mut self) {
        let top = self.state().clone();
        self.state_stack.push(top);
    }

    fn restore(&mut self) {
        if self.state_stack.len() <= 1 {
            panic!("unbalanced device restore");
        }
        self.state_stack.pop();
    }

    fn stack_depth(&self) -> usize {
        self.state_stack.len()
    }

    fn set_source_rgba(&mut self, color: Rgba) {
        self.state_mut().source = color;
    }

    fn source_rgba(&self) -> Rgba {
        self.state().source
    }

    fn set_line_width(&mut self, width: f64) {
        self.state_mut().line_width = width;
    }

    fn line_width(&self) -> f64 {
        self.state().line_width
    }

    fn set_miter_limit(&mut self, limit: f64) {
        self.state_mut().miter_limit = limit;
    }

    fn set_cap_style(&mut self, cap: CapStyle) {
        self.state_mut().cap = cap;
    }

    fn cap_style(&self) -> CapStyle {
        self.state().cap
    }

    fn set_join_style(&mut self, join: JoinStyle) {
        self.state_mut().join = join;
    }

    fn join_style(&self) -> JoinStyle {
        self.state().join
    }

    fn set_dash(&mut self, dashes: &[f64], offset: f64) {
        let state = self.state_mut();
        state.dashes = dashes.to_vec();
        state.dash_offset = offset;
    }

    fn dash(&self) -> (Vec<f64>, f64) {
        let state = self.state();
        (state.dashes.clone(), state.dash_offset)
    }

    fn set_antialias(&mut self, mode: AntialiasMode) {
        self.state_mut().antialias = mode;
    }

    fn antialias(&self) -> AntialiasMode {
        self.state().antialias
    }

    fn clip_rect(&mut self, rect: Rect) {
        let mut mask = match Mask::new(self.pixmap.width(), self.pixmap.height()) {
            Some(mask) => mask,
            None => return,
        };
        if let Some(skia_rect) = tiny_skia::Rect::from_xywh(
            rect.x as f32,
            rect.y as f32,
            rect.width as f32,
            rect.height as f32,
        ) {
            let mut pb = PathBuilder::new();
            pb.push_rect(skia_rect);
            if let Some(path) = pb.finish() {
                mask.fill_path(&path, tiny_skia::FillRule::Winding, true, Transform::identity());
            }
        }
        // A degenerate rectangle clips everything away (mask stays empty).
        self.intersect_clip(mask);
    }

    fn clip_current_path(&mut self, preserve: bool) {
        if let Some(path) = self.finished_path() {
            if let Some(mut mask) = Mask::new(self.pixmap.width(), self.pixmap.height()) {
                mask.fill_path(&path, tiny_skia::FillRule::Winding, true, Transform::identity());
                self.intersect_clip(mask);
            }
        }
        if !preserve {
            self.drop_path();
        }
    }

    fn fill_current_path(&mut self, preserve: bool) {
        if let Some(path) = self.finished_path() {
            let (paint, clip) = {
                let state = self.state();
                (Self::solid_paint(state), state.clip.clone())
            };
            self.pixmap.fill_path(
                &path,
                &paint,
                tiny_skia::FillRule::Winding,
                Transform::identity(),
                clip.as_deref(),
            );
        }
        if !preserve {
            self.drop_path();
        }
    }

    fn stroke_current_path(&mut self, preserve: bool) {
        if let Some(path) = self.finished_path() {
            let state = self.state();
            if state.line_width > 0.0 {
                let stroke = tiny_skia::Stroke {
                    width: state.line_width as f32,
                    miter_limit: state.miter_limit as f32,
                    line_cap: state.cap.into(),
                    line_join: state.join.into(),
                    dash: if state.dashes.is_empty() {
                        None
                    } else {
                        let segments: Vec<f32> = state.dashes.iter().map(|d| *d as f32).collect();
                        tiny_skia::StrokeDash::new(segments, state.dash_offset as f32)
                    },
                };
                let (paint, clip) = (Self::solid_paint(state), state.clip.clone());
                self.pixmap
                    .stroke_path(&path, &paint, &stroke, Transform::identity(), clip.as_deref());
            }
        }
        if !preserve {
            self.drop_path();
        }
    }

    fn paint_tiled(&mut self, tile: &Stamp) {
        let (anti_alias, clip) = {
            let state = self.state();
            (state.antialias != AntialiasMode::None, state.clip.clone())
        };
        let paint = Paint {
            shader: tiny_skia::Pattern::new(
                tile.pixmap.as_ref(),
                tiny_skia::SpreadMode::Repeat,
                tiny_skia::FilterQuality::Nearest,
                1.0,
                Transform::identity(),
            ),
            anti_alias,
            ..Paint::default()
        };
        let mut pb = PathBuilder::new();
        if let Some(rect) = tiny_skia::Rect::from_xywh(
            0.0,
            0.0,
            self.pixmap.width() as f32,
            self.pixmap.height() as f32,
        ) {
            pb.push_rect(rect);
        }
        if let Some(path) = pb.finish() {
            self.pixmap.fill_path(
                &path,
                &paint,
                tiny_skia::FillRule::Winding,
                Transform::identity(),
                clip.as_deref(),
            );
        }
    }

    fn fill_extents(&self) -> Option<Rect> {
        let path = self.finished_path()?;
        let b = path.bounds();
        Some(Rect::from_xywh(
            b.x() as f64,
            b.y() as f64,
            b.width() as f64,
            b.height() as f64,
        ))
    }

    fn stroke_extents(&self) -> Option<Rect> {
        let half = self.state().line_width / 2.0;
        self.fill_extents().map(|r| r.expand(half))
    }

    fn composite_stamp(&mut self, stamp: &Stamp, x: i32, y: i32) {
        let clip = self.state().clip.clone();
        let paint = PixmapPaint {
            opacity: 1.0,
            blend_mode: tiny_skia::BlendMode::SourceOver,
            quality: tiny_skia::FilterQuality::Nearest,
        };
        self.pixmap.draw_pixmap(
            0,
            0,
            stamp.pixmap.as_ref(),
            &paint,
            Transform::from_translate(x as f32, y as f32),
            clip.as_deref(),
        );
    }

    fn composite_alpha_stamp(&mut self, stamp: &AlphaStamp, x: i32, y: i32) {
        let source = self.state().source;
        let mut data = Vec::with_capacity(stamp.coverage.len() * 4);
        for &cov in &stamp.coverage {
            let alpha = cov as f64 / 255.0 * source.a.clamp(0.0, 1.0);
            let to_byte = |c: f64| (c.clamp(0.0, 1.0) * alpha * 255.0).round() as u8;
            data.push(to_byte(source.r));
            data.push(to_byte(source.g));
            data.push(to_byte(source.b));
            data.push((alpha * 255.0).round() as u8);
        }
        let size = match tiny_skia::IntSize::from_wh(stamp.width, stamp.height) {
            Some(size) => size,
            None => return,
        };
        let Some(pixmap) = Pixmap::from_vec(data, size) else {
            return;
        };
        let clip = self.state().clip.clone();
        let paint = PixmapPaint {
            opacity: 1.0,
            blend_mode: tiny_skia::BlendMode::SourceOver,
            quality: tiny_skia::FilterQuality::Nearest,
        };
        self.pixmap.draw_pixmap(
            0,
            0,
            pixmap.as_ref(),
            &paint,
            Transform::from_translate(x as f32, y as f32),
            clip.as_deref(),
        );
    }

    fn composite_image(&mut self, data: &[u8], width: u32, height: u32, x: f64, y: f64) {
        let Some(image) = PixmapRef::from_bytes(data, width, height) else {
            return;
        };
        let clip = self.state().clip.clone();
        let paint = PixmapPaint {
            opacity: 1.0,
            blend_mode: tiny_skia::BlendMode::SourceOver,
            quality: tiny_skia::FilterQuality::Bilinear,
        };
        self.pixmap.draw_pixmap(
            0,
            0,
            image,
            &paint,
            Transform::from_translate(x as f32, y as f32),
            clip.as_deref(),
        );
    }

    fn draw_mesh_gradient(&mut self, triangles: &[MeshTriangle]) {
        let width = self.pixmap.width() as i32;
        let height = self.pixmap.height() as i32;
        let clip = self.state().clip.clone();
        let data = self.pixmap.data_mut();

        for tri in triangles {
            let [p0, p1, p2] = tri.points;
            let area = (p1[0] - p0[0]) * (p2[1] - p0[1]) - (p2[0] - p0[0]) * (p1[1] - p0[1]);
            if area == 0.0 {
                continue;
            }
            let xs = [p0[0], p1[0], p2[0]];
            let ys = [p0[1], p1[1], p2[1]];
            let x_min = (xs.iter().cloned().fold(f64::INFINITY, f64::min).floor() as i32).max(0);
            let x_max = (xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max).ceil() as i32)
                .min(width - 1);
            let y_min = (ys.iter().cloned().fold(f64::INFINITY, f64::min).floor() as i32).max(0);
            let y_max = (ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max).ceil() as i32)
                .min(height - 1);

            for py in y_min..=y_max {
                for px in x_min..=x_max {
                    let cx = px as f64 + 0.5;
                    let cy = py as f64 + 0.5;
                    let w0 = ((p1[0] - cx) * (p2[1] - cy) - (p2[0] - cx) * (p1[1] - cy)) / area;
                    let w1 = ((p2[0] - cx) * (p0[1] - cy) - (p0[0] - cx) * (p2[1] - cy)) / area;
                    let w2 = 1.0 - w0 - w1;
                    if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                        continue;
                    }
                    let weights = [w0, w1, w2];
                    let mut rgba = [0.0f64; 4];
                    for (w, c) in weights.iter().zip(tri.colors.iter()) {
                        rgba[0] += w * c.r;
                        rgba[1] += w * c.g;
                        rgba[2] += w * c.b;
                        rgba[3] += w * c.a;
                    }
                    let mut coverage = 1.0;
                    if let Some(mask) = &clip {
                        coverage =
                            mask.data()[(py as u32 * width as u32 + px as u32) as usize] as f64
                                / 255.0;
                        if coverage == 0.0 {
                            continue;
                        }
                    }
                    let alpha = rgba[3].clamp(0.0, 1.0) * coverage;
                    let src = [
                        rgba[0].clamp(0.0, 1.0) * alpha,
                        rgba[1].clamp(0.0, 1.0) * alpha,
                        rgba[2].clamp(0.0, 1.0) * alpha,
                        alpha,
                    ];
                    let idx = ((py * width + px) * 4) as usize;
                    Self::blend_pixel(data, idx, src);
                }
            }
        }
    }

    fn new_stamp_surface(&self, width: u32, height: u32) -> Option<RasterDevice> {
        RasterDevice::new(width.max(1), height.max(1)).ok()
    }

    fn image_data(&self) -> Option<&[u8]> {
        Some(self.pixmap.data())
    }

    fn image_data_mut(&mut self) -> Option<&mut [u8]> {
        Some(self.pixmap.data_mut())
    }

    fn stride(&self) -> Option<usize> {
        Some(self.pixmap.width() as usize * 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_square(device: &mut RasterDevice, x: f64, y: f64, size: f64) {
        device.move_to(x, y);
        device.line_to(x + size, y);
        device.line_to(x + size, y + size);
        device.line_to(x, y + size);
        device.close_path();
        device.fill_current_path(false);
    }

    fn pixel(device: &RasterDevice, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * device.width() + x) * 4) as usize;
        let data = device.image_data().unwrap();
        [data[idx], data[idx + 1], data[idx + 2], data[idx + 3]]
    }

    #[test]
    fn test_fill_respects_clip_rect() {
        let mut device = RasterDevice::new(40, 40).unwrap();
        device.save();
        device.clip_rect(Rect::from_xywh(0.0, 0.0, 20.0, 40.0));
        device.set_source_rgba(Rgba::new(1.0, 0.0, 0.0, 1.0));
        filled_square(&mut device, 0.0, 0.0, 40.0);
        device.restore();

        assert_eq!(pixel(&device, 10, 10)[3], 255);
        assert_eq!(pixel(&device, 30, 10)[3], 0);
    }

    #[test]
    fn test_clip_intersection_shrinks() {
        let mut device = RasterDevice::new(40, 40).unwrap();
        device.clip_rect(Rect::from_xywh(0.0, 0.0, 20.0, 40.0));
        device.clip_rect(Rect::from_xywh(0.0, 0.0, 40.0, 20.0));
        device.set_source_rgba(Rgba::new(0.0, 0.0, 1.0, 1.0));
        filled_square(&mut device, 0.0, 0.0, 40.0);

        // Only the 20x20 intersection survives.
        assert_eq!(pixel(&device, 10, 10)[3], 255);
        assert_eq!(pixel(&device, 10, 30)[3], 0);
        assert_eq!(pixel(&device, 30, 10)[3], 0);
    }

    #[test]
    fn test_restore_pops_clip() {
        let mut device = RasterDevice::new(40, 40).unwrap();
        device.save();
        device.clip_rect(Rect::from_xywh(0.0, 0.0, 1.0, 1.0));
        device.restore();
        device.set_source_rgba(Rgba::new(0.0, 1.0, 0.0, 1.0));
        filled_square(&mut device, 0.0, 0.0, 40.0);
        assert_eq!(pixel(&device, 30, 30)[3], 255);
    }

    #[test]
    fn test_stroke_extents_grow_with_line_width() {
        let mut device = RasterDevice::new(40, 40).unwrap();
        device.move_to(10.0, 10.0);
        device.line_to(20.0, 10.0);
        device.set_line_width(4.0);
        let fill = device.fill_extents().unwrap();
        let stroke = device.stroke_extents().unwrap();
        assert_eq!(fill.height, 0.0);
        assert_eq!(stroke.height, 4.0);
        assert_eq!(stroke.x, 8.0);
    }

    #[test]
    fn test_alpha_stamp_tinted_by_source() {
        let mut scratch = RasterDevice::new(4, 4).unwrap();
        scratch.set_source_rgba(Rgba::new(1.0, 1.0, 1.0, 1.0));
        filled_square(&mut scratch, 0.0, 0.0, 4.0);
        let stamp = scratch.alpha_snapshot();

        let mut device = RasterDevice::new(8, 8).unwrap();
        device.set_source_rgba(Rgba::new(0.0, 0.0, 1.0, 1.0));
        device.composite_alpha_stamp(&stamp, 2, 2);
        assert_eq!(pixel(&device, 3, 3), [0, 0, 255, 255]);
        assert_eq!(pixel(&device, 0, 0)[3], 0);
    }

    #[test]
    fn test_mesh_gradient_interpolates() {
        let mut device = RasterDevice::new(20, 20).unwrap();
        let tri = MeshTriangle {
            points: [[0.0, 0.0], [20.0, 0.0], [0.0, 20.0]],
            colors: [
                Rgba::new(1.0, 0.0, 0.0, 1.0),
                Rgba::new(1.0, 0.0, 0.0, 1.0),
                Rgba::new(1.0, 0.0, 0.0, 1.0),
            ],
        };
        device.draw_mesh_gradient(&[tri]);
        let p = pixel(&device, 2, 2);
        assert_eq!(p[0], 255);
        assert_eq!(p[3], 255);
        // Outside the triangle's hypotenuse nothing is painted.
        assert_eq!(pixel(&device, 19, 19)[3], 0);
    }
}
