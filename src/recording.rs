//! A device that records the command stream instead of rasterizing it.
//!
//! Recording surfaces are vector-class: snapping and stamp simplification
//! stay disabled against them, which also makes the recorded stream a
//! faithful view of what the path loader emitted.

use crate::color::Rgba;
use crate::device::{
    AlphaStamp, AntialiasMode, CapStyle, DeviceContext, JoinStyle, MeshTriangle, Rect, Stamp,
};
use crate::raster::RasterDevice;

/// One recorded device command.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    NewPath,
    MoveTo(f64, f64),
    LineTo(f64, f64),
    CurveTo(f64, f64, f64, f64, f64, f64),
    ClosePath,
    NewSubpath,
    Save,
    Restore,
    SourceRgba(Rgba),
    LineWidth(f64),
    MiterLimit(f64),
    Cap(CapStyle),
    Join(JoinStyle),
    Dash(Vec<f64>, f64),
    Antialias(AntialiasMode),
    ClipRect(Rect),
    ClipPath { preserve: bool },
    Fill { preserve: bool },
    Stroke { preserve: bool },
    PaintTiled,
    Image { width: u32, height: u32, x: f64, y: f64 },
    MeshGradient { triangles: usize },
}

#[derive(Debug, Clone)]
struct RecordingState {
    source: Rgba,
    line_width: f64,
    cap: CapStyle,
    join: JoinStyle,
    dashes: Vec<f64>,
    dash_offset: f64,
    antialias: AntialiasMode,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self {
            source: Rgba::BLACK,
            line_width: 1.0,
            cap: CapStyle::Butt,
            join: JoinStyle::Miter,
            dashes: Vec::new(),
            dash_offset: 0.0,
            antialias: AntialiasMode::Good,
        }
    }
}

/// An ordered log of device commands.
#[derive(Debug)]
pub struct RecordingDevice {
    width: u32,
    height: u32,
    commands: Vec<DeviceCommand>,
    state_stack: Vec<RecordingState>,
    current_point: Option<(f64, f64)>,
}

impl RecordingDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
            state_stack: vec![RecordingState::default()],
            current_point: None,
        }
    }

    /// All commands recorded so far, in issue order.
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Only the path-construction commands, in issue order.
    pub fn path_commands(&self) -> Vec<&DeviceCommand> {
        self.commands
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    DeviceCommand::MoveTo(..)
                        | DeviceCommand::LineTo(..)
                        | DeviceCommand::CurveTo(..)
                        | DeviceCommand::ClosePath
                        | DeviceCommand::NewSubpath
                )
            })
            .collect()
    }

    fn state(&self) -> &RecordingState {
        self.state_stack.last().expect("recording state stack is never empty")
    }

    fn state_mut(&mut self) -> &mut RecordingState {
        self.state_stack.last_mut().expect("recording state stack is never empty")
    }
}

impl DeviceContext for RecordingDevice {
    fn is_raster(&self) -> bool {
        false
    }

    fn is_vector(&self) -> bool {
        true
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn new_path(&mut self) {
        self.commands.push(DeviceCommand::NewPath);
        self.current_point = None;
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.commands.push(DeviceCommand::MoveTo(x, y));
        self.current_point = Some((x, y));
    }

    fn line_to(&mut self, x: f64, y: f64) {
        if self.current_point.is_none() {
            self.move_to(x, y);
            return;
        }
        self.commands.push(DeviceCommand::LineTo(x, y));
        self.current_point = Some((x, y));
    }

    fn curve_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) {
        if self.current_point.is_none() {
            self.commands.push(DeviceCommand::MoveTo(x1, y1));
        }
        self.commands
            .push(DeviceCommand::CurveTo(x1, y1, x2, y2, x3, y3));
        self.current_point = Some((x3, y3));
    }

    fn close_path(&mut self) {
        self.commands.push(DeviceCommand::ClosePath);
    }

    fn new_subpath(&mut self) {
        self.commands.push(DeviceCommand::NewSubpath);
        self.current_point = None;
    }

    fn current_point(&self) -> Option<(f64, f64)> {
        self.current_point
    }

    fn save(&mut self) {
        self.commands.push(DeviceCommand::Save);
        let top = self.state().clone();
        self.state_stack.push(top);
    }

    fn restore(&mut self) {
        self.commands.push(DeviceCommand::Restore);
        if self.state_stack.len() <= 1 {
            panic!("unbalanced device restore");
        }
        self.state_stack.pop();
    }

    fn stack_depth(&self) -> usize {
        self.state_stack.len()
    }

    fn set_source_rgba(&mut self, color: Rgba) {
        self.commands.push(DeviceCommand::SourceRgba(color));
        self.state_mut().source = color;
    }

    fn source_rgba(&self) -> Rgba {
        self.state().source
    }

    fn set_line_width(&mut self, width: f64) {
        self.commands.push(DeviceCommand::LineWidth(width));
        self.state_mut().line_width = width;
    }

    fn line_width(&self) -> f64 {
        self.state().line_width
    }

    fn set_miter_limit(&mut self, limit: f64) {
        self.commands.push(DeviceCommand::MiterLimit(limit));
    }

    fn set_cap_style(&mut self, cap: CapStyle) {
        self.commands.push(DeviceCommand::Cap(cap));
        self.state_mut().cap = cap;
    }

    fn cap_style(&self) -> CapStyle {
        self.state().cap
    }

    fn set_join_style(&mut self, join: JoinStyle) {
        self.commands.push(DeviceCommand::Join(join));
        self.state_mut().join = join;
    }

    fn join_style(&self) -> JoinStyle {
        self.state().join
    }

    fn set_dash(&mut self, dashes: &[f64], offset: f64) {
        self.commands
            .push(DeviceCommand::Dash(dashes.to_vec(), offset));
        let state = self.state_mut();
        state.dashes = dashes.to_vec();
        state.dash_offset = offset;
    }

    fn dash(&self) -> (Vec<f64>, f64) {
        let state = self.state();
        (state.dashes.clone(), state.dash_offset)
    }

    fn set_antialias(&mut self, mode: AntialiasMode) {
        self.commands.push(DeviceCommand::Antialias(mode));
        self.state_mut().antialias = mode;
    }

    fn antialias(&self) -> AntialiasMode {
        self.state().antialias
    }

    fn clip_rect(&mut self, rect: Rect) {
        self.commands.push(DeviceCommand::ClipRect(rect));
    }

    fn clip_current_path(&mut self, preserve: bool) {
        self.commands.push(DeviceCommand::ClipPath { preserve });
        if !preserve {
            self.current_point = None;
        }
    }

    fn fill_current_path(&mut self, preserve: bool) {
        self.commands.push(DeviceCommand::Fill { preserve });
        if !preserve {
            self.current_point = None;
        }
    }

    fn stroke_current_path(&mut self, preserve: bool) {
        self.commands.push(DeviceCommand::Stroke { preserve });
        if !preserve {
            self.current_point = None;
        }
    }

    fn paint_tiled(&mut self, _tile: &Stamp) {
        self.commands.push(DeviceCommand::PaintTiled);
    }

    fn fill_extents(&self) -> Option<Rect> {
        None
    }

    fn stroke_extents(&self) -> Option<Rect> {
        None
    }

    fn composite_stamp(&mut self, _stamp: &Stamp, _x: i32, _y: i32) {}

    fn composite_alpha_stamp(&mut self, _stamp: &AlphaStamp, _x: i32, _y: i32) {}

    fn composite_image(&mut self, _data: &[u8], width: u32, height: u32, x: f64, y: f64) {
        self.commands.push(DeviceCommand::Image {
            width,
            height,
            x,
            y,
        });
    }

    fn draw_mesh_gradient(&mut self, triangles: &[MeshTriangle]) {
        self.commands.push(DeviceCommand::MeshGradient {
            triangles: triangles.len(),
        });
    }

    fn new_stamp_surface(&self, _width: u32, _height: u32) -> Option<RasterDevice> {
        None
    }

    fn image_data(&self) -> Option<&[u8]> {
        None
    }

    fn image_data_mut(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn stride(&self) -> Option<usize> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_to_without_current_point_moves() {
        let mut device = RecordingDevice::new(10, 10);
        device.line_to(3.0, 4.0);
        assert_eq!(device.commands(), &[DeviceCommand::MoveTo(3.0, 4.0)]);
    }

    #[test]
    fn test_new_subpath_clears_current_point() {
        let mut device = RecordingDevice::new(10, 10);
        device.move_to(1.0, 1.0);
        device.new_subpath();
        assert_eq!(device.current_point(), None);
    }

    #[test]
    fn test_save_restore_state() {
        let mut device = RecordingDevice::new(10, 10);
        device.set_line_width(3.0);
        device.save();
        device.set_line_width(7.0);
        assert_eq!(device.line_width(), 7.0);
        device.restore();
        assert_eq!(device.line_width(), 3.0);
    }

    #[test]
    #[should_panic(expected = "unbalanced device restore")]
    fn test_unbalanced_restore_panics() {
        let mut device = RecordingDevice::new(10, 10);
        device.restore();
    }
}
