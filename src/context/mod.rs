//! The rendering context: owns one device context and one graphics-state
//! stack, orchestrates the draw entry points, and performs unit
//! conversion.

mod draw;
mod region;

pub use draw::{Dashes, OffsetPosition, PathCollectionParams, QuadMeshParams};
pub use region::Region;

use crate::color::{resolve_color, Rgba};
use crate::config::RenderConfig;
use crate::device::{AntialiasMode, CapStyle, DeviceContext, JoinStyle, Rect};
use crate::error::{RenderError, RenderResult};
use crate::path::Path;
use crate::path_loader::load_path;
use crate::raster::RasterDevice;
use crate::state::{Antialias, ClipPath, GraphicsState, GraphicsStateStack, SketchParams};
use crate::transform::{Affine2D, TransformSource};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Boolean antialiasing picks the best mode below this line width and the
/// fast mode above it.
const THIN_LINE_AA_THRESHOLD: f64 = 1.0 / 3.0;

/// Global counter for context identities.
static CONTEXT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A caller-held graphics-state handle. Draw entry points reject handles
/// issued by a different context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcHandle {
    context_id: u64,
}

/// The rendering context.
pub struct RenderingContext {
    id: u64,
    pub(crate) device: Box<dyn DeviceContext>,
    pub(crate) states: GraphicsStateStack,
    pub(crate) width: u32,
    pub(crate) height: u32,
    dpi: f64,
    pub(crate) config: RenderConfig,
}

impl RenderingContext {
    /// Create a context over an existing device.
    pub fn new(
        mut device: Box<dyn DeviceContext>,
        dpi: f64,
        config: RenderConfig,
    ) -> RenderResult<Self> {
        // Collections and text path effects rely on defaulting to a
        // round join; caps default to butt.
        device.set_join_style(JoinStyle::Round);
        device.set_cap_style(CapStyle::Butt);
        let hatch_color = resolve_color(&config.hatch_color, None)?;
        let width = device.width();
        let height = device.height();
        let initial = GraphicsState::initial(hatch_color, config.hatch_linewidth, config.snap);
        Ok(Self {
            id: CONTEXT_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            device,
            states: GraphicsStateStack::new(initial),
            width,
            height,
            dpi,
            config,
        })
    }

    /// Create a context over a fresh raster device.
    pub fn new_raster(
        width: u32,
        height: u32,
        dpi: f64,
        config: RenderConfig,
    ) -> RenderResult<Self> {
        Self::new(Box::new(RasterDevice::new(width, height)?), dpi, config)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dpi(&self) -> f64 {
        self.dpi
    }

    pub fn device(&self) -> &dyn DeviceContext {
        self.device.as_ref()
    }

    /// The graphics-state handle for this context.
    pub fn gc(&self) -> GcHandle {
        GcHandle {
            context_id: self.id,
        }
    }

    pub(crate) fn check_gc(&self, gc: &GcHandle) -> RenderResult<()> {
        if gc.context_id != self.id {
            return Err(RenderError::InvalidArgument(
                "non-matching graphics context".to_string(),
            ));
        }
        Ok(())
    }

    /// Copying state between independent contexts is unsupported; only
    /// the degenerate self-copy is accepted.
    pub fn copy_properties(&self, target: &GcHandle, source: &GcHandle) -> RenderResult<()> {
        if target.context_id != self.id || source.context_id != self.id {
            return Err(RenderError::InvalidArgument(
                "independent contexts cannot be copied".to_string(),
            ));
        }
        Ok(())
    }

    // --- State stack ---

    /// Duplicate the top graphics state and issue a device-level save.
    pub fn push_state(&mut self) {
        self.states.push();
        self.device.save();
    }

    /// Discard the top graphics state and issue a device-level restore.
    /// Panics on an unbalanced pop (programming error).
    pub fn pop_state(&mut self) {
        self.states.pop();
        self.device.restore();
    }

    pub fn state(&self) -> &GraphicsState {
        self.states.top()
    }

    pub fn state_depth(&self) -> usize {
        self.states.depth()
    }

    // --- Unit conversion ---

    pub fn points_to_pixels(&self, points: f64) -> f64 {
        points * self.dpi / 72.0
    }

    pub fn pixels_to_points(&self, pixels: f64) -> f64 {
        pixels / (self.dpi / 72.0)
    }

    // --- Style setters ---

    pub fn set_alpha(&mut self, alpha: Option<f64>) {
        self.states.top_mut().alpha = alpha;
    }

    pub fn set_antialiased(&mut self, antialias: Antialias) {
        self.states.top_mut().antialias = antialias;
    }

    pub fn set_capstyle(&mut self, capstyle: &str) -> RenderResult<()> {
        let cap = CapStyle::from_name(capstyle)?;
        self.device.set_cap_style(cap);
        Ok(())
    }

    pub fn set_joinstyle(&mut self, joinstyle: &str) -> RenderResult<()> {
        let join = JoinStyle::from_name(joinstyle)?;
        self.device.set_join_style(join);
        Ok(())
    }

    /// Set the line width, in points. The miter limit follows the line
    /// width (Agg parity).
    pub fn set_linewidth(&mut self, width: f64) {
        let width = self.points_to_pixels(width);
        self.device.set_line_width(width);
        self.device.set_miter_limit(width);
    }

    /// The current line width, in points.
    pub fn get_linewidth(&self) -> f64 {
        self.pixels_to_points(self.device.line_width())
    }

    /// Set the dash pattern, in points. A dash list without an offset is
    /// an invalid argument.
    pub fn set_dashes(&mut self, offset: Option<f64>, dash_list: Option<&[f64]>) -> RenderResult<()> {
        match dash_list {
            Some(dash_list) => {
                let offset = offset.ok_or_else(|| {
                    RenderError::InvalidArgument("missing dash offset".to_string())
                })?;
                let segments: Vec<f64> = dash_list
                    .iter()
                    .map(|d| self.points_to_pixels(*d))
                    .collect();
                let offset = self.points_to_pixels(offset);
                self.device.set_dash(&segments, offset);
            }
            None => self.device.set_dash(&[], 0.0),
        }
        Ok(())
    }

    /// Resolve a color specification and set it as the source, applying
    /// the alpha override if one is set.
    pub fn set_foreground(&mut self, spec: &str) -> RenderResult<()> {
        let color = resolve_color(spec, None)?;
        self.set_foreground_rgba(color);
        Ok(())
    }

    pub fn set_foreground_rgba(&mut self, color: Rgba) {
        let color = color.with_alpha_override(self.states.top().alpha);
        self.device.set_source_rgba(color);
    }

    /// The current source color with the alpha override applied.
    pub fn get_rgba(&self) -> Rgba {
        self.device
            .source_rgba()
            .with_alpha_override(self.states.top().alpha)
    }

    pub fn set_hatch(&mut self, hatch: Option<String>) {
        self.states.top_mut().hatch = hatch;
    }

    pub fn get_hatch(&self) -> Option<&str> {
        self.states.top().hatch.as_deref()
    }

    pub fn set_hatch_color(&mut self, spec: &str) -> RenderResult<()> {
        self.states.top_mut().hatch_color = resolve_color(spec, None)?;
        Ok(())
    }

    pub fn set_hatch_color_rgba(&mut self, color: Rgba) {
        self.states.top_mut().hatch_color = color;
    }

    /// Set the hatch line width, in points.
    pub fn set_hatch_linewidth(&mut self, width: f64) {
        self.states.top_mut().hatch_linewidth = width;
    }

    /// None ("snap if only vertical or horizontal lines") is treated as
    /// enabled.
    pub fn set_snap(&mut self, snap: Option<bool>) {
        self.states.top_mut().snap = snap.unwrap_or(true);
    }

    pub fn set_sketch(&mut self, sketch: Option<SketchParams>) {
        self.states.top_mut().sketch = sketch;
    }

    /// Set a pending clip rectangle, in path space (origin bottom-left).
    pub fn set_clip_rectangle(&mut self, rectangle: Option<Rect>) {
        self.states.top_mut().clip_rectangle = rectangle;
    }

    /// Set a pending clip path with the transform to apply it under.
    pub fn set_clip_path(
        &mut self,
        path: Option<(Arc<Path>, TransformSource)>,
    ) -> RenderResult<()> {
        self.states.top_mut().clip_path = match path {
            Some((path, transform)) => {
                let transform = Affine2D::for_device(&transform, self.height as f64)?;
                Some(ClipPath { path, transform })
            }
            None => None,
        };
        Ok(())
    }

    // --- Scoped draw context ---

    /// Run a draw operation inside one device save/restore scope with
    /// the pending state applied. Exactly one matching restore is issued
    /// on every exit path, including error returns.
    pub(crate) fn with_draw_scope<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> RenderResult<R>,
    ) -> RenderResult<R> {
        self.device.save();
        if let Err(err) = self.apply_pending_state() {
            self.device.restore();
            return Err(err);
        }
        let result = f(self);
        self.device.restore();
        result
    }

    fn apply_pending_state(&mut self) -> RenderResult<()> {
        // Re-resolve the source color, forcing the alpha override if set.
        // This cannot be done earlier: the override must be revocable.
        let color = self
            .device
            .source_rgba()
            .with_alpha_override(self.states.top().alpha);
        self.device.set_source_rgba(color);

        let mode = match self.states.top().antialias {
            Antialias::Mode(mode) => mode,
            Antialias::Bool(false) => AntialiasMode::None,
            Antialias::Bool(true) => {
                if self.device.line_width() < THIN_LINE_AA_THRESHOLD {
                    AntialiasMode::Best
                } else {
                    AntialiasMode::Fast
                }
            }
        };
        self.device.set_antialias(mode);

        // Clips cannot be applied earlier either: they must be
        // revocable until the draw actually happens.
        if let Some(rect) = self.states.top().clip_rectangle {
            let device_rect = Rect::from_xywh(
                rect.x,
                self.height as f64 - rect.height - rect.y,
                rect.width,
                rect.height,
            );
            self.device.clip_rect(device_rect);
        }
        let clip_path = self.states.top().clip_path.clone();
        if let Some(clip) = clip_path {
            self.device.save();
            let loaded = load_path(
                self.device.as_mut(),
                &clip.path,
                &clip.transform,
                false,
                None,
            );
            self.device.restore();
            loaded?;
            self.device.clip_current_path(false);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingDevice;

    fn recording_context() -> RenderingContext {
        RenderingContext::new(
            Box::new(RecordingDevice::new(80, 60)),
            72.0,
            RenderConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_handles_are_context_specific() {
        let a = recording_context();
        let b = recording_context();
        assert!(a.check_gc(&a.gc()).is_ok());
        assert!(matches!(
            a.check_gc(&b.gc()),
            Err(RenderError::InvalidArgument(_))
        ));
        assert!(a.copy_properties(&a.gc(), &a.gc()).is_ok());
        assert!(a.copy_properties(&a.gc(), &b.gc()).is_err());
    }

    #[test]
    fn test_push_pop_keeps_device_in_lockstep() {
        let mut ctx = recording_context();
        let device_depth = ctx.device().stack_depth();
        assert_eq!(ctx.state_depth(), device_depth);
        ctx.push_state();
        assert_eq!(ctx.state_depth(), 2);
        assert_eq!(ctx.device().stack_depth(), device_depth + 1);
        ctx.pop_state();
        assert_eq!(ctx.state_depth(), 1);
        assert_eq!(ctx.device().stack_depth(), device_depth);
    }

    #[test]
    fn test_unit_conversion_round_trip() {
        let ctx = RenderingContext::new(
            Box::new(RecordingDevice::new(80, 60)),
            180.0,
            RenderConfig::default(),
        )
        .unwrap();
        assert_eq!(ctx.points_to_pixels(72.0), 180.0);
        assert_eq!(ctx.pixels_to_points(ctx.points_to_pixels(3.5)), 3.5);
    }

    #[test]
    fn test_linewidth_sets_miter_limit() {
        let mut ctx = recording_context();
        ctx.set_linewidth(4.0);
        assert_eq!(ctx.get_linewidth(), 4.0);
        // At 72 dpi, points map 1:1 onto pixels.
        assert_eq!(ctx.device().line_width(), 4.0);
    }

    #[test]
    fn test_dash_list_requires_offset() {
        let mut ctx = recording_context();
        assert!(matches!(
            ctx.set_dashes(None, Some(&[4.0, 2.0])),
            Err(RenderError::InvalidArgument(_))
        ));
        assert!(ctx.set_dashes(Some(0.0), Some(&[4.0, 2.0])).is_ok());
        assert!(ctx.set_dashes(None, None).is_ok());
    }

    #[test]
    fn test_unknown_style_names_rejected() {
        let mut ctx = recording_context();
        assert!(ctx.set_capstyle("projecting").is_ok());
        assert!(ctx.set_capstyle("pointy").is_err());
        assert!(ctx.set_joinstyle("bevel").is_ok());
        assert!(ctx.set_joinstyle("sharp").is_err());
    }

    #[test]
    fn test_alpha_override_applies_to_foreground() {
        let mut ctx = recording_context();
        ctx.set_alpha(Some(0.5));
        ctx.set_foreground("red").unwrap();
        assert_eq!(ctx.get_rgba(), Rgba::new(1.0, 0.0, 0.0, 0.5));
        // Revoking the override restores the color's own alpha.
        ctx.set_alpha(None);
        ctx.set_foreground("red").unwrap();
        assert_eq!(ctx.get_rgba(), Rgba::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_draw_scope_is_balanced_on_error() {
        let mut ctx = recording_context();
        let before = ctx.device().stack_depth();
        let result: RenderResult<()> = ctx.with_draw_scope(|_| {
            Err(RenderError::InvalidArgument("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(ctx.device().stack_depth(), before);
    }

    #[test]
    fn test_draw_scope_resolves_antialias_from_line_width() {
        let mut ctx = recording_context();
        ctx.set_linewidth(0.2);
        ctx.with_draw_scope(|ctx| {
            assert_eq!(ctx.device.antialias(), AntialiasMode::Best);
            Ok(())
        })
        .unwrap();
        ctx.set_linewidth(2.0);
        ctx.with_draw_scope(|ctx| {
            assert_eq!(ctx.device.antialias(), AntialiasMode::Fast);
            Ok(())
        })
        .unwrap();
        ctx.set_antialiased(Antialias::Bool(false));
        ctx.with_draw_scope(|ctx| {
            assert_eq!(ctx.device.antialias(), AntialiasMode::None);
            Ok(())
        })
        .unwrap();
    }
}
