//! Graphics state that rides on top of the device state.
//!
//! The device keeps cap, join, width, dash, source, and clip; this layer
//! holds the attributes the device has no slot for. The stack must stay
//! in lockstep with the device's native save/restore stack at every
//! observable point, which the rendering context guarantees by pairing
//! the two through its push/pop entry points.

use crate::color::Rgba;
use crate::device::{AntialiasMode, Rect};
use crate::path::Path;
use crate::transform::Affine2D;
use std::sync::Arc;

/// Antialiasing request: a plain on/off that the draw scope resolves to a
/// concrete mode based on line width, or an explicit mode used verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Antialias {
    Bool(bool),
    Mode(AntialiasMode),
}

impl Default for Antialias {
    fn default() -> Self {
        Antialias::Bool(true)
    }
}

/// Parameters of the sketch (hand-drawn wobble) path effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SketchParams {
    /// Wobble amplitude, in pixels.
    pub scale: f64,
    /// Wobble wavelength along the line, in pixels.
    pub length: f64,
    /// Randomization factor for the wobble phase.
    pub randomness: f64,
}

/// A clip path captured with the transform that was active when it was
/// set.
#[derive(Debug, Clone)]
pub struct ClipPath {
    pub path: Arc<Path>,
    pub transform: Affine2D,
}

/// State carried per nesting level of the graphics-state stack.
#[derive(Debug, Clone)]
pub struct GraphicsState {
    /// Alpha override for the current source color; None keeps the
    /// color's own alpha.
    pub alpha: Option<f64>,
    pub antialias: Antialias,
    /// Pending clip rectangle, in path space (origin bottom-left).
    pub clip_rectangle: Option<Rect>,
    pub clip_path: Option<ClipPath>,
    /// Named hatch pattern, if hatching is active.
    pub hatch: Option<String>,
    pub hatch_color: Rgba,
    /// Hatch line width, in points.
    pub hatch_linewidth: f64,
    pub sketch: Option<SketchParams>,
    /// Whether pixel snapping is requested for this state.
    pub snap: bool,
}

impl GraphicsState {
    pub(crate) fn initial(hatch_color: Rgba, hatch_linewidth: f64, snap: bool) -> Self {
        Self {
            alpha: None,
            antialias: Antialias::default(),
            clip_rectangle: None,
            clip_path: None,
            hatch: None,
            hatch_color,
            hatch_linewidth,
            sketch: None,
            snap,
        }
    }
}

/// Nested, copy-on-push graphics state.
#[derive(Debug)]
pub struct GraphicsStateStack {
    states: Vec<GraphicsState>,
}

impl GraphicsStateStack {
    pub fn new(initial: GraphicsState) -> Self {
        Self {
            states: vec![initial],
        }
    }

    pub fn top(&self) -> &GraphicsState {
        self.states.last().expect("graphics state stack is never empty")
    }

    pub fn top_mut(&mut self) -> &mut GraphicsState {
        self.states
            .last_mut()
            .expect("graphics state stack is never empty")
    }

    /// Duplicate the top state.
    pub fn push(&mut self) {
        let top = self.top().clone();
        self.states.push(top);
    }

    /// Discard the top state. Popping the base state is a programming
    /// error and fails fatally.
    pub fn pop(&mut self) {
        if self.states.len() <= 1 {
            panic!("unbalanced graphics state pop");
        }
        self.states.pop();
    }

    pub fn depth(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> GraphicsStateStack {
        GraphicsStateStack::new(GraphicsState::initial(Rgba::BLACK, 1.0, true))
    }

    #[test]
    fn test_push_then_pop_is_value_identical() {
        let mut stack = stack();
        stack.top_mut().alpha = Some(0.25);
        stack.top_mut().hatch = Some("xx".to_string());
        stack.top_mut().snap = false;
        stack.top_mut().antialias = Antialias::Mode(AntialiasMode::Fast);

        stack.push();
        stack.pop();

        let top = stack.top();
        assert_eq!(top.alpha, Some(0.25));
        assert_eq!(top.hatch.as_deref(), Some("xx"));
        assert!(!top.snap);
        assert_eq!(top.antialias, Antialias::Mode(AntialiasMode::Fast));
        assert!(top.clip_rectangle.is_none());
        assert!(top.clip_path.is_none());
    }

    #[test]
    fn test_push_copies_and_pop_discards() {
        let mut stack = stack();
        stack.push();
        stack.top_mut().alpha = Some(0.5);
        assert_eq!(stack.depth(), 2);
        stack.pop();
        assert_eq!(stack.top().alpha, None);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    #[should_panic(expected = "unbalanced graphics state pop")]
    fn test_pop_base_state_panics() {
        stack().pop();
    }
}
