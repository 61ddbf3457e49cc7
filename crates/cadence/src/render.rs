//! Render-frame boundary.
//!
//! The core does not draw. During the render phase each renderer receives a
//! submission handle and pushes type-erased drawables, optionally to a named
//! layer; the application driver drains the frame afterwards and hands the
//! drawables to whatever backend it uses. Layer transforms, viewports, and
//! concrete shapes live entirely on the driver's side.

use crate::system::AsAny;

/// Marker for anything a renderer can submit to the frame.
///
/// The core never interprets drawables; implement this for your shape or
/// draw-command types and downcast on the driver side via [`AsAny`].
pub trait Drawable: AsAny + 'static {}

/// Name of the layer used by [`RenderFrame::submit`].
pub const DEFAULT_LAYER: &str = "world";

/// One tick's worth of submitted drawables, grouped into named layers.
///
/// Layers keep their first-submission order, and drawables within a layer
/// keep submission order. Cleared by the driver at the start of every tick.
#[derive(Default)]
pub struct RenderFrame {
    layers: Vec<(String, Vec<Box<dyn Drawable>>)>,
}

impl RenderFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a drawable to the default layer.
    pub fn submit(&mut self, drawable: impl Drawable) {
        self.submit_to(DEFAULT_LAYER, drawable);
    }

    /// Submit a drawable to a named layer, creating the layer on first use.
    pub fn submit_to(&mut self, layer: &str, drawable: impl Drawable) {
        self.submit_boxed(layer, Box::new(drawable));
    }

    /// Submit an already-boxed drawable to a named layer.
    pub fn submit_boxed(&mut self, layer: &str, drawable: Box<dyn Drawable>) {
        match self.layers.iter_mut().find(|(name, _)| name == layer) {
            Some((_, drawables)) => drawables.push(drawable),
            None => self.layers.push((layer.to_string(), vec![drawable])),
        }
    }

    /// Drawables submitted to a layer this tick, submission order. Empty if
    /// the layer received nothing.
    pub fn layer(&self, name: &str) -> &[Box<dyn Drawable>] {
        self.layers
            .iter()
            .find(|(layer, _)| layer == name)
            .map(|(_, drawables)| drawables.as_slice())
            .unwrap_or(&[])
    }

    /// Layers in first-submission order.
    pub fn layers(&self) -> impl Iterator<Item = (&str, &[Box<dyn Drawable>])> {
        self.layers
            .iter()
            .map(|(name, drawables)| (name.as_str(), drawables.as_slice()))
    }

    /// Total number of drawables across all layers.
    pub fn len(&self) -> usize {
        self.layers.iter().map(|(_, d)| d.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take everything out of the frame, leaving it empty.
    pub fn drain(&mut self) -> Vec<(String, Vec<Box<dyn Drawable>>)> {
        std::mem::take(&mut self.layers)
    }

    /// Discard all submitted drawables.
    pub fn clear(&mut self) {
        self.layers.clear();
    }
}
