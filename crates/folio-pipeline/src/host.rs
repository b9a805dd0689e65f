//! The DOM seen by the capture pipeline.
//!
//! [`CaptureHost`] is the narrow set of document operations the
//! preparator and restoration guard need. `folio-io` implements it on
//! top of `web_sys`; the `testing` feature provides an in-memory fake.

use crate::types::{Dimensions, HostError};

/// Inline style properties the pipeline reads or overrides.
pub mod style {
    /// `display`
    pub const DISPLAY: &str = "display";
    /// `position`
    pub const POSITION: &str = "position";
    /// `width`
    pub const WIDTH: &str = "width";
    /// `height`
    pub const HEIGHT: &str = "height";
    /// `max-width`
    pub const MAX_WIDTH: &str = "max-width";
    /// `overflow`
    pub const OVERFLOW: &str = "overflow";
    /// `animation`
    pub const ANIMATION: &str = "animation";
    /// `transition`
    pub const TRANSITION: &str = "transition";
    /// `filter`
    pub const FILTER: &str = "filter";
    /// `backdrop-filter`
    pub const BACKDROP_FILTER: &str = "backdrop-filter";

    /// Visual effects that are expensive or illegible when rasterized.
    pub const EFFECTS: [&str; 4] = [ANIMATION, TRANSITION, FILTER, BACKDROP_FILTER];
}

/// Document operations used during capture.
///
/// Nodes are cheap handles (`web_sys::Element` clones share the same
/// underlying object). An empty string stands for "no inline value":
/// setting a property to `""` removes it.
pub trait CaptureHost {
    /// Handle to an element.
    type Node: Clone + PartialEq;
    /// Handle to a temporary off-screen container.
    type Container;

    /// Whether `node` is attached to the live document.
    fn is_attached(&self, node: &Self::Node) -> bool;

    /// Descendants of `root` (excluding `root`) matching a CSS selector,
    /// in document order.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the selector is invalid.
    fn query_all(&self, root: &Self::Node, selector: &str) -> Result<Vec<Self::Node>, HostError>;

    /// Every element descendant of `root` (excluding `root`).
    fn descendants(&self, root: &Self::Node) -> Vec<Self::Node>;

    /// Full scrollable content size of `node` in CSS pixels.
    fn scroll_size(&self, node: &Self::Node) -> Dimensions;

    /// Current inline value of a style property (`""` when unset).
    fn inline_style(&self, node: &Self::Node, property: &str) -> String;

    /// Set (or with `""`, remove) an inline style property.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the element has no style declaration or
    /// the browser rejects the value.
    fn set_inline_style(
        &self,
        node: &Self::Node,
        property: &str,
        value: &str,
    ) -> Result<(), HostError>;

    /// Deep-clone `node`. The clone is not attached anywhere.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if cloning fails.
    fn deep_clone(&self, node: &Self::Node) -> Result<Self::Node, HostError>;

    /// Copy what has been drawn onto each canvas under `source` (the
    /// root included) onto the matching canvas under `clone`, pairing
    /// them in document order. A deep clone copies structure only, so
    /// chart pixels are lost without this. Returns the number copied.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the trees do not pair up or a drawing
    /// context is unavailable.
    fn copy_drawings(&self, source: &Self::Node, clone: &Self::Node) -> Result<usize, HostError>;

    /// Detach `node` from its parent.
    fn remove(&self, node: &Self::Node);

    /// Attach `node` inside a new container placed outside the visible
    /// viewport, sized to `size` CSS pixels.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the container cannot be created or
    /// attached.
    fn mount_offscreen(
        &self,
        node: &Self::Node,
        size: Dimensions,
    ) -> Result<Self::Container, HostError>;

    /// Remove a container created by [`mount_offscreen`](Self::mount_offscreen).
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if removal fails.
    fn unmount(&self, container: Self::Container) -> Result<(), HostError>;
}
