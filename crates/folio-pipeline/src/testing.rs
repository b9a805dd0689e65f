//! In-memory collaborators for exercising the pipeline without a browser.
//!
//! Enabled for this crate's unit tests and, through the `testing`
//! feature, for downstream integration tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use crate::document::{Document, DocumentEncoder, DocumentSink};
use crate::host::{style, CaptureHost};
use crate::raster::{RasterOutput, RasterRequest, Rasterizer};
use crate::readiness::{ChartProbe, Clock, Timer};
use crate::types::{Dimensions, HostError, RgbaImage};

// ───────────────────────── FakeHost ──────────────────────────────────

/// Handle to a node in a [`FakeHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Default)]
struct FakeNode {
    tag: String,
    classes: Vec<String>,
    id: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    styles: BTreeMap<String, String>,
    scroll: Dimensions,
    rejects_styles: bool,
    container: bool,
    /// What a script drew onto a `canvas`. Structural clones drop it.
    drawing: Option<String>,
}

/// A tiny element tree with inline styles and simple selectors.
///
/// Selectors support comma-separated compounds of a tag name, `.class`
/// and `#id`. Anything else is rejected as invalid. Mutations touching
/// attached nodes are counted so tests can assert the live page was
/// left alone.
#[derive(Debug)]
pub struct FakeHost {
    nodes: RefCell<Vec<FakeNode>>,
    body: NodeId,
    mutations: Cell<usize>,
    fail_clones: Cell<bool>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

/// One simple selector: optional tag plus required classes and id.
#[derive(Debug, Default)]
struct Compound {
    tag: Option<String>,
    classes: Vec<String>,
    id: Option<String>,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn parse_selector(selector: &str) -> Result<Vec<Compound>, HostError> {
    let invalid = || HostError::new(format!("'{selector}' is not a valid selector"));
    let mut compounds = Vec::new();
    for part in selector.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(invalid());
        }
        let mut compound = Compound::default();
        let mut rest = part;
        let tag_len = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
        if tag_len > 0 {
            compound.tag = Some(rest[..tag_len].to_ascii_lowercase());
            rest = &rest[tag_len..];
        }
        while let Some(marker) = rest.chars().next() {
            let body = &rest[marker.len_utf8()..];
            let len = body.find(|c: char| !is_ident_char(c)).unwrap_or(body.len());
            if len == 0 {
                return Err(invalid());
            }
            let name = body[..len].to_owned();
            match marker {
                '.' => compound.classes.push(name),
                '#' => compound.id = Some(name),
                _ => return Err(invalid()),
            }
            rest = &body[len..];
        }
        compounds.push(compound);
    }
    Ok(compounds)
}

impl FakeNode {
    fn from_descriptor(descriptor: &str) -> Self {
        let mut node = Self::default();
        let mut parts = descriptor.split('.');
        let head = parts.next().unwrap_or_default();
        match head.split_once('#') {
            Some((tag, id)) => {
                node.tag = tag.to_owned();
                node.id = Some(id.to_owned());
            }
            None => head.clone_into(&mut node.tag),
        }
        node.classes = parts.map(str::to_owned).collect();
        node
    }

    fn matches(&self, compound: &Compound) -> bool {
        compound
            .tag
            .as_ref()
            .is_none_or(|tag| tag.eq_ignore_ascii_case(&self.tag))
            && compound.classes.iter().all(|c| self.classes.contains(c))
            && compound
                .id
                .as_ref()
                .is_none_or(|id| self.id.as_ref() == Some(id))
    }
}

impl FakeHost {
    /// An empty document containing only `body`.
    #[must_use]
    pub fn new() -> Self {
        let body = FakeNode {
            tag: "body".to_owned(),
            ..FakeNode::default()
        };
        Self {
            nodes: RefCell::new(vec![body]),
            body: NodeId(0),
            mutations: Cell::new(0),
            fail_clones: Cell::new(false),
        }
    }

    /// The document body.
    #[must_use]
    pub const fn body(&self) -> NodeId {
        self.body
    }

    fn insert(&self, node: FakeNode) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId(nodes.len());
        if let Some(parent) = node.parent {
            nodes[parent.0].children.push(id);
        }
        nodes.push(node);
        id
    }

    /// Append a child described like `"div.card.wide"` or `"main#app"`.
    /// Setup only: not counted as a mutation.
    pub fn append(&self, parent: &NodeId, descriptor: &str) -> NodeId {
        self.insert(FakeNode {
            parent: Some(*parent),
            ..FakeNode::from_descriptor(descriptor)
        })
    }

    /// Create a node that is not attached to the document.
    pub fn detached(&self, descriptor: &str) -> NodeId {
        self.insert(FakeNode::from_descriptor(descriptor))
    }

    /// Set the scroll size reported for `node`.
    pub fn set_scroll_size(&self, node: &NodeId, size: Dimensions) {
        self.nodes.borrow_mut()[node.0].scroll = size;
    }

    /// Make every later style write to `node` fail.
    pub fn reject_styles(&self, node: &NodeId) {
        self.nodes.borrow_mut()[node.0].rejects_styles = true;
    }

    /// Draw `content` onto the canvas `node`.
    pub fn paint(&self, node: &NodeId, content: &str) {
        self.nodes.borrow_mut()[node.0].drawing = Some(content.to_owned());
    }

    /// What has been drawn onto `node`, if anything.
    #[must_use]
    pub fn drawing(&self, node: &NodeId) -> Option<String> {
        self.nodes.borrow()[node.0].drawing.clone()
    }

    /// Make every later [`CaptureHost::deep_clone`] fail.
    pub fn fail_clones(&self) {
        self.fail_clones.set(true);
    }

    /// Mutations made so far to attached nodes.
    #[must_use]
    pub fn live_mutations(&self) -> usize {
        self.mutations.get()
    }

    /// Off-screen containers currently attached.
    #[must_use]
    pub fn live_containers(&self) -> usize {
        let nodes = self.nodes.borrow();
        (0..nodes.len())
            .filter(|&i| nodes[i].container && Self::attached_in(&nodes, NodeId(i), self.body))
            .count()
    }

    /// Inline styles of `node` and every descendant.
    #[must_use]
    pub fn subtree_styles(&self, node: &NodeId) -> BTreeMap<NodeId, BTreeMap<String, String>> {
        let nodes = self.nodes.borrow();
        let mut out = BTreeMap::new();
        out.insert(*node, nodes[node.0].styles.clone());
        for id in Self::preorder(&nodes, *node) {
            out.insert(id, nodes[id.0].styles.clone());
        }
        out
    }

    fn attached_in(nodes: &[FakeNode], mut node: NodeId, body: NodeId) -> bool {
        loop {
            if node == body {
                return true;
            }
            match nodes[node.0].parent {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    /// Descendants of `root` in document order, excluding `root`.
    fn preorder(nodes: &[FakeNode], root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = nodes[root.0].children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(nodes[id.0].children.iter().rev().copied());
        }
        out
    }

    fn clone_subtree(nodes: &mut Vec<FakeNode>, source: NodeId, parent: Option<NodeId>) -> NodeId {
        let mut copy = nodes[source.0].clone();
        let children = std::mem::take(&mut copy.children);
        copy.parent = parent;
        copy.drawing = None;
        let id = NodeId(nodes.len());
        nodes.push(copy);
        for child in children {
            let child = Self::clone_subtree(nodes, child, Some(id));
            nodes[id.0].children.push(child);
        }
        id
    }

    fn detach(nodes: &mut [FakeNode], node: NodeId) {
        if let Some(parent) = nodes[node.0].parent.take() {
            nodes[parent.0].children.retain(|&c| c != node);
        }
    }

    fn count_if_live(&self, node: NodeId) {
        if Self::attached_in(&self.nodes.borrow(), node, self.body) {
            self.mutations.set(self.mutations.get() + 1);
        }
    }
}

impl CaptureHost for FakeHost {
    type Node = NodeId;
    type Container = NodeId;

    fn is_attached(&self, node: &NodeId) -> bool {
        Self::attached_in(&self.nodes.borrow(), *node, self.body)
    }

    fn query_all(&self, root: &NodeId, selector: &str) -> Result<Vec<NodeId>, HostError> {
        let compounds = parse_selector(selector)?;
        let nodes = self.nodes.borrow();
        Ok(Self::preorder(&nodes, *root)
            .into_iter()
            .filter(|id| compounds.iter().any(|c| nodes[id.0].matches(c)))
            .collect())
    }

    fn descendants(&self, root: &NodeId) -> Vec<NodeId> {
        Self::preorder(&self.nodes.borrow(), *root)
    }

    fn scroll_size(&self, node: &NodeId) -> Dimensions {
        self.nodes.borrow()[node.0].scroll
    }

    fn inline_style(&self, node: &NodeId, property: &str) -> String {
        self.nodes.borrow()[node.0]
            .styles
            .get(property)
            .cloned()
            .unwrap_or_default()
    }

    fn set_inline_style(&self, node: &NodeId, property: &str, value: &str) -> Result<(), HostError> {
        if self.nodes.borrow()[node.0].rejects_styles {
            return Err(HostError::new(format!("style write to {property} rejected")));
        }
        self.count_if_live(*node);
        let mut nodes = self.nodes.borrow_mut();
        let styles = &mut nodes[node.0].styles;
        if value.is_empty() {
            styles.remove(property);
        } else {
            styles.insert(property.to_owned(), value.to_owned());
        }
        Ok(())
    }

    fn deep_clone(&self, node: &NodeId) -> Result<NodeId, HostError> {
        if self.fail_clones.get() {
            return Err(HostError::new("clone refused"));
        }
        Ok(Self::clone_subtree(&mut self.nodes.borrow_mut(), *node, None))
    }

    fn copy_drawings(&self, source: &NodeId, clone: &NodeId) -> Result<usize, HostError> {
        let mut nodes = self.nodes.borrow_mut();
        let canvases = |nodes: &[FakeNode], root: NodeId| -> Vec<NodeId> {
            std::iter::once(root)
                .chain(Self::preorder(nodes, root))
                .filter(|id| nodes[id.0].tag.eq_ignore_ascii_case("canvas"))
                .collect()
        };
        let from = canvases(&nodes[..], *source);
        let onto = canvases(&nodes[..], *clone);
        if from.len() != onto.len() {
            return Err(HostError::new(format!(
                "clone has {} canvases, source has {}",
                onto.len(),
                from.len()
            )));
        }
        for (from, onto) in from.iter().zip(&onto) {
            let drawing = nodes[from.0].drawing.clone();
            nodes[onto.0].drawing = drawing;
        }
        Ok(onto.len())
    }

    fn remove(&self, node: &NodeId) {
        self.count_if_live(*node);
        Self::detach(&mut self.nodes.borrow_mut(), *node);
    }

    fn mount_offscreen(&self, node: &NodeId, size: Dimensions) -> Result<NodeId, HostError> {
        let mut container = FakeNode::from_descriptor("div");
        container.container = true;
        container.parent = Some(self.body);
        for (property, value) in [
            (style::POSITION, "fixed".to_owned()),
            ("left", "-100000px".to_owned()),
            (style::WIDTH, format!("{}px", size.width)),
            (style::HEIGHT, format!("{}px", size.height)),
        ] {
            container.styles.insert(property.to_owned(), value);
        }
        let container = self.insert(container);
        let mut nodes = self.nodes.borrow_mut();
        Self::detach(&mut nodes, *node);
        nodes[node.0].parent = Some(container);
        nodes[container.0].children.push(*node);
        drop(nodes);
        self.mutations.set(self.mutations.get() + 1);
        Ok(container)
    }

    fn unmount(&self, container: NodeId) -> Result<(), HostError> {
        if !self.nodes.borrow()[container.0].container || !self.is_attached(&container) {
            return Err(HostError::new("not a mounted container"));
        }
        self.count_if_live(container);
        Self::detach(&mut self.nodes.borrow_mut(), container);
        Ok(())
    }
}

// ───────────────────────── Probe and clock ───────────────────────────

/// A [`ChartProbe`] whose surfaces report zero size for a number of
/// polls before reporting their real size.
#[derive(Debug)]
pub struct FakeProbe {
    sizes: Vec<Dimensions>,
    rendered_after: u32,
    settled: bool,
    polls: Cell<u32>,
}

impl FakeProbe {
    /// Surfaces that are already rendered.
    #[must_use]
    pub const fn new(sizes: Vec<Dimensions>) -> Self {
        Self {
            sizes,
            rendered_after: 0,
            settled: false,
            polls: Cell::new(0),
        }
    }

    /// Report zero sizes for the first `polls` inspections.
    #[must_use]
    pub const fn rendered_after(mut self, polls: u32) -> Self {
        self.rendered_after = polls;
        self
    }

    /// Raise the explicit completion signal.
    #[must_use]
    pub const fn settled(mut self) -> Self {
        self.settled = true;
        self
    }

    /// Inspections so far.
    #[must_use]
    pub fn polls(&self) -> u32 {
        self.polls.get()
    }
}

impl ChartProbe for FakeProbe {
    fn surface_sizes(&self) -> Vec<Dimensions> {
        let poll = self.polls.get();
        self.polls.set(poll.saturating_add(1));
        if poll < self.rendered_after {
            vec![Dimensions::default(); self.sizes.len()]
        } else {
            self.sizes.clone()
        }
    }

    fn is_settled(&self) -> bool {
        self.settled
    }
}

/// A clock that only moves when slept on or advanced.
///
/// Implements both [`Clock`] and [`Timer`]: sleeping advances time and
/// completes immediately.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
}

impl ManualClock {
    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    type Instant = Duration;

    fn now(&self) -> Duration {
        self.now.get()
    }

    fn elapsed(&self, since: &Duration) -> Duration {
        self.now.get().saturating_sub(*since)
    }
}

impl Timer for ManualClock {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        self.advance(duration);
        std::future::ready(())
    }
}

// ───────────────────────── Rasterizer ────────────────────────────────

#[derive(Debug, Clone)]
enum RasterMode {
    Solid(image::Rgba<u8>),
    Failing(String),
    Empty,
    Never,
}

/// A scripted capture backend.
#[derive(Debug)]
pub struct FakeRasterizer {
    mode: RasterMode,
    calls: Cell<u32>,
    last_request: RefCell<Option<RasterRequest>>,
}

impl FakeRasterizer {
    fn with_mode(mode: RasterMode) -> Self {
        Self {
            mode,
            calls: Cell::new(0),
            last_request: RefCell::new(None),
        }
    }

    /// Returns a bitmap of exactly the expected size filled with `color`.
    #[must_use]
    pub fn solid(color: image::Rgba<u8>) -> Self {
        Self::with_mode(RasterMode::Solid(color))
    }

    /// Fails every capture with `message`.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self::with_mode(RasterMode::Failing(message.to_owned()))
    }

    /// Returns a zero-sized bitmap.
    #[must_use]
    pub fn empty() -> Self {
        Self::with_mode(RasterMode::Empty)
    }

    /// Never completes.
    #[must_use]
    pub fn never() -> Self {
        Self::with_mode(RasterMode::Never)
    }

    /// Captures attempted.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.get()
    }

    /// The most recent request.
    #[must_use]
    pub fn last_request(&self) -> Option<RasterRequest> {
        self.last_request.borrow().clone()
    }
}

impl<N> Rasterizer<N> for FakeRasterizer {
    fn rasterize(
        &self,
        _node: &N,
        request: &RasterRequest,
    ) -> impl Future<Output = Result<RasterOutput, HostError>> {
        self.calls.set(self.calls.get() + 1);
        *self.last_request.borrow_mut() = Some(request.clone());
        let expected = request.expected_dimensions();
        let mode = self.mode.clone();
        async move {
            match mode {
                RasterMode::Solid(color) => Ok(RasterOutput {
                    pixels: RgbaImage::from_pixel(expected.width, expected.height, color),
                    resources_timed_out: false,
                }),
                RasterMode::Failing(message) => Err(HostError::new(message)),
                RasterMode::Empty => Ok(RasterOutput {
                    pixels: RgbaImage::new(0, 0),
                    resources_timed_out: false,
                }),
                RasterMode::Never => {
                    std::future::pending::<()>().await;
                    Err(HostError::new("unreachable"))
                }
            }
        }
    }
}

// ───────────────────────── Encoder and sink ──────────────────────────

/// Encodes a plain-text outline of the document.
#[derive(Debug, Default)]
pub struct SummaryEncoder {
    fail: bool,
}

impl SummaryEncoder {
    /// An encoder that always fails.
    #[must_use]
    pub const fn failing() -> Self {
        Self { fail: true }
    }
}

impl DocumentEncoder for SummaryEncoder {
    type Error = HostError;

    fn mime_type(&self) -> &'static str {
        "text/plain"
    }

    fn extension(&self) -> &'static str {
        "txt"
    }

    fn encode(&self, document: &Document) -> Result<Vec<u8>, HostError> {
        if self.fail {
            return Err(HostError::new("encoder failed"));
        }
        let mut out = format!(
            "{} {}x{}mm, {} pages\n",
            document.title,
            document.page_width,
            document.page_height,
            document.pages.len()
        );
        for (index, page) in document.pages.iter().enumerate() {
            for line in &page.header {
                out.push_str(&format!("p{index} text {:?}\n", line.text));
            }
            for image in &page.images {
                out.push_str(&format!(
                    "p{index} image rows {}..{} at {:.2},{:.2}\n",
                    image.rows.start, image.rows.end, image.x, image.y
                ));
            }
        }
        Ok(out.into_bytes())
    }
}

/// A file handed to a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    /// File contents.
    pub bytes: Vec<u8>,
    /// File name.
    pub filename: String,
    /// MIME type.
    pub mime_type: String,
}

/// Collects saved files in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    saved: RefCell<Vec<SavedFile>>,
    fail: bool,
}

impl MemorySink {
    /// A sink that refuses every save.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            saved: RefCell::default(),
            fail: true,
        }
    }

    /// Files saved so far.
    #[must_use]
    pub fn saved(&self) -> Vec<SavedFile> {
        self.saved.borrow().clone()
    }
}

impl DocumentSink for MemorySink {
    fn save(&self, bytes: &[u8], filename: &str, mime_type: &str) -> Result<(), HostError> {
        if self.fail {
            return Err(HostError::new("download blocked"));
        }
        self.saved.borrow_mut().push(SavedFile {
            bytes: bytes.to_vec(),
            filename: filename.to_owned(),
            mime_type: mime_type.to_owned(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn selectors_match_tags_classes_and_ids() {
        let host = FakeHost::new();
        let root = host.append(&host.body(), "main#app");
        let card = host.append(&root, "div.card.wide");
        let button = host.append(&card, "button");
        assert_eq!(host.query_all(&host.body(), "#app").unwrap(), [root]);
        assert_eq!(host.query_all(&root, "div.wide").unwrap(), [card]);
        assert_eq!(host.query_all(&root, "button, .card").unwrap(), [card, button]);
        assert!(host.query_all(&root, "span").unwrap().is_empty());
    }

    #[test]
    fn malformed_selectors_are_rejected() {
        let host = FakeHost::new();
        for bad in ["", "div,", "[[nope", "div > p", ".", "a..b"] {
            assert!(host.query_all(&host.body(), bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn clones_are_detached_copies() {
        let host = FakeHost::new();
        let root = host.append(&host.body(), "section");
        host.append(&root, "p");
        let clone = host.deep_clone(&root).unwrap();
        assert!(!host.is_attached(&clone));
        assert_eq!(host.descendants(&clone).len(), 1);
        assert_eq!(host.descendants(&root).len(), 1);
        assert_eq!(host.live_mutations(), 0);
    }

    #[test]
    fn mounted_containers_are_counted_until_unmounted() {
        let host = FakeHost::new();
        let orphan = host.detached("div");
        let container = host.mount_offscreen(&orphan, Dimensions::new(10, 10)).unwrap();
        assert!(host.is_attached(&orphan));
        assert_eq!(host.live_containers(), 1);
        host.unmount(container).unwrap();
        assert_eq!(host.live_containers(), 0);
        assert!(host.unmount(container).is_err());
    }
}
