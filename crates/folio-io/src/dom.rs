//! [`CaptureHost`] over the live browser DOM.
//!
//! Inline styles are read and written through the element's
//! `CSSStyleDeclaration`, which both `HTMLElement` and `SVGElement`
//! expose. Off-screen containers are fixed-position `<div>`s parked far
//! left of the viewport so the clone lays out at full size without
//! being visible.

use folio_pipeline::{CaptureHost, Dimensions, HostError};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CanvasRenderingContext2d, CssStyleDeclaration, Document, Element, HtmlCanvasElement};

/// Horizontal offset of off-screen containers, in CSS pixels.
const OFFSCREEN_LEFT_PX: i32 = -100_000;

/// Errors from DOM access.
#[derive(Debug, thiserror::Error)]
pub enum DomError {
    /// A browser API call returned an error or a required object was missing.
    #[error("DOM error: {0}")]
    JsError(String),

    /// The element has no inline style declaration.
    #[error("<{0}> has no style declaration")]
    NoStyle(String),
}

impl From<JsValue> for DomError {
    fn from(value: JsValue) -> Self {
        Self::JsError(format!("{value:?}"))
    }
}

impl From<DomError> for HostError {
    fn from(err: DomError) -> Self {
        Self::new(err.to_string())
    }
}

/// The browser's current `document`.
///
/// # Errors
///
/// Returns [`DomError::JsError`] outside a browser window.
pub fn document() -> Result<Document, DomError> {
    web_sys::window()
        .ok_or_else(|| DomError::JsError("no global window".into()))?
        .document()
        .ok_or_else(|| DomError::JsError("no document".into()))
}

/// The style declaration of an HTML or SVG element.
fn style_of(element: &Element) -> Option<CssStyleDeclaration> {
    if let Some(html) = element.dyn_ref::<web_sys::HtmlElement>() {
        Some(html.style())
    } else {
        element
            .dyn_ref::<web_sys::SvgElement>()
            .map(web_sys::SvgElement::style)
    }
}

/// Collect a `NodeList` into elements, skipping non-element nodes.
fn elements(list: &web_sys::NodeList) -> Vec<Element> {
    (0..list.length())
        .filter_map(|i| list.item(i))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .collect()
}

/// Every `<canvas>` under `root` in document order, `root` first if it
/// is one.
fn canvases(root: &Element) -> Result<Vec<HtmlCanvasElement>, DomError> {
    let below = elements(&root.query_selector_all("canvas")?);
    Ok(std::iter::once(root.clone())
        .chain(below)
        .filter_map(|element| element.dyn_into::<HtmlCanvasElement>().ok())
        .collect())
}

/// Draw the current bitmap of `source` onto `clone`.
fn copy_bitmap(source: &HtmlCanvasElement, clone: &HtmlCanvasElement) -> Result<(), DomError> {
    clone.set_width(source.width());
    clone.set_height(source.height());
    if source.width() == 0 || source.height() == 0 {
        return Ok(());
    }
    let context = clone
        .get_context("2d")?
        .ok_or_else(|| DomError::JsError("canvas clone has no 2d context".into()))?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|_| DomError::JsError("2d context has an unexpected type".into()))?;
    context.draw_image_with_html_canvas_element(source, 0.0, 0.0)?;
    Ok(())
}

/// The live browser document as a [`CaptureHost`].
#[derive(Debug, Clone)]
pub struct WebHost {
    document: Document,
}

impl WebHost {
    /// Wrap the current document.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::JsError`] outside a browser window.
    pub fn new() -> Result<Self, DomError> {
        Ok(Self {
            document: document()?,
        })
    }

    /// Wrap a specific document.
    #[must_use]
    pub const fn with_document(document: Document) -> Self {
        Self { document }
    }

    /// The first element matching `selector`, if any.
    #[must_use]
    pub fn find(&self, selector: &str) -> Option<Element> {
        self.document.query_selector(selector).ok().flatten()
    }

    fn offscreen_container(&self, size: Dimensions) -> Result<Element, DomError> {
        let container = self.document.create_element("div")?;
        container.set_attribute("aria-hidden", "true")?;
        let style = style_of(&container).ok_or_else(|| DomError::NoStyle("div".into()))?;
        for (property, value) in [
            ("position", "fixed".to_owned()),
            ("left", format!("{OFFSCREEN_LEFT_PX}px")),
            ("top", "0".to_owned()),
            ("width", format!("{}px", size.width)),
            ("height", format!("{}px", size.height)),
            ("overflow", "visible".to_owned()),
            ("pointer-events", "none".to_owned()),
        ] {
            style.set_property(property, &value)?;
        }
        Ok(container)
    }
}

impl CaptureHost for WebHost {
    type Node = Element;
    type Container = Element;

    fn is_attached(&self, node: &Element) -> bool {
        node.is_connected()
    }

    fn query_all(&self, root: &Element, selector: &str) -> Result<Vec<Element>, HostError> {
        let list = root
            .query_selector_all(selector)
            .map_err(|e| HostError::new(format!("invalid selector '{selector}': {e:?}")))?;
        Ok(elements(&list))
    }

    fn descendants(&self, root: &Element) -> Vec<Element> {
        root.query_selector_all("*")
            .map(|list| elements(&list))
            .unwrap_or_default()
    }

    #[allow(clippy::cast_sign_loss)]
    fn scroll_size(&self, node: &Element) -> Dimensions {
        Dimensions::new(
            node.scroll_width().max(0) as u32,
            node.scroll_height().max(0) as u32,
        )
    }

    fn inline_style(&self, node: &Element, property: &str) -> String {
        style_of(node)
            .and_then(|style| style.get_property_value(property).ok())
            .unwrap_or_default()
    }

    fn set_inline_style(&self, node: &Element, property: &str, value: &str) -> Result<(), HostError> {
        let style = style_of(node).ok_or_else(|| DomError::NoStyle(node.tag_name()))?;
        if value.is_empty() {
            style.remove_property(property).map_err(DomError::from)?;
        } else {
            style.set_property(property, value).map_err(DomError::from)?;
        }
        Ok(())
    }

    fn deep_clone(&self, node: &Element) -> Result<Element, HostError> {
        let clone = node.clone_node_with_deep(true).map_err(DomError::from)?;
        clone
            .dyn_into::<Element>()
            .map_err(|_| HostError::new("clone is not an element"))
    }

    fn copy_drawings(&self, source: &Element, clone: &Element) -> Result<usize, HostError> {
        let from = canvases(source)?;
        let onto = canvases(clone)?;
        if from.len() != onto.len() {
            return Err(HostError::new(format!(
                "clone has {} canvases, source has {}",
                onto.len(),
                from.len()
            )));
        }
        for (from, onto) in from.iter().zip(&onto) {
            copy_bitmap(from, onto)?;
        }
        Ok(onto.len())
    }

    fn remove(&self, node: &Element) {
        node.remove();
    }

    fn mount_offscreen(&self, node: &Element, size: Dimensions) -> Result<Element, HostError> {
        let body = self
            .document
            .body()
            .ok_or_else(|| DomError::JsError("no document body".into()))?;
        let container = self.offscreen_container(size)?;
        container.append_child(node).map_err(DomError::from)?;
        body.append_child(&container).map_err(DomError::from)?;
        Ok(container)
    }

    fn unmount(&self, container: Element) -> Result<(), HostError> {
        container.remove();
        Ok(())
    }
}
