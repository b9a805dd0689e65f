//! [`ChartProbe`] over chart surfaces mounted under a report root.

use folio_pipeline::{ChartProbe, Dimensions};
use wasm_bindgen::JsCast;
use web_sys::{Element, HtmlCanvasElement};

/// Selector for chart drawing surfaces.
pub const CHART_SURFACES: &str = "canvas, svg";

/// Attribute a chart library wrapper may set on the report root once
/// every chart has finished its first render.
pub const SETTLED_ATTRIBUTE: &str = "data-charts-settled";

/// Reports the intrinsic size of every `<canvas>` and `<svg>` under a
/// root element.
///
/// A canvas reports its bitmap size; an SVG reports its laid-out
/// bounding box. Both stay at zero until the chart library has drawn.
#[derive(Debug, Clone)]
pub struct CanvasProbe {
    root: Element,
}

impl CanvasProbe {
    /// Probe the surfaces under `root`.
    #[must_use]
    pub const fn new(root: Element) -> Self {
        Self { root }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn surface_size(element: &Element) -> Dimensions {
    if let Some(canvas) = element.dyn_ref::<HtmlCanvasElement>() {
        return Dimensions::new(canvas.width(), canvas.height());
    }
    let rect = element.get_bounding_client_rect();
    Dimensions::new(
        rect.width().max(0.0).round() as u32,
        rect.height().max(0.0).round() as u32,
    )
}

impl ChartProbe for CanvasProbe {
    fn surface_sizes(&self) -> Vec<Dimensions> {
        let Ok(list) = self.root.query_selector_all(CHART_SURFACES) else {
            return Vec::new();
        };
        (0..list.length())
            .filter_map(|i| list.item(i))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            // Icons nested inside a chart's own SVG are not separate surfaces.
            .filter(|element| {
                element
                    .parent_element()
                    .and_then(|parent| parent.closest("svg").ok().flatten())
                    .is_none()
            })
            .map(|element| surface_size(&element))
            .collect()
    }

    fn is_settled(&self) -> bool {
        self.root
            .get_attribute(SETTLED_ATTRIBUTE)
            .is_some_and(|value| value == "true")
    }
}
