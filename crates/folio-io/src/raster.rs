//! [`Rasterizer`] backed by the `html2canvas` script.
//!
//! `html2canvas` must be loaded as a global (`window.html2canvas`)
//! before an export starts. The rendered canvas is read back with
//! `getImageData` into an RGBA buffer for the pipeline.

use folio_pipeline::{HostError, RasterOutput, RasterRequest, Rasterizer, RgbaImage};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{CanvasRenderingContext2d, Element, HtmlCanvasElement, HtmlImageElement};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_name = html2canvas)]
    fn html2canvas_js(element: &Element, options: &JsValue) -> Result<js_sys::Promise, JsValue>;
}

/// Errors from the capture backend.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// A browser API call returned an error.
    #[error("browser API error: {0}")]
    JsError(String),

    /// `html2canvas` resolved to something other than a canvas.
    #[error("html2canvas did not return a canvas")]
    NotACanvas,

    /// The canvas has no 2D context to read pixels from.
    #[error("canvas has no 2d context")]
    NoContext,

    /// The pixel buffer does not match the canvas size.
    #[error("pixel buffer does not match a {width}x{height} canvas")]
    BadBuffer {
        /// Canvas width.
        width: u32,
        /// Canvas height.
        height: u32,
    },
}

impl From<JsValue> for CaptureError {
    fn from(value: JsValue) -> Self {
        Self::JsError(format!("{value:?}"))
    }
}

impl From<CaptureError> for HostError {
    fn from(err: CaptureError) -> Self {
        Self::new(err.to_string())
    }
}

/// Build the `html2canvas` options object for `request`.
fn options(request: &RasterRequest) -> Result<JsValue, CaptureError> {
    let options = js_sys::Object::new();
    let width = f64::from(request.size.width);
    let height = f64::from(request.size.height);
    #[allow(clippy::cast_precision_loss)]
    let timeout_ms = request.resource_timeout.as_millis() as f64;
    for (key, value) in [
        ("scale", JsValue::from_f64(request.scale)),
        ("width", JsValue::from_f64(width)),
        ("height", JsValue::from_f64(height)),
        ("windowWidth", JsValue::from_f64(width)),
        ("windowHeight", JsValue::from_f64(height)),
        ("backgroundColor", JsValue::from_str(&request.background.to_css_hex())),
        ("useCORS", JsValue::TRUE),
        ("imageTimeout", JsValue::from_f64(timeout_ms)),
        ("logging", JsValue::FALSE),
    ] {
        js_sys::Reflect::set(&options, &JsValue::from_str(key), &value)?;
    }
    Ok(options.into())
}

/// Copy a canvas's pixels into an [`RgbaImage`].
fn read_pixels(canvas: &HtmlCanvasElement) -> Result<RgbaImage, CaptureError> {
    let (width, height) = (canvas.width(), canvas.height());
    if width == 0 || height == 0 {
        return Ok(RgbaImage::new(0, 0));
    }
    let context = canvas
        .get_context("2d")?
        .ok_or(CaptureError::NoContext)?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|_| CaptureError::NoContext)?;
    let data = context.get_image_data(0.0, 0.0, f64::from(width), f64::from(height))?;
    RgbaImage::from_raw(width, height, data.data().0)
        .ok_or(CaptureError::BadBuffer { width, height })
}

/// Whether any `<img>` under `node` is still loading.
fn images_pending(node: &Element) -> bool {
    node.query_selector_all("img").is_ok_and(|list| {
        (0..list.length())
            .filter_map(|i| list.item(i))
            .filter_map(|n| n.dyn_into::<HtmlImageElement>().ok())
            .any(|img| !img.complete())
    })
}

/// Captures elements with `html2canvas`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Html2Canvas;

impl Html2Canvas {
    #[allow(clippy::future_not_send)] // WASM is single-threaded; Element is !Send
    async fn capture(node: &Element, request: &RasterRequest) -> Result<RasterOutput, CaptureError> {
        let promise = html2canvas_js(node, &options(request)?)?;
        let canvas = JsFuture::from(promise)
            .await?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| CaptureError::NotACanvas)?;
        log::debug!("html2canvas returned {}x{}", canvas.width(), canvas.height());
        Ok(RasterOutput {
            pixels: read_pixels(&canvas)?,
            resources_timed_out: images_pending(node),
        })
    }
}

impl Rasterizer<Element> for Html2Canvas {
    #[allow(clippy::future_not_send)]
    async fn rasterize(
        &self,
        node: &Element,
        request: &RasterRequest,
    ) -> Result<RasterOutput, HostError> {
        Ok(Self::capture(node, request).await?)
    }
}
