//! Rasterization: capture the prepared subtree into one opaque bitmap.
//!
//! The capture backend itself lives behind [`Rasterizer`]. This module
//! decides the scale the backend is asked for, checks what it returns,
//! and composites the result over the page background.

use std::future::Future;
use std::time::Duration;

use crate::config::RasterOptions;
use crate::types::{Dimensions, HostError, PipelineError, RasterImage, Rgb, RgbaImage};

/// Parameters for one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterRequest {
    /// Forced layout size in CSS pixels.
    pub size: Dimensions,
    /// Effective device-pixel scale (already memory-bounded).
    pub scale: f64,
    /// Fill color behind transparent content.
    pub background: Rgb,
    /// How long the backend may wait for embedded images.
    pub resource_timeout: Duration,
}

impl RasterRequest {
    /// Build a request for `size`, bounding the scale by
    /// [`RasterOptions::max_raster_pixels`].
    #[must_use]
    pub fn new(size: Dimensions, options: &RasterOptions) -> Self {
        Self {
            size,
            scale: effective_scale(size, options),
            background: options.background,
            resource_timeout: options.resource_timeout,
        }
    }

    /// Smallest bitmap the backend may return without clipping.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn expected_dimensions(&self) -> Dimensions {
        Dimensions::new(
            (f64::from(self.size.width) * self.scale).floor() as u32,
            (f64::from(self.size.height) * self.scale).floor() as u32,
        )
    }
}

/// What a capture backend hands back.
#[derive(Debug, Clone)]
pub struct RasterOutput {
    /// The captured pixels, possibly with transparency.
    pub pixels: RgbaImage,
    /// Whether some embedded resources had not loaded when the
    /// resource timeout expired.
    pub resources_timed_out: bool,
}

/// A capture backend (`html2canvas` in the browser).
pub trait Rasterizer<N> {
    /// Render `node` at the requested size and scale.
    fn rasterize(
        &self,
        node: &N,
        request: &RasterRequest,
    ) -> impl Future<Output = Result<RasterOutput, HostError>>;
}

/// The largest scale not above `options.scale` that keeps the bitmap
/// within `options.max_raster_pixels`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn effective_scale(size: Dimensions, options: &RasterOptions) -> f64 {
    if size.is_empty() {
        return options.scale;
    }
    let budget = (options.max_raster_pixels as f64 / size.area() as f64).sqrt();
    let scale = options.scale.min(budget);
    if scale < options.scale {
        log::warn!(
            "reducing capture scale from {} to {scale:.3} to stay under {} pixels",
            options.scale,
            options.max_raster_pixels
        );
    }
    scale
}

/// Composite every pixel over `background`, leaving the image opaque.
pub fn flatten(pixels: &mut RgbaImage, background: Rgb) {
    for pixel in pixels.pixels_mut() {
        let alpha = u16::from(pixel[3]);
        if alpha == 255 {
            continue;
        }
        for (channel, bg) in pixel.0.iter_mut().take(3).zip(background.0) {
            let blended = (u16::from(*channel) * alpha + u16::from(bg) * (255 - alpha) + 127) / 255;
            #[allow(clippy::cast_possible_truncation)]
            {
                *channel = blended as u8;
            }
        }
        pixel[3] = 255;
    }
}

/// Check a backend result and turn it into the pipeline's bitmap.
///
/// # Errors
///
/// Returns [`PipelineError::CaptureFailure`] for an empty bitmap or one
/// smaller than the forced layout (allowing one pixel of rounding).
pub fn finish(output: RasterOutput, request: &RasterRequest) -> Result<RasterImage, PipelineError> {
    let mut pixels = output.pixels;
    let got = Dimensions::new(pixels.width(), pixels.height());
    if got.is_empty() {
        return Err(PipelineError::CaptureFailure(format!(
            "capture produced an empty {got} bitmap"
        )));
    }
    let expected = request.expected_dimensions();
    if got.width + 1 < expected.width || got.height + 1 < expected.height {
        return Err(PipelineError::CaptureFailure(format!(
            "capture clipped: got {got}, expected at least {expected}"
        )));
    }
    if output.resources_timed_out {
        log::warn!(
            "embedded resources still loading after {:?}; captured without them",
            request.resource_timeout
        );
    }
    flatten(&mut pixels, request.background);
    Ok(RasterImage {
        pixels,
        scale: request.scale,
    })
}

/// Run `rasterizer` on `node` and validate the result.
///
/// # Errors
///
/// Returns [`PipelineError::CaptureFailure`] if the backend fails or
/// its bitmap is unusable.
#[allow(clippy::future_not_send)]
pub async fn capture<N, R>(
    rasterizer: &R,
    node: &N,
    request: &RasterRequest,
) -> Result<RasterImage, PipelineError>
where
    R: Rasterizer<N> + ?Sized,
{
    log::debug!(
        "capturing {} at scale {:.3}",
        request.size,
        request.scale
    );
    let output = rasterizer
        .rasterize(node, request)
        .await
        .map_err(|e| PipelineError::CaptureFailure(e.to_string()))?;
    finish(output, request)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;

    fn request(width: u32, height: u32) -> RasterRequest {
        RasterRequest::new(Dimensions::new(width, height), &RasterOptions::default())
    }

    #[test]
    fn small_captures_keep_requested_scale() {
        let req = request(1400, 3000);
        assert!((req.scale - 2.0).abs() < f64::EPSILON);
        assert_eq!(req.expected_dimensions(), Dimensions::new(2800, 6000));
    }

    #[test]
    fn huge_captures_are_scaled_down_under_budget() {
        let options = RasterOptions::default();
        let size = Dimensions::new(1400, 20_000);
        let scale = effective_scale(size, &options);
        assert!(scale < options.scale);
        let pixels = f64::from(size.width) * scale * f64::from(size.height) * scale;
        #[allow(clippy::cast_precision_loss)]
        let budget = options.max_raster_pixels as f64;
        assert!(pixels <= budget * (1.0 + 1e-9));
    }

    #[test]
    fn flatten_composites_over_background() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 128]));
        flatten(&mut img, Rgb::WHITE);
        assert_eq!(img.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(1, 0), &Rgba([127, 127, 127, 255]));
    }

    #[test]
    fn empty_bitmap_is_a_capture_failure() {
        let output = RasterOutput {
            pixels: RgbaImage::new(0, 0),
            resources_timed_out: false,
        };
        let err = finish(output, &request(10, 10)).unwrap_err();
        assert!(matches!(err, PipelineError::CaptureFailure(_)));
    }

    #[test]
    fn clipped_bitmap_is_a_capture_failure() {
        let output = RasterOutput {
            pixels: RgbaImage::new(20, 10),
            resources_timed_out: false,
        };
        assert!(finish(output, &request(10, 10)).is_err());
    }

    #[test]
    fn resource_timeout_is_not_fatal() {
        let output = RasterOutput {
            pixels: RgbaImage::from_pixel(20, 21, Rgba([10, 20, 30, 255])),
            resources_timed_out: true,
        };
        let image = finish(output, &request(10, 10)).unwrap();
        assert_eq!(image.dimensions(), Dimensions::new(20, 21));
        assert!((image.scale - 2.0).abs() < f64::EPSILON);
    }
}
