//! Document assembly: turn a slice plan into pages of text and images.
//!
//! The [`Document`] is format-neutral. A [`DocumentEncoder`] (the PDF
//! writer in `folio-export`) serializes it, and a [`DocumentSink`]
//! delivers the bytes to the user.

use std::ops::Range;

use image::imageops;

use crate::paginate::SlicePlan;
use crate::types::{HostError, RasterImage, RgbaImage};

/// Gap between the top margin and the title baseline.
const TITLE_OFFSET_MM: f64 = 8.0;
/// Gap between the title and subtitle baselines.
const SUBTITLE_GAP_MM: f64 = 8.0;
/// Title font size.
const TITLE_SIZE_PT: f64 = 18.0;
/// Subtitle font size.
const SUBTITLE_SIZE_PT: f64 = 12.0;

/// Caller-supplied header text for page 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportHeader {
    /// Main heading, e.g. the report name.
    pub title: String,
    /// Secondary line, e.g. the period covered.
    pub subtitle: String,
}

impl ReportHeader {
    /// Create a header.
    #[must_use]
    pub fn new(title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitle: subtitle.into(),
        }
    }
}

/// Font weight for header text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    /// Regular weight.
    Regular,
    /// Bold weight.
    Bold,
}

/// One line of real (selectable) text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    /// The text.
    pub text: String,
    /// Font weight.
    pub weight: FontWeight,
    /// Font size in points.
    pub size_pt: f64,
    /// Horizontal center of the line.
    pub center_x: f64,
    /// Baseline, measured from the top of the page.
    pub baseline: f64,
}

/// A bitmap drawn into a rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedImage {
    /// Opaque pixels for this slice only.
    pub pixels: RgbaImage,
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Drawn width.
    pub width: f64,
    /// Drawn height.
    pub height: f64,
    /// Source rows this bitmap was cut from.
    pub rows: Range<u32>,
}

/// One fixed-size page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Header lines (page 1 only).
    pub header: Vec<TextLine>,
    /// Image slices.
    pub images: Vec<PlacedImage>,
}

/// An assembled, not yet encoded, document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Page width in millimetres.
    pub page_width: f64,
    /// Page height in millimetres.
    pub page_height: f64,
    /// Pages in order.
    pub pages: Vec<Page>,
    /// Document title metadata.
    pub title: String,
}

impl Document {
    /// Total number of image slices across all pages.
    #[must_use]
    pub fn slice_count(&self) -> usize {
        self.pages.iter().map(|p| p.images.len()).sum()
    }
}

/// Serializes a [`Document`] into a file format.
pub trait DocumentEncoder {
    /// Encoder-specific failure.
    type Error: std::error::Error;

    /// MIME type of the output.
    fn mime_type(&self) -> &'static str;

    /// File extension without the leading dot.
    fn extension(&self) -> &'static str;

    /// Encode the whole document.
    ///
    /// # Errors
    ///
    /// Returns the encoder's error if the document cannot be written.
    fn encode(&self, document: &Document) -> Result<Vec<u8>, Self::Error>;
}

/// Delivers encoded bytes to the user.
pub trait DocumentSink {
    /// Save `bytes` under `filename`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the environment refuses the save.
    fn save(&self, bytes: &[u8], filename: &str, mime_type: &str) -> Result<(), HostError>;
}

fn header_lines(header: &ReportHeader, page_width: f64, margin: f64) -> Vec<TextLine> {
    let center_x = page_width / 2.0;
    let title_baseline = margin + TITLE_OFFSET_MM;
    let mut lines = Vec::with_capacity(2);
    if !header.title.is_empty() {
        lines.push(TextLine {
            text: header.title.clone(),
            weight: FontWeight::Bold,
            size_pt: TITLE_SIZE_PT,
            center_x,
            baseline: title_baseline,
        });
    }
    if !header.subtitle.is_empty() {
        lines.push(TextLine {
            text: header.subtitle.clone(),
            weight: FontWeight::Regular,
            size_pt: SUBTITLE_SIZE_PT,
            center_x,
            baseline: title_baseline + SUBTITLE_GAP_MM,
        });
    }
    lines
}

/// Cut `raster` along `plan` and lay the pieces out on pages, with the
/// header on page 1.
#[must_use]
pub fn assemble(raster: &RasterImage, plan: &SlicePlan, header: &ReportHeader) -> Document {
    let geometry = &plan.geometry;
    let mut pages: Vec<Page> = Vec::with_capacity(plan.page_count());
    for slice in &plan.slices {
        while pages.len() <= slice.page {
            pages.push(Page::default());
        }
        let pixels = imageops::crop_imm(
            &raster.pixels,
            0,
            slice.rows.start,
            raster.pixels.width(),
            slice.rows.end - slice.rows.start,
        )
        .to_image();
        pages[slice.page].images.push(PlacedImage {
            pixels,
            x: geometry.x_offset,
            y: slice.top,
            width: geometry.image_width,
            height: slice.height,
            rows: slice.rows.clone(),
        });
    }
    if let Some(first) = pages.first_mut() {
        first.header = header_lines(header, geometry.page_width, geometry.margin);
    }
    Document {
        page_width: geometry.page_width,
        page_height: geometry.page_height,
        pages,
        title: header.title.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::config::PageLayout;
    use crate::paginate::plan;
    use crate::types::Dimensions;

    /// Each row is filled with its own index so slices can be traced.
    fn striped(width: u32, height: u32) -> RasterImage {
        #[allow(clippy::cast_possible_truncation)]
        let pixels = RgbaImage::from_fn(width, height, |_, y| {
            Rgba([(y % 256) as u8, (y / 256) as u8, 0, 255])
        });
        RasterImage { pixels, scale: 1.0 }
    }

    #[test]
    fn slices_carry_their_own_rows() {
        let raster = striped(100, 1000);
        let plan = plan(raster.dimensions(), &PageLayout::default()).unwrap();
        let doc = assemble(&raster, &plan, &ReportHeader::new("Deliveries", "March 2024"));
        assert_eq!(doc.pages.len(), plan.page_count());
        assert!(doc.pages.len() > 1);

        for page in &doc.pages {
            for image in &page.images {
                assert_eq!(image.pixels.width(), 100);
                assert_eq!(image.pixels.height(), image.rows.end - image.rows.start);
                let top = image.pixels.get_pixel(0, 0);
                assert_eq!(u32::from(top[0]) + 256 * u32::from(top[1]), image.rows.start);
            }
        }
    }

    #[test]
    fn header_is_on_first_page_only() {
        let raster = striped(100, 1000);
        let plan = plan(raster.dimensions(), &PageLayout::default()).unwrap();
        let doc = assemble(&raster, &plan, &ReportHeader::new("Deliveries", "March 2024"));
        assert_eq!(doc.pages[0].header.len(), 2);
        assert_eq!(doc.pages[0].header[0].weight, FontWeight::Bold);
        assert!((doc.pages[0].header[0].center_x - 105.0).abs() < 1e-9);
        assert!(doc.pages[0].header[1].baseline > doc.pages[0].header[0].baseline);
        assert!(doc.pages[1..].iter().all(|p| p.header.is_empty()));
        assert_eq!(doc.title, "Deliveries");
    }

    #[test]
    fn header_stays_above_the_image_band() {
        let raster = striped(100, 50);
        let plan = plan(raster.dimensions(), &PageLayout::default()).unwrap();
        let doc = assemble(&raster, &plan, &ReportHeader::new("T", "S"));
        let last = doc.pages[0].header.last().unwrap();
        assert!(last.baseline < doc.pages[0].images[0].y);
        assert_eq!(doc.slice_count(), 1);
    }

    #[test]
    fn header_clears_the_image_at_the_smallest_reservation() {
        let layout = PageLayout {
            header_reservation: PageLayout::DEFAULT_MARGIN_MM + PageLayout::HEADER_EXTENT_MM,
            ..PageLayout::default()
        };
        let raster = striped(100, 1000);
        let plan = plan(raster.dimensions(), &layout).unwrap();
        let doc = assemble(&raster, &plan, &ReportHeader::new("T", "S"));
        let subtitle = doc.pages[0].header.last().unwrap();
        // Leave room for the subtitle's descenders.
        assert!(subtitle.baseline + 2.0 <= doc.pages[0].images[0].y);
    }

    #[test]
    fn empty_subtitle_is_omitted() {
        let raster = striped(10, 10);
        let plan = plan(Dimensions::new(10, 10), &PageLayout::default()).unwrap();
        let doc = assemble(&raster, &plan, &ReportHeader::new("Only title", ""));
        assert_eq!(doc.pages[0].header.len(), 1);
    }
}
