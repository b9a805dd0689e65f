//! PDF serializer for assembled report documents.
//!
//! Each page gets one content stream. Header lines are real text in the
//! base-14 Helvetica faces; image slices become Flate-compressed RGB
//! image XObjects drawn into their millimetre rectangles. PDF user
//! space has its origin at the bottom-left, so every top-based
//! coordinate is flipped against the page height.

use folio_pipeline::{Document, DocumentEncoder, FontWeight, Page, PlacedImage, TextLine};
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref, Str, TextStr};

use crate::metrics::{encode_win_ansi, text_width};

/// Points per millimetre.
pub const PT_PER_MM: f64 = 72.0 / 25.4;

/// Default zlib level for image and content streams.
pub const DEFAULT_COMPRESSION: u8 = 6;

const REGULAR_FONT: Name<'static> = Name(b"F1");
const BOLD_FONT: Name<'static> = Name(b"F2");

/// Errors that can occur while writing a PDF.
#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    /// The document has no pages.
    #[error("document has no pages")]
    EmptyDocument,

    /// A page or placement length is NaN or infinite.
    #[error("non-finite {0} in document geometry")]
    NonFinite(&'static str),

    /// An image slice is too large for a PDF integer.
    #[error("image slice {width}x{height} exceeds PDF limits")]
    ImageTooLarge {
        /// Slice width in pixels.
        width: u32,
        /// Slice height in pixels.
        height: u32,
    },
}

/// Metadata written to the PDF document information dictionary.
#[derive(Debug, Clone)]
pub struct PdfMetadata {
    /// Application credited as creator.
    pub creator: String,
}

impl Default for PdfMetadata {
    fn default() -> Self {
        Self {
            creator: "folio".to_owned(),
        }
    }
}

/// Writes [`Document`]s as PDF.
#[derive(Debug, Clone)]
pub struct PdfEncoder {
    compression: u8,
    metadata: PdfMetadata,
}

impl Default for PdfEncoder {
    fn default() -> Self {
        Self {
            compression: DEFAULT_COMPRESSION,
            metadata: PdfMetadata::default(),
        }
    }
}

impl PdfEncoder {
    /// Encoder with default compression and metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use zlib `level` (0-10) for streams. Level 0 stores streams
    /// uncompressed inside the zlib wrapper, which keeps content
    /// streams readable.
    #[must_use]
    pub fn with_compression(mut self, level: u8) -> Self {
        self.compression = level.min(10);
        self
    }

    /// Use `metadata` for the information dictionary.
    #[must_use]
    pub fn with_metadata(mut self, metadata: PdfMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Serialize `document`.
    ///
    /// # Errors
    ///
    /// Returns [`PdfError`] for an empty document, non-finite geometry,
    /// or oversized image slices.
    pub fn write(&self, document: &Document) -> Result<Vec<u8>, PdfError> {
        if document.pages.is_empty() {
            return Err(PdfError::EmptyDocument);
        }
        check_finite(document)?;

        let mut alloc = Ref::new(1);
        let catalog_id = alloc.bump();
        let tree_id = alloc.bump();
        let regular_id = alloc.bump();
        let bold_id = alloc.bump();
        let info_id = alloc.bump();

        let layout: Vec<PageRefs> = document
            .pages
            .iter()
            .map(|page| PageRefs {
                page: alloc.bump(),
                content: alloc.bump(),
                images: page.images.iter().map(|_| alloc.bump()).collect(),
            })
            .collect();

        let mut pdf = Pdf::new();
        pdf.catalog(catalog_id).pages(tree_id);
        pdf.pages(tree_id)
            .kids(layout.iter().map(|refs| refs.page))
            .count(i32::try_from(layout.len()).unwrap_or(i32::MAX));
        pdf.type1_font(regular_id)
            .base_font(Name(b"Helvetica"))
            .encoding_predefined(Name(b"WinAnsiEncoding"));
        pdf.type1_font(bold_id)
            .base_font(Name(b"Helvetica-Bold"))
            .encoding_predefined(Name(b"WinAnsiEncoding"));

        let media_box = Rect::new(
            0.0,
            0.0,
            to_pt(document.page_width),
            to_pt(document.page_height),
        );

        for (page, refs) in document.pages.iter().zip(&layout) {
            let names: Vec<String> = (0..page.images.len()).map(|i| format!("Im{i}")).collect();

            let mut writer = pdf.page(refs.page);
            writer.media_box(media_box);
            writer.parent(tree_id);
            writer.contents(refs.content);
            let mut resources = writer.resources();
            resources
                .fonts()
                .pair(REGULAR_FONT, regular_id)
                .pair(BOLD_FONT, bold_id);
            let mut x_objects = resources.x_objects();
            for (name, id) in names.iter().zip(&refs.images) {
                x_objects.pair(Name(name.as_bytes()), *id);
            }
            x_objects.finish();
            resources.finish();
            writer.finish();

            let content = page_content(page, document.page_height, &names);
            let content = miniz_oxide::deflate::compress_to_vec_zlib(&content, self.compression);
            pdf.stream(refs.content, &content)
                .filter(Filter::FlateDecode);

            for (image, id) in page.images.iter().zip(&refs.images) {
                self.write_image(&mut pdf, *id, image)?;
            }
        }

        let mut info = pdf.document_info(info_id);
        if !document.title.is_empty() {
            info.title(TextStr(&document.title));
        }
        info.creator(TextStr(&self.metadata.creator));
        info.finish();

        Ok(pdf.finish())
    }

    fn write_image(&self, pdf: &mut Pdf, id: Ref, image: &PlacedImage) -> Result<(), PdfError> {
        let (width, height) = (image.pixels.width(), image.pixels.height());
        let too_large = || PdfError::ImageTooLarge { width, height };
        let pdf_width = i32::try_from(width).map_err(|_| too_large())?;
        let pdf_height = i32::try_from(height).map_err(|_| too_large())?;

        let rgb: Vec<u8> = image
            .pixels
            .pixels()
            .flat_map(|p| [p[0], p[1], p[2]])
            .collect();
        let data = miniz_oxide::deflate::compress_to_vec_zlib(&rgb, self.compression);

        let mut xobject = pdf.image_xobject(id, &data);
        xobject.filter(Filter::FlateDecode);
        xobject.width(pdf_width);
        xobject.height(pdf_height);
        xobject.color_space().device_rgb();
        xobject.bits_per_component(8);
        xobject.finish();
        Ok(())
    }
}

impl DocumentEncoder for PdfEncoder {
    type Error = PdfError;

    fn mime_type(&self) -> &'static str {
        "application/pdf"
    }

    fn extension(&self) -> &'static str {
        "pdf"
    }

    fn encode(&self, document: &Document) -> Result<Vec<u8>, PdfError> {
        let bytes = self.write(document)?;
        log::debug!(
            "wrote {}-page PDF ({} bytes)",
            document.pages.len(),
            bytes.len()
        );
        Ok(bytes)
    }
}

struct PageRefs {
    page: Ref,
    content: Ref,
    images: Vec<Ref>,
}

/// Convert millimetres to points.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn to_pt(mm: f64) -> f32 {
    (mm * PT_PER_MM) as f32
}

fn check_finite(document: &Document) -> Result<(), PdfError> {
    if !(document.page_width.is_finite() && document.page_height.is_finite()) {
        return Err(PdfError::NonFinite("page size"));
    }
    for page in &document.pages {
        for line in &page.header {
            if !(line.center_x.is_finite() && line.baseline.is_finite() && line.size_pt.is_finite())
            {
                return Err(PdfError::NonFinite("text position"));
            }
        }
        for image in &page.images {
            let rect = [image.x, image.y, image.width, image.height];
            if !rect.iter().all(|v| v.is_finite()) {
                return Err(PdfError::NonFinite("image placement"));
            }
        }
    }
    Ok(())
}

/// Content stream drawing one page's header text and image slices.
fn page_content(page: &Page, page_height: f64, image_names: &[String]) -> Vec<u8> {
    let mut content = Content::new();
    for line in &page.header {
        draw_text(&mut content, line, page_height);
    }
    for (image, name) in page.images.iter().zip(image_names) {
        content.save_state();
        content.transform([
            to_pt(image.width),
            0.0,
            0.0,
            to_pt(image.height),
            to_pt(image.x),
            to_pt(page_height - image.y - image.height),
        ]);
        content.x_object(Name(name.as_bytes()));
        content.restore_state();
    }
    content.finish().to_vec()
}

#[allow(clippy::cast_possible_truncation)]
fn draw_text(content: &mut Content, line: &TextLine, page_height: f64) {
    let bytes = encode_win_ansi(&line.text);
    let width = text_width(&bytes, line.weight, line.size_pt);
    let font = match line.weight {
        FontWeight::Regular => REGULAR_FONT,
        FontWeight::Bold => BOLD_FONT,
    };
    let x = f64::from(to_pt(line.center_x)) - width / 2.0;
    content.begin_text();
    content.set_font(font, line.size_pt as f32);
    content.next_line(x as f32, to_pt(page_height - line.baseline));
    content.show(Str(&bytes));
    content.end_text();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use folio_pipeline::{PageLayout, RasterImage, ReportHeader, RgbaImage};

    use super::*;

    fn document(height_px: u32) -> Document {
        let raster = RasterImage {
            pixels: RgbaImage::from_pixel(200, height_px, image::Rgba([40, 80, 120, 255])),
            scale: 1.0,
        };
        let plan = folio_pipeline::paginate::plan(raster.dimensions(), &PageLayout::default()).unwrap();
        folio_pipeline::document::assemble(&raster, &plan, &ReportHeader::new("Fleet", "Week 12"))
    }

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| *w == needle).count()
    }

    #[test]
    fn a4_is_595_by_842_points() {
        assert!((f64::from(to_pt(PageLayout::A4_WIDTH_MM)) - 595.27).abs() < 0.01);
        assert!((f64::from(to_pt(PageLayout::A4_HEIGHT_MM)) - 841.89).abs() < 0.01);
    }

    #[test]
    fn writes_a_well_formed_multi_page_file() {
        let doc = document(1000);
        let pages = doc.pages.len();
        assert!(pages > 1);
        let bytes = PdfEncoder::new().encode(&doc).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
        assert!(count(&bytes, b"startxref") == 1);
        assert!(bytes.ends_with(b"%%EOF") || bytes.ends_with(b"%%EOF\n"));
        assert_eq!(count(&bytes, format!("/Count {pages}").as_bytes()), 1);
        assert_eq!(count(&bytes, b"/Subtype /Image"), pages);
        assert_eq!(count(&bytes, b"/BaseFont /Helvetica-Bold"), 1);
    }

    #[test]
    fn uncompressed_content_shows_header_text() {
        let bytes = PdfEncoder::new()
            .with_compression(0)
            .encode(&document(10))
            .unwrap();
        assert_eq!(count(&bytes, b"(Fleet) Tj"), 1);
        assert_eq!(count(&bytes, b"(Week 12) Tj"), 1);
        assert_eq!(count(&bytes, b"/Im0 Do"), 1);
    }

    #[test]
    fn empty_document_is_rejected() {
        let doc = Document {
            page_width: 210.0,
            page_height: 297.0,
            pages: Vec::new(),
            title: String::new(),
        };
        assert!(matches!(PdfEncoder::new().encode(&doc), Err(PdfError::EmptyDocument)));
    }

    #[test]
    fn non_finite_geometry_is_rejected() {
        let mut doc = document(10);
        doc.pages[0].images[0].y = f64::NAN;
        assert!(matches!(
            PdfEncoder::new().encode(&doc),
            Err(PdfError::NonFinite(_))
        ));
    }

    #[test]
    fn encoder_reports_pdf_type() {
        let encoder = PdfEncoder::new();
        assert_eq!(encoder.mime_type(), "application/pdf");
        assert_eq!(encoder.extension(), "pdf");
    }
}
