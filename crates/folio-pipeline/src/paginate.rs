//! Pagination: fit a tall bitmap onto fixed-size pages.
//!
//! The bitmap is scaled to a fixed width, centered horizontally, and
//! cut into horizontal bands of whole source pixel rows. Page 1 starts
//! below the text header; later pages start at the top margin. Every
//! source row lands on exactly one page.
//!
//! All lengths are millimetres measured from the top-left page corner.

use std::ops::Range;

use serde::Serialize;

use crate::config::PageLayout;
use crate::types::{Dimensions, PipelineError};

/// Slack for comparisons between derived millimetre lengths.
const EPSILON_MM: f64 = 1e-9;

/// Page and image geometry derived from a layout and a bitmap size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageGeometry {
    /// Page width.
    pub page_width: f64,
    /// Page height.
    pub page_height: f64,
    /// Margin on every side.
    pub margin: f64,
    /// Top of the image on page 1.
    pub header_reservation: f64,
    /// Width the image is drawn at.
    pub image_width: f64,
    /// Height of the whole image at `image_width`.
    pub image_height: f64,
    /// Left edge of the image, identical on every page.
    pub x_offset: f64,
    /// Height of one source pixel row.
    pub mm_per_row: f64,
}

impl PageGeometry {
    /// Derive geometry for a `source`-sized bitmap.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PaginationImpossible`] if the bitmap is
    /// empty or the layout is degenerate.
    pub fn compute(source: Dimensions, layout: &PageLayout) -> Result<Self, PipelineError> {
        if source.is_empty() {
            return Err(PipelineError::PaginationImpossible(format!(
                "source bitmap is {source}"
            )));
        }
        layout
            .validate()
            .map_err(|e| PipelineError::PaginationImpossible(e.to_string()))?;

        let usable = layout.usable_width();
        let image_width = (usable * layout.content_fraction * layout.zoom)
            .clamp(0.0, usable * layout.max_fraction);
        if image_width <= 0.0 {
            return Err(PipelineError::PaginationImpossible(
                "image width collapsed to zero".into(),
            ));
        }
        let mm_per_row = image_width / f64::from(source.width);
        Ok(Self {
            page_width: layout.page_width,
            page_height: layout.page_height,
            margin: layout.margin,
            header_reservation: layout.header_reservation,
            image_width,
            image_height: mm_per_row * f64::from(source.height),
            x_offset: (layout.page_width - image_width) / 2.0,
            mm_per_row,
        })
    }

    /// Top of the image band on `page` (0-based).
    #[must_use]
    pub fn band_top(&self, page: usize) -> f64 {
        if page == 0 {
            self.header_reservation
        } else {
            self.margin
        }
    }

    /// Height available for image content on `page` (0-based).
    #[must_use]
    pub fn available(&self, page: usize) -> f64 {
        self.page_height - self.band_top(page) - self.margin
    }

    /// Whether the whole image fits on page 1.
    #[must_use]
    pub fn fits_single_page(&self) -> bool {
        self.image_height <= self.available(0) + EPSILON_MM
    }
}

/// One band of source rows placed on one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slice {
    /// Page index (0-based).
    pub page: usize,
    /// Top edge on the page.
    pub top: f64,
    /// Drawn height.
    pub height: f64,
    /// Source pixel rows.
    pub rows: Range<u32>,
}

/// Where every part of the bitmap goes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlicePlan {
    /// Geometry shared by every slice.
    pub geometry: PageGeometry,
    /// Slices in page order.
    pub slices: Vec<Slice>,
}

impl SlicePlan {
    /// Number of pages.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.slices.last().map_or(0, |s| s.page + 1)
    }

    /// Sum of every slice height.
    #[must_use]
    pub fn total_height(&self) -> f64 {
        self.slices.iter().map(|s| s.height).sum()
    }
}

/// Plan the slices for a `source`-sized bitmap.
///
/// Slices are whole source rows, so a row is never split across pages.
/// A very narrow bitmap scaled up to the image width can have rows
/// taller than a page band; such a bitmap cannot be paginated and the
/// caller should capture it at a higher scale.
///
/// # Errors
///
/// Returns [`PipelineError::PaginationImpossible`] for degenerate
/// geometry, or when a single source row is taller than a page band.
pub fn plan(source: Dimensions, layout: &PageLayout) -> Result<SlicePlan, PipelineError> {
    let geometry = PageGeometry::compute(source, layout)?;

    if geometry.fits_single_page() {
        log::debug!("{source} bitmap fits on one page");
        return Ok(SlicePlan {
            geometry,
            slices: vec![Slice {
                page: 0,
                top: geometry.band_top(0),
                height: geometry.image_height,
                rows: 0..source.height,
            }],
        });
    }

    let narrowest = geometry.available(0).min(geometry.available(1));
    if geometry.mm_per_row > narrowest + EPSILON_MM {
        return Err(PipelineError::PaginationImpossible(format!(
            "one source row is {:.3} mm tall but a page band is only {narrowest:.3} mm",
            geometry.mm_per_row
        )));
    }

    let mut slices = Vec::new();
    let mut row = 0u32;
    while row < source.height {
        let page = slices.len();
        let remaining = source.height - row;
        let rows = rows_that_fit(geometry.available(page), geometry.mm_per_row).clamp(1, remaining);
        slices.push(Slice {
            page,
            top: geometry.band_top(page),
            height: f64::from(rows) * geometry.mm_per_row,
            rows: row..row + rows,
        });
        row += rows;
    }

    log::debug!(
        "{source} bitmap split into {} pages ({:.2} mm tall at {:.2} mm wide)",
        slices.len(),
        geometry.image_height,
        geometry.image_width
    );
    Ok(SlicePlan { geometry, slices })
}

/// Whole rows of height `mm_per_row` fitting in `available`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn rows_that_fit(available: f64, mm_per_row: f64) -> u32 {
    let rows = (available / mm_per_row + EPSILON_MM).floor();
    if rows >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        rows.max(0.0) as u32
    }
}
