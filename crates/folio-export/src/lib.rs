//! folio-export: PDF serializer for assembled report documents (sans-IO)
//!
//! Implements [`folio_pipeline::DocumentEncoder`] for PDF. Header text is
//! written as real text in the standard Helvetica faces; captured slices
//! are embedded as compressed RGB images.

pub mod metrics;
pub mod pdf;

pub use pdf::{PdfEncoder, PdfError, PdfMetadata};
