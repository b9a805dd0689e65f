//! folio-io: Browser I/O and Dioxus components.
//!
//! Implements the `folio-pipeline` collaborator traits against the
//! browser: DOM access for capture preparation, chart surface probing,
//! `html2canvas` rasterization, `setTimeout` sleeps, Blob downloads and
//! a console logger. [`report::export_pdf`] wires them to the PDF
//! encoder, and [`ExportReportButton`] puts that behind a button.

pub mod charts;
pub mod components;
pub mod dom;
pub mod download;
pub mod logger;
pub mod raster;
pub mod report;
pub mod timer;

pub use charts::CanvasProbe;
pub use components::ExportReportButton;
pub use dom::{DomError, WebHost};
pub use download::{BrowserDownload, DownloadError};
pub use raster::{CaptureError, Html2Canvas};
pub use report::{export_pdf, shared_lock, today};
pub use timer::BrowserTimer;
