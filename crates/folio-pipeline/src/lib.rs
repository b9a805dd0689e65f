//! folio-pipeline: Pure report-to-document pipeline (sans-IO).
//!
//! Turns a live, chart-heavy report into a multi-page fixed-size
//! document through:
//! readiness gate -> snapshot preparation -> rasterization ->
//! pagination -> document assembly -> save,
//! with a restoration guard undoing every live page mutation.
//!
//! This crate has **no I/O dependencies** -- the DOM, the capture
//! backend, timers and the file save are reached through traits
//! ([`CaptureHost`], [`ChartProbe`], [`Rasterizer`], [`Timer`],
//! [`Clock`], [`DocumentEncoder`], [`DocumentSink`]). Browser
//! implementations live in `folio-io`; the PDF encoder lives in
//! `folio-export`.

pub mod config;
pub mod diagnostics;
pub mod document;
pub mod filename;
pub mod host;
pub mod lock;
pub mod paginate;
pub mod pipeline;
pub mod prepare;
pub mod raster;
pub mod readiness;
pub mod restore;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{
    ExportConfig, PageLayout, PrepareConfig, PrepareStrategy, RasterOptions, ReadinessConfig,
    ReportProfile,
};
pub use diagnostics::{ExportDiagnostics, StageDiagnostics, StageMetrics};
pub use document::{
    Document, DocumentEncoder, DocumentSink, FontWeight, Page, PlacedImage, ReportHeader, TextLine,
};
pub use filename::{output_filename, IsoDate};
pub use host::CaptureHost;
pub use lock::{ExportLock, InFlight};
pub use paginate::{PageGeometry, Slice, SlicePlan};
pub use pipeline::{
    export_report, Assembled, Captured, Collaborators, Encoded, ExportOutcome, ExportRequest,
    Paginated, PipelineState,
};
pub use prepare::{CaptureTarget, PreparedSnapshot};
pub use raster::{RasterOutput, RasterRequest, Rasterizer};
pub use readiness::{ChartProbe, Clock, ReadinessReport, SystemClock, Timer};
pub use restore::{RestorationGuard, RestorationRecord, RestoreReport};
pub use types::{
    Dimensions, HostError, PipelineError, RasterImage, Rgb, RgbaImage, GENERIC_FAILURE_MESSAGE,
};
