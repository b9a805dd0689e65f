//! One-call browser export: DOM capture to a downloaded PDF.

use folio_export::PdfEncoder;
use folio_pipeline::{
    Collaborators, ExportLock, ExportOutcome, ExportRequest, IsoDate, PipelineError,
    PipelineState, SystemClock, export_report,
};
use web_sys::Element;

use crate::charts::CanvasProbe;
use crate::dom::WebHost;
use crate::download::BrowserDownload;
use crate::raster::Html2Canvas;
use crate::timer::BrowserTimer;

thread_local! {
    static PAGE_LOCK: ExportLock = ExportLock::new();
}

/// The page-wide export lock.
///
/// Every handle shares one flag, so exports started from different
/// buttons on the same page never overlap.
#[must_use]
pub fn shared_lock() -> ExportLock {
    PAGE_LOCK.with(ExportLock::clone)
}

/// Today's date in the browser's local time zone.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn today() -> IsoDate {
    let now = js_sys::Date::new_0();
    IsoDate::new(
        now.get_full_year() as i32,
        (now.get_month() + 1) as u8,
        now.get_date() as u8,
    )
}

/// Export the report rooted at `request.target` as a PDF download.
///
/// Chart readiness is probed under the same root.
///
/// # Errors
///
/// Any [`PipelineError`]; show [`PipelineError::user_message`] to the
/// user.
#[allow(clippy::future_not_send)] // WASM is single-threaded; DOM handles are !Send
pub async fn export_pdf<F>(
    request: ExportRequest<Element>,
    lock: &ExportLock,
    on_state: F,
) -> Result<ExportOutcome, PipelineError>
where
    F: FnMut(PipelineState),
{
    let host = WebHost::new().map_err(|e| {
        log::error!("cannot export without a document: {e}");
        PipelineError::MissingTarget
    })?;
    // Without a target the pipeline fails with MissingTarget; the probe
    // still needs a root.
    let Some(probe_root) = request.target.clone().or_else(|| host.find("html")) else {
        return Err(PipelineError::MissingTarget);
    };

    let probe = CanvasProbe::new(probe_root);
    let encoder = PdfEncoder::new();
    let env = Collaborators {
        host: &host,
        probe: &probe,
        rasterizer: &Html2Canvas,
        timer: &BrowserTimer,
        clock: &SystemClock,
        encoder: &encoder,
        sink: &BrowserDownload,
    };
    export_report(request, &env, lock, on_state).await
}
