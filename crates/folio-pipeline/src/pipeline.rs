//! The export pipeline: readiness, preparation, capture, pagination,
//! assembly and save, run strictly in sequence.
//!
//! [`export_report`] drives a whole export against a set of
//! [`Collaborators`]. The synchronous tail (from a captured bitmap to
//! saved bytes) is also exposed stage by stage, so offline tools can
//! feed a bitmap straight into pagination:
//!
//! ```rust
//! # use folio_pipeline::{Captured, PageLayout, PipelineError, RasterImage, ReportHeader, RgbaImage};
//! # fn run() -> Result<(), PipelineError> {
//! let raster = RasterImage { pixels: RgbaImage::new(1000, 4000), scale: 1.0 };
//! let assembled = Captured::new(raster, PageLayout::default(), ReportHeader::new("Deliveries", "March"))
//!     .paginate()?
//!     .assemble();
//! assert_eq!(assembled.document().pages.len(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next stage.

use std::fmt;
use std::time::Duration;

use crate::config::{ExportConfig, PageLayout, ReportProfile};
use crate::diagnostics::{ExportDiagnostics, StageDiagnostics, StageMetrics};
use crate::document::{assemble, Document, DocumentEncoder, DocumentSink, ReportHeader};
use crate::filename::{output_filename, IsoDate};
use crate::host::CaptureHost;
use crate::lock::ExportLock;
use crate::paginate::{plan, SlicePlan};
use crate::prepare::{prepare, CaptureTarget, PreparedSnapshot};
use crate::raster::{capture, RasterRequest, Rasterizer};
use crate::readiness::{wait_for_charts, ChartProbe, Clock, Timer};
use crate::types::{PipelineError, RasterImage};

// ───────────────────────── State machine ─────────────────────────────

/// Observable progress of one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Nothing running.
    Idle,
    /// Waiting for chart surfaces to lay out.
    WaitingForCharts,
    /// Isolating and laying out the capture subtree.
    Preparing,
    /// Rasterizing, then restoring the live page.
    Capturing,
    /// Planning page slices.
    Paginating,
    /// Building, encoding and saving the document.
    Assembling,
    /// The file was handed to the sink.
    Saved,
    /// The export failed; the page has already been restored.
    Failed,
}

impl PipelineState {
    /// Whether the export has finished, successfully or not.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Saved | Self::Failed)
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WaitingForCharts => "waiting for charts",
            Self::Preparing => "preparing",
            Self::Capturing => "capturing",
            Self::Paginating => "paginating",
            Self::Assembling => "assembling",
            Self::Saved => "saved",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ───────────────────────── Stage: Captured ───────────────────────────

/// A captured bitmap waiting to be paginated.
#[must_use = "pipeline stages are consumed by advancing; call .paginate() to continue"]
pub struct Captured {
    raster: RasterImage,
    layout: PageLayout,
    header: ReportHeader,
}

impl Captured {
    /// Start the document stages from an existing bitmap.
    pub const fn new(raster: RasterImage, layout: PageLayout, header: ReportHeader) -> Self {
        Self {
            raster,
            layout,
            header,
        }
    }

    /// The captured bitmap.
    #[must_use]
    pub const fn raster(&self) -> &RasterImage {
        &self.raster
    }

    /// Plan page slices and advance to [`Paginated`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PaginationImpossible`] for degenerate
    /// geometry.
    pub fn paginate(self) -> Result<Paginated, PipelineError> {
        let plan = plan(self.raster.dimensions(), &self.layout)?;
        Ok(Paginated {
            raster: self.raster,
            header: self.header,
            plan,
        })
    }
}

// ───────────────────────── Stage: Paginated ──────────────────────────

/// A bitmap with its slice plan.
#[must_use = "pipeline stages are consumed by advancing; call .assemble() to continue"]
pub struct Paginated {
    raster: RasterImage,
    header: ReportHeader,
    plan: SlicePlan,
}

impl Paginated {
    /// The slice plan.
    #[must_use]
    pub const fn plan(&self) -> &SlicePlan {
        &self.plan
    }

    /// Cut the bitmap and lay out pages. The full bitmap is released.
    pub fn assemble(self) -> Assembled {
        let document = assemble(&self.raster, &self.plan, &self.header);
        Assembled {
            document,
            plan: self.plan,
        }
    }
}

// ───────────────────────── Stage: Assembled ──────────────────────────

/// A laid-out document ready to encode.
#[must_use = "pipeline stages are consumed by advancing; call .encode() to continue"]
pub struct Assembled {
    document: Document,
    plan: SlicePlan,
}

impl Assembled {
    /// The assembled document.
    #[must_use]
    pub const fn document(&self) -> &Document {
        &self.document
    }

    /// The plan the document was built from.
    #[must_use]
    pub const fn plan(&self) -> &SlicePlan {
        &self.plan
    }

    /// Serialize the whole document.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Encode`] if the encoder fails.
    pub fn encode<E: DocumentEncoder + ?Sized>(self, encoder: &E) -> Result<Encoded, PipelineError> {
        let bytes = encoder
            .encode(&self.document)
            .map_err(|e| PipelineError::Encode(e.to_string()))?;
        Ok(Encoded {
            bytes,
            pages: self.document.pages.len(),
            slices: self.document.slice_count(),
            mime_type: encoder.mime_type(),
        })
    }
}

// ───────────────────────── Stage: Encoded ────────────────────────────

/// Fully encoded document bytes.
#[derive(Debug)]
pub struct Encoded {
    bytes: Vec<u8>,
    pages: usize,
    slices: usize,
    mime_type: &'static str,
}

impl Encoded {
    /// The encoded bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Take the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Page count.
    #[must_use]
    pub const fn pages(&self) -> usize {
        self.pages
    }

    /// Hand the bytes to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SaveFailure`] if the sink refuses.
    pub fn save<S: DocumentSink + ?Sized>(&self, sink: &S, filename: &str) -> Result<(), PipelineError> {
        sink.save(&self.bytes, filename, self.mime_type)
            .map_err(|e| PipelineError::SaveFailure(e.to_string()))
    }
}

// ───────────────────────── Entry point ───────────────────────────────

/// Everything needed for one export, supplied by the caller.
#[derive(Debug, Clone)]
pub struct ExportRequest<N> {
    /// Root of the rendered report, if mounted.
    pub target: Option<N>,
    /// Text header for page 1.
    pub header: ReportHeader,
    /// Report kind for the filename, e.g. `"aggregate"`.
    pub report_kind: String,
    /// Period label for the filename, e.g. `"March 2024"`.
    pub period_label: String,
    /// Date stamped into the filename.
    pub date: IsoDate,
    /// Exclusions and header handling.
    pub profile: ReportProfile,
    /// Layout, raster, readiness and preparation settings.
    pub config: ExportConfig,
}

impl<N> ExportRequest<N> {
    /// A generic-profile request with default configuration.
    #[must_use]
    pub fn new(target: Option<N>, header: ReportHeader, date: IsoDate) -> Self {
        Self {
            target,
            header,
            report_kind: "report".to_owned(),
            period_label: String::new(),
            date,
            profile: ReportProfile::generic(),
            config: ExportConfig::default(),
        }
    }

    /// Set the filename's kind and period.
    #[must_use]
    pub fn named(mut self, kind: impl Into<String>, period: impl Into<String>) -> Self {
        self.report_kind = kind.into();
        self.period_label = period.into();
        self
    }

    /// Use `profile`.
    #[must_use]
    pub fn with_profile(mut self, profile: ReportProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Use `config`.
    #[must_use]
    pub fn with_config(mut self, config: ExportConfig) -> Self {
        self.config = config;
        self
    }
}

/// The environment an export runs against.
#[derive(Debug)]
pub struct Collaborators<'a, H, P, R, T, C, E, S> {
    /// The document.
    pub host: &'a H,
    /// Chart surface inspection.
    pub probe: &'a P,
    /// Capture backend.
    pub rasterizer: &'a R,
    /// Sleep.
    pub timer: &'a T,
    /// Monotonic time.
    pub clock: &'a C,
    /// Document serializer.
    pub encoder: &'a E,
    /// File save.
    pub sink: &'a S,
}

/// A completed export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    /// Name the file was saved under.
    pub filename: String,
    /// Pages in the document.
    pub pages: usize,
    /// Encoded size.
    pub bytes: usize,
    /// Per-stage timing and counts.
    pub diagnostics: ExportDiagnostics,
}

/// Time a stage body against `clock`.
fn timed<C: Clock + ?Sized, T>(clock: &C, body: impl FnOnce() -> T) -> (T, Duration) {
    let started = clock.now();
    let value = body();
    (value, clock.elapsed(&started))
}

/// Export one report.
///
/// Takes `lock` for the whole run, reports every state transition to
/// `on_state`, and always restores the live page before returning. On
/// failure the error is logged in full and returned; show the user
/// [`PipelineError::user_message`] instead of the error itself.
///
/// A rejected [`PipelineError::Busy`] call emits no transitions.
///
/// # Errors
///
/// Any [`PipelineError`]. No bytes reach the sink unless every stage
/// before saving succeeded.
#[allow(clippy::future_not_send)]
pub async fn export_report<H, P, R, T, C, E, S, F>(
    request: ExportRequest<H::Node>,
    env: &Collaborators<'_, H, P, R, T, C, E, S>,
    lock: &ExportLock,
    mut on_state: F,
) -> Result<ExportOutcome, PipelineError>
where
    H: CaptureHost,
    P: ChartProbe,
    R: Rasterizer<H::Node>,
    T: Timer,
    C: Clock,
    E: DocumentEncoder,
    S: DocumentSink,
    F: FnMut(PipelineState),
{
    let _in_flight = lock.try_acquire().inspect_err(|_| {
        log::warn!("report export requested while another is in progress");
    })?;

    let result = run(request, env, &mut on_state).await;
    match &result {
        Ok(outcome) => {
            log::info!(
                "saved {} ({} pages, {} bytes)",
                outcome.filename,
                outcome.pages,
                outcome.bytes
            );
            on_state(PipelineState::Saved);
        }
        Err(err) => {
            log::error!("report export failed: {err}");
            on_state(PipelineState::Failed);
        }
    }
    result
}

#[allow(clippy::future_not_send, clippy::too_many_lines)]
async fn run<H, P, R, T, C, E, S, F>(
    request: ExportRequest<H::Node>,
    env: &Collaborators<'_, H, P, R, T, C, E, S>,
    on_state: &mut F,
) -> Result<ExportOutcome, PipelineError>
where
    H: CaptureHost,
    P: ChartProbe,
    R: Rasterizer<H::Node>,
    T: Timer,
    C: Clock,
    E: DocumentEncoder,
    S: DocumentSink,
    F: FnMut(PipelineState),
{
    let started = env.clock.now();
    let ExportRequest {
        target,
        header,
        report_kind,
        period_label,
        date,
        profile,
        config,
    } = request;

    config.validate()?;
    let target = CaptureTarget::new(target).excluding(profile.exclusion_selectors());
    if !target.root.as_ref().is_some_and(|root| env.host.is_attached(root)) {
        return Err(PipelineError::MissingTarget);
    }

    // Readiness
    on_state(PipelineState::WaitingForCharts);
    let readiness =
        wait_for_charts(env.probe, env.timer, env.clock, &config.readiness).await?;
    let readiness = StageDiagnostics {
        duration: readiness.waited,
        metrics: StageMetrics::Readiness {
            surfaces: readiness.surfaces,
            polls: readiness.polls,
        },
    };

    // Prepare
    on_state(PipelineState::Preparing);
    let (snapshot, prepare_time) = timed(env.clock, || prepare(env.host, &target, &config.prepare));
    let snapshot = snapshot?;
    let prepare_stage = StageDiagnostics {
        duration: prepare_time,
        metrics: StageMetrics::Prepare {
            width: snapshot.size.width,
            height: snapshot.size.height,
            excluded: snapshot.excluded,
        },
    };

    // Capture, then restore whatever happened.
    on_state(PipelineState::Capturing);
    let capture_started = env.clock.now();
    let raster_request = RasterRequest::new(snapshot.size, &config.raster);
    let captured = capture(env.rasterizer, &snapshot.node, &raster_request).await;
    let PreparedSnapshot { guard, .. } = snapshot;
    let restored = guard.restore();
    let raster = captured?;
    let capture_stage = StageDiagnostics {
        duration: env.clock.elapsed(&capture_started),
        metrics: StageMetrics::Capture {
            width: raster.pixels.width(),
            height: raster.pixels.height(),
            scale: raster.scale,
            restored: restored.styles_reverted + restored.containers_removed,
            restore_failures: restored.failures,
        },
    };

    // Paginate
    on_state(PipelineState::Paginating);
    let (paginated, paginate_time) = timed(env.clock, || {
        Captured::new(raster, config.layout.clone(), header).paginate()
    });
    let paginated = paginated?;
    let geometry = paginated.plan().geometry;
    let paginate_stage = StageDiagnostics {
        duration: paginate_time,
        metrics: StageMetrics::Paginate {
            pages: paginated.plan().page_count(),
            image_width: geometry.image_width,
            image_height: geometry.image_height,
        },
    };

    // Assemble, encode, save
    on_state(PipelineState::Assembling);
    let (assembled, assemble_time) = timed(env.clock, || paginated.assemble());
    let (encoded, encode_time) = timed(env.clock, || assembled.encode(env.encoder));
    let encoded = encoded?;
    let filename = output_filename(&report_kind, &period_label, date, env.encoder.extension());
    encoded.save(env.sink, &filename)?;

    let diagnostics = ExportDiagnostics {
        readiness,
        prepare: prepare_stage,
        capture: capture_stage,
        paginate: paginate_stage,
        assemble: StageDiagnostics {
            duration: assemble_time,
            metrics: StageMetrics::Assemble {
                slices: encoded.slices,
            },
        },
        encode: StageDiagnostics {
            duration: encode_time,
            metrics: StageMetrics::Encode {
                bytes: encoded.bytes.len(),
            },
        },
        total_duration: env.clock.elapsed(&started),
    };
    log::debug!("{}", diagnostics.report());

    Ok(ExportOutcome {
        filename,
        pages: encoded.pages,
        bytes: encoded.bytes.len(),
        diagnostics,
    })
}
