//! folio-bench: CLI tool for page-geometry experimentation and diagnostics.
//!
//! Takes a captured report bitmap (e.g. a full-page screenshot) and
//! runs the document half of the pipeline on it: pagination, assembly
//! and PDF encoding. Useful for:
//!
//! - Checking where page breaks fall for a given layout
//! - Tuning margins and header reservation against real captures
//! - Measuring assembly and encoding cost for very tall reports
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin folio-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use folio_export::PdfEncoder;
use folio_pipeline::raster::flatten;
use folio_pipeline::{
    Captured, Clock, PageGeometry, PageLayout, PipelineError, RasterImage, ReportHeader, Rgb, Slice,
    StageDiagnostics, StageMetrics, SystemClock,
};
use serde::Serialize;

/// Page-geometry experimentation and diagnostics for folio.
///
/// Paginates a captured report bitmap into a PDF with configurable
/// layout and prints the slice plan and per-stage timings.
#[derive(Parser)]
#[command(name = "folio-bench", version)]
struct Cli {
    /// Path to the captured bitmap (PNG or JPEG).
    image_path: PathBuf,

    /// Page width in millimetres.
    #[arg(long, default_value_t = PageLayout::A4_WIDTH_MM)]
    page_width: f64,

    /// Page height in millimetres.
    #[arg(long, default_value_t = PageLayout::A4_HEIGHT_MM)]
    page_height: f64,

    /// Margin on every side in millimetres.
    #[arg(long, default_value_t = PageLayout::DEFAULT_MARGIN_MM)]
    margin: f64,

    /// Space reserved for the header on page 1, in millimetres.
    #[arg(long, default_value_t = PageLayout::DEFAULT_HEADER_RESERVATION_MM)]
    header_reservation: f64,

    /// Device-pixel scale the bitmap was captured at.
    #[arg(long, default_value_t = 2.0)]
    scale: f64,

    /// Background composited under transparent pixels.
    #[arg(long, default_value = "#ffffff")]
    background: Rgb,

    /// Document title drawn on page 1.
    #[arg(long, default_value = "")]
    title: String,

    /// Line drawn under the title.
    #[arg(long, default_value = "")]
    subtitle: String,

    /// Write the PDF to this file.
    #[arg(long)]
    pdf: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Full export config as a JSON string.
    ///
    /// When provided, the layout and background flags are ignored. The
    /// JSON must be a valid `ExportConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// Diagnostics for one run.
#[derive(Serialize)]
struct BenchReport {
    geometry: PageGeometry,
    slices: Vec<Slice>,
    paginate: StageDiagnostics,
    assemble: StageDiagnostics,
    encode: StageDiagnostics,
}

impl BenchReport {
    fn stages(&self) -> [(&'static str, &StageDiagnostics); 3] {
        [
            ("paginate", &self.paginate),
            ("assemble", &self.assemble),
            ("encode", &self.encode),
        ]
    }

    fn report(&self) -> String {
        use std::fmt::Write;

        let g = &self.geometry;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Page: {:.1} x {:.1} mm, margin {:.1} mm, header {:.1} mm",
            g.page_width, g.page_height, g.margin, g.header_reservation
        );
        let _ = writeln!(
            out,
            "Image: {:.2} x {:.2} mm at x = {:.2} mm ({:.5} mm per row)",
            g.image_width, g.image_height, g.x_offset, g.mm_per_row
        );
        let _ = writeln!(out, "{}", "=".repeat(60));
        let _ = writeln!(out, "{:>5}  {:>13}  {:>9}  {:>9}", "page", "rows", "top mm", "height mm");
        for slice in &self.slices {
            let rows = format!("{}..{}", slice.rows.start, slice.rows.end);
            let _ = writeln!(
                out,
                "{:>5}  {rows:>13}  {:>9.2}  {:>9.2}",
                slice.page + 1,
                slice.top,
                slice.height
            );
        }
        let _ = writeln!(out, "{}", "-".repeat(60));
        for (name, stage) in self.stages() {
            let _ = writeln!(
                out,
                "{name:<10} {:>10.3} ms  {}",
                stage.duration.as_secs_f64() * 1000.0,
                metrics_summary(&stage.metrics)
            );
        }
        out
    }
}

fn metrics_summary(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Paginate { pages, .. } => format!("{pages} pages"),
        StageMetrics::Assemble { slices } => format!("{slices} slices"),
        StageMetrics::Encode { bytes } => format!("{bytes} bytes"),
        other => format!("{other:?}"),
    }
}

/// Build the page layout and background from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual layout flags are ignored.
fn layout_from_cli(cli: &Cli) -> Result<(PageLayout, Rgb), String> {
    if let Some(ref json) = cli.config_json {
        let config: folio_pipeline::ExportConfig =
            serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?;
        config.validate().map_err(|e| e.to_string())?;
        return Ok((config.layout, config.raster.background));
    }

    let layout = PageLayout {
        page_width: cli.page_width,
        page_height: cli.page_height,
        margin: cli.margin,
        header_reservation: cli.header_reservation,
        ..PageLayout::default()
    };
    layout.validate().map_err(|e| e.to_string())?;
    Ok((layout, cli.background))
}

fn timed<T>(body: impl FnOnce() -> T) -> (T, Duration) {
    let clock = SystemClock;
    let started = clock.now();
    let value = body();
    (value, clock.elapsed(&started))
}

/// Run pagination, assembly and encoding once.
fn run_once(
    raster: &RasterImage,
    layout: &PageLayout,
    header: &ReportHeader,
    encoder: &PdfEncoder,
) -> Result<(BenchReport, Vec<u8>), PipelineError> {
    let (paginated, paginate_time) =
        timed(|| Captured::new(raster.clone(), layout.clone(), header.clone()).paginate());
    let paginated = paginated?;
    let plan = paginated.plan().clone();

    let (assembled, assemble_time) = timed(|| paginated.assemble());
    let slices = assembled.document().slice_count();
    let (encoded, encode_time) = timed(|| assembled.encode(encoder));
    let bytes = encoded?.into_bytes();

    let report = BenchReport {
        geometry: plan.geometry,
        paginate: StageDiagnostics {
            duration: paginate_time,
            metrics: StageMetrics::Paginate {
                pages: plan.page_count(),
                image_width: plan.geometry.image_width,
                image_height: plan.geometry.image_height,
            },
        },
        slices: plan.slices,
        assemble: StageDiagnostics {
            duration: assemble_time,
            metrics: StageMetrics::Assemble { slices },
        },
        encode: StageDiagnostics {
            duration: encode_time,
            metrics: StageMetrics::Encode { bytes: bytes.len() },
        },
    };
    Ok((report, bytes))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let (layout, background) = match layout_from_cli(&cli) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let mut pixels = match image::open(&cli.image_path) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };
    flatten(&mut pixels, background);
    let raster = RasterImage {
        pixels,
        scale: cli.scale,
    };

    eprintln!(
        "Image: {} ({}x{} px)",
        cli.image_path.display(),
        raster.pixels.width(),
        raster.pixels.height(),
    );
    eprintln!("Layout: {layout:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let header = ReportHeader::new(cli.title.clone(), cli.subtitle.clone());
    let encoder = PdfEncoder::new();
    let mut totals = [Duration::ZERO; 3];

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let (report, bytes) = match run_once(&raster, &layout, &header, &encoder) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        };

        if cli.json {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            println!("{}", report.report());
        }

        // Write the PDF on the first run only.
        if run == 0
            && let Some(ref pdf_path) = cli.pdf
        {
            match std::fs::write(pdf_path, &bytes) {
                Ok(()) => eprintln!("PDF written to {} ({} bytes)", pdf_path.display(), bytes.len()),
                Err(e) => eprintln!("Error writing PDF to {}: {e}", pdf_path.display()),
            }
        }

        for (total, (_, stage)) in totals.iter_mut().zip(report.stages()) {
            *total += stage.duration;
        }
    }

    if cli.runs > 1 {
        print_average(&totals, cli.runs);
    }

    ExitCode::SUCCESS
}

/// Print mean per-stage durations across runs.
#[allow(clippy::cast_precision_loss)]
fn print_average(totals: &[Duration; 3], runs: usize) {
    println!();
    println!("Average over {runs} runs\n{}", "=".repeat(60));
    for (name, total) in ["paginate", "assemble", "encode"].iter().zip(totals) {
        println!(
            "{name:<10} {:>10.3} ms",
            total.as_secs_f64() * 1000.0 / runs as f64
        );
    }
}
