//! Integration test: export a tall in-memory report through the full pipeline to PDF.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::PathBuf;

use folio_export::PdfEncoder;
use folio_pipeline::testing::{FakeHost, FakeProbe, FakeRasterizer, ManualClock, MemorySink};
use folio_pipeline::{
    Collaborators, Dimensions, ExportConfig, ExportLock, ExportRequest, IsoDate, PipelineState,
    PrepareStrategy, ReportHeader, ReportProfile, export_report,
};

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .filter(|w| *w == needle)
        .count()
}

#[test]
fn tall_aggregate_report_exports_to_three_page_pdf() {
    let host = FakeHost::new();
    let root = host.append(&host.body(), "main.report");
    host.set_scroll_size(&root, Dimensions::new(1000, 4000));
    host.append(&root, "div.report-header");
    host.append(&root, "div.report-filters");
    host.append(&root, "canvas.chart");
    let before = host.subtree_styles(&host.body());

    let probe = FakeProbe::new(vec![Dimensions::new(800, 400)]).rendered_after(2);
    let clock = ManualClock::default();
    let rasterizer = FakeRasterizer::solid(image::Rgba([250, 250, 250, 255]));
    let encoder = PdfEncoder::new().with_compression(0);
    let sink = MemorySink::default();

    let mut config = ExportConfig::default();
    config.layout.header_reservation = 60.0;
    config.prepare.min_size = Dimensions::new(0, 0);
    config.raster.scale = 1.0;

    let request = ExportRequest::new(
        Some(root),
        ReportHeader::new("Fleet Deliveries", "March 2024"),
        IsoDate::new(2024, 4, 2),
    )
    .named("Aggregate", "March 2024")
    .with_profile(ReportProfile::aggregate())
    .with_config(config);

    let env = Collaborators {
        host: &host,
        probe: &probe,
        rasterizer: &rasterizer,
        timer: &clock,
        clock: &clock,
        encoder: &encoder,
        sink: &sink,
    };
    let mut states = Vec::new();
    let outcome = futures::executor::block_on(export_report(
        request,
        &env,
        &ExportLock::new(),
        |s| states.push(s),
    ))
    .expect("export should succeed");

    assert_eq!(outcome.filename, "aggregate-march-2024-2024-04-02.pdf");
    assert_eq!(outcome.pages, 3);
    assert_eq!(states.last(), Some(&PipelineState::Saved));
    assert_eq!(probe.polls(), 3);

    let saved = sink.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].mime_type, "application/pdf");
    let pdf = &saved[0].bytes;
    assert!(pdf.starts_with(b"%PDF-"));
    assert_eq!(count(pdf, b"startxref"), 1);
    assert_eq!(count(pdf, b"/Count 3"), 1);
    assert_eq!(count(pdf, b"/Subtype /Image"), 3);
    assert_eq!(count(pdf, b"(Fleet Deliveries) Tj"), 1);
    assert_eq!(count(pdf, b"(March 2024) Tj"), 1);

    // The live report is exactly as it was.
    assert_eq!(host.live_containers(), 0);
    assert_eq!(host.subtree_styles(&host.body()), before);

    let workspace_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf();
    let target_dir = workspace_root.join("target");
    std::fs::create_dir_all(&target_dir).unwrap();
    let output_path = target_dir.join(&outcome.filename);
    std::fs::write(&output_path, pdf).unwrap();
    eprintln!("PDF written to {output_path:?} ({} bytes)", pdf.len());
}

#[test]
fn in_place_capture_exports_and_restores() {
    let host = FakeHost::new();
    let root = host.append(&host.body(), "section.report");
    host.set_scroll_size(&root, Dimensions::new(600, 300));
    let controls = host.append(&root, "div.report-actions");
    host.append(&controls, "button");
    host.append(&root, "svg.chart");
    let before = host.subtree_styles(&host.body());

    let probe = FakeProbe::new(vec![Dimensions::new(600, 200)]);
    let clock = ManualClock::default();
    let rasterizer = FakeRasterizer::solid(image::Rgba([0, 0, 0, 0]));
    let encoder = PdfEncoder::new();
    let sink = MemorySink::default();

    let mut config = ExportConfig::default();
    config.prepare.strategy = PrepareStrategy::InPlace;
    let request = ExportRequest::new(
        Some(root),
        ReportHeader::new("Driver", "Week 14"),
        IsoDate::new(2024, 4, 5),
    )
    .named("Individual", "Week 14")
    .with_profile(ReportProfile::individual())
    .with_config(config);

    let env = Collaborators {
        host: &host,
        probe: &probe,
        rasterizer: &rasterizer,
        timer: &clock,
        clock: &clock,
        encoder: &encoder,
        sink: &sink,
    };
    let outcome = futures::executor::block_on(export_report(
        request,
        &env,
        &ExportLock::new(),
        |_| {},
    ))
    .unwrap();

    assert_eq!(outcome.pages, 1);
    assert_eq!(outcome.filename, "individual-week-14-2024-04-05.pdf");
    // 600x300 forced up to the 1400 px minimum width at 2x.
    let request = rasterizer.last_request().unwrap();
    assert_eq!(request.size, Dimensions::new(1400, 300));
    let folio_pipeline::StageMetrics::Capture {
        width,
        height,
        restored,
        restore_failures,
        ..
    } = outcome.diagnostics.capture.metrics
    else {
        panic!("capture stage reported {:?}", outcome.diagnostics.capture.metrics);
    };
    assert_eq!((width, height), (2800, 600));
    assert!(restored > 0);
    assert_eq!(restore_failures, 0);
    assert_eq!(host.subtree_styles(&host.body()), before);
}
