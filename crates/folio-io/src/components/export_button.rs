//! "Export PDF" button for a mounted report.

use dioxus::prelude::*;
use folio_pipeline::{ExportConfig, ExportRequest, PipelineState, ReportHeader, ReportProfile};

use crate::dom::WebHost;
use crate::{logger, report};

/// Props for the [`ExportReportButton`] component.
#[derive(Props, Clone, PartialEq)]
pub struct ExportReportButtonProps {
    /// CSS selector for the report's root element.
    target: String,
    /// Document title drawn on page 1.
    title: String,
    /// Line under the title; empty for none.
    #[props(default)]
    subtitle: String,
    /// Report kind used in the filename (e.g. `"aggregate"`).
    report_kind: String,
    /// Period label used in the filename (e.g. `"March 2024"`).
    #[props(default)]
    period_label: String,
    /// Which controls to strip from the capture.
    #[props(default)]
    profile: ReportProfile,
    /// Layout, capture and readiness settings.
    #[props(default)]
    config: ExportConfig,
}

/// Button that exports the report under `target` to a PDF download.
///
/// Disabled while its own export is in flight. Every button on the page
/// shares [`report::shared_lock`], so a click during another button's
/// export fails with the busy message. Failures show a generic
/// message; the detailed error goes to the console log.
#[component]
pub fn ExportReportButton(props: ExportReportButtonProps) -> Element {
    use_hook(|| logger::init(log::LevelFilter::Info));
    let lock = use_hook(report::shared_lock);
    let mut status = use_signal(|| PipelineState::Idle);
    let mut error = use_signal(|| Option::<&'static str>::None);
    let busy = !status().is_terminal() && status() != PipelineState::Idle;

    let onclick = move |_| {
        let lock = lock.clone();
        let props = props.clone();
        async move {
            error.set(None);
            let target = WebHost::new().ok().and_then(|host| host.find(&props.target));
            let request = ExportRequest::new(
                target,
                ReportHeader::new(props.title, props.subtitle),
                report::today(),
            )
            .named(props.report_kind, props.period_label)
            .with_profile(props.profile)
            .with_config(props.config);

            match report::export_pdf(request, &lock, |s| status.set(s)).await {
                Ok(outcome) => log::info!("downloaded {}", outcome.filename),
                Err(err) => error.set(Some(err.user_message())),
            }
        }
    };

    let enabled_class = "px-4 py-2 bg-[var(--btn-primary)] hover:bg-[var(--btn-primary-hover)] rounded text-white font-medium transition-colors cursor-pointer";
    let disabled_class =
        "px-4 py-2 bg-[var(--btn-disabled)] rounded text-[var(--text-disabled)] cursor-not-allowed";

    rsx! {
        div { class: "space-y-2 no-print",
            button {
                class: if busy { disabled_class } else { enabled_class },
                disabled: busy,
                onclick,
                if busy { "Exporting ({status})..." } else { "Export PDF" }
            }
            if let Some(message) = error() {
                p { class: "text-[var(--text-error)] text-sm", "{message}" }
            }
        }
    }
}
