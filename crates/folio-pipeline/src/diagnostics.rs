//! Export diagnostics: timing and counts for each pipeline stage.
//!
//! Every successful [`export_report`](crate::export_report) returns an
//! [`ExportDiagnostics`] alongside the saved filename. The bench CLI
//! prints the same structure for offline runs.
//!
//! Durations are serialized as fractional seconds (`f64`), since
//! `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom("duration seconds must be finite and non-negative")
        })
    }
}

/// Wall-clock time and metrics for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Time spent in the stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Metrics that vary by stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Readiness gate.
    Readiness {
        /// Chart surfaces seen on the final poll.
        surfaces: usize,
        /// Inspections performed.
        polls: u32,
    },
    /// Snapshot preparation.
    Prepare {
        /// Forced layout width in CSS pixels.
        width: u32,
        /// Forced layout height in CSS pixels.
        height: u32,
        /// Nodes removed or hidden.
        excluded: usize,
    },
    /// Rasterization, including restoration of the live page.
    Capture {
        /// Bitmap width in pixels.
        width: u32,
        /// Bitmap height in pixels.
        height: u32,
        /// Effective device-pixel scale.
        scale: f64,
        /// Live mutations reverted afterwards.
        restored: usize,
        /// Reverts that failed.
        restore_failures: usize,
    },
    /// Slice planning.
    Paginate {
        /// Pages in the plan.
        pages: usize,
        /// Drawn image width (mm).
        image_width: f64,
        /// Drawn image height (mm).
        image_height: f64,
    },
    /// Cutting slices and laying out pages.
    Assemble {
        /// Image slices placed.
        slices: usize,
    },
    /// Serializing the document.
    Encode {
        /// Encoded size.
        bytes: usize,
    },
}

/// Diagnostics for one complete export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDiagnostics {
    /// Readiness gate.
    pub readiness: StageDiagnostics,
    /// Snapshot preparation.
    pub prepare: StageDiagnostics,
    /// Rasterization and restoration.
    pub capture: StageDiagnostics,
    /// Slice planning.
    pub paginate: StageDiagnostics,
    /// Page layout.
    pub assemble: StageDiagnostics,
    /// Encoding.
    pub encode: StageDiagnostics,
    /// Total time from lock acquisition to save (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl ExportDiagnostics {
    /// Human-readable multi-line summary.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Export Diagnostics\n{}", "=".repeat(60)));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration)
        ));
        lines.push(String::new());
        lines.push(format!("{:<12} {:>10}  {}", "Stage", "Duration", "Details"));
        lines.push("-".repeat(60));

        let stages = [
            ("Readiness", &self.readiness),
            ("Prepare", &self.prepare),
            ("Capture", &self.capture),
            ("Paginate", &self.paginate),
            ("Assemble", &self.assemble),
            ("Encode", &self.encode),
        ];
        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<12} {ms:>8.3}ms  {details}"));
        }
        lines.join("\n")
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Readiness { surfaces, polls } => {
            format!("{surfaces} surfaces, {polls} polls")
        }
        StageMetrics::Prepare {
            width,
            height,
            excluded,
        } => format!("{width}x{height} css px, {excluded} excluded"),
        StageMetrics::Capture {
            width,
            height,
            scale,
            restored,
            restore_failures,
        } => format!(
            "{width}x{height} px at {scale:.2}x, {restored} restored ({restore_failures} failed)"
        ),
        StageMetrics::Paginate {
            pages,
            image_width,
            image_height,
        } => format!("{pages} pages, image {image_width:.1}x{image_height:.1} mm"),
        StageMetrics::Assemble { slices } => format!("{slices} slices"),
        StageMetrics::Encode { bytes } => format!("{bytes} bytes"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stage(ms: u64, metrics: StageMetrics) -> StageDiagnostics {
        StageDiagnostics {
            duration: Duration::from_millis(ms),
            metrics,
        }
    }

    fn sample() -> ExportDiagnostics {
        ExportDiagnostics {
            readiness: stage(
                300,
                StageMetrics::Readiness {
                    surfaces: 3,
                    polls: 1,
                },
            ),
            prepare: stage(
                4,
                StageMetrics::Prepare {
                    width: 1400,
                    height: 3000,
                    excluded: 5,
                },
            ),
            capture: stage(
                850,
                StageMetrics::Capture {
                    width: 2800,
                    height: 6000,
                    scale: 2.0,
                    restored: 1,
                    restore_failures: 0,
                },
            ),
            paginate: stage(0, StageMetrics::Paginate {
                pages: 3,
                image_width: 180.0,
                image_height: 385.7,
            }),
            assemble: stage(12, StageMetrics::Assemble { slices: 3 }),
            encode: stage(40, StageMetrics::Encode { bytes: 123_456 }),
            total_duration: Duration::from_millis(1206),
        }
    }

    #[test]
    fn report_lists_every_stage() {
        let report = sample().report();
        for name in ["Readiness", "Prepare", "Capture", "Paginate", "Assemble", "Encode"] {
            assert!(report.contains(name), "missing {name}");
        }
        assert!(report.contains("2800x6000 px at 2.00x"));
        assert!(report.contains("1206.000ms"));
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.contains("\"total_duration\":1.206"));
        let back: ExportDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.capture.metrics, sample().capture.metrics);
        assert!((back.total_duration.as_secs_f64() - 1.206).abs() < 1e-9);
    }
}
