//! Export configuration: page layout, raster options, readiness
//! timing, and snapshot preparation.
//!
//! All types are serde-compatible so a full configuration can be
//! embedded as JSON (e.g. the bench CLI's `--config-json`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, PipelineError, Rgb};

/// Page size, margins and image scaling for the paginator.
///
/// All lengths are in millimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLayout {
    /// Page width.
    pub page_width: f64,
    /// Page height.
    pub page_height: f64,
    /// Margin applied on all sides.
    pub margin: f64,
    /// Top offset of the image on page 1, leaving room for the text
    /// header. Later pages start at `margin`.
    pub header_reservation: f64,
    /// Fraction of the usable width the image nominally occupies.
    pub content_fraction: f64,
    /// Zoom multiplier applied on top of `content_fraction`.
    pub zoom: f64,
    /// Upper bound on the image width as a fraction of usable width.
    /// Must be in `(0, 1]` so the image never overflows the margins.
    pub max_fraction: f64,
}

impl PageLayout {
    /// ISO A4 portrait width.
    pub const A4_WIDTH_MM: f64 = 210.0;
    /// ISO A4 portrait height.
    pub const A4_HEIGHT_MM: f64 = 297.0;
    /// Default margin on all sides.
    pub const DEFAULT_MARGIN_MM: f64 = 15.0;
    /// Default page-1 header reservation.
    pub const DEFAULT_HEADER_RESERVATION_MM: f64 = 40.0;
    /// Height of the title and subtitle block below the top margin.
    pub const HEADER_EXTENT_MM: f64 = 20.0;

    /// Width available between the side margins.
    #[must_use]
    pub fn usable_width(&self) -> f64 {
        self.margin.mul_add(-2.0, self.page_width)
    }

    /// Check that every length is finite and the geometry leaves room
    /// for content on both the first and the continuation pages.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// violated constraint.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let fields = [
            ("page_width", self.page_width),
            ("page_height", self.page_height),
            ("margin", self.margin),
            ("header_reservation", self.header_reservation),
            ("content_fraction", self.content_fraction),
            ("zoom", self.zoom),
            ("max_fraction", self.max_fraction),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        if self.margin < 0.0 || self.header_reservation < 0.0 {
            return Err(PipelineError::InvalidConfig(
                "margin and header_reservation must not be negative".into(),
            ));
        }
        if self.header_reservation < self.margin + Self::HEADER_EXTENT_MM {
            return Err(PipelineError::InvalidConfig(format!(
                "header reservation ({} mm) must cover the {} mm margin and the {} mm header",
                self.header_reservation,
                self.margin,
                Self::HEADER_EXTENT_MM
            )));
        }
        if self.usable_width() <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "margins ({} mm) leave no usable width on a {} mm page",
                self.margin, self.page_width
            )));
        }
        if self.margin.mul_add(-2.0, self.page_height) <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "margins ({} mm) leave no usable height on a {} mm page",
                self.margin, self.page_height
            )));
        }
        if self.page_height - self.header_reservation - self.margin <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "header reservation ({} mm) leaves no room for content on page 1",
                self.header_reservation
            )));
        }
        if self.content_fraction <= 0.0 || self.zoom <= 0.0 {
            return Err(PipelineError::InvalidConfig(
                "content_fraction and zoom must be positive".into(),
            ));
        }
        if self.max_fraction <= 0.0 || self.max_fraction > 1.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "max_fraction must be in (0, 1], got {}",
                self.max_fraction
            )));
        }
        Ok(())
    }
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            page_width: Self::A4_WIDTH_MM,
            page_height: Self::A4_HEIGHT_MM,
            margin: Self::DEFAULT_MARGIN_MM,
            header_reservation: Self::DEFAULT_HEADER_RESERVATION_MM,
            content_fraction: 1.0,
            zoom: 1.0,
            max_fraction: 1.0,
        }
    }
}

/// Options handed to the capture backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterOptions {
    /// Requested device-pixel scale.
    pub scale: f64,
    /// Upper bound on the output bitmap's pixel count. The effective
    /// scale is reduced so `width * height * scale²` stays below it.
    pub max_raster_pixels: u64,
    /// Fill color behind transparent content.
    pub background: Rgb,
    /// How long to wait for embedded cross-origin images. Exceeding it
    /// is not an error; the capture proceeds with what has loaded.
    #[serde(with = "duration_millis")]
    pub resource_timeout: Duration,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            scale: 2.0,
            max_raster_pixels: 32_000_000,
            background: Rgb::WHITE,
            resource_timeout: Duration::from_secs(15),
        }
    }
}

/// Timing for the chart readiness gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Delay before the first inspection.
    #[serde(with = "duration_millis")]
    pub grace_delay: Duration,
    /// Delay between inspections.
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
    /// Give up after this long (measured from the start of the gate).
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            grace_delay: Duration::from_millis(300),
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_secs(10),
        }
    }
}

/// How the snapshot preparator isolates the capture from the live page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrepareStrategy {
    /// Deep-clone the target into an off-screen container and mutate
    /// only the clone.
    #[default]
    DetachedClone,
    /// Mutate the live subtree, recording every original value so the
    /// restoration guard can revert it.
    InPlace,
}

/// Snapshot preparation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepareConfig {
    /// Isolation strategy.
    pub strategy: PrepareStrategy,
    /// Minimum forced layout size in CSS pixels. Responsive layouts are
    /// forced at least this large so they expand instead of clipping at
    /// the viewport width.
    pub min_size: Dimensions,
    /// Explicit size overrides; each axis is used when larger than the
    /// measured scroll size.
    pub size_override: Option<Dimensions>,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            strategy: PrepareStrategy::default(),
            min_size: Dimensions::new(1400, 0),
            size_override: None,
        }
    }
}

/// Complete configuration for one export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Paginator layout.
    pub layout: PageLayout,
    /// Capture backend options.
    pub raster: RasterOptions,
    /// Readiness gate timing.
    pub readiness: ReadinessConfig,
    /// Snapshot preparation.
    pub prepare: PrepareConfig,
}

impl ExportConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for the first invalid value.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.layout.validate()?;
        if !self.raster.scale.is_finite() || self.raster.scale <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "raster scale must be positive, got {}",
                self.raster.scale
            )));
        }
        if self.raster.max_raster_pixels == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_raster_pixels must be positive".into(),
            ));
        }
        if self.readiness.poll_interval.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "readiness poll_interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Which report flavour is being exported.
///
/// The generic, aggregate and individual reports share one pipeline;
/// they differ only in which controls are excluded from the capture
/// and whether the on-screen report header is dropped (the document
/// draws its own text header instead).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportProfile {
    /// Selectors for nodes excluded from the capture.
    pub exclude: Vec<String>,
    /// Selector for the report's leading header block.
    pub header_selector: String,
    /// Whether to exclude the header block.
    pub drop_header: bool,
}

/// Controls that never belong in a printed report.
const INTERACTIVE_CONTROLS: [&str; 5] = ["button", "input", "select", "textarea", ".no-print"];

impl ReportProfile {
    /// Header block selector shared by every built-in profile.
    pub const HEADER_SELECTOR: &'static str = ".report-header";

    fn with_extra(extra: &[&str], drop_header: bool) -> Self {
        Self {
            exclude: INTERACTIVE_CONTROLS
                .iter()
                .chain(extra)
                .map(|s| (*s).to_owned())
                .collect(),
            header_selector: Self::HEADER_SELECTOR.to_owned(),
            drop_header,
        }
    }

    /// Any report: strip interactive controls, keep the header block.
    #[must_use]
    pub fn generic() -> Self {
        Self::with_extra(&[], false)
    }

    /// Fleet-wide summary report: also strips the filter bar and drops
    /// the on-screen header.
    #[must_use]
    pub fn aggregate() -> Self {
        Self::with_extra(&[".report-filters", ".report-actions"], true)
    }

    /// Single-driver/delivery report: also strips the action row and
    /// drops the on-screen header.
    #[must_use]
    pub fn individual() -> Self {
        Self::with_extra(&[".report-actions", ".report-nav"], true)
    }

    /// Every selector to exclude, including the header block when
    /// `drop_header` is set.
    #[must_use]
    pub fn exclusion_selectors(&self) -> Vec<&str> {
        let mut selectors: Vec<&str> = self.exclude.iter().map(String::as_str).collect();
        if self.drop_header {
            selectors.push(&self.header_selector);
        }
        selectors
    }
}

impl Default for ReportProfile {
    fn default() -> Self {
        Self::generic()
    }
}

/// Serde support for `std::time::Duration` as integer milliseconds.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as whole milliseconds.
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    /// Deserialize a `Duration` from whole milliseconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ExportConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_header_reservation_filling_first_page() {
        let layout = PageLayout {
            header_reservation: 290.0,
            ..PageLayout::default()
        };
        assert!(matches!(
            layout.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_header_reservation_overlapping_header_text() {
        let layout = PageLayout {
            margin: 15.0,
            header_reservation: 20.0,
            ..PageLayout::default()
        };
        assert!(matches!(
            layout.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));

        let tight = PageLayout {
            header_reservation: 15.0 + PageLayout::HEADER_EXTENT_MM,
            ..layout
        };
        tight.validate().unwrap();
    }

    #[test]
    fn rejects_margins_wider_than_page() {
        let layout = PageLayout {
            margin: 105.0,
            ..PageLayout::default()
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn rejects_max_fraction_above_one() {
        let layout = PageLayout {
            max_fraction: 1.2,
            ..PageLayout::default()
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn rejects_non_finite_lengths() {
        let layout = PageLayout {
            zoom: f64::NAN,
            ..PageLayout::default()
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn usable_width_subtracts_both_margins() {
        let layout = PageLayout::default();
        assert!((layout.usable_width() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_profile_drops_header() {
        let profile = ReportProfile::aggregate();
        let selectors = profile.exclusion_selectors();
        assert!(selectors.contains(&ReportProfile::HEADER_SELECTOR));
        assert!(selectors.contains(&"button"));
        assert!(selectors.contains(&".report-filters"));
    }

    #[test]
    fn generic_profile_keeps_header() {
        let profile = ReportProfile::generic();
        assert!(!profile
            .exclusion_selectors()
            .contains(&ReportProfile::HEADER_SELECTOR));
    }

    #[test]
    fn config_json_round_trip_uses_millis() {
        let config = ExportConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"timeout\":10000"));
        let back: ExportConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ExportConfig =
            serde_json::from_str(r#"{"layout":{"margin":10.0}}"#).unwrap();
        assert!((config.layout.margin - 10.0).abs() < f64::EPSILON);
        assert!((config.layout.page_width - PageLayout::A4_WIDTH_MM).abs() < f64::EPSILON);
        assert_eq!(config.readiness, ReadinessConfig::default());
    }
}
