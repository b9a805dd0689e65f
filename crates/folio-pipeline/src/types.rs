//! Shared types for the folio capture pipeline.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` so downstream crates can reference captured
/// bitmaps without depending on `image` directly.
pub use image::RgbaImage;

/// Pixel dimensions of an element, bitmap, or slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Total pixel count.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Component-wise maximum.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self {
            width: self.width.max(other.width),
            height: self.height.max(other.height),
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An opaque RGB color, used as the raster background fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    /// Pure white, the default page background.
    pub const WHITE: Self = Self([255, 255, 255]);

    /// Format as a lowercase CSS hex color (`#rrggbb`).
    #[must_use]
    pub fn to_css_hex(self) -> String {
        let [r, g, b] = self.0;
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Self::WHITE
    }
}

impl FromStr for Rgb {
    type Err = PipelineError;

    /// Parse a CSS hex color string (e.g. `"#1a1a1a"` or `" #fff "`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| PipelineError::InvalidConfig(format!("not a hex color: {s:?}")))?;
        match hex.len() {
            3 => {
                // Short form: #rgb -> #rrggbb
                let mut rgb = [0u8; 3];
                for (i, ch) in hex.chars().enumerate() {
                    let n = ch.to_digit(16).ok_or_else(|| {
                        PipelineError::InvalidConfig(format!("invalid hex char: {ch}"))
                    })?;
                    #[expect(clippy::cast_possible_truncation)]
                    {
                        rgb[i] = (n * 17) as u8;
                    }
                }
                Ok(Self(rgb))
            }
            6 if hex.is_ascii() => {
                let r = u8::from_str_radix(&hex[0..2], 16);
                let g = u8::from_str_radix(&hex[2..4], 16);
                let b = u8::from_str_radix(&hex[4..6], 16);
                match (r, g, b) {
                    (Ok(r), Ok(g), Ok(b)) => Ok(Self([r, g, b])),
                    _ => Err(PipelineError::InvalidConfig(format!(
                        "invalid hex color: {s:?}"
                    ))),
                }
            }
            _ => Err(PipelineError::InvalidConfig(format!(
                "unexpected hex length: {s:?}"
            ))),
        }
    }
}

/// The single bitmap produced by capturing the prepared target.
///
/// Always opaque: transparent regions have been composited over the
/// configured background color.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    /// The captured pixels.
    pub pixels: RgbaImage,
    /// Device-pixel scale the capture was taken at.
    pub scale: f64,
}

impl RasterImage {
    /// Bitmap dimensions in pixels.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.pixels.width(), self.pixels.height())
    }
}

/// An error reported by a browser-side collaborator (DOM host,
/// capture backend, save trigger).
///
/// Collaborator errors are carried as strings: the underlying values
/// (typically `JsValue`) are neither `Send` nor comparable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    /// Create a new host error from any displayable message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The message shown to users for every export failure.
///
/// The detailed error is logged instead, never displayed raw.
pub const GENERIC_FAILURE_MESSAGE: &str = "The report could not be exported. Please try again.";

/// Errors that can occur while exporting a report.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// No capture root was supplied, or it is not attached to the document.
    #[error("missing capture target")]
    MissingTarget,

    /// Chart surfaces did not all report a rendered size before the
    /// readiness deadline.
    #[error("charts not ready after {waited:?}: {pending} of {total} surfaces still unrendered")]
    ChartsNotReady {
        /// How long the gate waited.
        waited: Duration,
        /// Surfaces still reporting a zero size.
        pending: usize,
        /// Surfaces inspected on the final poll.
        total: usize,
    },

    /// The capture backend failed or produced an unusable bitmap.
    #[error("capture failed: {0}")]
    CaptureFailure(String),

    /// Page geometry is degenerate for the captured bitmap.
    #[error("pagination impossible: {0}")]
    PaginationImpossible(String),

    /// The document encoder failed.
    #[error("document encoding failed: {0}")]
    Encode(String),

    /// The environment rejected the file save.
    #[error("save failed: {0}")]
    SaveFailure(String),

    /// Another export is still in flight.
    #[error("an export is already in progress")]
    Busy,

    /// Export configuration is invalid.
    #[error("invalid export configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// The user-facing message for this error.
    ///
    /// Every failure maps to [`GENERIC_FAILURE_MESSAGE`] except
    /// [`PipelineError::Busy`], which is not a failure of the export
    /// itself.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Busy => "A report export is already in progress.",
            _ => GENERIC_FAILURE_MESSAGE,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_long_hex() {
        assert_eq!("#1a2b3c".parse::<Rgb>().unwrap(), Rgb([0x1a, 0x2b, 0x3c]));
    }

    #[test]
    fn parse_short_hex_with_whitespace() {
        assert_eq!(" #fff ".parse::<Rgb>().unwrap(), Rgb::WHITE);
    }

    #[test]
    fn parse_rejects_missing_hash_and_bad_length() {
        assert!("ffffff".parse::<Rgb>().is_err());
        assert!("#ffff".parse::<Rgb>().is_err());
        assert!("#zzzzzz".parse::<Rgb>().is_err());
    }

    #[test]
    fn css_hex_round_trips() {
        let color = Rgb([0, 128, 255]);
        assert_eq!(color.to_css_hex(), "#0080ff");
        assert_eq!(color.to_css_hex().parse::<Rgb>().unwrap(), color);
    }

    #[test]
    fn every_failure_shares_the_generic_message() {
        let errors = [
            PipelineError::MissingTarget,
            PipelineError::CaptureFailure("boom".into()),
            PipelineError::PaginationImpossible("zero width".into()),
            PipelineError::SaveFailure("denied".into()),
        ];
        for err in &errors {
            assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
        }
        assert_ne!(PipelineError::Busy.user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn dimensions_display_and_area() {
        let d = Dimensions::new(1000, 4000);
        assert_eq!(d.to_string(), "1000x4000");
        assert_eq!(d.area(), 4_000_000);
        assert!(!d.is_empty());
        assert!(Dimensions::new(0, 10).is_empty());
    }
}
