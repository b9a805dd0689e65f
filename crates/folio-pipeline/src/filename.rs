//! Output file naming: `<report-kind>-<period-label>-<ISO-date>.<ext>`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A calendar date, formatted as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IsoDate {
    /// Proleptic Gregorian year.
    pub year: i32,
    /// Month, 1-12.
    pub month: u8,
    /// Day of month, 1-31.
    pub day: u8,
}

impl IsoDate {
    /// Create a date. Components are not range-checked.
    #[must_use]
    pub const fn new(year: i32, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }

    /// The civil date `days` days after 1970-01-01.
    ///
    /// Uses Howard Hinnant's `civil_from_days` algorithm.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_unix_days(days: i64) -> Self {
        let z = days + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z.rem_euclid(146_097);
        let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = doy - (153 * mp + 2) / 5 + 1;
        let month = if mp < 10 { mp + 3 } else { mp - 9 };
        let year = yoe + era * 400 + i64::from(month <= 2);
        Self {
            year: year as i32,
            month: month as u8,
            day: day as u8,
        }
    }
}

impl fmt::Display for IsoDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Lowercase `label`, join whitespace-separated words with single
/// hyphens and drop everything but letters, digits, `-` and `_`.
#[must_use]
pub fn slug(label: &str) -> String {
    label
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_'))
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Build the download filename for a report.
///
/// An empty kind becomes `report`; an empty period is skipped.
#[must_use]
pub fn output_filename(kind: &str, period: &str, date: IsoDate, extension: &str) -> String {
    let kind = slug(kind);
    let kind = if kind.is_empty() { "report".to_owned() } else { kind };
    let period = slug(period);
    if period.is_empty() {
        format!("{kind}-{date}.{extension}")
    } else {
        format!("{kind}-{period}-{date}.{extension}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_epoch_and_known_dates() {
        assert_eq!(IsoDate::from_unix_days(0), IsoDate::new(1970, 1, 1));
        assert_eq!(IsoDate::from_unix_days(19_782), IsoDate::new(2024, 2, 29));
        assert_eq!(IsoDate::from_unix_days(-1), IsoDate::new(1969, 12, 31));
        assert_eq!(IsoDate::from_unix_days(11_017), IsoDate::new(2000, 3, 1));
    }

    #[test]
    fn date_is_zero_padded() {
        assert_eq!(IsoDate::new(2024, 3, 5).to_string(), "2024-03-05");
    }

    #[test]
    fn slug_lowercases_and_hyphenates() {
        assert_eq!(slug("Aggregate  Report"), "aggregate-report");
        assert_eq!(slug("  Q1 / 2024 "), "q1-2024");
        assert_eq!(slug("Driver: O'Brien"), "driver-obrien");
        assert_eq!(slug("***"), "");
    }

    #[test]
    fn filename_has_kind_period_and_date() {
        let name = output_filename("Aggregate", "March 2024", IsoDate::new(2024, 4, 1), "pdf");
        assert_eq!(name, "aggregate-march-2024-2024-04-01.pdf");
    }

    #[test]
    fn filename_falls_back_for_empty_parts() {
        let date = IsoDate::new(2024, 4, 1);
        assert_eq!(output_filename("", "", date, "pdf"), "report-2024-04-01.pdf");
        assert_eq!(output_filename("Individual", "<>", date, "pdf"), "individual-2024-04-01.pdf");
    }
}
