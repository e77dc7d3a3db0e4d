//! Julian date to UTC calendar conversion and display-time parsing

use chrono::NaiveDateTime;
use thiserror::Error;

const SECONDS_PER_DAY: f64 = 86_400.0;
// Unix epoch (1970-01-01 00:00:00 UTC) as a Julian date
const JD_UNIX_EPOCH: f64 = 2_440_587.5;

/// Display format accepted by [`parse_display_time`]
pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error, PartialEq)]
pub enum TimeParseError {
    #[error("invalid display time '{0}': expected YYYY-MM-DD HH:MM:SS")]
    Invalid(String),
}

/// Convert a Julian date (UTC) to Gregorian calendar components
/// `(year, month, day, hour, minute, second)`.
///
/// Algorithm from Fliegel & Van Flandern (1968) / Jean Meeus. The second is
/// rounded to the nearest integer and carried through minute, hour and day.
/// The day increment does not re-check month boundaries; when rounding adds
/// a full second exactly at a month boundary the result is approximate.
pub fn jd_to_utc(jd: f64) -> (i32, u32, u32, u32, u32, u32) {
    let z = (jd + 0.5).floor();
    let f = (jd + 0.5) - z;
    let j = z as i64;

    let a = if j >= 2_299_161 {
        // Gregorian reform correction
        let alpha = ((j as f64 - 1_867_216.25) / 36_524.25).floor() as i64;
        j + 1 + alpha - (alpha as f64 / 4.0).floor() as i64
    } else {
        j
    };

    let b = a + 1524;
    let c = ((b as f64 - 122.1) / 365.25).floor() as i64;
    let d = (365.25 * c as f64).floor() as i64;
    let e = ((b - d) as f64 / 30.6001).floor() as i64;

    let day_decimal = (b - d) as f64 - (30.6001 * e as f64).floor() + f;
    let mut day = day_decimal.floor() as i64;

    let month = if e < 14 { e - 1 } else { e - 13 };
    let year = if month > 2 { c - 4716 } else { c - 4715 };

    let fractional_day = day_decimal - day as f64;
    let total_seconds = fractional_day * SECONDS_PER_DAY;
    let mut hour = (total_seconds / 3600.0).floor() as i64;
    let rem = total_seconds - hour as f64 * 3600.0;
    let mut minute = (rem / 60.0).floor() as i64;
    let seconds = rem - minute as f64 * 60.0;
    let mut second = (seconds + 0.5).floor() as i64;

    if second >= 60 {
        second -= 60;
        minute += 1;
        if minute >= 60 {
            minute -= 60;
            hour += 1;
            if hour >= 24 {
                hour -= 24;
                day += 1;
            }
        }
    }

    (
        year as i32,
        month as u32,
        day as u32,
        hour as u32,
        minute as u32,
        second as u32,
    )
}

/// Format calendar components as `YYYY/MM/DD HH:MM:SS`
pub fn format_utc(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> String {
    format!(
        "{:04}/{:02}/{:02} {:02}:{:02}:{:02}",
        year, month, day, hour, minute, second
    )
}

/// Julian date to display string in one step
pub fn jd_to_display(jd: f64) -> String {
    let (y, mo, d, h, m, s) = jd_to_utc(jd);
    format_utc(y, mo, d, h, m, s)
}

/// Parse a `YYYY-MM-DD HH:MM:SS` display time into seconds since the Unix
/// epoch (UTC). `/` separators are normalized to `-` first so strings
/// produced by [`format_utc`] parse back. Any other deviation fails.
pub fn parse_display_time(s: &str) -> Result<i64, TimeParseError> {
    let normalized = s.trim().replace('/', "-");
    NaiveDateTime::parse_from_str(&normalized, DISPLAY_TIME_FORMAT)
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|_| TimeParseError::Invalid(s.to_string()))
}

/// Seconds since the Unix epoch for a Julian date (fractional)
pub fn jd_to_unix_s(jd: f64) -> f64 {
    (jd - JD_UNIX_EPOCH) * SECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_epoch_conversions() {
        // J2000.0: JD 2451545.0 = 2000-01-01 12:00:00 UTC
        assert_eq!(jd_to_utc(2_451_545.0), (2000, 1, 1, 12, 0, 0));
        // Unix epoch
        assert_eq!(jd_to_utc(JD_UNIX_EPOCH), (1970, 1, 1, 0, 0, 0));
    }

    #[test]
    fn fractional_day_extraction() {
        // JD 2460832.436 = 2025-06-05 22:27:50 UTC (rounded to the second)
        assert_eq!(jd_to_utc(2_460_832.436), (2025, 6, 5, 22, 27, 50));
    }

    #[test]
    fn rounding_carries_through_minute_and_hour() {
        // half a second before midnight rounds up and rolls the day
        let jd = JD_UNIX_EPOCH + (86_399.7 / 86_400.0);
        assert_eq!(jd_to_utc(jd), (1970, 1, 2, 0, 0, 0));
    }

    #[test]
    fn format_is_fixed_width() {
        assert_eq!(format_utc(2025, 6, 5, 22, 27, 50), "2025/06/05 22:27:50");
        assert_eq!(format_utc(900, 1, 2, 3, 4, 5), "0900/01/02 03:04:05");
    }

    #[test]
    fn parse_accepts_both_separators() {
        assert_eq!(parse_display_time("1970-01-01 00:00:00"), Ok(0));
        assert_eq!(parse_display_time("1970/01/01 00:01:40"), Ok(100));
    }

    #[test]
    fn parse_rejects_deviations() {
        assert!(parse_display_time("1970-01-01T00:00:00").is_err());
        assert!(parse_display_time("1970-13-01 00:00:00").is_err());
        assert!(parse_display_time("not a time").is_err());
        assert!(parse_display_time("").is_err());
    }

    #[test]
    fn display_round_trip_within_half_second() {
        // formatting truncates to whole seconds with nearest rounding, so a
        // parse-back may differ from the source jd by at most 0.5 s
        for &jd in &[2_451_545.0, 2_460_832.436, 2_460_832.999_994, 2_440_588.25] {
            let shown = jd_to_display(jd);
            let unix = parse_display_time(&shown).unwrap() as f64;
            assert!(
                (unix - jd_to_unix_s(jd)).abs() <= 0.5 + 1e-6,
                "jd {} -> '{}' drifted {} s",
                jd,
                shown,
                (unix - jd_to_unix_s(jd)).abs()
            );
        }
    }
}
