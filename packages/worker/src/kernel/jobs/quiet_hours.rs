//! Quiet-hour window evaluation.
//!
//! Tenants configure a wall-clock window (minute precision) during which
//! non-urgent communications are deferred. The window may wrap midnight
//! (e.g. 21:00-08:00). A degenerate window (start == end) never gates.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike, Utc};

/// A parsed quiet-hour window in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietWindow {
    start: u32,
    end: u32,
}

/// Parse "HH:MM" strings into a window.
///
/// Returns `None` (gate disabled) when either bound is missing, malformed,
/// or out of range, or when the window is degenerate.
pub fn parse_window(start: Option<&str>, end: Option<&str>) -> Option<QuietWindow> {
    let start = parse_minutes(start?)?;
    let end = parse_minutes(end?)?;
    if start == end {
        return None;
    }
    Some(QuietWindow { start, end })
}

fn parse_minutes(raw: &str) -> Option<u32> {
    let (hours, minutes) = raw.trim().split_once(':')?;
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if hours >= 24 || minutes >= 60 {
        return None;
    }
    Some(hours * 60 + minutes)
}

impl QuietWindow {
    /// Whether the given instant falls inside the quiet window.
    pub fn is_quiet(&self, at: DateTime<Utc>) -> bool {
        let cur = at.hour() * 60 + at.minute();
        if self.start < self.end {
            cur >= self.start && cur < self.end
        } else {
            cur >= self.start || cur < self.end
        }
    }

    /// The next instant at which sending is allowed again.
    ///
    /// Only meaningful while `is_quiet` holds; the result is strictly in
    /// the future.
    pub fn next_allowed(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let cur = now.hour() * 60 + now.minute();
        let end_time = NaiveTime::from_hms_opt(self.end / 60, self.end % 60, 0)
            .unwrap_or(NaiveTime::MIN);

        let today_end = Utc
            .from_utc_datetime(&now.date_naive().and_time(end_time));

        if self.start < self.end {
            // Non-wrapping: the window closes later today.
            today_end
        } else if cur < self.end {
            // Wrapping, after midnight: the window closes later today.
            today_end
        } else {
            // Wrapping, before midnight: the window closes tomorrow.
            today_end + Duration::days(1)
        }
    }
}
