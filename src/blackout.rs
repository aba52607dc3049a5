// =============================================================================
// BlackoutCalendar — recurring local-time trading-suppression windows
// =============================================================================
//
// Windows are evaluated against the current time converted to Asia/Tokyo,
// regardless of the host's local timezone. Defaults come from the venue's
// published low-liquidity/rollover periods.
// =============================================================================

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Asia::Tokyo;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One recurring `[start, end)` window in JST wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackoutWindow {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl BlackoutWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, String> {
        if start >= end {
            return Err(format!(
                "blackout window start {start} must be before end {end}"
            ));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, String> {
        let start = parse_hhmm(start)?;
        let end = parse_hhmm(end)?;
        Self::new(start, end)
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        self.start <= t && t < self.end
    }
}

fn parse_hhmm(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| format!("invalid HH:MM '{s}': {e}"))
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(d)?;
        NaiveTime::parse_from_str(&s, "%H:%M").map_err(serde::de::Error::custom)
    }
}

fn default_windows() -> Vec<BlackoutWindow> {
    vec![
        BlackoutWindow::parse("04:00", "09:15").expect("built-in window is valid"),
        BlackoutWindow::parse("21:20", "21:45").expect("built-in window is valid"),
        BlackoutWindow::parse("22:25", "23:10").expect("built-in window is valid"),
    ]
}

/// Owned, mutable calendar of blackout windows, shared across the process.
pub struct BlackoutCalendar {
    windows: RwLock<Vec<BlackoutWindow>>,
}

impl Default for BlackoutCalendar {
    fn default() -> Self {
        Self::new(default_windows())
    }
}

impl BlackoutCalendar {
    pub fn new(mut windows: Vec<BlackoutWindow>) -> Self {
        windows.sort_by_key(|w| w.start);
        Self { windows: RwLock::new(windows) }
    }

    /// Replace the configured windows, validating and sorting them first.
    pub fn set_windows(&self, mut windows: Vec<BlackoutWindow>) {
        windows.sort_by_key(|w| w.start);
        *self.windows.write() = windows;
    }

    pub fn windows(&self) -> Vec<BlackoutWindow> {
        self.windows.read().clone()
    }

    /// Is `now` (or the current instant, if `None`) inside any configured
    /// window once converted to Asia/Tokyo local time?
    pub fn is_blackout(&self, now: Option<DateTime<Utc>>) -> bool {
        let now = now.unwrap_or_else(Utc::now);
        let jst = Tokyo.from_utc_datetime(&now.naive_utc());
        let t = jst.time();
        self.windows.read().iter().any(|w| w.contains(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc_at_jst_hhmm(h: u32, m: u32) -> DateTime<Utc> {
        // JST is UTC+9 with no DST.
        let utc_h = (h + 24 - 9) % 24;
        Utc.with_ymd_and_hms(2026, 7, 28, utc_h, m, 0).unwrap()
    }

    #[test]
    fn default_windows_cover_expected_ranges() {
        let cal = BlackoutCalendar::default();
        assert!(cal.is_blackout(Some(utc_at_jst_hhmm(5, 0))));
        assert!(cal.is_blackout(Some(utc_at_jst_hhmm(21, 30))));
        assert!(cal.is_blackout(Some(utc_at_jst_hhmm(22, 30))));
        assert!(!cal.is_blackout(Some(utc_at_jst_hhmm(12, 0))));
    }

    #[test]
    fn window_boundaries_are_half_open() {
        let cal = BlackoutCalendar::new(vec![BlackoutWindow::parse("04:00", "09:15").unwrap()]);
        assert!(cal.is_blackout(Some(utc_at_jst_hhmm(4, 0))));
        assert!(!cal.is_blackout(Some(utc_at_jst_hhmm(9, 15))));
    }

    #[test]
    fn invalid_window_rejected() {
        assert!(BlackoutWindow::parse("10:00", "09:00").is_err());
        assert!(BlackoutWindow::parse("10:00", "10:00").is_err());
    }

    #[test]
    fn serialize_roundtrip() {
        let w = BlackoutWindow::parse("04:00", "09:15").unwrap();
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"start":"04:00","end":"09:15"}"#);
        let back: BlackoutWindow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn set_windows_sorts_by_start() {
        let cal = BlackoutCalendar::new(vec![]);
        cal.set_windows(vec![
            BlackoutWindow::parse("21:20", "21:45").unwrap(),
            BlackoutWindow::parse("04:00", "09:15").unwrap(),
        ]);
        let ws = cal.windows();
        assert_eq!(ws[0].start, NaiveTime::parse_from_str("04:00", "%H:%M").unwrap());
    }
}
