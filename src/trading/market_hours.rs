//! Regular equity session. Crypto pairs trade around the clock and are not
//! gated by it.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Daily trading window in an exchange time zone, Monday to Friday.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketHours {
    /// Session open, exchange local time
    pub open: NaiveTime,

    /// Session close, exchange local time (inclusive)
    pub close: NaiveTime,

    pub timezone: Tz,
}

impl MarketHours {
    pub fn new(open: NaiveTime, close: NaiveTime, timezone: Tz) -> Self {
        Self {
            open,
            close,
            timezone,
        }
    }

    /// Whether `now` falls inside the session. Exchange holidays are not
    /// modelled.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let time = local.time();
        self.open <= time && time <= self.close
    }
}

impl Default for MarketHours {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default(),
            timezone: chrono_tz::America::New_York,
        }
    }
}

impl fmt::Display for MarketHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} {}",
            self.open.format("%H:%M"),
            self.close.format("%H:%M"),
            self.timezone
        )
    }
}

/// Parse `HH:MM` (or `HH:MM:SS`) session times.
pub fn parse_session_time(s: &str) -> Result<NaiveTime, String> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| format!("invalid session time '{}': {}", s, e))
}

pub fn parse_timezone(s: &str) -> Result<Tz, String> {
    s.trim()
        .parse::<Tz>()
        .map_err(|e| format!("invalid time zone '{}': {}", s, e))
}
