//! Session schedule and engine settings

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::aggregation::symbol::DEFAULT_MAX_BARS;

/// Daily session window in an exchange timezone
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSchedule {
    /// Session open (local time)
    pub start: NaiveTime,
    /// Session close (local time)
    pub end: NaiveTime,
    pub timezone: Tz,
    /// Keep the session closed on Saturday and Sunday
    pub skip_weekends: bool,
}

impl Default for SessionSchedule {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN),
            timezone: chrono_tz::America::New_York,
            skip_weekends: true,
        }
    }
}

impl SessionSchedule {
    /// Check if a local wall time falls inside the window.
    /// A start later than the end wraps past midnight.
    pub fn is_within_hours(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }

    pub fn is_session_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        if self.skip_weekends && matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        self.is_within_hours(local.time())
    }
}

/// Aggregation and position settings
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Retained minute buckets per symbol
    pub max_bars: usize,
    /// Size handed to each position engine
    pub position_size: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_bars: DEFAULT_MAX_BARS,
            position_size: 100.0,
        }
    }
}
