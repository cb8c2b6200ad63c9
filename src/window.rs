use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};

use crate::error::{ExpansionError, Result};

pub const DEFAULT_WINDOW_START: &str = "04:00";
pub const DEFAULT_WINDOW_END: &str = "20:00";

/// Fixed daily UTC interval over which every minute is expected to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl Default for TradingWindow {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(4, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or_default(),
        }
    }
}

/// Parse a window bound in `HH:MM` form.
pub fn parse_clock(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|e| {
        ExpansionError::Configuration(format!(
            "invalid clock '{}': expected HH:MM ({})",
            s, e
        ))
    })
}

impl TradingWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self> {
        for t in [start, end] {
            if t.second() != 0 || t.nanosecond() != 0 {
                return Err(ExpansionError::Configuration(format!(
                    "window bound {} is not a whole minute",
                    t
                )));
            }
        }
        if start > end {
            return Err(ExpansionError::Configuration(format!(
                "window start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_clock(start)?, parse_clock(end)?)
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// First and last expected minute of `day`, both inclusive.
    pub fn bounds(&self, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.from_utc_datetime(&day.and_time(self.start)),
            Utc.from_utc_datetime(&day.and_time(self.end)),
        )
    }

    pub fn minutes_per_day(&self) -> usize {
        ((self.end - self.start).num_minutes() + 1) as usize
    }

    /// Every whole minute of the window on `day`, ascending.
    pub fn minutes(&self, day: NaiveDate) -> impl Iterator<Item = DateTime<Utc>> {
        let (first, _) = self.bounds(day);
        (0..self.minutes_per_day() as i64).map(move |i| first + Duration::minutes(i))
    }
}
