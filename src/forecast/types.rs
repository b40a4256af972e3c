use chrono::{DateTime, Duration, TimeZone, Timelike};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;

use super::normalize::Window;

/// What a series value measures. Decided by the source that produced the
/// series and never re-derived from magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueUnit {
    /// Fraction in `[0, 1]`.
    Probability,
    /// Hourly precipitation amount.
    Millimetres,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPoint {
    pub ts: DateTime<Tz>,
    pub value: Option<f64>,
}

impl ForecastPoint {
    pub fn new(ts: DateTime<Tz>, value: Option<f64>) -> Self {
        Self { ts, value }
    }
}

/// Points are ordered by strictly increasing timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSeries {
    pub unit: ValueUnit,
    pub points: Vec<ForecastPoint>,
}

impl ForecastSeries {
    pub fn new(unit: ValueUnit, points: Vec<ForecastPoint>) -> Self {
        Self { unit, points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().filter_map(|p| p.value)
    }
}

/// Longest hour horizon accepted; Open-Meteo serves at most 16 days.
pub const MAX_HORIZON_HOURS: u32 = 384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    /// The next `n` whole hours, starting at the top of the next hour.
    Hours(u32),
    /// From now until the next local midnight.
    Today,
}

impl Horizon {
    pub fn window(&self, now: DateTime<Tz>) -> Window {
        match *self {
            Horizon::Hours(hours) => {
                let start = top_of_hour(now) + Duration::hours(1);
                Window::inclusive(start, start + Duration::hours(i64::from(hours)))
            }
            Horizon::Today => Window::exclusive(now, next_local_midnight(now)),
        }
    }
}

impl FromStr for Horizon {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("today") {
            return Ok(Horizon::Today);
        }
        match s.parse::<u32>() {
            Ok(0) => Err("horizon must be at least one hour".to_string()),
            Ok(hours) if hours > MAX_HORIZON_HOURS => {
                Err(format!("horizon must be at most {} hours", MAX_HORIZON_HOURS))
            }
            Ok(hours) => Ok(Horizon::Hours(hours)),
            Err(_) => Err(format!("expected a number of hours or 'today', got '{}'", s)),
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Horizon::Hours(h) => write!(f, "next {} hours", h),
            Horizon::Today => write!(f, "rest of today"),
        }
    }
}

fn top_of_hour(ts: DateTime<Tz>) -> DateTime<Tz> {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

fn next_local_midnight(now: DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    now.date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| tz.from_local_datetime(&midnight).earliest())
        .unwrap_or_else(|| now + Duration::days(1))
}
