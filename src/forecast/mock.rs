use super::normalize::Window;
use super::types::*;
use super::{FetchError, ForecastSource};
use async_trait::async_trait;
use chrono::{Duration, Timelike, Utc};
use chrono_tz::Tz;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum Behaviour {
    Synthetic,
    #[cfg(test)]
    Fixed(ForecastSeries),
    #[cfg(test)]
    Failing(String),
}

/// Offline source. Produces a deterministic diurnal probability curve; test
/// builds can also pin a fixed series or a failure.
pub struct MockSource {
    timezone: Tz,
    horizon: Horizon,
    behaviour: Mutex<Behaviour>,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new(timezone: Tz, horizon: Horizon) -> Self {
        Self::with_behaviour(timezone, horizon, Behaviour::Synthetic)
    }

    #[cfg(test)]
    pub fn fixed(series: ForecastSeries) -> Self {
        Self::with_behaviour(chrono_tz::UTC, Horizon::Hours(12), Behaviour::Fixed(series))
    }

    #[cfg(test)]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_behaviour(chrono_tz::UTC, Horizon::Hours(12), Behaviour::Failing(message.into()))
    }

    fn with_behaviour(timezone: Tz, horizon: Horizon, behaviour: Behaviour) -> Self {
        Self {
            timezone,
            horizon,
            behaviour: Mutex::new(behaviour),
            calls: AtomicUsize::new(0),
        }
    }

    #[cfg(test)]
    pub fn set_series(&self, series: ForecastSeries) {
        *self.behaviour.lock().unwrap_or_else(|e| e.into_inner()) = Behaviour::Fixed(series);
    }

    #[cfg(test)]
    pub fn set_failing(&self, message: impl Into<String>) {
        *self.behaviour.lock().unwrap_or_else(|e| e.into_inner()) = Behaviour::Failing(message.into());
    }

    #[cfg(test)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForecastSource for MockSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch(&self) -> Result<ForecastSeries, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behaviour = self.behaviour.lock().unwrap_or_else(|e| e.into_inner()).clone();

        match behaviour {
            Behaviour::Synthetic => {
                let now = Utc::now().with_timezone(&self.timezone);
                Ok(synthetic_series(&self.horizon.window(now)))
            }
            #[cfg(test)]
            Behaviour::Fixed(series) => Ok(series),
            #[cfg(test)]
            Behaviour::Failing(message) => Err(FetchError::ApiError {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: message,
            }),
        }
    }
}

/// Hourly probabilities peaking in the mid afternoon.
pub fn synthetic_series(window: &Window) -> ForecastSeries {
    let mut points = Vec::new();
    let mut ts = window.start;

    while window.contains(&ts) {
        let phase = (f64::from(ts.hour()) - 9.0) * std::f64::consts::PI / 12.0;
        let probability = (0.35 + 0.3 * phase.sin()).clamp(0.0, 1.0);
        points.push(ForecastPoint::new(ts, Some((probability * 100.0).round() / 100.0)));
        ts = ts + Duration::hours(1);
    }

    ForecastSeries::new(ValueUnit::Probability, points)
}
