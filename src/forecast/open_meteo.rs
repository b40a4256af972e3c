use super::normalize::Window;
use super::types::*;
use super::{get_json, http_client, FetchError, ForecastSource};
use crate::config::Config;
use async_trait::async_trait;
use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

const HOURLY_FIELD: &str = "precipitation_probability";

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    #[serde(default)]
    hourly: Option<OpenMeteoHourly>,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoHourly {
    #[serde(default)]
    time: Vec<Value>,
    #[serde(default)]
    precipitation_probability: Vec<Value>,
}

/// Hourly precipitation probability from the Open-Meteo forecast API.
pub struct OpenMeteoClient {
    client: Client,
    base_url: String,
    latitude: f64,
    longitude: f64,
    timezone: Tz,
    horizon: Horizon,
}

impl OpenMeteoClient {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        Ok(Self {
            client: http_client(config.request_timeout)?,
            base_url: config.open_meteo_base_url.clone(),
            latitude: config.latitude,
            longitude: config.longitude,
            timezone: config.timezone,
            horizon: config.horizon,
        })
    }

    pub async fn fetch_window(&self, window: &Window) -> Result<ForecastSeries, FetchError> {
        let latitude = self.latitude.to_string();
        let longitude = self.longitude.to_string();
        let start_date = window.start.date_naive().format("%Y-%m-%d").to_string();
        let end_date = window.end.date_naive().format("%Y-%m-%d").to_string();

        let response = get_json(
            &self.client,
            &self.base_url,
            &[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("hourly", HOURLY_FIELD),
                ("start_date", start_date.as_str()),
                ("end_date", end_date.as_str()),
                ("timezone", self.timezone.name()),
            ],
        )
        .await?;

        Ok(parse_hourly(response, self.timezone, window))
    }
}

#[async_trait]
impl ForecastSource for OpenMeteoClient {
    fn name(&self) -> &'static str {
        "open-meteo"
    }

    async fn fetch(&self) -> Result<ForecastSeries, FetchError> {
        let now = Utc::now().with_timezone(&self.timezone);
        self.fetch_window(&self.horizon.window(now)).await
    }
}

/// Pairs the parallel `time`/probability arrays. Times are local to `tz`;
/// percentages become fractions. Entries with an unreadable time or a
/// non-numeric value are dropped, `null` values are kept as missing. A body
/// whose `hourly` block has an unexpected shape yields an empty series.
fn parse_hourly(response: Value, tz: Tz, window: &Window) -> ForecastSeries {
    let hourly = match serde_json::from_value::<OpenMeteoResponse>(response) {
        Ok(OpenMeteoResponse { hourly: Some(hourly) }) => hourly,
        Ok(_) => return ForecastSeries::new(ValueUnit::Probability, Vec::new()),
        Err(e) => {
            tracing::warn!("Unexpected Open-Meteo hourly block: {}", e);
            return ForecastSeries::new(ValueUnit::Probability, Vec::new());
        }
    };

    let mut previous: Option<DateTime<Tz>> = None;
    let mut points = Vec::new();

    for (time, value) in hourly.time.iter().zip(hourly.precipitation_probability.iter()) {
        let Some(ts) = time.as_str().and_then(|raw| parse_local_time(raw, tz, previous)) else {
            continue;
        };
        let value = match value {
            Value::Null => None,
            Value::Number(n) => match n.as_f64() {
                Some(v) => Some(v / 100.0),
                None => continue,
            },
            _ => continue,
        };
        if previous.is_some_and(|prev| ts <= prev) {
            continue;
        }
        previous = Some(ts);
        if window.contains(&ts) {
            points.push(ForecastPoint::new(ts, value));
        }
    }

    ForecastSeries::new(ValueUnit::Probability, points)
}

/// A local time repeated by a DST fall-back resolves to its second
/// occurrence once `previous` has taken the first one.
fn parse_local_time(raw: &str, tz: Tz, previous: Option<DateTime<Tz>>) -> Option<DateTime<Tz>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(ts) => Some(ts),
        LocalResult::Ambiguous(earlier, later) => match previous {
            Some(prev) if prev >= earlier => Some(later),
            _ => Some(earlier),
        },
        LocalResult::None => None,
    }
}
