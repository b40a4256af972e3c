//! DMI EDR point-forecast client.
//!
//! The name of the precipitation property in the GeoJSON response is not
//! fixed, so discovery runs an ordered list of [`ExtractionStrategy`]s, each
//! costing one request, until one of them locates a usable key.

use super::normalize::{filter_window, to_hourly_rates, Window};
use super::types::*;
use super::{get_json, http_client, FetchError, ForecastSource};
use crate::config::Config;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

const PRECIP_KEYWORDS: [&str; 3] = ["precip", "rain", "solid"];
const TIME_KEYS: [&str; 4] = ["step", "datetime", "time", "validTime"];

pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> String;

    /// Value for the `parameter-name` query parameter, if any.
    fn parameter(&self) -> Option<&str>;

    /// Returns the property key holding precipitation values.
    fn locate(&self, features: &[Value]) -> Option<String>;
}

/// Unfiltered request; picks the first property whose name looks like
/// precipitation.
pub struct KeywordProbe;

impl ExtractionStrategy for KeywordProbe {
    fn name(&self) -> String {
        "keyword-probe".to_string()
    }

    fn parameter(&self) -> Option<&str> {
        None
    }

    fn locate(&self, features: &[Value]) -> Option<String> {
        find_precip_key(features)
    }
}

/// Requests a single named parameter and accepts it even when its name
/// carries no precipitation keyword.
pub struct NamedParameter {
    name: String,
}

impl NamedParameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ExtractionStrategy for NamedParameter {
    fn name(&self) -> String {
        format!("parameter:{}", self.name)
    }

    fn parameter(&self) -> Option<&str> {
        Some(self.name.as_str())
    }

    fn locate(&self, features: &[Value]) -> Option<String> {
        find_precip_key(features).or_else(|| {
            features
                .first()
                .and_then(properties)
                .filter(|props| props.contains_key(&self.name))
                .map(|_| self.name.clone())
        })
    }
}

/// Raw cumulative samples plus whether any strategy located a key.
#[derive(Debug, Clone, PartialEq)]
pub struct RawExtraction {
    pub points: Vec<ForecastPoint>,
    pub found: bool,
}

pub struct DmiClient {
    client: Client,
    base_url: String,
    api_key: String,
    latitude: f64,
    longitude: f64,
    timezone: Tz,
    horizon: Horizon,
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl DmiClient {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let mut strategies: Vec<Box<dyn ExtractionStrategy>> = vec![Box::new(KeywordProbe)];
        strategies.extend(
            config
                .dmi_parameter_candidates
                .iter()
                .map(|name| Box::new(NamedParameter::new(name.as_str())) as Box<dyn ExtractionStrategy>),
        );

        Ok(Self {
            client: http_client(config.request_timeout)?,
            base_url: config.dmi_base_url.clone(),
            api_key: config.dmi_api_key.clone().unwrap_or_default(),
            latitude: config.latitude,
            longitude: config.longitude,
            timezone: config.timezone,
            horizon: config.horizon,
            strategies,
        })
    }

    async fn request(&self, parameter: Option<&str>) -> Result<Value, FetchError> {
        let coords = format!("POINT({} {})", self.longitude, self.latitude);
        let mut params = vec![
            ("coords", coords.as_str()),
            ("crs", "crs84"),
            ("f", "GeoJSON"),
            ("api-key", self.api_key.as_str()),
        ];
        if let Some(parameter) = parameter {
            params.push(("parameter-name", parameter));
        }
        get_json(&self.client, &self.base_url, &params).await
    }

    /// Runs the strategies in order. A failed request skips to the next
    /// strategy; the last failure is returned only if nothing was found.
    pub async fn extract(&self) -> Result<RawExtraction, FetchError> {
        let mut last_error = None;

        for strategy in &self.strategies {
            let response = match self.request(strategy.parameter()).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("DMI strategy {} failed: {}", strategy.name(), e);
                    last_error = Some(e);
                    continue;
                }
            };

            let features = features(&response);
            match strategy.locate(features) {
                Some(key) => {
                    info!("DMI strategy {} matched property '{}'", strategy.name(), key);
                    return Ok(RawExtraction {
                        points: parse_features(features, &key, self.timezone),
                        found: true,
                    });
                }
                None => debug!("DMI strategy {} found no precipitation property", strategy.name()),
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(RawExtraction {
                points: Vec::new(),
                found: false,
            }),
        }
    }

    pub async fn fetch_window(&self, window: &Window) -> Result<ForecastSeries, FetchError> {
        let extraction = self.extract().await?;
        if !extraction.found {
            return Err(FetchError::NoData(format!(
                "none of {} DMI strategies located a precipitation property",
                self.strategies.len()
            )));
        }

        let rates = to_hourly_rates(&extraction.points);
        Ok(ForecastSeries::new(
            ValueUnit::Millimetres,
            filter_window(&rates, window),
        ))
    }
}

#[async_trait]
impl ForecastSource for DmiClient {
    fn name(&self) -> &'static str {
        "dmi"
    }

    async fn fetch(&self) -> Result<ForecastSeries, FetchError> {
        let now = Utc::now().with_timezone(&self.timezone);
        let window = self.horizon.window(now).not_before(now);
        self.fetch_window(&window).await
    }
}

fn features(response: &Value) -> &[Value] {
    response
        .get("features")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn properties(feature: &Value) -> Option<&serde_json::Map<String, Value>> {
    feature.get("properties").and_then(Value::as_object)
}

pub fn find_precip_key(features: &[Value]) -> Option<String> {
    features.iter().filter_map(properties).find_map(|props| {
        props
            .keys()
            .find(|key| {
                let lower = key.to_lowercase();
                PRECIP_KEYWORDS.iter().any(|kw| lower.contains(kw))
            })
            .cloned()
    })
}

/// Reads `(time, key)` pairs out of the features. Entries lacking a
/// readable time or numeric value are skipped. Sorted by time, duplicates
/// dropped.
pub fn parse_features(features: &[Value], key: &str, tz: Tz) -> Vec<ForecastPoint> {
    let mut points: Vec<ForecastPoint> = features
        .iter()
        .filter_map(properties)
        .filter_map(|props| {
            let raw_time = TIME_KEYS
                .iter()
                .find_map(|k| props.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()))?;
            let ts = parse_time(raw_time, tz)?;
            let value = match props.get(key)? {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) => s.trim().parse::<f64>().ok()?,
                _ => return None,
            };
            Some(ForecastPoint::new(ts, Some(value)))
        })
        .collect();

    points.sort_by_key(|p| p.ts);
    points.dedup_by_key(|p| p.ts);
    points
}

fn parse_time(raw: &str, tz: Tz) -> Option<DateTime<Tz>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&tz));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .ok()?;
    tz.from_local_datetime(&naive).earliest()
}
