use chrono_tz::Tz;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::forecast::types::Horizon;

const DEFAULT_OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";
const DEFAULT_DMI_URL: &str =
    "https://dmigw.govcloud.dk/v1/forecastedr/collections/harmonie_dini_sf/position";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenMeteo,
    Dmi,
    Mock,
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open-meteo" | "openmeteo" => Ok(Provider::OpenMeteo),
            "dmi" => Ok(Provider::Dmi),
            "mock" => Ok(Provider::Mock),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub provider: Provider,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: Tz,
    pub horizon: Horizon,
    pub dmi_api_key: Option<String>,
    pub dmi_base_url: String,
    pub dmi_parameter_candidates: Vec<String>,
    pub open_meteo_base_url: String,
    pub request_timeout: Duration,
    pub refresh_interval: Duration,
    pub page_refresh_secs: u64,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = parse_or("RAIN_PROVIDER", get("RAIN_PROVIDER"), Provider::OpenMeteo)?;
        let latitude: f64 = parse_or("RAIN_LATITUDE", get("RAIN_LATITUDE"), 55.6761)?;
        let longitude: f64 = parse_or("RAIN_LONGITUDE", get("RAIN_LONGITUDE"), 12.5683)?;

        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ConfigError::Invalid {
                key: "RAIN_LATITUDE",
                value: latitude.to_string(),
                reason: "must be between -90 and 90".to_string(),
            });
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ConfigError::Invalid {
                key: "RAIN_LONGITUDE",
                value: longitude.to_string(),
                reason: "must be between -180 and 180".to_string(),
            });
        }

        let timezone: Tz = parse_or("RAIN_TIMEZONE", get("RAIN_TIMEZONE"), chrono_tz::Europe::Copenhagen)?;
        let horizon: Horizon = parse_or("RAIN_HORIZON", get("RAIN_HORIZON"), Horizon::Hours(12))?;

        let dmi_api_key = get("DMI_API_KEY");
        if provider == Provider::Dmi && dmi_api_key.is_none() {
            return Err(ConfigError::Missing("DMI_API_KEY"));
        }

        let dmi_parameter_candidates = get("DMI_PARAMETER_CANDIDATES")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|| vec!["total-precipitation".to_string()]);

        let default_timeout = match provider {
            Provider::Dmi => 20,
            _ => 10,
        };
        let request_timeout = parse_or("REQUEST_TIMEOUT_SECS", get("REQUEST_TIMEOUT_SECS"), default_timeout)?;
        let refresh_interval: u64 = parse_or("REFRESH_INTERVAL_SECS", get("REFRESH_INTERVAL_SECS"), 3600)?;
        if refresh_interval == 0 {
            return Err(ConfigError::Invalid {
                key: "REFRESH_INTERVAL_SECS",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(Config {
            provider,
            latitude,
            longitude,
            timezone,
            horizon,
            dmi_api_key,
            dmi_base_url: get("DMI_BASE_URL").unwrap_or_else(|| DEFAULT_DMI_URL.to_string()),
            dmi_parameter_candidates,
            open_meteo_base_url: get("OPEN_METEO_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPEN_METEO_URL.to_string()),
            request_timeout: Duration::from_secs(request_timeout),
            refresh_interval: Duration::from_secs(refresh_interval),
            page_refresh_secs: parse_or("PAGE_REFRESH_SECS", get("PAGE_REFRESH_SECS"), 300)?,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
        })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.provider, Provider::OpenMeteo);
        assert_eq!(config.timezone, chrono_tz::Europe::Copenhagen);
        assert_eq!(config.horizon, Horizon::Hours(12));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.refresh_interval, Duration::from_secs(3600));
        assert_eq!(config.dmi_parameter_candidates, vec!["total-precipitation"]);
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
    }

    #[test]
    fn test_dmi_requires_api_key() {
        let err = Config::from_lookup(lookup(&[("RAIN_PROVIDER", "dmi")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DMI_API_KEY"));

        let err = Config::from_lookup(lookup(&[("RAIN_PROVIDER", "dmi"), ("DMI_API_KEY", "  ")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::Missing("DMI_API_KEY"));
    }

    #[test]
    fn test_dmi_config() {
        let config = Config::from_lookup(lookup(&[
            ("RAIN_PROVIDER", "DMI"),
            ("DMI_API_KEY", "secret"),
            ("RAIN_HORIZON", "today"),
            ("DMI_PARAMETER_CANDIDATES", "total-precipitation, precipitation-rate,"),
        ]))
        .unwrap();
        assert_eq!(config.provider, Provider::Dmi);
        assert_eq!(config.dmi_api_key.as_deref(), Some("secret"));
        assert_eq!(config.horizon, Horizon::Today);
        assert_eq!(config.request_timeout, Duration::from_secs(20));
        assert_eq!(
            config.dmi_parameter_candidates,
            vec!["total-precipitation", "precipitation-rate"]
        );
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup(&[("RAIN_LATITUDE", "91")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RAIN_LATITUDE", .. }));

        let err = Config::from_lookup(lookup(&[("RAIN_LONGITUDE", "east")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RAIN_LONGITUDE", .. }));

        let err = Config::from_lookup(lookup(&[("RAIN_TIMEZONE", "Mars/Olympus")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RAIN_TIMEZONE", .. }));

        let err = Config::from_lookup(lookup(&[("RAIN_HORIZON", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RAIN_HORIZON", .. }));

        let err = Config::from_lookup(lookup(&[("RAIN_HORIZON", "4294967295")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RAIN_HORIZON", .. }));

        let err = Config::from_lookup(lookup(&[("REFRESH_INTERVAL_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "REFRESH_INTERVAL_SECS", .. }));

        let err = Config::from_lookup(lookup(&[("RAIN_PROVIDER", "metoffice")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RAIN_PROVIDER", .. }));
    }
}
