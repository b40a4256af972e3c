pub mod dmi;
pub mod mock;
pub mod normalize;
pub mod open_meteo;
pub mod types;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{Config, Provider};
use types::ForecastSeries;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("API error: HTTP {status}: {body}")]
    ApiError {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("no precipitation data found: {0}")]
    NoData(String),
}

/// A provider that yields a normalized, windowed precipitation series.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> Result<ForecastSeries, FetchError>;
}

pub fn build_source(config: &Config) -> Result<Arc<dyn ForecastSource>, FetchError> {
    let source: Arc<dyn ForecastSource> = match config.provider {
        Provider::OpenMeteo => Arc::new(open_meteo::OpenMeteoClient::new(config)?),
        Provider::Dmi => Arc::new(dmi::DmiClient::new(config)?),
        Provider::Mock => Arc::new(mock::MockSource::new(config.timezone, config.horizon)),
    };
    Ok(source)
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client, FetchError> {
    let client = Client::builder()
        .user_agent(concat!("RainForecastServer/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Issues a GET and decodes the body as JSON. Non-2xx responses become
/// `FetchError::ApiError` carrying the response text.
pub(crate) async fn get_json(
    client: &Client,
    url: &str,
    params: &[(&str, &str)],
) -> Result<Value, FetchError> {
    tracing::debug!("GET {} ({} params)", url, params.len());
    let response = client.get(url).query(params).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FetchError::ApiError { status, body });
    }

    let text = response.text().await?;
    Ok(serde_json::from_str(&text)?)
}
