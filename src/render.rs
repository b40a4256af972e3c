use askama::Template;
use chrono_tz::Tz;

use crate::cache::CacheSnapshot;
use crate::config::Config;
use crate::forecast::types::{ForecastSeries, ValueUnit};

/// Bar fill per millimetre; 10 mm and above fills the bar.
pub const MM_BAR_SCALE: f64 = 10.0;
const RAIN_LIKELY_PROBABILITY: f64 = 0.5;
const RAIN_EXPECTED_MM: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct PageSettings {
    pub title: String,
    pub timezone: Tz,
    /// Browser auto-refresh period, 0 disables it.
    pub refresh_secs: u64,
}

impl PageSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            title: format!("Rain forecast: {}", config.horizon),
            timezone: config.timezone,
            refresh_secs: config.page_refresh_secs,
        }
    }
}

struct Row {
    time_label: String,
    value_label: String,
    bar: u32,
}

#[derive(Template)]
#[template(path = "forecast.html")]
struct ForecastPage<'a> {
    title: &'a str,
    refresh_secs: u64,
    updated_label: String,
    notice: String,
    outlook: String,
    rows: Vec<Row>,
}

pub fn value_label(value: Option<f64>, unit: ValueUnit) -> String {
    match (value, unit) {
        (None, _) => "N/A".to_string(),
        (Some(v), ValueUnit::Probability) => format!("{:.0}%", v * 100.0),
        (Some(v), ValueUnit::Millimetres) => format!("{:.2} mm", v),
    }
}

/// Progress bar value on a 0-100 scale.
pub fn bar_fill(value: Option<f64>, unit: ValueUnit) -> u32 {
    let Some(v) = value else {
        return 0;
    };
    let scaled = match unit {
        ValueUnit::Probability => v * 100.0,
        ValueUnit::Millimetres => v * MM_BAR_SCALE,
    };
    scaled.round().clamp(0.0, 100.0) as u32
}

/// Peak and mean of the series, with the rain verdict the page headline uses.
#[derive(Debug, Clone, PartialEq)]
pub struct Outlook {
    pub unit: ValueUnit,
    pub peak: f64,
    pub average: f64,
    pub rain_expected: bool,
}

impl Outlook {
    pub fn of(series: &ForecastSeries) -> Option<Self> {
        let values: Vec<f64> = series.values().collect();
        if values.is_empty() {
            return None;
        }
        let peak = values.iter().copied().fold(f64::MIN, f64::max);
        let average = values.iter().sum::<f64>() / values.len() as f64;
        let threshold = match series.unit {
            ValueUnit::Probability => RAIN_LIKELY_PROBABILITY,
            ValueUnit::Millimetres => RAIN_EXPECTED_MM,
        };

        Some(Self {
            unit: series.unit,
            peak,
            average,
            rain_expected: peak >= threshold,
        })
    }

    pub fn headline(&self) -> String {
        match self.unit {
            ValueUnit::Probability => format!(
                "{} (peak {:.0}%, average {:.0}%)",
                if self.rain_expected { "Rain likely" } else { "No rain expected" },
                self.peak * 100.0,
                self.average * 100.0
            ),
            ValueUnit::Millimetres => format!(
                "{} (peak {:.2} mm/h)",
                if self.rain_expected { "Rain expected" } else { "No rain expected" },
                self.peak
            ),
        }
    }
}

pub fn render_page(snapshot: &CacheSnapshot, settings: &PageSettings) -> Result<String, askama::Error> {
    let tz = settings.timezone;
    let local = |ts: chrono::DateTime<chrono::Utc>| ts.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string();

    let (updated_label, outlook, rows) = match &snapshot.entry {
        Some(entry) => {
            let series = entry.series.as_ref();
            let rows = series
                .points
                .iter()
                .map(|p| Row {
                    time_label: p.ts.format("%Y-%m-%d %H:%M").to_string(),
                    value_label: value_label(p.value, series.unit),
                    bar: bar_fill(p.value, series.unit),
                })
                .collect();
            let outlook = Outlook::of(series)
                .map(|o| o.headline())
                .unwrap_or_else(|| "No forecast data in the selected window".to_string());
            (local(entry.fetched_at), outlook, rows)
        }
        None => ("never".to_string(), "No forecast fetched yet".to_string(), Vec::new()),
    };

    let notice = match (snapshot.is_stale(), snapshot.last_attempt, &snapshot.last_error) {
        (true, Some(at), Some(error)) => format!("Refresh at {} failed: {}", local(at), error),
        _ => String::new(),
    };

    ForecastPage {
        title: &settings.title,
        refresh_secs: settings.refresh_secs,
        updated_label,
        notice,
        outlook,
        rows,
    }
    .render()
}
