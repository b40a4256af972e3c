use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::cache::{CacheEntry, ForecastCache};
use crate::forecast::{FetchError, ForecastSource};

/// Fetches once and stores the outcome. The cache lock is never held while
/// the fetch is in flight.
pub async fn refresh_once(
    source: &dyn ForecastSource,
    cache: &ForecastCache,
) -> Result<CacheEntry, FetchError> {
    match source.fetch().await {
        Ok(series) => {
            let entry = CacheEntry::new(series, Utc::now());
            tracing::info!(
                "Refreshed forecast from {} ({} points)",
                source.name(),
                entry.series.points.len()
            );
            cache.set(entry.clone()).await;
            Ok(entry)
        }
        Err(e) => {
            tracing::warn!("Forecast refresh from {} failed: {}", source.name(), e);
            cache.record_failure(Utc::now(), e.to_string()).await;
            Err(e)
        }
    }
}

/// Refreshes immediately and then once per `period`, measured from the start
/// of each cycle, until `shutdown` flips to true or its sender is dropped.
pub async fn run_refresher(
    source: Arc<dyn ForecastSource>,
    cache: Arc<ForecastCache>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop_requested(&mut shutdown) => break,
        }

        // An in-flight fetch is abandoned on shutdown; the cache is only
        // written once the fetch has completed.
        tokio::select! {
            _ = refresh_once(source.as_ref(), &cache) => {}
            _ = stop_requested(&mut shutdown) => break,
        }
    }
    tracing::info!("Refresher stopping");
}

async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
