use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::forecast::types::ForecastSeries;

/// The last successfully fetched series. Replaced wholesale, never patched.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub series: Arc<ForecastSeries>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(series: ForecastSeries, fetched_at: DateTime<Utc>) -> Self {
        Self {
            series: Arc::new(series),
            fetched_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub entry: Option<CacheEntry>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl CacheSnapshot {
    /// True when the most recent attempt failed after the last success.
    pub fn is_stale(&self) -> bool {
        match (&self.entry, self.last_attempt, &self.last_error) {
            (Some(entry), Some(attempt), Some(_)) => attempt > entry.fetched_at,
            _ => false,
        }
    }
}

/// Single-slot forecast cache shared by the refresher and the request
/// handlers. The lock is only held to clone or assign.
#[derive(Debug, Default)]
pub struct ForecastCache {
    slot: Mutex<CacheSnapshot>,
}

impl ForecastCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<CacheEntry> {
        self.slot.lock().await.entry.clone()
    }

    pub async fn snapshot(&self) -> CacheSnapshot {
        self.slot.lock().await.clone()
    }

    pub async fn set(&self, entry: CacheEntry) {
        let mut slot = self.slot.lock().await;
        slot.last_attempt = Some(entry.fetched_at);
        slot.last_error = None;
        slot.entry = Some(entry);
    }

    /// Records a failed attempt without touching the cached series.
    pub async fn record_failure(&self, at: DateTime<Utc>, error: impl Into<String>) {
        let mut slot = self.slot.lock().await;
        slot.last_attempt = Some(at);
        slot.last_error = Some(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::types::{ForecastPoint, ValueUnit};
    use chrono::{Duration, TimeZone};
    use chrono_tz::UTC;

    fn series_of(value: f64, len: usize) -> ForecastSeries {
        let start = UTC.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let points = (0..len)
            .map(|i| ForecastPoint::new(start + Duration::hours(i as i64), Some(value)))
            .collect();
        ForecastSeries::new(ValueUnit::Millimetres, points)
    }

    #[tokio::test]
    async fn test_empty_cache() {
        let cache = ForecastCache::new();
        assert!(cache.get().await.is_none());

        let snapshot = cache.snapshot().await;
        assert!(snapshot.entry.is_none());
        assert!(snapshot.last_attempt.is_none());
        assert!(!snapshot.is_stale());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = ForecastCache::new();
        let now = Utc::now();
        cache.set(CacheEntry::new(series_of(1.0, 3), now)).await;

        let entry = cache.get().await.unwrap();
        assert_eq!(entry.fetched_at, now);
        assert_eq!(entry.series.points.len(), 3);
    }

    #[tokio::test]
    async fn test_failure_keeps_last_good_series() {
        let cache = ForecastCache::new();
        let fetched_at = Utc::now();
        cache.set(CacheEntry::new(series_of(1.0, 3), fetched_at)).await;

        let failed_at = fetched_at + Duration::hours(1);
        cache.record_failure(failed_at, "timeout").await;

        let snapshot = cache.snapshot().await;
        let entry = snapshot.entry.clone().unwrap();
        assert_eq!(entry.fetched_at, fetched_at);
        assert_eq!(entry.series.points.len(), 3);
        assert_eq!(snapshot.last_attempt, Some(failed_at));
        assert_eq!(snapshot.last_error.as_deref(), Some("timeout"));
        assert!(snapshot.is_stale());

        cache.set(CacheEntry::new(series_of(2.0, 2), failed_at + Duration::hours(1))).await;
        let snapshot = cache.snapshot().await;
        assert!(snapshot.last_error.is_none());
        assert!(!snapshot.is_stale());
    }

    #[tokio::test]
    async fn test_failure_on_empty_cache_stays_empty() {
        let cache = ForecastCache::new();
        cache.record_failure(Utc::now(), "dns").await;

        assert!(cache.get().await.is_none());
        assert!(!cache.snapshot().await.is_stale());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_mixed_series() {
        let cache = Arc::new(ForecastCache::new());
        cache.set(CacheEntry::new(series_of(0.0, 48), Utc::now())).await;

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for round in 1..200 {
                    let len = 24 + (round % 24);
                    cache.set(CacheEntry::new(series_of(round as f64, len), Utc::now())).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for _ in 0..500 {
                        let entry = cache.get().await.unwrap();
                        let first = entry.series.points[0].value;
                        assert!(entry.series.points.iter().all(|p| p.value == first));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
