use chrono::DateTime;
use chrono_tz::Tz;

use super::types::ForecastPoint;

/// Time range predicate used to scope a series. The start is always
/// inclusive; the end is inclusive or exclusive depending on the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub end_inclusive: bool,
}

impl Window {
    pub fn inclusive(start: DateTime<Tz>, end: DateTime<Tz>) -> Self {
        Self { start, end, end_inclusive: true }
    }

    pub fn exclusive(start: DateTime<Tz>, end: DateTime<Tz>) -> Self {
        Self { start, end, end_inclusive: false }
    }

    pub fn contains(&self, ts: &DateTime<Tz>) -> bool {
        if *ts < self.start {
            return false;
        }
        if self.end_inclusive {
            *ts <= self.end
        } else {
            *ts < self.end
        }
    }

    /// Moves the start forward to `ts` if it lies inside the window.
    pub fn not_before(self, ts: DateTime<Tz>) -> Self {
        Self {
            start: self.start.max(ts),
            ..self
        }
    }
}

/// Differences a cumulative series into per-hour rates.
///
/// Each rate is stamped with the later sample's timestamp and clamped at
/// zero, so provider corrections never produce negative rain. Fewer than two
/// samples are returned unchanged.
pub fn to_hourly_rates(points: &[ForecastPoint]) -> Vec<ForecastPoint> {
    if points.len() < 2 {
        return points.to_vec();
    }

    points
        .windows(2)
        .map(|pair| {
            let (earlier, later) = (&pair[0], &pair[1]);
            let hours = (later.ts - earlier.ts).num_seconds() as f64 / 3600.0;
            let rate = match (earlier.value, later.value) {
                (Some(a), Some(b)) => {
                    let delta = b - a;
                    let rate = if hours > 0.0 { delta / hours } else { delta };
                    Some(rate.max(0.0))
                }
                _ => None,
            };
            ForecastPoint::new(later.ts, rate)
        })
        .collect()
}

pub fn filter_window(points: &[ForecastPoint], window: &Window) -> Vec<ForecastPoint> {
    points
        .iter()
        .filter(|p| window.contains(&p.ts))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use chrono_tz::Europe::Copenhagen;

    fn series(start: DateTime<Tz>, step_hours: i64, values: &[f64]) -> Vec<ForecastPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| ForecastPoint::new(start + Duration::hours(i as i64 * step_hours), Some(*v)))
            .collect()
    }

    fn base() -> DateTime<Tz> {
        Copenhagen.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_hourly_rates_from_cumulative() {
        let points = series(base(), 1, &[0.0, 0.5, 1.5, 1.5]);
        let rates = to_hourly_rates(&points);

        assert_eq!(rates.len(), 3);
        assert_eq!(rates[0].ts, base() + Duration::hours(1));
        assert_eq!(rates[0].value, Some(0.5));
        assert_eq!(rates[1].value, Some(1.0));
        assert_eq!(rates[2].value, Some(0.0));
    }

    #[test]
    fn test_hourly_rates_divide_by_step() {
        let points = series(base(), 3, &[1.0, 4.0]);
        let rates = to_hourly_rates(&points);

        assert_eq!(rates.len(), 1);
        assert!((rates[0].value.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_hourly_rates_never_negative() {
        let points = series(base(), 1, &[5.0, 3.0, 3.5, 0.0, 10.0, 9.99]);
        let rates = to_hourly_rates(&points);

        assert_eq!(rates.len(), 5);
        assert!(rates.iter().all(|p| p.value.unwrap() >= 0.0));
        assert_eq!(rates[0].value, Some(0.0));
        assert_eq!(rates[2].value, Some(0.0));
    }

    #[test]
    fn test_single_point_passes_through() {
        let points = series(base(), 1, &[2.5]);
        assert_eq!(to_hourly_rates(&points), points);
        assert!(to_hourly_rates(&[]).is_empty());
    }

    #[test]
    fn test_missing_value_yields_missing_rate() {
        let mut points = series(base(), 1, &[1.0, 2.0, 3.0]);
        points[1].value = None;
        let rates = to_hourly_rates(&points);

        assert_eq!(rates[0].value, None);
        assert_eq!(rates[1].value, None);
    }

    #[test]
    fn test_filter_exclusive_window() {
        let points = series(base(), 1, &[0.0, 1.0, 2.0, 3.0, 4.0]);
        let window = Window::exclusive(base() + Duration::hours(1), base() + Duration::hours(3));
        let kept = filter_window(&points, &window);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].value, Some(1.0));
        assert_eq!(kept[1].value, Some(2.0));
        assert!(kept.iter().all(|p| p.ts >= window.start && p.ts < window.end));
    }

    #[test]
    fn test_filter_inclusive_window() {
        let points = series(base(), 1, &[0.0, 1.0, 2.0, 3.0]);
        let window = Window::inclusive(base() + Duration::hours(1), base() + Duration::hours(3));
        let kept = filter_window(&points, &window);

        assert_eq!(
            kept.iter().map(|p| p.value.unwrap()).collect::<Vec<_>>(),
            vec![1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn test_not_before_moves_start_forward() {
        let window = Window::exclusive(base(), base() + Duration::hours(24));
        let later = base() + Duration::minutes(90);

        assert_eq!(window.not_before(later).start, later);
        assert_eq!(window.not_before(base() - Duration::hours(1)).start, base());
    }
}
