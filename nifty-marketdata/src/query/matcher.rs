//! Nearest-timestamp matching.
//!
//! Both the option/spot join and snapshot selection pick the observation
//! with the smallest absolute time difference. Equal distances resolve to
//! the earlier observation.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::data::{OptionRow, SpotSeries};

/// Index of the element nearest to `target` in a slice sorted ascending by
/// `key`. O(log n).
pub fn nearest_index<T, F>(items: &[T], target: NaiveDateTime, key: F) -> Option<usize>
where
    F: Fn(&T) -> NaiveDateTime,
{
    if items.is_empty() {
        return None;
    }
    // First element at or after the target.
    let idx = items.partition_point(|item| key(item) < target);
    if idx == 0 {
        return Some(0);
    }
    if idx == items.len() {
        return Some(idx - 1);
    }

    let before = target - key(&items[idx - 1]);
    let after = key(&items[idx]) - target;
    if after < before {
        Some(idx)
    } else {
        Some(idx - 1)
    }
}

/// Nearest timestamp in an ascending list of timestamps.
pub fn nearest_timestamp(timestamps: &[NaiveDateTime], target: NaiveDateTime) -> Option<NaiveDateTime> {
    nearest_index(timestamps, target, |ts| *ts).map(|idx| timestamps[idx])
}

/// Joins option rows to the underlying spot series.
#[derive(Debug, Clone, Copy)]
pub struct SpotMatcher<'a> {
    series: &'a SpotSeries,
}

impl<'a> SpotMatcher<'a> {
    pub fn new(series: &'a SpotSeries) -> Self {
        Self { series }
    }

    /// Spot price nearest in time to `timestamp` among points recorded on
    /// the same day, or `None` when that day has no spot data.
    pub fn nearest(&self, timestamp: NaiveDateTime) -> Option<Decimal> {
        self.nearest_on(timestamp.date(), timestamp)
    }

    fn nearest_on(&self, date: NaiveDate, timestamp: NaiveDateTime) -> Option<Decimal> {
        let points = self.series.on_date(date);
        nearest_index(points, timestamp, |p| p.timestamp).map(|idx| points[idx].price)
    }

    /// Fill `spot_price` on every row from its own trade date's spot data.
    pub fn attach(&self, rows: &mut [OptionRow]) {
        for row in rows.iter_mut() {
            row.spot_price = self.nearest_on(row.trade_date(), row.timestamp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SpotPoint;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn series() -> SpotSeries {
        SpotSeries::new(vec![
            SpotPoint { timestamp: at(10, 0, 0), price: Decimal::from(100) },
            SpotPoint { timestamp: at(10, 5, 0), price: Decimal::from(102) },
        ])
    }

    #[test]
    fn test_nearest_picks_closer_side() {
        let series = series();
        let matcher = SpotMatcher::new(&series);
        assert_eq!(matcher.nearest(at(10, 2, 0)), Some(Decimal::from(100)));
        assert_eq!(matcher.nearest(at(10, 3, 0)), Some(Decimal::from(102)));
    }

    #[test]
    fn test_nearest_tie_resolves_to_earlier() {
        let series = series();
        let matcher = SpotMatcher::new(&series);
        assert_eq!(matcher.nearest(at(10, 2, 30)), Some(Decimal::from(100)));
    }

    #[test]
    fn test_nearest_outside_range_and_exact() {
        let series = series();
        let matcher = SpotMatcher::new(&series);
        assert_eq!(matcher.nearest(at(9, 15, 0)), Some(Decimal::from(100)));
        assert_eq!(matcher.nearest(at(15, 30, 0)), Some(Decimal::from(102)));
        assert_eq!(matcher.nearest(at(10, 5, 0)), Some(Decimal::from(102)));
    }

    #[test]
    fn test_nearest_ignores_other_days() {
        let series = series();
        let matcher = SpotMatcher::new(&series);
        let next_day = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        assert_eq!(matcher.nearest(next_day), None);
    }

    #[test]
    fn test_empty_series_returns_none() {
        let empty = SpotSeries::default();
        assert_eq!(SpotMatcher::new(&empty).nearest(at(10, 0, 0)), None);
    }

    #[test]
    fn test_nearest_timestamp() {
        let stamps = vec![at(9, 15, 0), at(9, 16, 0), at(9, 20, 0)];
        assert_eq!(nearest_timestamp(&stamps, at(9, 18, 0)), Some(at(9, 16, 0)));
        assert_eq!(nearest_timestamp(&stamps, at(9, 19, 0)), Some(at(9, 20, 0)));
        assert_eq!(nearest_timestamp(&[], at(9, 19, 0)), None);
    }
}
