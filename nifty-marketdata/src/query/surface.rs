//! ATM strike grids, multi-expiry surface snapshots and multi-day series.
//!
//! Everything here is composed from [`QueryEngine`] calls; no file is read
//! directly.

use std::collections::BTreeSet;

use chrono::{NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::engine::{validate_strikes, QueryEngine, QueryFilters};
use super::matcher::nearest_timestamp;
use crate::config::OnMissing;
use crate::data::loader::parse_timestamp;
use crate::data::{DateToken, OptionRow, OptionType};
use crate::error::{MarketDataError, MarketDataResult};

const CLOCK_FORMATS: &[&str] = &["%H:%M", "%H:%M:%S"];

/// ATM strike and the symmetric grid around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtmGrid {
    pub atm_strike: i64,
    /// `atm_strike + step * k` for `k` in `-n..=n`, ascending.
    pub strikes: Vec<i64>,
    /// Spot price the ATM strike was chosen against.
    pub reference_spot: Decimal,
}

/// Parameters for [`SurfaceBuilder::surface_snapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceRequest {
    /// Number of nearest expiries to include.
    pub n_expiries: usize,
    /// Strikes on each side of ATM.
    pub n_strikes: i64,
    /// Strike spacing in index points.
    pub step: i64,
    pub option_type: Option<String>,
    pub min_volume: u64,
}

impl Default for SurfaceRequest {
    fn default() -> Self {
        Self {
            n_expiries: 8,
            n_strikes: 10,
            step: 100,
            option_type: None,
            min_volume: 0,
        }
    }
}

/// Parameters for [`SurfaceBuilder::query_time_series`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeriesRequest {
    pub strikes: Option<Vec<i64>>,
    pub option_type: Option<String>,
    /// Clock time (`HH:MM`) to reduce each day to.
    pub snapshot_time: Option<String>,
    pub min_volume: u64,
    /// Overrides the engine's configured policy.
    pub on_missing: Option<OnMissing>,
}

/// A trade date left out of a time series, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedDate {
    pub trade_date: String,
    pub reason: String,
}

/// Rows for every trade date that loaded, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    pub rows: Vec<OptionRow>,
    pub skipped: Vec<SkippedDate>,
}

fn check_grid_params(n_strikes: i64, step: i64) -> MarketDataResult<()> {
    if n_strikes <= 0 {
        return Err(MarketDataError::invalid(format!(
            "n_strikes must be positive, received {}",
            n_strikes
        )));
    }
    if step <= 0 {
        return Err(MarketDataError::invalid(format!(
            "step must be positive, received {}",
            step
        )));
    }
    Ok(())
}

fn parse_clock_time(raw: &str) -> MarketDataResult<NaiveTime> {
    CLOCK_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw.trim(), fmt).ok())
        .ok_or_else(|| {
            MarketDataError::invalid(format!(
                "snapshot_time '{}' is not a clock time; expected 'HH:MM' (e.g. '10:00')",
                raw
            ))
        })
}

/// Strike nearest to `spot`; ties go to the lower strike.
pub fn nearest_strike(strikes: &BTreeSet<i64>, spot: Decimal) -> Option<i64> {
    let mut best: Option<(i64, Decimal)> = None;
    for &strike in strikes {
        let distance = (Decimal::from(strike) - spot).abs();
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((strike, distance));
        }
    }
    best.map(|(strike, _)| strike)
}

/// Keep only the rows stamped with the timestamp nearest to `target`.
/// `rows` must be sorted by timestamp.
pub fn rows_nearest_to(rows: Vec<OptionRow>, target: NaiveDateTime) -> Vec<OptionRow> {
    let mut stamps: Vec<NaiveDateTime> = rows.iter().map(|r| r.timestamp).collect();
    stamps.dedup();
    match nearest_timestamp(&stamps, target) {
        Some(chosen) => rows.into_iter().filter(|r| r.timestamp == chosen).collect(),
        None => rows,
    }
}

/// Higher-level queries built on a [`QueryEngine`].
#[derive(Debug, Clone, Copy)]
pub struct SurfaceBuilder<'a> {
    engine: &'a QueryEngine,
}

impl<'a> SurfaceBuilder<'a> {
    pub fn new(engine: &'a QueryEngine) -> Self {
        Self { engine }
    }

    /// ATM strike for an expiry/trade date and the full theoretical grid of
    /// `2 * n_strikes + 1` strikes around it.
    ///
    /// The reference spot is the one joined to the earliest quote of the
    /// session. Grid strikes are not checked against traded strikes.
    pub fn get_atm_strikes(
        &self,
        expiry: &str,
        trade_date: &str,
        n_strikes: i64,
        step: i64,
    ) -> MarketDataResult<AtmGrid> {
        let expiry = DateToken::parse(expiry, "expiry")?;
        let trade_date = DateToken::parse(trade_date, "trade_date")?;
        check_grid_params(n_strikes, step)?;
        self.atm_grid(&expiry, &trade_date, n_strikes, step)
    }

    fn atm_grid(
        &self,
        expiry: &DateToken,
        trade_date: &DateToken,
        n_strikes: i64,
        step: i64,
    ) -> MarketDataResult<AtmGrid> {
        let output = self
            .engine
            .run(expiry, trade_date, &QueryFilters::default())?;

        let reference_spot = output
            .rows
            .iter()
            .find_map(|r| r.spot_price)
            .ok_or_else(|| {
                MarketDataError::NoDataReturned(format!(
                    "no spot price available to locate ATM for expiry {} on trade date {}",
                    expiry, trade_date
                ))
            })?;

        let traded: BTreeSet<i64> = output.rows.iter().map(|r| r.strike).collect();
        let atm_strike = nearest_strike(&traded, reference_spot).ok_or_else(|| {
            MarketDataError::NoDataReturned(format!(
                "no strikes traded for expiry {} on trade date {}",
                expiry, trade_date
            ))
        })?;

        let overflow = || {
            MarketDataError::invalid(format!(
                "grid of {} strikes spaced {} around ATM {} exceeds the strike range",
                n_strikes, step, atm_strike
            ))
        };
        let span = step.checked_mul(n_strikes).ok_or_else(overflow)?;
        atm_strike.checked_add(span).ok_or_else(overflow)?;
        let lowest = atm_strike.checked_sub(span).ok_or_else(overflow)?;
        if lowest <= 0 {
            return Err(MarketDataError::invalid(format!(
                "grid of {} strikes spaced {} around ATM {} reaches non-positive strike {}",
                n_strikes, step, atm_strike, lowest
            )));
        }
        let strikes = (-n_strikes..=n_strikes)
            .map(|k| atm_strike + step * k)
            .collect();

        debug!(expiry = %expiry, trade_date = %trade_date, atm_strike, %reference_spot, "atm grid");
        Ok(AtmGrid {
            atm_strike,
            strikes,
            reference_spot,
        })
    }

    /// Cross-section of quotes over the first `n_expiries` expiries at one
    /// instant. Each expiry contributes its ATM grid rows at the timestamp
    /// nearest to `timestamp` among rows passing the other filters.
    ///
    /// Expiries whose option file or ATM reference is unavailable are
    /// skipped; the call fails with `NoDataReturned` only when nothing is
    /// left. A missing spot file for the trade date is shared by every expiry
    /// and fails the call with `FileNotAvailable` unless spot is optional.
    pub fn surface_snapshot(
        &self,
        trade_date: &str,
        timestamp: &str,
        request: &SurfaceRequest,
    ) -> MarketDataResult<Vec<OptionRow>> {
        let trade_date = DateToken::parse(trade_date, "trade_date")?;
        let target = parse_timestamp(timestamp, None).ok_or_else(|| {
            MarketDataError::invalid(format!(
                "timestamp '{}' is not a datetime; expected 'YYYY-MM-DD HH:MM' (e.g. '2024-01-01 10:00')",
                timestamp
            ))
        })?;
        if request.n_expiries == 0 {
            return Err(MarketDataError::invalid("n_expiries must be positive, received 0"));
        }
        check_grid_params(request.n_strikes, request.step)?;
        let option_type = request
            .option_type
            .as_deref()
            .map(OptionType::from_filter)
            .transpose()?;

        let mut expiries = self.engine.expiries_for(&trade_date)?;
        if expiries.is_empty() {
            return Err(MarketDataError::NoDataReturned(format!(
                "no expiries found for trade date {}",
                trade_date
            )));
        }
        expiries.truncate(request.n_expiries);
        self.engine.load_spot(trade_date.month_key())?;

        let mut surface = Vec::new();
        for expiry in &expiries {
            let grid = match self.atm_grid(expiry, &trade_date, request.n_strikes, request.step) {
                Ok(grid) => grid,
                Err(e) if e.is_file_not_available() || e.is_no_data() => {
                    debug!(expiry = %expiry, error = %e, "skipping expiry");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let filters = QueryFilters {
                strikes: Some(grid.strikes.iter().copied().collect()),
                option_type,
                start: None,
                end: None,
                min_volume: Some(request.min_volume),
            };
            let rows = match self.engine.run(expiry, &trade_date, &filters) {
                Ok(output) => output.rows,
                Err(e) if e.is_file_not_available() => {
                    debug!(expiry = %expiry, error = %e, "skipping expiry");
                    continue;
                }
                Err(e) => return Err(e),
            };
            surface.extend(rows_nearest_to(rows, target));
        }

        if surface.is_empty() {
            return Err(MarketDataError::NoDataReturned(format!(
                "surface snapshot for trade date {} at {} returned no rows; try another timestamp or reduce min_volume",
                trade_date, target
            )));
        }
        Ok(surface)
    }

    /// The same expiry across several trade dates, in the order given.
    ///
    /// Dates whose option file is missing follow the `on_missing` policy:
    /// skipped with a recorded reason, or failing the call. If every date is
    /// missing the first `FileNotAvailable` is returned either way.
    pub fn query_time_series<S: AsRef<str>>(
        &self,
        expiry: &str,
        trade_dates: &[S],
        request: &TimeSeriesRequest,
    ) -> MarketDataResult<TimeSeries> {
        let expiry = DateToken::parse(expiry, "expiry")?;
        if trade_dates.is_empty() {
            return Err(MarketDataError::invalid("trade_dates must not be empty"));
        }
        let dates = trade_dates
            .iter()
            .map(|d| DateToken::parse(d.as_ref(), "trade_date"))
            .collect::<MarketDataResult<Vec<_>>>()?;
        let filters = QueryFilters {
            strikes: request
                .strikes
                .as_deref()
                .map(validate_strikes)
                .transpose()?,
            option_type: request
                .option_type
                .as_deref()
                .map(OptionType::from_filter)
                .transpose()?,
            start: None,
            end: None,
            min_volume: Some(request.min_volume),
        };
        let snapshot_time = request
            .snapshot_time
            .as_deref()
            .map(parse_clock_time)
            .transpose()?;
        let on_missing = request.on_missing.unwrap_or(self.engine.config().on_missing);

        let mut series = TimeSeries::default();
        let mut first_missing: Option<MarketDataError> = None;
        let mut loaded = 0usize;

        for trade_date in &dates {
            let rows = match self.engine.run(&expiry, trade_date, &filters) {
                Ok(output) => output.rows,
                Err(e) if e.is_file_not_available() && on_missing == OnMissing::Skip => {
                    warn!(trade_date = %trade_date, error = %e, "skipping trade date");
                    series.skipped.push(SkippedDate {
                        trade_date: trade_date.as_str().to_string(),
                        reason: e.to_string(),
                    });
                    first_missing.get_or_insert(e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            loaded += 1;

            match snapshot_time {
                Some(time) => {
                    let target = trade_date.date().and_time(time);
                    series.rows.extend(rows_nearest_to(rows, target));
                }
                None => series.rows.extend(rows),
            }
        }

        if loaded == 0 {
            if let Some(e) = first_missing {
                return Err(e);
            }
        }
        Ok(series)
    }
}

impl QueryEngine {
    /// Surface and time-series queries over this engine.
    pub fn surface(&self) -> SurfaceBuilder<'_> {
        SurfaceBuilder::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row_at(h: u32, m: u32, strike: i64) -> OptionRow {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        OptionRow {
            timestamp: day.and_hms_opt(h, m, 0).unwrap(),
            expiry_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            days_to_expiry: 31,
            strike,
            option_type: OptionType::Call,
            open_price: Decimal::ONE,
            high_price: Decimal::ONE,
            low_price: Decimal::ONE,
            close_price: Decimal::ONE,
            market_price: Decimal::ONE,
            volume: 1,
            open_interest: 1,
            spot_price: None,
        }
    }

    #[test]
    fn test_nearest_strike_ties_go_lower() {
        let strikes: BTreeSet<i64> = [21600, 21700, 21800].into_iter().collect();
        assert_eq!(nearest_strike(&strikes, Decimal::from(21650)), Some(21600));
        assert_eq!(nearest_strike(&strikes, Decimal::from(21651)), Some(21700));
        assert_eq!(nearest_strike(&strikes, Decimal::from(30000)), Some(21800));
        assert_eq!(nearest_strike(&BTreeSet::new(), Decimal::from(1)), None);
    }

    #[test]
    fn test_grid_params() {
        assert!(check_grid_params(10, 100).is_ok());
        assert!(matches!(
            check_grid_params(0, 100),
            Err(MarketDataError::InvalidParameter(_))
        ));
        assert!(matches!(
            check_grid_params(5, -50),
            Err(MarketDataError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_parse_clock_time() {
        assert_eq!(parse_clock_time("10:00").unwrap(), NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert_eq!(parse_clock_time("10:00:30").unwrap(), NaiveTime::from_hms_opt(10, 0, 30).unwrap());
        assert!(parse_clock_time("ten").is_err());
    }

    #[test]
    fn test_rows_nearest_to_keeps_one_timestamp() {
        let rows = vec![
            row_at(9, 59, 21500),
            row_at(9, 59, 21600),
            row_at(10, 3, 21500),
            row_at(10, 3, 21600),
        ];
        let target = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(10, 1, 0).unwrap();
        let picked = rows_nearest_to(rows, target);
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|r| r.timestamp.time() == NaiveTime::from_hms_opt(9, 59, 0).unwrap()));
    }

    #[test]
    fn test_surface_request_defaults() {
        let request = SurfaceRequest::default();
        assert_eq!(request.n_expiries, 8);
        assert_eq!(request.n_strikes, 10);
        assert_eq!(request.step, 100);
    }
}
