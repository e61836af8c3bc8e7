//! Query engine: loads the files for a request, joins spot prices and
//! applies the caller's filters.
//!
//! Every call reads fresh from disk. The engine holds only the immutable
//! configuration, so a single instance can be shared across threads.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use super::matcher::SpotMatcher;
use crate::config::EngineConfig;
use crate::data::loader::{parse_timestamp, parse_whole};
use crate::data::paths::split_option_file_name;
use crate::data::{
    DateToken, MonthKey, OptionFileLoader, OptionRow, OptionType, PathResolver, SpotFileLoader,
    SpotSeries,
};
use crate::error::{MarketDataError, MarketDataResult, DIRECTORY_HINT};

/// Optional filters for [`QueryEngine::query_options`].
///
/// Values are kept as the caller supplied them and validated before any
/// file is opened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionQuery {
    /// Exact-match strike list.
    pub strikes: Option<Vec<i64>>,
    /// `C`/`P` (or `CALL`/`PUT`).
    pub option_type: Option<String>,
    /// Inclusive window start, `YYYY-MM-DD HH:MM[:SS]`.
    pub start: Option<String>,
    /// Inclusive window end, `YYYY-MM-DD HH:MM[:SS]`.
    pub end: Option<String>,
    /// Keep rows with `volume >= min_volume`.
    pub min_volume: Option<u64>,
    /// Fail with `NoDataReturned` instead of returning no rows.
    pub raise_if_empty: bool,
}

impl OptionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strikes(mut self, strikes: impl Into<Vec<i64>>) -> Self {
        self.strikes = Some(strikes.into());
        self
    }

    pub fn option_type(mut self, option_type: impl Into<String>) -> Self {
        self.option_type = Some(option_type.into());
        self
    }

    pub fn start(mut self, start: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn end(mut self, end: impl Into<String>) -> Self {
        self.end = Some(end.into());
        self
    }

    pub fn min_volume(mut self, min_volume: u64) -> Self {
        self.min_volume = Some(min_volume);
        self
    }

    pub fn raise_if_empty(mut self, raise: bool) -> Self {
        self.raise_if_empty = raise;
        self
    }

    /// Check every filter and convert to typed form.
    pub fn validate(&self) -> MarketDataResult<QueryFilters> {
        let strikes = match &self.strikes {
            Some(list) => Some(validate_strikes(list)?),
            None => None,
        };
        let option_type = self
            .option_type
            .as_deref()
            .map(OptionType::from_filter)
            .transpose()?;
        let start = self
            .start
            .as_deref()
            .map(|s| parse_query_time(s, "start"))
            .transpose()?;
        let end = self
            .end
            .as_deref()
            .map(|s| parse_query_time(s, "end"))
            .transpose()?;

        Ok(QueryFilters {
            strikes,
            option_type,
            start,
            end,
            min_volume: self.min_volume,
        })
    }
}

/// Validated, typed filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilters {
    pub strikes: Option<BTreeSet<i64>>,
    pub option_type: Option<OptionType>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub min_volume: Option<u64>,
}

impl QueryFilters {
    pub fn matches(&self, row: &OptionRow) -> bool {
        if let Some(strikes) = &self.strikes {
            if !strikes.contains(&row.strike) {
                return false;
            }
        }
        if let Some(option_type) = self.option_type {
            if row.option_type != option_type {
                return false;
            }
        }
        if let Some(start) = self.start {
            if row.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if row.timestamp > end {
                return false;
            }
        }
        if let Some(min_volume) = self.min_volume {
            if row.volume < min_volume {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for QueryFilters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strikes = match &self.strikes {
            Some(s) => format!("{:?}", s.iter().collect::<Vec<_>>()),
            None => "all".to_string(),
        };
        let option_type = self.option_type.map_or("both", |t| t.as_str());
        let bound = |b: Option<NaiveDateTime>| b.map_or("-".to_string(), |t| t.to_string());
        write!(
            f,
            "strikes={}, option_type={}, window=[{}, {}], min_volume={}",
            strikes,
            option_type,
            bound(self.start),
            bound(self.end),
            self.min_volume.unwrap_or(0)
        )
    }
}

/// Result rows plus per-file skip counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub rows: Vec<OptionRow>,
    pub skipped_option_rows: usize,
    pub skipped_spot_rows: usize,
}

/// Check a strike list: every strike must be a positive integer.
pub fn validate_strikes(strikes: &[i64]) -> MarketDataResult<BTreeSet<i64>> {
    let invalid: Vec<i64> = strikes.iter().copied().filter(|s| *s <= 0).collect();
    if !invalid.is_empty() {
        return Err(MarketDataError::invalid(format!(
            "strikes must be positive integers, received {:?}",
            invalid
        )));
    }
    Ok(strikes.iter().copied().collect())
}

/// Parse a comma-separated strike list such as `21000,21500,22000`.
pub fn parse_strike_list(raw: &str) -> MarketDataResult<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            parse_whole(s).filter(|v| *v > 0).ok_or_else(|| {
                MarketDataError::invalid(format!(
                    "strike '{}' is not a positive integer (e.g. strikes=21000,21500)",
                    s
                ))
            })
        })
        .collect()
}

fn parse_query_time(raw: &str, what: &str) -> MarketDataResult<NaiveDateTime> {
    parse_timestamp(raw, None).ok_or_else(|| {
        MarketDataError::invalid(format!(
            "'{}' could not be parsed as a datetime, received '{}'; expected 'YYYY-MM-DD HH:MM' (e.g. '2024-01-01 09:30')",
            what, raw
        ))
    })
}

/// Entry point for all point-in-time and range queries.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    config: EngineConfig,
    resolver: PathResolver,
    options: OptionFileLoader,
    spot: SpotFileLoader,
}

impl QueryEngine {
    /// Build an engine over `config.data_root`, which must be an existing directory.
    pub fn new(config: EngineConfig) -> MarketDataResult<Self> {
        if !config.data_root.is_dir() {
            return Err(MarketDataError::missing(
                config.data_root.clone(),
                "dataset root does not exist or is not accessible; verify the path and that the shared drive is mounted",
            ));
        }
        let resolver = PathResolver::new(config.data_root.clone());
        info!(root = %config.data_root.display(), "market data engine initialised");

        Ok(Self {
            options: OptionFileLoader::new(resolver.clone()),
            spot: SpotFileLoader::new(resolver.clone()),
            resolver,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Option rows for one expiry and trade date with spot joined and
    /// filters applied, ordered by timestamp, strike, then calls before puts.
    pub fn query_options(
        &self,
        expiry: &str,
        trade_date: &str,
        query: &OptionQuery,
    ) -> MarketDataResult<Vec<OptionRow>> {
        Ok(self.query(expiry, trade_date, query)?.rows)
    }

    /// Same as [`Self::query_options`], also reporting skipped row counts.
    pub fn query(
        &self,
        expiry: &str,
        trade_date: &str,
        query: &OptionQuery,
    ) -> MarketDataResult<QueryOutput> {
        let expiry = DateToken::parse(expiry, "expiry")?;
        let trade_date = DateToken::parse(trade_date, "trade_date")?;
        let filters = query.validate()?;

        let output = self.run(&expiry, &trade_date, &filters)?;
        if output.rows.is_empty() {
            let message = no_data_message(&expiry, &trade_date, &filters);
            if query.raise_if_empty {
                return Err(MarketDataError::NoDataReturned(message));
            }
            info!("{}", message);
        }
        Ok(output)
    }

    /// Load, filter, join and sort. Parameters are already validated.
    pub(crate) fn run(
        &self,
        expiry: &DateToken,
        trade_date: &DateToken,
        filters: &QueryFilters,
    ) -> MarketDataResult<QueryOutput> {
        let parsed = self.options.load(expiry, trade_date)?;
        let (series, skipped_spot_rows) = self.load_spot(trade_date.month_key())?;

        let mut rows: Vec<OptionRow> = parsed
            .rows
            .into_iter()
            .filter(|row| filters.matches(row))
            .collect();
        SpotMatcher::new(&series).attach(&mut rows);
        rows.sort_by_key(|row| row.sort_key());

        debug!(
            expiry = %expiry,
            trade_date = %trade_date,
            rows = rows.len(),
            "query complete"
        );
        Ok(QueryOutput {
            rows,
            skipped_option_rows: parsed.skipped,
            skipped_spot_rows,
        })
    }

    pub(crate) fn load_spot(&self, key: MonthKey) -> MarketDataResult<(SpotSeries, usize)> {
        match self.spot.load(key) {
            Ok(parsed) => Ok((parsed.rows, parsed.skipped)),
            Err(e) if e.is_file_not_available() && !self.config.require_spot => {
                warn!(month = %key, error = %e, "spot data unavailable, spot_price left empty");
                Ok((SpotSeries::default(), 0))
            }
            Err(e) => Err(e),
        }
    }

    /// Expiry tokens with a file for `trade_date`, ascending by expiry date.
    pub fn list_expiries(&self, trade_date: &str) -> MarketDataResult<Vec<String>> {
        let trade_date = DateToken::parse(trade_date, "trade_date")?;
        Ok(self
            .expiries_for(&trade_date)?
            .into_iter()
            .map(|t| t.as_str().to_string())
            .collect())
    }

    pub(crate) fn expiries_for(&self, trade_date: &DateToken) -> MarketDataResult<Vec<DateToken>> {
        let dir = self.resolver.month_dir(trade_date.month_key());
        let mut expiries: BTreeMap<NaiveDate, DateToken> = BTreeMap::new();

        for (expiry, file_trade_date) in scan_option_files(&dir)? {
            if !file_trade_date.eq_ignore_ascii_case(trade_date.as_str()) {
                continue;
            }
            match DateToken::parse(&expiry, "expiry") {
                Ok(token) => {
                    expiries.insert(token.date(), token);
                }
                Err(_) => debug!(expiry = %expiry, "ignoring file with unparseable expiry"),
            }
        }

        if expiries.is_empty() {
            info!(trade_date = %trade_date, dir = %dir.display(), "no expiry files found");
        }
        Ok(expiries.into_values().collect())
    }

    /// Distinct strikes present in one option file, ascending.
    pub fn list_strikes(&self, expiry: &str, trade_date: &str) -> MarketDataResult<Vec<i64>> {
        let expiry = DateToken::parse(expiry, "expiry")?;
        let trade_date = DateToken::parse(trade_date, "trade_date")?;
        let parsed = self.options.load(&expiry, &trade_date)?;

        let strikes: BTreeSet<i64> = parsed.rows.iter().map(|r| r.strike).collect();
        Ok(strikes.into_iter().collect())
    }

    /// Trade date tokens with at least one option file in a month directory,
    /// ascending. Only file names are inspected.
    pub fn list_trading_days(&self, year: i32, month: &str) -> MarketDataResult<Vec<String>> {
        let key = MonthKey::parse(year, month)?;
        let dir = self.resolver.month_dir(key);

        let mut days: BTreeMap<NaiveDate, DateToken> = BTreeMap::new();
        for (_, trade_date) in scan_option_files(&dir)? {
            match DateToken::parse(&trade_date, "trade_date") {
                Ok(token) => {
                    days.insert(token.date(), token);
                }
                Err(_) => debug!(trade_date = %trade_date, "ignoring file with unparseable trade date"),
            }
        }
        Ok(days.into_values().map(|t| t.as_str().to_string()).collect())
    }
}

/// `(expiry, trade_date)` tokens of every option file in a month directory.
fn scan_option_files(dir: &Path) -> MarketDataResult<Vec<(String, String)>> {
    if !dir.is_dir() {
        return Err(MarketDataError::missing(dir, DIRECTORY_HINT));
    }

    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if let Some((expiry, trade_date)) = split_option_file_name(&name) {
            found.push((expiry.to_string(), trade_date.to_string()));
        }
    }
    Ok(found)
}

fn no_data_message(expiry: &DateToken, trade_date: &DateToken, filters: &QueryFilters) -> String {
    format!(
        "query returned 0 rows for expiry {} on trade date {} ({}); \
         relax min_volume, check list_strikes, or check trading hours (09:15-15:30 IST)",
        expiry, trade_date, filters
    )
}
