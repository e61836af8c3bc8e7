//! CSV loaders for option and spot files.
//!
//! Exported files do not agree on column names (`strike` vs `strike_price`,
//! `option_type` vs `right`, `price` vs `close`). Headers are normalised to a
//! fixed set of canonical columns through [`OPTION_COLUMN_ALIASES`] and
//! [`SPOT_COLUMN_ALIASES`] before any row is read.
//!
//! Rows that fail to parse are skipped and counted; a missing file or a
//! header without a required column is an error.

use std::path::Path;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use csv::{ReaderBuilder, StringRecord, Trim};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::paths::PathResolver;
use super::types::{DateToken, MonthKey, OptionRow, OptionType, SpotPoint, SpotSeries};
use crate::error::{MarketDataError, MarketDataResult, OPTION_FILE_HINT, SPOT_FILE_HINT};

/// Canonical option columns and the raw header names accepted for each.
pub const OPTION_COLUMN_ALIASES: &[(&str, &[&str])] = &[
    ("timestamp", &["timestamp", "datetime", "date_time", "time"]),
    ("strike", &["strike", "strike_price"]),
    ("option_type", &["option_type", "right", "type"]),
    ("open", &["open", "open_price"]),
    ("high", &["high", "high_price"]),
    ("low", &["low", "low_price"]),
    ("close", &["close", "close_price"]),
    ("volume", &["volume", "vol"]),
    ("open_interest", &["open_interest", "oi", "openinterest"]),
];

/// Canonical spot columns and the raw header names accepted for each.
pub const SPOT_COLUMN_ALIASES: &[(&str, &[&str])] = &[
    ("timestamp", &["timestamp", "datetime", "date_time", "time"]),
    ("price", &["price", "close", "spot_price", "spot"]),
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%H:%M:%S%.f"];

/// Parsed content of one file plus the number of data rows that were skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile<T> {
    pub rows: T,
    pub skipped: usize,
}

/// Column positions resolved from a header row.
#[derive(Debug, Clone)]
struct ColumnMap {
    indices: Vec<usize>,
}

impl ColumnMap {
    /// Resolve every canonical column in `aliases` against `headers`,
    /// case-insensitively. The first alias present wins.
    fn resolve(
        headers: &StringRecord,
        aliases: &[(&str, &[&str])],
        path: &Path,
    ) -> MarketDataResult<Self> {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
            .collect();

        let mut indices = Vec::with_capacity(aliases.len());
        for (canonical, names) in aliases {
            let idx = names
                .iter()
                .find_map(|name| normalized.iter().position(|h| h == name))
                .ok_or_else(|| MarketDataError::MalformedFile {
                    path: path.to_path_buf(),
                    reason: format!(
                        "missing column '{}' (accepted names: {}); found: {}",
                        canonical,
                        names.join(", "),
                        normalized.join(", ")
                    ),
                })?;
            indices.push(idx);
        }
        Ok(Self { indices })
    }

    /// Field for the n-th canonical column.
    fn get<'r>(&self, record: &'r StringRecord, column: usize) -> Option<&'r str> {
        record
            .get(self.indices[column])
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// Column positions inside OPTION_COLUMN_ALIASES / SPOT_COLUMN_ALIASES.
const OPT_TIMESTAMP: usize = 0;
const OPT_STRIKE: usize = 1;
const OPT_TYPE: usize = 2;
const OPT_OPEN: usize = 3;
const OPT_HIGH: usize = 4;
const OPT_LOW: usize = 5;
const OPT_CLOSE: usize = 6;
const OPT_VOLUME: usize = 7;
const OPT_OI: usize = 8;
const SPOT_TIMESTAMP: usize = 0;
const SPOT_PRICE: usize = 1;

/// Parse a timestamp cell. Full date-times are taken as-is; clock times
/// are anchored to `anchor` when one is given.
pub fn parse_timestamp(raw: &str, anchor: Option<NaiveDate>) -> Option<NaiveDateTime> {
    let s = raw.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    let date = anchor?;
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
        .map(|time| date.and_time(time))
}

/// Parse a price cell, accepting plain and scientific notation.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// Parse an integral cell. `21000` and `21000.0` are accepted, `21000.5` is not.
pub fn parse_whole(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let d = parse_decimal(s)?;
    if d.fract().is_zero() {
        d.to_i64()
    } else {
        None
    }
}

fn parse_count(raw: &str) -> Option<u64> {
    u64::try_from(parse_whole(raw)?).ok()
}

fn open_reader(path: &Path) -> MarketDataResult<csv::Reader<std::fs::File>> {
    Ok(ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?)
}

/// Loads one option file for an (expiry, trade date) pair.
#[derive(Debug, Clone)]
pub struct OptionFileLoader {
    resolver: PathResolver,
}

impl OptionFileLoader {
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// Load and normalise the option file. `spot_price` is left empty.
    pub fn load(
        &self,
        expiry: &DateToken,
        trade_date: &DateToken,
    ) -> MarketDataResult<ParsedFile<Vec<OptionRow>>> {
        let path = self.resolver.option_path(expiry, trade_date);
        if !path.is_file() {
            return Err(MarketDataError::missing(
                path,
                &format!(
                    "option file for expiry {} on trade date {}: {}",
                    expiry, trade_date, OPTION_FILE_HINT
                ),
            ));
        }
        let parsed = Self::load_path(&path, expiry, trade_date)?;

        debug!(
            path = %path.display(),
            rows = parsed.rows.len(),
            skipped = parsed.skipped,
            "loaded option file"
        );
        if parsed.skipped > 0 {
            warn!(
                path = %path.display(),
                skipped = parsed.skipped,
                "skipped malformed option rows"
            );
        }
        Ok(parsed)
    }

    /// Parse an option CSV at an explicit path.
    pub fn load_path(
        path: &Path,
        expiry: &DateToken,
        trade_date: &DateToken,
    ) -> MarketDataResult<ParsedFile<Vec<OptionRow>>> {
        let mut reader = open_reader(path)?;
        let columns = ColumnMap::resolve(reader.headers()?, OPTION_COLUMN_ALIASES, path)?;

        let expiry_date = expiry.date();
        let days_to_expiry = (expiry_date - trade_date.date()).num_days();

        let mut rows = Vec::new();
        let mut skipped = 0;
        for record in reader.records() {
            let parsed = record.ok().and_then(|record| {
                parse_option_record(&record, &columns, trade_date.date(), expiry_date, days_to_expiry)
            });
            match parsed {
                Some(row) => rows.push(row),
                None => skipped += 1,
            }
        }
        Ok(ParsedFile { rows, skipped })
    }
}

fn parse_option_record(
    record: &StringRecord,
    columns: &ColumnMap,
    trade_date: NaiveDate,
    expiry_date: NaiveDate,
    days_to_expiry: i64,
) -> Option<OptionRow> {
    let timestamp = parse_timestamp(columns.get(record, OPT_TIMESTAMP)?, Some(trade_date))?;
    let strike = parse_whole(columns.get(record, OPT_STRIKE)?).filter(|s| *s > 0)?;
    let option_type = OptionType::from_str(columns.get(record, OPT_TYPE)?)?;
    let open_price = parse_decimal(columns.get(record, OPT_OPEN)?)?;
    let high_price = parse_decimal(columns.get(record, OPT_HIGH)?)?;
    let low_price = parse_decimal(columns.get(record, OPT_LOW)?)?;
    let close_price = parse_decimal(columns.get(record, OPT_CLOSE)?)?;
    let volume = parse_count(columns.get(record, OPT_VOLUME)?)?;
    let open_interest = parse_count(columns.get(record, OPT_OI)?)?;

    Some(OptionRow {
        timestamp,
        expiry_date,
        days_to_expiry,
        strike,
        option_type,
        open_price,
        high_price,
        low_price,
        close_price,
        market_price: close_price,
        volume,
        open_interest,
        spot_price: None,
    })
}

/// Loads one monthly spot file.
#[derive(Debug, Clone)]
pub struct SpotFileLoader {
    resolver: PathResolver,
}

impl SpotFileLoader {
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// Load the spot series for a month, ascending by timestamp.
    pub fn load(&self, key: MonthKey) -> MarketDataResult<ParsedFile<SpotSeries>> {
        let path = self.resolver.spot_path(key);
        if !path.is_file() {
            return Err(MarketDataError::missing(
                path,
                &format!("spot file for {}: {}", key, SPOT_FILE_HINT),
            ));
        }
        let parsed = Self::load_path(&path)?;

        debug!(
            path = %path.display(),
            points = parsed.rows.len(),
            skipped = parsed.skipped,
            "loaded spot file"
        );
        if parsed.skipped > 0 {
            warn!(
                path = %path.display(),
                skipped = parsed.skipped,
                "skipped malformed spot rows"
            );
        }
        Ok(parsed)
    }

    /// Parse a spot CSV at an explicit path.
    pub fn load_path(path: &Path) -> MarketDataResult<ParsedFile<SpotSeries>> {
        let mut reader = open_reader(path)?;
        let columns = ColumnMap::resolve(reader.headers()?, SPOT_COLUMN_ALIASES, path)?;

        let mut points = Vec::new();
        let mut skipped = 0;
        for record in reader.records() {
            let point = record.ok().and_then(|record| {
                let timestamp = parse_timestamp(columns.get(&record, SPOT_TIMESTAMP)?, None)?;
                let price = parse_decimal(columns.get(&record, SPOT_PRICE)?)?;
                Some(SpotPoint { timestamp, price })
            });
            match point {
                Some(point) => points.push(point),
                None => skipped += 1,
            }
        }
        Ok(ParsedFile {
            rows: SpotSeries::new(points),
            skipped,
        })
    }
}
