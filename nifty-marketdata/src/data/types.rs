//! Core data types for the NIFTY options dataset.
//!
//! These types mirror the canonical row schema every query returns,
//! independent of the column names used by the exported CSV files.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{MarketDataError, MarketDataResult};

/// Three-letter month abbreviations, January first.
pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Two-digit years in date tokens are read as 20YY.
const CENTURY: i32 = 2000;

/// Month number (1-12) for an abbreviation, matched case-insensitively.
pub fn month_from_abbrev(abbrev: &str) -> Option<u32> {
    let upper = abbrev.trim().to_uppercase();
    MONTH_ABBREVIATIONS
        .iter()
        .position(|m| *m == upper)
        .map(|idx| idx as u32 + 1)
}

/// Uppercase abbreviation for a month number (1-12).
pub fn month_abbrev(month: u32) -> Option<&'static str> {
    MONTH_ABBREVIATIONS.get(month.checked_sub(1)? as usize).copied()
}

/// Option type (call or put).
///
/// Ordering puts calls before puts, which is the tie-break used when
/// sorting rows with equal timestamp and strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OptionType {
    #[serde(rename = "C")]
    Call,
    #[serde(rename = "P")]
    Put,
}

impl OptionType {
    /// Parse a token as written in the exported files (`C`, `CE`, `CALL`, ...).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "C" | "CE" | "CALL" => Some(Self::Call),
            "P" | "PE" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    /// Parse a query filter token. Only `C`/`P` and `CALL`/`PUT` are accepted.
    pub fn from_filter(s: &str) -> MarketDataResult<Self> {
        match s.trim().to_uppercase().as_str() {
            "C" | "CALL" => Ok(Self::Call),
            "P" | "PUT" => Ok(Self::Put),
            _ => Err(MarketDataError::invalid(format!(
                "option_type must be 'C' (Call) or 'P' (Put), received '{}'",
                s
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "C",
            Self::Put => "P",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A date in the dataset's `DDMMMYY` token format (e.g. `01JAN24`).
///
/// Keeps the canonical uppercase token next to the parsed date so file
/// names can be rebuilt exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DateToken {
    date: NaiveDate,
    token: String,
}

impl DateToken {
    /// Parse a `DDMMMYY` token. `what` names the parameter in error messages.
    pub fn parse(raw: &str, what: &str) -> MarketDataResult<Self> {
        let invalid = || {
            MarketDataError::invalid(format!(
                "{} '{}' is not a valid date; required format DDMMMYY (e.g. '01JAN24')",
                what, raw
            ))
        };

        let s = raw.trim();
        if s.len() != 7 || !s.is_ascii() {
            return Err(invalid());
        }
        let (day_part, rest) = s.split_at(2);
        let (month_part, year_part) = rest.split_at(3);

        if !day_part.bytes().all(|b| b.is_ascii_digit())
            || !year_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let day: u32 = day_part.parse().map_err(|_| invalid())?;
        let year: i32 = year_part.parse().map_err(|_| invalid())?;
        let month = month_from_abbrev(month_part).ok_or_else(invalid)?;

        let date = NaiveDate::from_ymd_opt(CENTURY + year, month, day).ok_or_else(invalid)?;
        Ok(Self {
            date,
            token: s.to_uppercase(),
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// The year/month partition this date's files live in.
    pub fn month_key(&self) -> MonthKey {
        MonthKey {
            year: self.date.year(),
            month: self.date.month(),
        }
    }
}

impl fmt::Display for DateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

/// A calendar month partition, rendered as `2024JAN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    /// Build from a four-digit year and a three-letter month abbreviation.
    pub fn parse(year: i32, month: &str) -> MarketDataResult<Self> {
        if !(1000..=9999).contains(&year) {
            return Err(MarketDataError::invalid(format!(
                "year must be a four-digit calendar year, received {}",
                year
            )));
        }
        let month_num = month_from_abbrev(month).ok_or_else(|| {
            MarketDataError::invalid(format!(
                "month '{}' is not a recognised abbreviation (expected JAN..DEC)",
                month
            ))
        })?;
        Ok(Self {
            year,
            month: month_num,
        })
    }

    pub fn abbrev(&self) -> &'static str {
        month_abbrev(self.month).unwrap_or("JAN")
    }

    /// `2024JAN` style label used for directory and spot file names.
    pub fn label(&self) -> String {
        format!("{:04}{}", self.year, self.abbrev())
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A single option quote at one minute of one trade date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionRow {
    /// Quote time (trade date + intraday clock time)
    pub timestamp: NaiveDateTime,

    /// Contract expiry date
    pub expiry_date: NaiveDate,

    /// Calendar days from trade date to expiry (not clamped)
    pub days_to_expiry: i64,

    /// Strike price in index points
    pub strike: i64,

    /// Call or put
    pub option_type: OptionType,

    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub close_price: Decimal,

    /// Pricing proxy; always equal to `close_price` (no bid/ask in the dataset)
    pub market_price: Decimal,

    pub volume: u64,
    pub open_interest: u64,

    /// Nearest-in-time underlying price, if any spot data exists
    pub spot_price: Option<Decimal>,
}

impl OptionRow {
    /// Trade date the quote was recorded on.
    pub fn trade_date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// Sort key: timestamp, then strike, then calls before puts.
    pub fn sort_key(&self) -> (NaiveDateTime, i64, OptionType) {
        (self.timestamp, self.strike, self.option_type)
    }
}

/// One underlying index observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotPoint {
    pub timestamp: NaiveDateTime,
    pub price: Decimal,
}

/// Spot observations for one calendar month, ascending by timestamp with
/// unique timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpotSeries {
    points: Vec<SpotPoint>,
}

impl SpotSeries {
    /// Build a series, sorting by timestamp. For duplicate timestamps the
    /// point appearing last in `points` wins.
    pub fn new(points: Vec<SpotPoint>) -> Self {
        let mut indexed: Vec<(usize, SpotPoint)> = points.into_iter().enumerate().collect();
        indexed.sort_by_key(|(idx, p)| (p.timestamp, *idx));

        let mut deduped: Vec<SpotPoint> = Vec::with_capacity(indexed.len());
        for (_, point) in indexed {
            match deduped.last_mut() {
                Some(last) if last.timestamp == point.timestamp => *last = point,
                _ => deduped.push(point),
            }
        }
        Self { points: deduped }
    }

    pub fn points(&self) -> &[SpotPoint] {
        &self.points
    }

    /// Points recorded on `date`, ascending.
    pub fn on_date(&self, date: NaiveDate) -> &[SpotPoint] {
        let start = self.points.partition_point(|p| p.timestamp.date() < date);
        let end = self.points.partition_point(|p| p.timestamp.date() <= date);
        &self.points[start..end]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_option_type_parsing() {
        assert_eq!(OptionType::from_str("C"), Some(OptionType::Call));
        assert_eq!(OptionType::from_str("PE"), Some(OptionType::Put));
        assert_eq!(OptionType::from_str("ce"), Some(OptionType::Call));
        assert_eq!(OptionType::from_str("PUT"), Some(OptionType::Put));
        assert_eq!(OptionType::from_str("X"), None);
    }

    #[test]
    fn test_option_type_filter_rejects_unknown_tokens() {
        assert_eq!(OptionType::from_filter("c").unwrap(), OptionType::Call);
        assert_eq!(OptionType::from_filter("PUT").unwrap(), OptionType::Put);
        assert!(matches!(
            OptionType::from_filter("X"),
            Err(MarketDataError::InvalidParameter(_))
        ));
        assert!(OptionType::from_filter("CE").is_err());
    }

    #[test]
    fn test_calls_sort_before_puts() {
        assert!(OptionType::Call < OptionType::Put);
    }

    #[test]
    fn test_date_token_parsing() {
        let token = DateToken::parse("01jan24", "trade_date").unwrap();
        assert_eq!(token.date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(token.as_str(), "01JAN24");
        assert_eq!(token.month_key().label(), "2024JAN");
    }

    #[test]
    fn test_date_token_rejects_bad_input() {
        for bad in ["1JAN24", "01XYZ24", "32JAN24", "30FEB24", "2024-01-01", "01JAN2024", ""] {
            assert!(
                matches!(
                    DateToken::parse(bad, "expiry"),
                    Err(MarketDataError::InvalidParameter(_))
                ),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_month_key() {
        let key = MonthKey::parse(2024, "feb").unwrap();
        assert_eq!(key.month, 2);
        assert_eq!(key.label(), "2024FEB");
        assert!(MonthKey::parse(2024, "FEBRUARY").is_err());
        assert!(MonthKey::parse(24, "FEB").is_err());
    }

    #[test]
    fn test_spot_series_last_duplicate_wins() {
        let series = SpotSeries::new(vec![
            SpotPoint { timestamp: at(10, 5), price: Decimal::from(102) },
            SpotPoint { timestamp: at(10, 0), price: Decimal::from(100) },
            SpotPoint { timestamp: at(10, 0), price: Decimal::from(101) },
        ]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.points()[0].timestamp, at(10, 0));
        assert_eq!(series.points()[0].price, Decimal::from(101));
        assert_eq!(series.points()[1].price, Decimal::from(102));
    }

    #[test]
    fn test_spot_series_on_date_slices_one_day() {
        let next_day = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        let series = SpotSeries::new(vec![
            SpotPoint { timestamp: at(10, 0), price: Decimal::from(100) },
            SpotPoint { timestamp: next_day, price: Decimal::from(110) },
            SpotPoint { timestamp: at(9, 15), price: Decimal::from(99) },
        ]);

        let jan01 = series.on_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(jan01.len(), 2);
        assert_eq!(jan01[0].timestamp, at(9, 15));
        assert_eq!(series.on_date(next_day.date()).len(), 1);
        assert!(series
            .on_date(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap())
            .is_empty());
    }
}
