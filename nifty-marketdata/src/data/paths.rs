//! Dataset layout: maps logical keys to file paths. No I/O.
//!
//! ```text
//! <root>/<YYYY>/<YYYY><MMM>/NIFTY-<EXPIRY>-<TRADEDATE>.csv
//! <root>/<YYYY>/<YYYY>Nifty/Nifty-<YYYY><MMM>.csv
//! ```

use std::path::{Path, PathBuf};

use super::types::{DateToken, MonthKey};
use crate::error::MarketDataResult;

pub const OPTION_FILE_PREFIX: &str = "NIFTY";
pub const SPOT_FILE_PREFIX: &str = "Nifty";
pub const CSV_EXTENSION: &str = ".csv";

/// Resolves dataset paths under a fixed root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<YYYY>`
    fn year_dir(&self, year: i32) -> PathBuf {
        self.root.join(format!("{:04}", year))
    }

    /// Option file name, e.g. `NIFTY-01FEB24-01JAN24.csv`.
    pub fn option_file_name(expiry: &DateToken, trade_date: &DateToken) -> String {
        format!(
            "{}-{}-{}{}",
            OPTION_FILE_PREFIX, expiry, trade_date, CSV_EXTENSION
        )
    }

    /// Spot file name, e.g. `Nifty-2024JAN.csv`.
    pub fn spot_file_name(key: MonthKey) -> String {
        format!("{}-{}{}", SPOT_FILE_PREFIX, key.label(), CSV_EXTENSION)
    }

    pub fn month_dir(&self, key: MonthKey) -> PathBuf {
        self.year_dir(key.year).join(key.label())
    }

    /// Option files live in the trade date's month directory.
    pub fn option_path(&self, expiry: &DateToken, trade_date: &DateToken) -> PathBuf {
        self.month_dir(trade_date.month_key())
            .join(Self::option_file_name(expiry, trade_date))
    }

    pub fn spot_path(&self, key: MonthKey) -> PathBuf {
        self.year_dir(key.year)
            .join(format!("{:04}{}", key.year, SPOT_FILE_PREFIX))
            .join(Self::spot_file_name(key))
    }

    /// Path of the option file for raw `DDMMMYY` tokens.
    pub fn resolve_option_path(&self, expiry: &str, trade_date: &str) -> MarketDataResult<PathBuf> {
        let expiry = DateToken::parse(expiry, "expiry")?;
        let trade_date = DateToken::parse(trade_date, "trade_date")?;
        Ok(self.option_path(&expiry, &trade_date))
    }

    /// Path of the spot file for a year and month abbreviation.
    pub fn resolve_spot_path(&self, year: i32, month: &str) -> MarketDataResult<PathBuf> {
        Ok(self.spot_path(MonthKey::parse(year, month)?))
    }

    /// Path of the option directory for a year and month abbreviation.
    pub fn resolve_month_dir(&self, year: i32, month: &str) -> MarketDataResult<PathBuf> {
        Ok(self.month_dir(MonthKey::parse(year, month)?))
    }
}

/// Split an option file name into its `(expiry, trade_date)` tokens.
///
/// Returns `None` for anything that is not `NIFTY-<A>-<B>.csv`; the tokens
/// themselves are not validated here.
pub fn split_option_file_name(name: &str) -> Option<(&str, &str)> {
    let stem = name.strip_suffix(CSV_EXTENSION)?;
    let rest = stem.strip_prefix(OPTION_FILE_PREFIX)?.strip_prefix('-')?;
    let (expiry, trade_date) = rest.split_once('-')?;
    if expiry.is_empty() || trade_date.is_empty() || trade_date.contains('-') {
        return None;
    }
    Some((expiry, trade_date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MarketDataError;

    #[test]
    fn test_option_path() {
        let resolver = PathResolver::new("/data/nifty");
        let path = resolver.resolve_option_path("01FEB24", "01jan24").unwrap();
        assert_eq!(
            path,
            PathBuf::from("/data/nifty/2024/2024JAN/NIFTY-01FEB24-01JAN24.csv")
        );
    }

    #[test]
    fn test_option_path_uses_trade_date_partition() {
        let resolver = PathResolver::new("/data/nifty");
        let path = resolver.resolve_option_path("30JAN25", "27DEC24").unwrap();
        assert_eq!(
            path,
            PathBuf::from("/data/nifty/2024/2024DEC/NIFTY-30JAN25-27DEC24.csv")
        );
    }

    #[test]
    fn test_spot_path() {
        let resolver = PathResolver::new("/data/nifty");
        let path = resolver.resolve_spot_path(2024, "jan").unwrap();
        assert_eq!(
            path,
            PathBuf::from("/data/nifty/2024/2024Nifty/Nifty-2024JAN.csv")
        );
    }

    #[test]
    fn test_month_dir() {
        let resolver = PathResolver::new("/data/nifty");
        assert_eq!(
            resolver.resolve_month_dir(2025, "MAR").unwrap(),
            PathBuf::from("/data/nifty/2025/2025MAR")
        );
    }

    #[test]
    fn test_bad_tokens_are_invalid_parameters() {
        let resolver = PathResolver::new("/data/nifty");
        assert!(matches!(
            resolver.resolve_option_path("01FOO24", "01JAN24"),
            Err(MarketDataError::InvalidParameter(_))
        ));
        assert!(matches!(
            resolver.resolve_spot_path(2024, "January"),
            Err(MarketDataError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_split_option_file_name() {
        assert_eq!(
            split_option_file_name("NIFTY-01FEB24-01JAN24.csv"),
            Some(("01FEB24", "01JAN24"))
        );
        assert_eq!(split_option_file_name("Nifty-2024JAN.csv"), None);
        assert_eq!(split_option_file_name("NIFTY-01FEB24-01JAN24.txt"), None);
        assert_eq!(split_option_file_name("NIFTY-01FEB24.csv"), None);
    }
}
