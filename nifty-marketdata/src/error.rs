//! Error taxonomy for the market data engine.
//!
//! Structural failures (bad parameters, missing files, unreadable headers)
//! are returned to the caller. Malformed individual data rows are not errors;
//! the loaders count and skip them.

use std::path::PathBuf;

use thiserror::Error;

/// Hint attached to every missing option file.
pub const OPTION_FILE_HINT: &str = "this expiry may not have traded on that date (use list_expiries), \
     the date format may be wrong (required DDMMMYY, e.g. '01FEB24'), \
     or data for this period may not be loaded yet";

/// Hint attached to every missing spot file.
pub const SPOT_FILE_HINT: &str =
    "the spot series for this month may not be loaded yet; check the dataset availability";

/// Hint attached to a missing month directory or dataset root.
pub const DIRECTORY_HINT: &str =
    "check the year/month spelling and that the dataset root is mounted";

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("File not available: {} ({hint})", .path.display())]
    FileNotAvailable { path: PathBuf, hint: String },

    #[error("No data returned: {0}")]
    NoDataReturned(String),

    #[error("Malformed file {}: {reason}", .path.display())]
    MalformedFile { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type MarketDataResult<T> = Result<T, MarketDataError>;

impl MarketDataError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub fn missing(path: impl Into<PathBuf>, hint: &str) -> Self {
        Self::FileNotAvailable {
            path: path.into(),
            hint: hint.to_string(),
        }
    }

    pub fn is_file_not_available(&self) -> bool {
        matches!(self, Self::FileNotAvailable { .. })
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoDataReturned(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_not_available_message_carries_path_and_hint() {
        let err = MarketDataError::missing("/data/2024/2024JAN/NIFTY-01FEB24-01JAN24.csv", OPTION_FILE_HINT);
        let msg = err.to_string();
        assert!(msg.contains("NIFTY-01FEB24-01JAN24.csv"));
        assert!(msg.contains("list_expiries"));
        assert!(err.is_file_not_available());
        assert!(!err.is_no_data());
    }

    #[test]
    fn test_invalid_parameter_message() {
        let err = MarketDataError::invalid("option_type must be 'C' or 'P', received 'X'");
        assert_eq!(
            err.to_string(),
            "Invalid parameter: option_type must be 'C' or 'P', received 'X'"
        );
    }
}
