//! Engine configuration.
//!
//! The only required setting is the dataset root. Configuration is built
//! once and handed to the engine by value; nothing reads it globally.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MarketDataError, MarketDataResult};

/// Environment variable that overrides `data_root`.
pub const DATA_ROOT_ENV: &str = "NIFTY_DATA_ROOT";

/// What a multi-day query does when one trade date has no file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnMissing {
    /// Record a warning for the date and continue.
    #[default]
    Skip,
    /// Return the first failure.
    Fail,
}

impl OnMissing {
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }
}

/// Configuration for [`crate::QueryEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root folder holding one sub-folder per year.
    pub data_root: PathBuf,
    /// Treat a missing monthly spot file as an error. When false, rows are
    /// returned with no spot price.
    pub require_spot: bool,
    /// Default partial-failure policy for time series queries.
    pub on_missing: OnMissing,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data/nifty"),
            require_spot: true,
            on_missing: OnMissing::Skip,
        }
    }
}

impl EngineConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            ..Self::default()
        }
    }

    /// Load from a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: &Path) -> MarketDataResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MarketDataError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| MarketDataError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply `NIFTY_DATA_ROOT` if it is set and non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(root) = std::env::var(DATA_ROOT_ENV) {
            if !root.trim().is_empty() {
                self.data_root = PathBuf::from(root.trim());
            }
        }
        self
    }

    pub fn with_require_spot(mut self, require_spot: bool) -> Self {
        self.require_spot = require_spot;
        self
    }

    pub fn with_on_missing(mut self, on_missing: OnMissing) -> Self {
        self.on_missing = on_missing;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.require_spot);
        assert_eq!(config.on_missing, OnMissing::Skip);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = EngineConfig::from_toml_str(
            r#"
            data_root = "/mnt/shared/NiftyHistorical"
            on_missing = "fail"
            "#,
        )
        .unwrap();
        assert_eq!(config.data_root, PathBuf::from("/mnt/shared/NiftyHistorical"));
        assert_eq!(config.on_missing, OnMissing::Fail);
        assert!(config.require_spot);
    }

    #[test]
    fn test_from_toml_rejects_unknown_policy() {
        assert!(EngineConfig::from_toml_str(r#"on_missing = "retry""#).is_err());
    }

    #[test]
    fn test_on_missing_parsing() {
        assert_eq!(OnMissing::from_str_case_insensitive("SKIP"), Some(OnMissing::Skip));
        assert_eq!(OnMissing::from_str_case_insensitive("fail"), Some(OnMissing::Fail));
        assert_eq!(OnMissing::from_str_case_insensitive("abort"), None);
    }

    #[test]
    fn test_missing_config_file() {
        let err = EngineConfig::from_toml_file(Path::new("/nonexistent/engine.toml")).unwrap_err();
        assert!(matches!(err, MarketDataError::Config(_)));
    }
}
