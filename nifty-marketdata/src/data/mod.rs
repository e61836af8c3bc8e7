pub mod loader;
pub mod paths;
pub mod types;

pub use loader::{OptionFileLoader, ParsedFile, SpotFileLoader, OPTION_COLUMN_ALIASES, SPOT_COLUMN_ALIASES};
pub use paths::PathResolver;
pub use types::{DateToken, MonthKey, OptionRow, OptionType, SpotPoint, SpotSeries, MONTH_ABBREVIATIONS};
