pub mod config;
pub mod data;
pub mod error;
pub mod query;

// Re-export commonly used types
pub use config::{EngineConfig, OnMissing};
pub use data::{DateToken, MonthKey, OptionRow, OptionType, PathResolver, SpotPoint, SpotSeries};
pub use error::{MarketDataError, MarketDataResult};
pub use query::{
    AtmGrid, OptionQuery, QueryEngine, QueryOutput, SurfaceBuilder, SurfaceRequest, TimeSeries,
    TimeSeriesRequest,
};
