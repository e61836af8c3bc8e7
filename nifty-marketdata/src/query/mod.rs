//! Query layer.
//!
//! Provides:
//! - Nearest-timestamp spot matching
//! - Filtered option queries and dataset discovery
//! - ATM strike grids, surface snapshots and multi-day series

pub mod engine;
pub mod matcher;
pub mod surface;

pub use engine::{parse_strike_list, OptionQuery, QueryEngine, QueryFilters, QueryOutput};
pub use matcher::{nearest_index, nearest_timestamp, SpotMatcher};
pub use surface::{AtmGrid, SkippedDate, SurfaceBuilder, SurfaceRequest, TimeSeries, TimeSeriesRequest};
