//! Ensemble statistics engine
//!
//! This module maps a [`VariableTable`](crate::table::VariableTable) of
//! ensemble members to a [`StatisticsTable`](crate::table::StatisticsTable),
//! row by row and in parallel.
//!
//! # Organization
//!
//! This module is organized into submodules:
//! - [`operations`]: Variable kinds and statistic dispatch
//! - [`distribution`]: Percentile band and precipitation statistics
//! - [`categorical`]: Octa, compass octant and weather hazard distributions
//! - [`parallel`]: Row-parallel evaluation

pub mod categorical;
pub mod distribution;
pub mod operations;
pub mod parallel;

// Re-export the main types and functions for convenience
pub use categorical::{
    cloud_cover_probabilities, octa_probabilities, percent_to_octa, weather_code_probabilities,
    wind_direction_probabilities, Hazard, SectorBoundary, COMPASS_LABELS, OCTA_COUNT,
};
pub use distribution::{
    percentiles, precipitation_stats, quantile_linear, PERCENTILE_STATISTICS,
    PRECIPITATION_STATISTICS,
};
pub use operations::{MemberStatistics, StatisticsOptions, VariableKind};
pub use parallel::map_rows;
