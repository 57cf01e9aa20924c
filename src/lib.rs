//! meteo_ensemble: ensemble weather forecast statistics
//!
//! A Rust library for summarizing ensemble weather forecasts. For every
//! forecast timestamp the members of a variable are reduced to statistics
//! (percentile bands, precipitation probability, octa, wind-sector and hazard
//! distributions). The statistics of several models are then averaged into a
//! multi-model ensemble trimmed to a local forecast window.
//!
//! ## Key Features
//!
//! - **Parallel Processing**: Row-parallel statistics using Rayon
//! - **Absent Values**: Missing members are skipped, never treated as zero
//! - **Timezones**: Naive and zoned indexes, UTC normalization, local display
//! - **Formatting**: Name-based rounding rules for rendered tables
//! - **Async Seams**: Pluggable run registry and statistics sink
//!
//! ## Module Organization
//!
//! - [`table`]: Member tables, statistics tables and timestamp indexes
//! - [`statistics`]: Statistics engine, one operation per variable kind
//! - [`model`]: Per-model wide statistics (outer join on timestamp)
//! - [`ensemble`]: Multi-model aggregation and forecast window
//! - [`formatting`]: Render tables and rounding rules
//! - [`input`]: Open-Meteo ensemble document decoding
//! - [`config`]: TOML configuration
//! - [`data_source`]: Run registry and statistics sink traits
//! - [`pipeline`]: End-to-end processing of model runs
//! - [`parallel`]: Parallel processing configuration
//! - [`errors`]: Centralized error handling
//!
//! ## Usage Example
//! ```rust,no_run
//! use meteo_ensemble::prelude::*;
//! use chrono::{NaiveDate, Utc};
//!
//! let t0 = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! let table = VariableTable::new(
//!     "temperature_2m",
//!     TimeIndex::Naive(vec![t0]),
//!     vec!["m1".into(), "m2".into(), "m3".into()],
//!     vec![vec![Some(10.0)], vec![Some(12.0)], vec![Some(14.0)]],
//! ).unwrap();
//!
//! let run = ModelRun::new("icon_seamless", Utc::now()).with_variable(table);
//! let report = run
//!     .compute_statistics(&Default::default(), &StatisticsOptions::default())
//!     .unwrap();
//! let ensemble = EnsembleAggregator::new(ForecastWindow::new(chrono_tz::UTC, 72))
//!     .aggregate(&[report.statistics], Utc::now())
//!     .unwrap();
//! let rendered = Formatter::default().format(&ensemble.to_render_table());
//! # let _ = rendered;
//! ```

// Core modules
pub mod config;
pub mod data_source;
pub mod ensemble;
pub mod errors;
pub mod formatting;
pub mod input;
pub mod model;
pub mod parallel;
pub mod pipeline;
pub mod statistics;
pub mod table;

// Direct re-exports for the public API
pub use config::*;
pub use data_source::*;
pub use ensemble::*;
pub use errors::*;
pub use formatting::*;
pub use input::*;
pub use model::*;
pub use parallel::*;
pub use pipeline::*;
pub use statistics::*;
pub use table::*;

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::config::ForecastConfig;
    pub use crate::data_source::{
        InMemoryRunRegistry, InMemoryStatisticsSink, RunRegistry, StatisticsSink,
    };
    pub use crate::ensemble::{EnsembleAggregator, EnsembleStatistics, ForecastWindow};
    pub use crate::errors::{EnsembleError, Result};
    pub use crate::formatting::{ExportReport, Formatter, RenderTable, Rounding, RoundingRule};
    pub use crate::model::{ModelRun, ModelStatistics};
    pub use crate::parallel::ParallelConfig;
    pub use crate::pipeline::{ForecastPipeline, RunOutcome};
    pub use crate::statistics::{MemberStatistics, SectorBoundary, StatisticsOptions, VariableKind};
    pub use crate::table::{StatKey, StatisticsTable, TimeIndex, VariableTable};
}
