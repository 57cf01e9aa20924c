//! Variable kinds and the statistic each one selects
//!
//! The kind of a variable decides which statistics summarize its members.
//! Kinds are assigned explicitly (usually from configuration), never inferred
//! from the variable name.

use super::categorical::{
    cloud_cover_probabilities, octa_probabilities, weather_code_probabilities,
    wind_direction_probabilities, SectorBoundary,
};
use super::distribution::{percentiles, precipitation_stats};
use crate::errors::Result;
use crate::table::{StatisticsTable, VariableTable};
use serde::{Deserialize, Serialize};

/// Supported variable kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// Temperature, pressure, dew point and similar: percentile band
    Continuous,
    /// Precipitation amounts: probability and conditional average
    PrecipitationLike,
    /// Cloud cover in percent: octa distribution
    CloudCover,
    /// Cloud cover already expressed in octas: octa distribution
    Octas,
    /// Wind direction in degrees: compass octant distribution
    WindDirection,
    /// WMO weather codes: hazard probabilities
    WeatherCode,
}

impl VariableKind {
    /// Get the string representation of the kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::PrecipitationLike => "precipitation_like",
            Self::CloudCover => "cloud_cover",
            Self::Octas => "octas",
            Self::WindDirection => "wind_direction",
            Self::WeatherCode => "weather_code",
        }
    }

    /// Computes this kind's statistics for every row of `table`
    ///
    /// # Errors
    ///
    /// Returns an error if a member value is outside the domain of the
    /// statistic (e.g. a cloud cover above 100 %).
    pub fn compute(
        self,
        table: &VariableTable,
        options: &StatisticsOptions,
    ) -> Result<StatisticsTable> {
        match self {
            Self::Continuous => percentiles(table),
            Self::PrecipitationLike => precipitation_stats(table),
            Self::CloudCover => cloud_cover_probabilities(table),
            Self::Octas => octa_probabilities(table),
            Self::WindDirection => wind_direction_probabilities(table, options.sector_boundary),
            Self::WeatherCode => weather_code_probabilities(table),
        }
    }
}

/// Tunable conventions of the statistics engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatisticsOptions {
    /// Convention for wind directions exactly on a sector boundary
    #[serde(default)]
    pub sector_boundary: SectorBoundary,
}

/// Trait for tables that can be summarized into ensemble statistics
pub trait MemberStatistics {
    /// Summarize the members of every row according to `kind`
    ///
    /// # Errors
    ///
    /// Returns an error if the members violate the input contract of `kind`.
    fn member_statistics(
        &self,
        kind: VariableKind,
        options: &StatisticsOptions,
    ) -> Result<StatisticsTable>;
}

impl MemberStatistics for VariableTable {
    fn member_statistics(
        &self,
        kind: VariableKind,
        options: &StatisticsOptions,
    ) -> Result<StatisticsTable> {
        let stats = kind.compute(self, options)?;
        tracing::debug!(
            variable = self.variable(),
            kind = kind.as_str(),
            rows = stats.n_rows(),
            members = self.members().len(),
            "computed member statistics"
        );
        Ok(stats)
    }
}
