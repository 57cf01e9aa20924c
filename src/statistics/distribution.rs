//! Statistics of continuous and precipitation-like variables

use super::parallel::{fraction, map_rows};
use crate::errors::Result;
use crate::table::{StatisticsTable, VariableTable};

/// Statistic names produced by [`percentiles`]
pub const PERCENTILE_STATISTICS: [&str; 3] = ["p10", "median", "p90"];

/// Statistic names produced by [`precipitation_stats`]
pub const PRECIPITATION_STATISTICS: [&str; 2] = ["probability", "conditional_average"];

/// Linear-interpolated quantile with effective rank `p * (n - 1)`.
///
/// **Expects pre-sorted input.** Returns `NaN` for an empty slice.
#[must_use]
pub fn quantile_linear(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    let h = (n - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    sorted[lo] + (h - h.floor()) * (sorted[hi] - sorted[lo])
}

/// Per-row 10th percentile, median and 90th percentile of the members.
///
/// # Errors
///
/// Returns an error only if the statistics table cannot be assembled.
pub fn percentiles(table: &VariableTable) -> Result<StatisticsTable> {
    let values = map_rows(table.values(), PERCENTILE_STATISTICS.len(), |members| {
        let mut sorted = members.to_vec();
        sorted.sort_by(f64::total_cmp);
        Ok(vec![
            quantile_linear(&sorted, 0.10),
            quantile_linear(&sorted, 0.50),
            quantile_linear(&sorted, 0.90),
        ])
    })?;

    StatisticsTable::new(
        table.index().clone(),
        PERCENTILE_STATISTICS.iter().map(ToString::to_string).collect(),
        values,
    )
}

/// Per-row probability of precipitation and mean amount where it occurs.
///
/// `probability` is the fraction of members above zero. `conditional_average`
/// is the mean over those members, and exactly `0.0` when none is above zero.
///
/// # Errors
///
/// Returns an error only if the statistics table cannot be assembled.
pub fn precipitation_stats(table: &VariableTable) -> Result<StatisticsTable> {
    let values = map_rows(table.values(), PRECIPITATION_STATISTICS.len(), |members| {
        let wet: Vec<f64> = members.iter().copied().filter(|&v| v > 0.0).collect();
        let conditional_average = if wet.is_empty() {
            0.0
        } else {
            wet.iter().sum::<f64>() / wet.len() as f64
        };
        Ok(vec![fraction(members, |v| v > 0.0), conditional_average])
    })?;

    StatisticsTable::new(
        table.index().clone(),
        PRECIPITATION_STATISTICS.iter().map(ToString::to_string).collect(),
        values,
    )
}
