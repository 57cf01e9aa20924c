//! Frequency distributions of categorical variables
//!
//! Cloud cover is bucketed into octas, wind direction into compass octants and
//! WMO weather codes into hazard classes. Each probability is the fraction of
//! reporting members that fall into the bucket.

use super::parallel::map_rows;
use crate::errors::{EnsembleError, Result};
use crate::table::{StatisticsTable, VariableTable};
use serde::Deserialize;

/// Number of octa buckets, 0 (clear) through 8 (overcast)
pub const OCTA_COUNT: usize = 9;

/// Compass octants in sector order
pub const COMPASS_LABELS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Converts a cloud cover percentage into octas, `round(pct / 100 * 8)` with ties to even.
///
/// # Errors
///
/// Returns an error if the percentage lies outside `0..=100`.
pub fn percent_to_octa(percent: f64) -> Result<f64> {
    if !(0.0..=100.0).contains(&percent) {
        return Err(EnsembleError::InvalidValue {
            statistic: "cloud cover",
            value: percent,
            reason: "percentage must be between 0 and 100",
        });
    }
    Ok((percent / 100.0 * 8.0).round_ties_even())
}

fn octa_bucket(octa: f64) -> Result<usize> {
    if octa.fract() != 0.0 || !(0.0..=8.0).contains(&octa) {
        return Err(EnsembleError::InvalidValue {
            statistic: "octa",
            value: octa,
            reason: "must be an integer between 0 and 8",
        });
    }
    Ok(octa as usize)
}

/// Per-row probability of each octa `0..=8`, columns `octa_{k}_prob`.
///
/// Every octa gets a column whether or not any member attains it.
///
/// # Errors
///
/// Returns an error if a member value is not an integer octa.
pub fn octa_probabilities(table: &VariableTable) -> Result<StatisticsTable> {
    let values = map_rows(table.values(), OCTA_COUNT, |members| {
        let mut counts = [0_usize; OCTA_COUNT];
        for &octa in members {
            counts[octa_bucket(octa)?] += 1;
        }
        let n = members.len() as f64;
        Ok(counts.iter().map(|&c| c as f64 / n).collect())
    })?;

    StatisticsTable::new(
        table.index().clone(),
        (0..OCTA_COUNT).map(|k| format!("octa_{k}_prob")).collect(),
        values,
    )
}

/// Octa distribution of a table holding cloud cover in percent.
///
/// # Errors
///
/// Returns an error if a percentage lies outside `0..=100`.
pub fn cloud_cover_probabilities(table: &VariableTable) -> Result<StatisticsTable> {
    octa_probabilities(&table.try_map_values(percent_to_octa)?)
}

/// Convention for directions lying exactly on a sector boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorBoundary {
    /// `floor(((deg + 22.5) mod 360) / 45)`: 22.5° belongs to NE, 337.5° to N
    #[default]
    Floor,
    /// `round(deg / 45) mod 8` with ties to even: 22.5° and 337.5° both belong to N
    HalfEven,
}

impl SectorBoundary {
    /// Compass sector `0..8` (N..NW) of a direction in degrees
    #[must_use]
    pub fn sector(self, degrees: f64) -> usize {
        let raw = match self {
            Self::Floor => ((degrees + 22.5).rem_euclid(360.0) / 45.0).floor(),
            Self::HalfEven => (degrees.rem_euclid(360.0) / 45.0).round_ties_even(),
        };
        raw as usize % COMPASS_LABELS.len()
    }
}

/// Per-row probability of each compass octant, columns `{label}_prob`.
///
/// # Errors
///
/// Returns an error only if the statistics table cannot be assembled.
pub fn wind_direction_probabilities(
    table: &VariableTable,
    boundary: SectorBoundary,
) -> Result<StatisticsTable> {
    let values = map_rows(table.values(), COMPASS_LABELS.len(), |members| {
        let mut counts = [0_usize; COMPASS_LABELS.len()];
        for &degrees in members {
            counts[boundary.sector(degrees)] += 1;
        }
        let n = members.len() as f64;
        Ok(counts.iter().map(|&c| c as f64 / n).collect())
    })?;

    StatisticsTable::new(
        table.index().clone(),
        COMPASS_LABELS.iter().map(|l| format!("{l}_prob")).collect(),
        values,
    )
}

/// Hazard classes derived from WMO weather codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hazard {
    Fog,
    Storm,
    SevereStorm,
}

impl Hazard {
    pub const ALL: [Self; 3] = [Self::Fog, Self::Storm, Self::SevereStorm];

    #[must_use]
    pub const fn statistic(self) -> &'static str {
        match self {
            Self::Fog => "fog_prob",
            Self::Storm => "storm_prob",
            Self::SevereStorm => "severe_storm_prob",
        }
    }

    /// The code sets are disjoint.
    #[must_use]
    pub const fn includes(self, code: u32) -> bool {
        match self {
            Self::Fog => matches!(code, 10 | 11 | 12 | 28 | 40..=49),
            Self::Storm => matches!(code, 13 | 17 | 29 | 95 | 96 | 98),
            Self::SevereStorm => matches!(code, 18 | 19 | 97 | 99),
        }
    }

    /// Hazard of a weather code, `None` for codes outside every set or
    /// values that are not weather codes
    #[must_use]
    pub fn classify(code: f64) -> Option<Self> {
        weather_code(code).ok().and_then(Self::of)
    }

    /// Hazard of a validated weather code
    #[must_use]
    pub fn of(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.includes(code))
    }
}

fn weather_code(code: f64) -> Result<u32> {
    if code.fract() != 0.0 || !(0.0..=f64::from(u32::MAX)).contains(&code) {
        return Err(EnsembleError::InvalidValue {
            statistic: "weather code",
            value: code,
            reason: "must be a non-negative integer",
        });
    }
    Ok(code as u32)
}

/// Per-row probability of fog, storm and severe storm.
///
/// Members with codes outside all three sets count towards the denominator
/// only.
///
/// # Errors
///
/// Returns an error if a member value is not a non-negative integer code.
pub fn weather_code_probabilities(table: &VariableTable) -> Result<StatisticsTable> {
    let values = map_rows(table.values(), Hazard::ALL.len(), |members| {
        let mut counts = [0_usize; Hazard::ALL.len()];
        for &code in members {
            if let Some(hazard) = Hazard::of(weather_code(code)?) {
                counts[hazard as usize] += 1;
            }
        }
        let n = members.len() as f64;
        Ok(counts.iter().map(|&c| c as f64 / n).collect())
    })?;

    StatisticsTable::new(
        table.index().clone(),
        Hazard::ALL.iter().map(|h| h.statistic().to_string()).collect(),
        values,
    )
}
