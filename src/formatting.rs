//! Output rounding for rendered statistics tables
//!
//! Tables handed to renderers carry flat `{variable}_{statistic}` column
//! names. The [`Formatter`] picks a rounding per column from those names and
//! returns a new table; the input is left untouched.

use crate::ensemble::EnsembleStatistics;
use crate::errors::{EnsembleError, Result};
use crate::model::ModelStatistics;
use crate::table::StatKey;
use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use ndarray::Array2;
use serde::Serialize;
use std::collections::BTreeMap;

/// Offset applied before the ceiling so that already rounded values stay put
const CEIL_TOLERANCE: f64 = 1e-9;

/// Values of one rendered column
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnData {
    Float(Vec<Option<f64>>),
    Integer(Vec<Option<i64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Integer(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        !matches!(self, Self::Text(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderColumn {
    pub name: String,
    pub data: ColumnData,
}

/// Wide table with a timestamp index, as passed to CSV/HTML/plot renderers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderTable {
    pub index: Vec<DateTime<FixedOffset>>,
    pub columns: Vec<RenderColumn>,
}

impl RenderTable {
    /// Table without columns
    #[must_use]
    pub fn new(index: Vec<DateTime<FixedOffset>>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    /// Flattens a wide statistics table; `NaN` cells become `None`.
    #[must_use]
    pub fn from_wide(index: &[DateTime<Utc>], keys: &[StatKey], values: &Array2<f64>) -> Self {
        let columns = keys
            .iter()
            .enumerate()
            .map(|(col, key)| RenderColumn {
                name: key.column_name(),
                data: ColumnData::Float(
                    values
                        .column(col)
                        .iter()
                        .map(|&v| Some(v).filter(|v| !v.is_nan()))
                        .collect(),
                ),
            })
            .collect();

        Self {
            index: index.iter().map(DateTime::fixed_offset).collect(),
            columns,
        }
    }

    /// Appends a column.
    ///
    /// # Errors
    ///
    /// Returns an error if the column length differs from the index length.
    pub fn push_column(&mut self, name: impl Into<String>, data: ColumnData) -> Result<()> {
        let name = name.into();
        if data.len() != self.index.len() {
            return Err(EnsembleError::ShapeMismatch {
                context: format!("rendered column '{name}'"),
                expected: self.index.len(),
                found: data.len(),
            });
        }
        self.columns.push(RenderColumn { name, data });
        Ok(())
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.data)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Same instants, displayed in `tz`
    #[must_use]
    pub fn in_timezone(&self, tz: Tz) -> Self {
        Self {
            index: self
                .index
                .iter()
                .map(|ts| ts.with_timezone(&tz).fixed_offset())
                .collect(),
            columns: self.columns.clone(),
        }
    }
}

/// How one column is rounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Round half to even at the given number of decimals
    Decimals(u32),
    /// Round to the nearest integer and store as integer
    Integer,
    /// Round up to the next multiple of `1 / n`
    CeilToFraction(u32),
}

impl Rounding {
    #[must_use]
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::Decimals(decimals) => {
                let factor = 10_f64.powi(decimals as i32);
                (value * factor).round_ties_even() / factor
            }
            Self::Integer => value.round_ties_even(),
            Self::CeilToFraction(n) => {
                let n = f64::from(n);
                ((value * n) - CEIL_TOLERANCE).ceil() / n
            }
        }
    }

    fn apply_column(self, data: &ColumnData) -> ColumnData {
        match (self, data) {
            (Self::Integer, ColumnData::Float(values)) => ColumnData::Integer(
                values
                    .iter()
                    .map(|v| v.map(|x| x.round_ties_even() as i64))
                    .collect(),
            ),
            (_, ColumnData::Float(values)) => {
                ColumnData::Float(values.iter().map(|v| v.map(|x| self.apply(x))).collect())
            }
            // Integers already sit on every grid used here
            (_, other) => other.clone(),
        }
    }
}

/// Name-based rounding rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingRule {
    /// `cloud_cover*`: two decimals for probabilities, integer otherwise
    CloudCover,
    /// Any name containing `prob`: two decimals
    Probability,
    /// `precipitation*_probability`: round up to the next 0.05
    PrecipitationProbability,
}

impl RoundingRule {
    /// Rounding for `column` if this rule applies to it
    #[must_use]
    pub fn matches(self, column: &str) -> Option<Rounding> {
        match self {
            Self::CloudCover => column.starts_with("cloud_cover").then(|| {
                if column.contains("prob") {
                    Rounding::Decimals(2)
                } else {
                    Rounding::Integer
                }
            }),
            Self::Probability => column.contains("prob").then_some(Rounding::Decimals(2)),
            Self::PrecipitationProbability => (column.starts_with("precipitation")
                && column.ends_with("_probability"))
            .then_some(Rounding::CeilToFraction(20)),
        }
    }
}

/// Applies the first matching rule to every numeric column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatter {
    rules: Vec<RoundingRule>,
    fallback: Rounding,
}

impl Default for Formatter {
    /// Cloud cover, then probabilities, then precipitation probability, else
    /// one decimal. `precipitation_probability` contains `prob`, so under this
    /// order it gets two decimals.
    fn default() -> Self {
        Self {
            rules: vec![
                RoundingRule::CloudCover,
                RoundingRule::Probability,
                RoundingRule::PrecipitationProbability,
            ],
            fallback: Rounding::Decimals(1),
        }
    }
}

impl Formatter {
    #[must_use]
    pub const fn new(rules: Vec<RoundingRule>, fallback: Rounding) -> Self {
        Self { rules, fallback }
    }

    /// Same number of decimals for every numeric column
    #[must_use]
    pub const fn uniform(decimals: u32) -> Self {
        Self {
            rules: Vec::new(),
            fallback: Rounding::Decimals(decimals),
        }
    }

    #[must_use]
    pub fn rules(&self) -> &[RoundingRule] {
        &self.rules
    }

    /// Rounding chosen for a column name
    #[must_use]
    pub fn rounding_for(&self, column: &str) -> Rounding {
        self.rules
            .iter()
            .find_map(|rule| rule.matches(column))
            .unwrap_or(self.fallback)
    }

    /// Returns a rounded copy of `table`; text columns pass through.
    #[must_use]
    pub fn format(&self, table: &RenderTable) -> RenderTable {
        let columns = table
            .columns
            .iter()
            .map(|column| {
                let data = if column.data.is_numeric() {
                    self.rounding_for(&column.name).apply_column(&column.data)
                } else {
                    column.data.clone()
                };
                RenderColumn {
                    name: column.name.clone(),
                    data,
                }
            })
            .collect();

        RenderTable {
            index: table.index.clone(),
            columns,
        }
    }
}

/// Formatted ensemble and per-model tables, in local time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportReport {
    /// Absent when no model contributed to the ensemble
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ensemble: Option<RenderTable>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub models: BTreeMap<String, RenderTable>,
}

impl ExportReport {
    /// Ensemble rounded with the default rules, each non-empty model table
    /// with one decimal.
    #[must_use]
    pub fn build(ensemble: &EnsembleStatistics, models: &[ModelStatistics], tz: Tz) -> Self {
        let ensemble = if ensemble.is_empty() {
            tracing::info!("no ensemble statistics to export");
            None
        } else {
            Some(Formatter::default().format(&ensemble.to_render_table().in_timezone(tz)))
        };
        let uniform = Formatter::uniform(1);
        let models = models
            .iter()
            .filter(|m| !m.is_empty())
            .map(|m| {
                let table = uniform.format(&m.to_render_table().in_timezone(tz));
                (m.model().to_string(), table)
            })
            .collect();
        Self { ensemble, models }
    }

    /// Whether there is nothing to write
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ensemble.is_none() && self.models.is_empty()
    }
}
