//! Tabular containers for ensemble members and their statistics
//!
//! All tables are row-major `Array2<f64>` with one row per forecast timestamp.
//! An absent value is stored as `NaN` and surfaced as `None` by the accessors;
//! it is never treated as zero.

use crate::errors::{EnsembleError, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use ndarray::{Array2, ArrayView1};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Forecast timestamps of a table, with or without timezone information
#[derive(Debug, Clone, PartialEq)]
pub enum TimeIndex {
    /// Wall-clock timestamps without an offset; treated as UTC when normalized
    Naive(Vec<NaiveDateTime>),
    /// Timestamps carrying their UTC offset
    Zoned(Vec<DateTime<FixedOffset>>),
}

impl TimeIndex {
    /// Number of timestamps
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Naive(ts) => ts.len(),
            Self::Zoned(ts) => ts.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn is_zoned(&self) -> bool {
        matches!(self, Self::Zoned(_))
    }

    /// Normalize to UTC: naive timestamps get UTC attached, zoned ones are converted.
    #[must_use]
    pub fn to_utc(&self) -> Vec<DateTime<Utc>> {
        match self {
            Self::Naive(ts) => ts.iter().map(|t| t.and_utc()).collect(),
            Self::Zoned(ts) => ts.iter().map(|t| t.with_timezone(&Utc)).collect(),
        }
    }

    /// Position of the first timestamp that does not come strictly after its predecessor
    fn first_unsorted(&self) -> Option<usize> {
        fn scan<K: Ord>(keys: &[K]) -> Option<usize> {
            keys.windows(2).position(|w| w[0] >= w[1]).map(|i| i + 1)
        }
        match self {
            Self::Naive(ts) => scan(ts),
            Self::Zoned(ts) => scan(ts),
        }
    }

    pub(crate) fn ensure_strictly_increasing(&self, variable: &str) -> Result<()> {
        match self.first_unsorted() {
            Some(row) => Err(EnsembleError::UnsortedIndex {
                variable: variable.to_string(),
                row,
            }),
            None => Ok(()),
        }
    }

    /// Outer join of several indexes.
    ///
    /// Returns the sorted union and, for every input, the union row of each of
    /// its timestamps. All inputs must be of the same kind.
    pub(crate) fn outer_join(parts: &[(&str, &Self)]) -> Result<(Self, Vec<Vec<usize>>)> {
        let Some((_, first)) = parts.first() else {
            return Ok((Self::Naive(Vec::new()), Vec::new()));
        };

        match first {
            Self::Naive(_) => {
                let keys = parts
                    .iter()
                    .map(|(name, index)| match index {
                        Self::Naive(ts) => Ok(ts.as_slice()),
                        Self::Zoned(_) => Err(EnsembleError::MixedIndex {
                            variable: (*name).to_string(),
                        }),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let (union, positions) = join_keys(&keys);
                Ok((Self::Naive(union), positions))
            }
            Self::Zoned(_) => {
                let keys = parts
                    .iter()
                    .map(|(name, index)| match index {
                        Self::Zoned(ts) => Ok(ts.as_slice()),
                        Self::Naive(_) => Err(EnsembleError::MixedIndex {
                            variable: (*name).to_string(),
                        }),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let (union, positions) = join_keys(&keys);
                Ok((Self::Zoned(union), positions))
            }
        }
    }
}

fn merge_sorted<K: Ord + Clone>(acc: Vec<K>, next: &[K]) -> Vec<K> {
    let mut out = Vec::with_capacity(acc.len() + next.len());
    let (mut i, mut j) = (0, 0);
    while i < acc.len() && j < next.len() {
        match acc[i].cmp(&next[j]) {
            Ordering::Less => {
                out.push(acc[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                out.push(next[j].clone());
                j += 1;
            }
            Ordering::Equal => {
                out.push(acc[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&acc[i..]);
    out.extend_from_slice(&next[j..]);
    out
}

fn join_keys<K: Ord + Clone>(parts: &[&[K]]) -> (Vec<K>, Vec<Vec<usize>>) {
    let union = parts
        .iter()
        .fold(Vec::new(), |acc, keys| merge_sorted(acc, keys));
    let positions = parts
        .iter()
        .map(|keys| {
            keys.iter()
                .map(|k| union.binary_search(k).unwrap_or_else(|p| p))
                .collect()
        })
        .collect();
    (union, positions)
}

/// One weather variable's ensemble: rows are timestamps, columns are members
#[derive(Debug, Clone)]
pub struct VariableTable {
    variable: String,
    index: TimeIndex,
    members: Vec<String>,
    values: Array2<f64>,
}

impl VariableTable {
    /// Build a table from one column of values per member.
    ///
    /// `None` marks an absent value.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the index is not strictly increasing
    /// - the number of columns differs from the number of members
    /// - a column length differs from the index length
    /// - a present value is not finite
    pub fn new(
        variable: impl Into<String>,
        index: TimeIndex,
        members: Vec<String>,
        columns: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        let variable = variable.into();
        index.ensure_strictly_increasing(&variable)?;

        if columns.len() != members.len() {
            return Err(EnsembleError::ShapeMismatch {
                context: format!("members of '{variable}'"),
                expected: members.len(),
                found: columns.len(),
            });
        }

        let n_rows = index.len();
        let mut values = Array2::from_elem((n_rows, members.len()), f64::NAN);
        for (col, (member, column)) in members.iter().zip(&columns).enumerate() {
            if column.len() != n_rows {
                return Err(EnsembleError::ShapeMismatch {
                    context: format!("rows of member '{member}' in '{variable}'"),
                    expected: n_rows,
                    found: column.len(),
                });
            }
            for (row, value) in column.iter().enumerate() {
                if let Some(v) = *value {
                    if !v.is_finite() {
                        return Err(EnsembleError::InvalidValue {
                            statistic: "member value",
                            value: v,
                            reason: "must be finite",
                        });
                    }
                    values[[row, col]] = v;
                }
            }
        }

        Ok(Self {
            variable,
            index,
            members,
            values,
        })
    }

    #[must_use]
    pub fn variable(&self) -> &str {
        &self.variable
    }

    #[must_use]
    pub const fn index(&self) -> &TimeIndex {
        &self.index
    }

    #[must_use]
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Raw values, `NaN` where a member did not report
    #[must_use]
    pub const fn values(&self) -> &Array2<f64> {
        &self.values
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    /// Value of one member at one row, `None` when absent
    #[must_use]
    pub fn get(&self, row: usize, member: &str) -> Option<f64> {
        let col = self.members.iter().position(|m| m == member)?;
        self.values
            .get([row, col])
            .copied()
            .filter(|v| !v.is_nan())
    }

    /// Apply a fallible transformation to every present value.
    pub(crate) fn try_map_values<F>(&self, f: F) -> Result<Self>
    where
        F: Fn(f64) -> Result<f64>,
    {
        let mut values = self.values.clone();
        for v in values.iter_mut().filter(|v| !v.is_nan()) {
            *v = f(*v)?;
        }
        Ok(Self {
            variable: self.variable.clone(),
            index: self.index.clone(),
            members: self.members.clone(),
            values,
        })
    }
}

/// Named statistics of one variable per timestamp
#[derive(Debug, Clone)]
pub struct StatisticsTable {
    index: TimeIndex,
    statistics: Vec<String>,
    values: Array2<f64>,
}

impl StatisticsTable {
    /// # Errors
    ///
    /// Returns an error if the value array does not have one row per
    /// timestamp and one column per statistic.
    pub fn new(index: TimeIndex, statistics: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if values.nrows() != index.len() {
            return Err(EnsembleError::ShapeMismatch {
                context: "statistics rows".to_string(),
                expected: index.len(),
                found: values.nrows(),
            });
        }
        if values.ncols() != statistics.len() {
            return Err(EnsembleError::ShapeMismatch {
                context: "statistics columns".to_string(),
                expected: statistics.len(),
                found: values.ncols(),
            });
        }
        Ok(Self {
            index,
            statistics,
            values,
        })
    }

    #[must_use]
    pub const fn index(&self) -> &TimeIndex {
        &self.index
    }

    #[must_use]
    pub fn statistics(&self) -> &[String] {
        &self.statistics
    }

    #[must_use]
    pub const fn values(&self) -> &Array2<f64> {
        &self.values
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    /// Column of one statistic, `NaN` where absent
    #[must_use]
    pub fn column(&self, statistic: &str) -> Option<ArrayView1<'_, f64>> {
        let col = self.statistics.iter().position(|s| s == statistic)?;
        Some(self.values.column(col))
    }

    /// Value of one statistic at one row, `None` when absent
    #[must_use]
    pub fn get(&self, row: usize, statistic: &str) -> Option<f64> {
        self.column(statistic)?
            .get(row)
            .copied()
            .filter(|v| !v.is_nan())
    }

    /// Long form `(timestamp, variable, statistic, value)`, absent cells skipped
    #[must_use]
    pub fn melt(&self, variable: &str) -> Vec<StatRecord> {
        let keys: Vec<StatKey> = self
            .statistics
            .iter()
            .map(|s| StatKey::new(variable, s.as_str()))
            .collect();
        melt_rows(&self.index.to_utc(), &keys, &self.values)
    }
}

/// Structured column key of a wide table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StatKey {
    pub variable: String,
    pub statistic: String,
}

impl StatKey {
    pub fn new(variable: impl Into<String>, statistic: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            statistic: statistic.into(),
        }
    }

    /// Flat `{variable}_{statistic}` column name used by renderers and storage
    #[must_use]
    pub fn column_name(&self) -> String {
        format!("{}_{}", self.variable, self.statistic)
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.variable, self.statistic)
    }
}

/// One present cell of a statistics table in long form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatRecord {
    pub timestamp: DateTime<Utc>,
    pub variable: String,
    pub statistic: String,
    pub value: f64,
}

pub(crate) fn melt_rows(
    index: &[DateTime<Utc>],
    keys: &[StatKey],
    values: &Array2<f64>,
) -> Vec<StatRecord> {
    let mut records = Vec::new();
    for (row, timestamp) in index.iter().enumerate() {
        for (col, key) in keys.iter().enumerate() {
            let value = values[[row, col]];
            if value.is_nan() {
                continue;
            }
            records.push(StatRecord {
                timestamp: *timestamp,
                variable: key.variable.clone(),
                statistic: key.statistic.clone(),
                value,
            });
        }
    }
    records
}
