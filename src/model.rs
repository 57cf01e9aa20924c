//! One model run: its member tables and the wide table of their statistics

use crate::errors::{EnsembleError, Result};
use crate::formatting::RenderTable;
use crate::statistics::{MemberStatistics, StatisticsOptions, VariableKind};
use crate::table::{melt_rows, StatKey, StatRecord, StatisticsTable, TimeIndex, VariableTable};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Member tables of one model run, keyed by variable name
#[derive(Debug, Clone)]
pub struct ModelRun {
    model: String,
    run: DateTime<Utc>,
    variables: BTreeMap<String, VariableTable>,
}

/// A variable whose statistics could not be computed
#[derive(Debug)]
pub struct VariableFailure {
    pub variable: String,
    pub error: EnsembleError,
}

/// Statistics of one run plus the variables that were left out
#[derive(Debug)]
pub struct ModelReport {
    pub statistics: ModelStatistics,
    pub failures: Vec<VariableFailure>,
}

impl ModelRun {
    pub fn new(model: impl Into<String>, run: DateTime<Utc>) -> Self {
        Self {
            model: model.into(),
            run,
            variables: BTreeMap::new(),
        }
    }

    /// Adds a variable table, replacing any table of the same variable
    #[must_use]
    pub fn with_variable(mut self, table: VariableTable) -> Self {
        self.insert(table);
        self
    }

    pub fn insert(&mut self, table: VariableTable) {
        self.variables.insert(table.variable().to_string(), table);
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub const fn run(&self) -> DateTime<Utc> {
        self.run
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&VariableTable> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = &VariableTable> {
        self.variables.values()
    }

    /// Computes every variable's statistics and joins them into one wide table.
    ///
    /// Variables without an entry in `kinds` are treated as continuous. A
    /// variable whose statistics fail is logged, reported in
    /// [`ModelReport::failures`] and left out; the others are unaffected.
    ///
    /// # Errors
    ///
    /// Returns an error if the remaining statistics cannot be joined, which
    /// happens when naive and timezone-aware indexes are mixed.
    pub fn compute_statistics(
        &self,
        kinds: &BTreeMap<String, VariableKind>,
        options: &StatisticsOptions,
    ) -> Result<ModelReport> {
        let mut parts = Vec::with_capacity(self.variables.len());
        let mut failures = Vec::new();

        for (name, table) in &self.variables {
            let kind = kinds.get(name).copied().unwrap_or(VariableKind::Continuous);
            match table.member_statistics(kind, options) {
                Ok(stats) => parts.push((name.clone(), stats)),
                Err(error) => {
                    tracing::warn!(
                        model = %self.model,
                        variable = %name,
                        %error,
                        "omitting variable from model statistics"
                    );
                    failures.push(VariableFailure {
                        variable: name.clone(),
                        error,
                    });
                }
            }
        }

        let statistics = ModelStatistics::from_variables(&self.model, self.run, parts)?;
        Ok(ModelReport {
            statistics,
            failures,
        })
    }
}

/// Wide table of one model run: one column per (variable, statistic)
#[derive(Debug, Clone)]
pub struct ModelStatistics {
    model: String,
    run: DateTime<Utc>,
    index: TimeIndex,
    columns: Vec<StatKey>,
    values: Array2<f64>,
}

impl ModelStatistics {
    /// Outer-joins per-variable statistics on timestamp.
    ///
    /// Timestamps missing from a variable leave that variable's cells absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the variables mix naive and timezone-aware indexes.
    pub fn from_variables(
        model: impl Into<String>,
        run: DateTime<Utc>,
        parts: Vec<(String, StatisticsTable)>,
    ) -> Result<Self> {
        let model = model.into();
        let indexes: Vec<(&str, &TimeIndex)> = parts
            .iter()
            .map(|(name, stats)| (name.as_str(), stats.index()))
            .collect();
        let (index, positions) = TimeIndex::outer_join(&indexes)?;

        let columns: Vec<StatKey> = parts
            .iter()
            .flat_map(|(name, stats)| {
                stats
                    .statistics()
                    .iter()
                    .map(move |statistic| StatKey::new(name.as_str(), statistic.as_str()))
            })
            .collect();

        let mut values = Array2::from_elem((index.len(), columns.len()), f64::NAN);
        let mut offset = 0;
        for ((_, stats), rows) in parts.iter().zip(&positions) {
            for (src_row, &dst_row) in rows.iter().enumerate() {
                for (col, &value) in stats.values().row(src_row).iter().enumerate() {
                    values[[dst_row, offset + col]] = value;
                }
            }
            offset += stats.statistics().len();
        }

        tracing::debug!(
            model = %model,
            variables = parts.len(),
            rows = index.len(),
            columns = columns.len(),
            "joined model statistics"
        );

        Ok(Self {
            model,
            run,
            index,
            columns,
            values,
        })
    }

    /// Wraps an already wide table.
    ///
    /// # Errors
    ///
    /// Returns an error if `values` is not `index.len()` by `columns.len()` or
    /// the index is not strictly increasing.
    pub fn from_columns(
        model: impl Into<String>,
        run: DateTime<Utc>,
        index: TimeIndex,
        columns: Vec<StatKey>,
        values: Array2<f64>,
    ) -> Result<Self> {
        let model = model.into();
        index.ensure_strictly_increasing(&model)?;
        if values.dim() != (index.len(), columns.len()) {
            return Err(EnsembleError::ShapeMismatch {
                context: format!("wide statistics of '{model}'"),
                expected: index.len() * columns.len(),
                found: values.len(),
            });
        }
        Ok(Self {
            model,
            run,
            index,
            columns,
            values,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub const fn run(&self) -> DateTime<Utc> {
        self.run
    }

    #[must_use]
    pub const fn index(&self) -> &TimeIndex {
        &self.index
    }

    #[must_use]
    pub fn columns(&self) -> &[StatKey] {
        &self.columns
    }

    #[must_use]
    pub const fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// True when the table has no rows or no columns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at one row and column, `None` when absent
    #[must_use]
    pub fn get(&self, row: usize, key: &StatKey) -> Option<f64> {
        let col = self.columns.iter().position(|k| k == key)?;
        self.values
            .get([row, col])
            .copied()
            .filter(|v| !v.is_nan())
    }

    /// Long form for persistence under the (model, run) key
    #[must_use]
    pub fn melt(&self) -> Vec<StatRecord> {
        melt_rows(&self.index.to_utc(), &self.columns, &self.values)
    }

    /// Flattened, UTC-indexed table for formatting and rendering
    #[must_use]
    pub fn to_render_table(&self) -> RenderTable {
        RenderTable::from_wide(&self.index.to_utc(), &self.columns, &self.values)
    }
}
