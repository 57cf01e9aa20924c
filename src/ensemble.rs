//! Multi-model ensemble: timezone normalization, per-cell mean, window trim
//!
//! Each model's wide table is normalized to UTC, all tables are stacked, and
//! every (timestamp, column) cell becomes the mean over the models that
//! supplied a value there. The result is trimmed to the forecast window.

use crate::errors::{EnsembleError, Result};
use crate::formatting::RenderTable;
use crate::model::ModelStatistics;
use crate::table::{melt_rows, StatKey, StatRecord};
use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use ndarray::Array2;
use std::collections::{BTreeSet, HashMap};

/// Time range reported by the ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastWindow {
    /// Local timezone in which "now" is floored to the hour
    pub timezone: Tz,
    /// Length of the window after "now"
    pub horizon: Duration,
}

impl ForecastWindow {
    #[must_use]
    pub fn new(timezone: Tz, horizon_hours: u32) -> Self {
        Self {
            timezone,
            horizon: Duration::hours(i64::from(horizon_hours)),
        }
    }

    /// Inclusive bounds: `now` floored to the local hour, and `now + horizon`
    ///
    /// # Errors
    ///
    /// Returns [`EnsembleError::Config`] if a bound leaves the representable
    /// date range.
    pub fn bounds(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let local = now.with_timezone(&self.timezone);
        let into_hour = Duration::seconds(i64::from(local.minute()) * 60 + i64::from(local.second()))
            + Duration::nanoseconds(i64::from(local.nanosecond()));
        let start = now
            .checked_sub_signed(into_hour)
            .ok_or_else(|| out_of_range("start", now))?;
        let end = now
            .checked_add_signed(self.horizon)
            .ok_or_else(|| out_of_range("end", now))?;
        Ok((start, end))
    }

    /// # Errors
    ///
    /// Returns an error if the window bounds cannot be computed.
    pub fn contains(&self, now: DateTime<Utc>, timestamp: DateTime<Utc>) -> Result<bool> {
        let (start, end) = self.bounds(now)?;
        Ok(start <= timestamp && timestamp <= end)
    }
}

fn out_of_range(bound: &str, now: DateTime<Utc>) -> EnsembleError {
    EnsembleError::Config(format!(
        "forecast window {bound} is out of range for now = {now}"
    ))
}

/// Mean statistics over all contributing models
#[derive(Debug, Clone)]
pub struct EnsembleStatistics {
    models: Vec<String>,
    index: Vec<DateTime<Utc>>,
    columns: Vec<StatKey>,
    values: Array2<f64>,
}

impl EnsembleStatistics {
    /// Ensemble with no models, rows or columns
    #[must_use]
    pub fn empty() -> Self {
        Self {
            models: Vec::new(),
            index: Vec::new(),
            columns: Vec::new(),
            values: Array2::zeros((0, 0)),
        }
    }

    /// Names of the contributing models
    #[must_use]
    pub fn models(&self) -> &[String] {
        &self.models
    }

    #[must_use]
    pub fn index(&self) -> &[DateTime<Utc>] {
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

    /// True when there is nothing to export
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Mean at one timestamp and column, `None` when no model supplied a value
    #[must_use]
    pub fn get(&self, timestamp: DateTime<Utc>, key: &StatKey) -> Option<f64> {
        let row = self.index.binary_search(&timestamp).ok()?;
        let col = self.columns.iter().position(|k| k == key)?;
        Some(self.values[[row, col]]).filter(|v| !v.is_nan())
    }

    /// Rows with `start <= timestamp <= end`
    #[must_use]
    pub fn trim(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let keep: Vec<usize> = self
            .index
            .iter()
            .enumerate()
            .filter(|(_, ts)| start <= **ts && **ts <= end)
            .map(|(row, _)| row)
            .collect();

        Self {
            models: self.models.clone(),
            index: keep.iter().map(|&row| self.index[row]).collect(),
            columns: self.columns.clone(),
            values: self.values.select(ndarray::Axis(0), &keep),
        }
    }

    /// Long form for persistence
    #[must_use]
    pub fn melt(&self) -> Vec<StatRecord> {
        melt_rows(&self.index, &self.columns, &self.values)
    }

    /// Flattened table for formatting and rendering
    #[must_use]
    pub fn to_render_table(&self) -> RenderTable {
        RenderTable::from_wide(&self.index, &self.columns, &self.values)
    }
}

/// Merges several models' statistics into one ensemble
#[derive(Debug, Clone, Copy)]
pub struct EnsembleAggregator {
    window: ForecastWindow,
}

impl EnsembleAggregator {
    #[must_use]
    pub const fn new(window: ForecastWindow) -> Self {
        Self { window }
    }

    #[must_use]
    pub const fn window(&self) -> &ForecastWindow {
        &self.window
    }

    /// Normalizes, stacks and averages the models without trimming.
    ///
    /// Timestamps and columns are the union over all models; columns keep the
    /// order of their first appearance. Models with an empty table do not
    /// count as contributors.
    #[must_use]
    pub fn merge(&self, models: &[ModelStatistics]) -> EnsembleStatistics {
        if models.is_empty() {
            return EnsembleStatistics::empty();
        }

        let mut timestamps = BTreeSet::new();
        let mut columns: Vec<StatKey> = Vec::new();
        let mut column_pos: HashMap<StatKey, usize> = HashMap::new();
        let mut normalized = Vec::with_capacity(models.len());

        for model in models {
            let utc = model.index().to_utc();
            timestamps.extend(utc.iter().copied());
            let targets: Vec<usize> = model
                .columns()
                .iter()
                .map(|key| {
                    *column_pos.entry(key.clone()).or_insert_with(|| {
                        columns.push(key.clone());
                        columns.len() - 1
                    })
                })
                .collect();
            normalized.push((model, utc, targets));
        }

        let index: Vec<DateTime<Utc>> = timestamps.into_iter().collect();
        let shape = (index.len(), columns.len());
        let mut sums = Array2::<f64>::zeros(shape);
        let mut counts = Array2::<u32>::zeros(shape);

        for (model, utc, targets) in &normalized {
            for (src_row, ts) in utc.iter().enumerate() {
                let dst_row = index.binary_search(ts).unwrap_or_else(|p| p);
                for (src_col, &dst_col) in targets.iter().enumerate() {
                    let value = model.values()[[src_row, src_col]];
                    if !value.is_nan() {
                        sums[[dst_row, dst_col]] += value;
                        counts[[dst_row, dst_col]] += 1;
                    }
                }
            }
        }

        let values = Array2::from_shape_fn(shape, |cell| match counts[cell] {
            0 => f64::NAN,
            n => sums[cell] / f64::from(n),
        });

        EnsembleStatistics {
            models: models
                .iter()
                .filter(|m| !m.is_empty())
                .map(|m| m.model().to_string())
                .collect(),
            index,
            columns,
            values,
        }
    }

    /// Merges the models and trims the result to the forecast window at `now`.
    ///
    /// Zero models yield an empty ensemble.
    ///
    /// # Errors
    ///
    /// Returns an error if the forecast window cannot be computed at `now`.
    pub fn aggregate(
        &self,
        models: &[ModelStatistics],
        now: DateTime<Utc>,
    ) -> Result<EnsembleStatistics> {
        let merged = self.merge(models);
        let (start, end) = self.window.bounds(now)?;
        let trimmed = merged.trim(start, end);

        tracing::info!(
            models = trimmed.models().len(),
            rows = trimmed.index().len(),
            dropped = merged.index().len() - trimmed.index().len(),
            columns = trimmed.columns().len(),
            %start,
            %end,
            "aggregated ensemble statistics"
        );
        Ok(trimmed)
    }
}
