//! Collaborator seams for run bookkeeping and statistics persistence
//!
//! The statistics core never talks to storage directly. The pipeline goes
//! through two async traits: a [`RunRegistry`] that remembers the latest
//! processed run per model, and a [`StatisticsSink`] that stores long-form
//! records. In-memory implementations back tests and the CLI.

use crate::errors::Result;
use crate::table::StatRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Remembers the latest processed run of every model
#[async_trait]
pub trait RunRegistry: Send + Sync {
    /// Latest recorded run of `model`, if any
    async fn last_run(&self, model: &str) -> Result<Option<DateTime<Utc>>>;

    /// Record `run` as the latest processed run of `model`
    async fn record_run(&self, model: &str, run: DateTime<Utc>) -> Result<()>;

    /// A run is new when nothing is recorded or it is strictly later than the
    /// recorded run.
    async fn is_new_run(&self, model: &str, run: DateTime<Utc>) -> Result<bool> {
        Ok(self.last_run(model).await?.map_or(true, |last| run > last))
    }
}

/// Stores long-form statistics records
#[async_trait]
pub trait StatisticsSink: Send + Sync {
    /// Store one model run's statistics; returns the number of records written
    async fn write_model_statistics(
        &self,
        model: &str,
        run: DateTime<Utc>,
        records: &[StatRecord],
    ) -> Result<usize>;

    /// Store the ensemble statistics; returns the number of records written
    async fn write_ensemble(&self, records: &[StatRecord]) -> Result<usize>;

    /// Remove every run older than `cutoff` together with its records;
    /// returns the number of runs removed
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Run registry held in process memory
#[derive(Debug, Default)]
pub struct InMemoryRunRegistry {
    runs: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryRunRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunRegistry for InMemoryRunRegistry {
    async fn last_run(&self, model: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.runs.read().await.get(model).copied())
    }

    async fn record_run(&self, model: &str, run: DateTime<Utc>) -> Result<()> {
        self.runs.write().await.insert(model.to_string(), run);
        Ok(())
    }
}

/// Unique key of a stored statistic
type RecordKey = (DateTime<Utc>, String, String);

#[derive(Debug, Default)]
struct SinkState {
    runs: BTreeMap<(String, DateTime<Utc>), BTreeMap<RecordKey, f64>>,
    ensemble: BTreeMap<RecordKey, f64>,
}

/// Statistics sink held in process memory.
///
/// Records are upserted on (model, run, variable, statistic, timestamp);
/// purging a run removes its records with it.
#[derive(Debug, Default)]
pub struct InMemoryStatisticsSink {
    state: RwLock<SinkState>,
}

impl InMemoryStatisticsSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored (model, run) pairs in ascending order
    pub async fn runs(&self) -> Vec<(String, DateTime<Utc>)> {
        self.state.read().await.runs.keys().cloned().collect()
    }

    /// Stored records of one model run
    pub async fn model_records(&self, model: &str, run: DateTime<Utc>) -> Vec<StatRecord> {
        self.state
            .read()
            .await
            .runs
            .get(&(model.to_string(), run))
            .map(to_records)
            .unwrap_or_default()
    }

    /// Stored ensemble records
    pub async fn ensemble_records(&self) -> Vec<StatRecord> {
        to_records(&self.state.read().await.ensemble)
    }
}

fn upsert(target: &mut BTreeMap<RecordKey, f64>, records: &[StatRecord]) {
    for record in records {
        target.insert(
            (
                record.timestamp,
                record.variable.clone(),
                record.statistic.clone(),
            ),
            record.value,
        );
    }
}

fn to_records(stored: &BTreeMap<RecordKey, f64>) -> Vec<StatRecord> {
    stored
        .iter()
        .map(|((timestamp, variable, statistic), &value)| StatRecord {
            timestamp: *timestamp,
            variable: variable.clone(),
            statistic: statistic.clone(),
            value,
        })
        .collect()
}

#[async_trait]
impl StatisticsSink for InMemoryStatisticsSink {
    async fn write_model_statistics(
        &self,
        model: &str,
        run: DateTime<Utc>,
        records: &[StatRecord],
    ) -> Result<usize> {
        let mut state = self.state.write().await;
        upsert(
            state.runs.entry((model.to_string(), run)).or_default(),
            records,
        );
        Ok(records.len())
    }

    async fn write_ensemble(&self, records: &[StatRecord]) -> Result<usize> {
        upsert(&mut self.state.write().await.ensemble, records);
        Ok(records.len())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut state = self.state.write().await;
        let before = state.runs.len();
        state.runs.retain(|(_, run), _| *run >= cutoff);
        Ok(before - state.runs.len())
    }
}
