//! End-to-end processing of model runs
//!
//! For each model run the pipeline computes the wide statistics table, and,
//! when the run is newer than what the registry has seen, persists the long
//! form and records the run. Several runs are processed concurrently and then
//! averaged into the ensemble.

use crate::config::ForecastConfig;
use crate::data_source::{RunRegistry, StatisticsSink};
use crate::ensemble::{EnsembleAggregator, EnsembleStatistics};
use crate::errors::Result;
use crate::model::{ModelRun, ModelStatistics, VariableFailure};
use chrono::{DateTime, Utc};
use futures::future::join_all;

/// Result of processing one model run
#[derive(Debug)]
pub struct RunOutcome {
    pub statistics: ModelStatistics,
    /// Variables left out of `statistics`
    pub failures: Vec<VariableFailure>,
    /// Whether the run was newer than the recorded one and got persisted
    pub is_new: bool,
}

/// Couples the statistics core with a run registry and a statistics sink
pub struct ForecastPipeline<R, S> {
    config: ForecastConfig,
    registry: R,
    sink: S,
}

impl<R: RunRegistry, S: StatisticsSink> ForecastPipeline<R, S> {
    pub const fn new(config: ForecastConfig, registry: R, sink: S) -> Self {
        Self {
            config,
            registry,
            sink,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ForecastConfig {
        &self.config
    }

    #[must_use]
    pub const fn registry(&self) -> &R {
        &self.registry
    }

    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Compute one run's statistics and persist them if the run is new.
    ///
    /// # Errors
    ///
    /// Returns an error if the statistics cannot be joined or a collaborator
    /// fails. Failing variables are not errors; they end up in
    /// [`RunOutcome::failures`].
    pub async fn process_run(&self, run: &ModelRun) -> Result<RunOutcome> {
        let report = run.compute_statistics(&self.config.variables, &self.config.statistics)?;
        let is_new = self.registry.is_new_run(run.model(), run.run()).await?;

        if is_new {
            let records = report.statistics.melt();
            let written = self
                .sink
                .write_model_statistics(run.model(), run.run(), &records)
                .await?;
            self.registry.record_run(run.model(), run.run()).await?;
            tracing::info!(
                model = run.model(),
                run = %run.run(),
                records = written,
                failed_variables = report.failures.len(),
                "stored statistics of new model run"
            );
        } else {
            tracing::info!(model = run.model(), run = %run.run(), "no new model run");
        }

        Ok(RunOutcome {
            statistics: report.statistics,
            failures: report.failures,
            is_new,
        })
    }

    /// Process several runs concurrently.
    ///
    /// Outcomes are returned in input order; one run's error does not affect
    /// the others.
    pub async fn process_runs(&self, runs: &[ModelRun]) -> Vec<Result<RunOutcome>> {
        let outcomes = join_all(runs.iter().map(|run| self.process_run(run))).await;
        for (run, outcome) in runs.iter().zip(&outcomes) {
            if let Err(error) = outcome {
                tracing::warn!(model = run.model(), %error, "model run failed");
            }
        }
        outcomes
    }

    /// Aggregate the models into the ensemble at `now` and persist it.
    ///
    /// An empty ensemble is not written.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured timezone is invalid, the forecast
    /// window is out of range at `now`, or the sink fails.
    pub async fn publish_ensemble(
        &self,
        models: &[ModelStatistics],
        now: DateTime<Utc>,
    ) -> Result<EnsembleStatistics> {
        let ensemble = EnsembleAggregator::new(self.config.window()?).aggregate(models, now)?;
        if ensemble.is_empty() {
            tracing::info!("empty ensemble, nothing stored");
            return Ok(ensemble);
        }
        let written = self.sink.write_ensemble(&ensemble.melt()).await?;
        tracing::info!(records = written, "stored ensemble statistics");
        Ok(ensemble)
    }

    /// Remove runs older than the configured retention.
    ///
    /// # Errors
    ///
    /// Returns an error if the cutoff is out of range or the sink fails.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = self.config.retention_cutoff(now)?;
        let purged = self.sink.purge_before(cutoff).await?;
        tracing::info!(%cutoff, runs = purged, "purged expired model runs");
        Ok(purged)
    }
}
