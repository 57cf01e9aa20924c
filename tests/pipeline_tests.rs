//! Pipeline tests against the in-memory registry and sink

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use meteo_ensemble::prelude::*;
use meteo_ensemble::StatRecord;

fn utc(day: u32, h: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(2024, 5, day)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
        .and_utc()
}

fn temperature_run(model: &str, run: DateTime<Utc>, values: [f64; 3]) -> ModelRun {
    let index = TimeIndex::Naive((0..2).map(|h| utc(1, h).naive_utc()).collect());
    let table = VariableTable::new(
        "temperature_2m",
        index,
        vec!["control".into(), "member01".into(), "member02".into()],
        values.iter().map(|&v| vec![Some(v), Some(v + 1.0)]).collect(),
    )
    .unwrap();
    ModelRun::new(model, run).with_variable(table)
}

fn pipeline() -> ForecastPipeline<InMemoryRunRegistry, InMemoryStatisticsSink> {
    ForecastPipeline::new(
        ForecastConfig::default(),
        InMemoryRunRegistry::new(),
        InMemoryStatisticsSink::new(),
    )
}

#[tokio::test]
async fn test_new_run_is_persisted_once() {
    let pipeline = pipeline();
    let run = temperature_run("icon_seamless", utc(1, 0), [10.0, 11.0, 12.0]);

    let first = pipeline.process_run(&run).await.unwrap();
    assert!(first.is_new);
    assert!(first.failures.is_empty());
    assert_eq!(
        pipeline.registry().last_run("icon_seamless").await.unwrap(),
        Some(utc(1, 0))
    );
    // Two rows, three percentile statistics
    let stored = pipeline.sink().model_records("icon_seamless", utc(1, 0)).await;
    assert_eq!(stored.len(), 6);

    let again = pipeline.process_run(&run).await.unwrap();
    assert!(!again.is_new);
    assert_eq!(pipeline.sink().runs().await.len(), 1);
}

#[tokio::test]
async fn test_later_run_is_new_earlier_is_not() {
    let registry = InMemoryRunRegistry::new();
    registry.record_run("gfs_seamless", utc(2, 0)).await.unwrap();

    assert!(registry.is_new_run("gfs_seamless", utc(2, 6)).await.unwrap());
    assert!(!registry.is_new_run("gfs_seamless", utc(2, 0)).await.unwrap());
    assert!(!registry.is_new_run("gfs_seamless", utc(1, 18)).await.unwrap());
    assert!(registry.is_new_run("icon_seamless", utc(1, 0)).await.unwrap());
}

#[tokio::test]
async fn test_process_runs_and_publish_ensemble() {
    let pipeline = pipeline();
    let runs = [
        temperature_run("icon_seamless", utc(1, 0), [10.0, 11.0, 12.0]),
        temperature_run("gfs_seamless", utc(1, 0), [12.0, 13.0, 14.0]),
    ];

    let outcomes = pipeline.process_runs(&runs).await;
    let statistics: Vec<ModelStatistics> = outcomes
        .into_iter()
        .map(|o| o.unwrap().statistics)
        .collect();
    assert_eq!(statistics[0].model(), "icon_seamless");

    let ensemble = pipeline
        .publish_ensemble(&statistics, utc(1, 0))
        .await
        .unwrap();
    let median = StatKey::new("temperature_2m", "median");
    assert_eq!(ensemble.get(utc(1, 0), &median), Some(12.0));
    assert_eq!(ensemble.get(utc(1, 1), &median), Some(13.0));
    assert_eq!(pipeline.sink().ensemble_records().await.len(), 6);
}

#[tokio::test]
async fn test_empty_ensemble_skips_sink() {
    let pipeline = pipeline();
    let ensemble = pipeline.publish_ensemble(&[], utc(1, 0)).await.unwrap();
    assert!(ensemble.is_empty());
    assert!(pipeline.sink().ensemble_records().await.is_empty());
}

#[tokio::test]
async fn test_out_of_range_durations_are_errors() {
    let config = ForecastConfig {
        forecast_hours: u32::MAX,
        retention_days: u32::MAX,
        ..ForecastConfig::default()
    };
    let pipeline = ForecastPipeline::new(
        config,
        InMemoryRunRegistry::new(),
        InMemoryStatisticsSink::new(),
    );

    let published = pipeline.publish_ensemble(&[], utc(1, 0)).await;
    assert!(matches!(published, Err(EnsembleError::Config(_))));
    let purged = pipeline.purge_expired(utc(1, 0)).await;
    assert!(matches!(purged, Err(EnsembleError::Config(_))));
}

#[tokio::test]
async fn test_purge_expired_runs() {
    let pipeline = pipeline();
    for day in [1, 5, 9] {
        let run = temperature_run("icon_seamless", utc(day, 0), [1.0, 2.0, 3.0]);
        pipeline.process_run(&run).await.unwrap();
    }

    // Default retention is 7 days: the run of May 1st is older than May 3rd
    let purged = pipeline.purge_expired(utc(10, 0)).await.unwrap();
    assert_eq!(purged, 1);
    assert!(pipeline
        .sink()
        .model_records("icon_seamless", utc(1, 0))
        .await
        .is_empty());
    assert_eq!(pipeline.sink().runs().await.len(), 2);
}

#[test]
fn test_sink_upserts_records() {
    let sink = InMemoryStatisticsSink::new();
    let record = |value| StatRecord {
        timestamp: utc(1, 0),
        variable: "temperature_2m".to_string(),
        statistic: "p10".to_string(),
        value,
    };

    tokio_test::block_on(async {
        sink.write_model_statistics("icon_seamless", utc(1, 0), &[record(1.0)])
            .await
            .unwrap();
        sink.write_model_statistics("icon_seamless", utc(1, 0), &[record(2.0)])
            .await
            .unwrap();
        let stored = sink.model_records("icon_seamless", utc(1, 0)).await;
        assert_eq!(stored, vec![record(2.0)]);
    });
}

/// Sink that rejects every write
struct UnavailableSink;

#[async_trait]
impl StatisticsSink for UnavailableSink {
    async fn write_model_statistics(
        &self,
        _model: &str,
        _run: DateTime<Utc>,
        _records: &[StatRecord],
    ) -> Result<usize> {
        Err(unavailable())
    }

    async fn write_ensemble(&self, _records: &[StatRecord]) -> Result<usize> {
        Err(unavailable())
    }

    async fn purge_before(&self, _cutoff: DateTime<Utc>) -> Result<usize> {
        Err(unavailable())
    }
}

fn unavailable() -> EnsembleError {
    EnsembleError::Collaborator {
        collaborator: "statistics sink",
        message: "database is locked".to_string(),
    }
}

#[tokio::test]
async fn test_sink_failure_leaves_run_unrecorded() {
    let pipeline = ForecastPipeline::new(
        ForecastConfig::default(),
        InMemoryRunRegistry::new(),
        UnavailableSink,
    );
    let runs = [
        temperature_run("icon_seamless", utc(1, 0), [1.0, 2.0, 3.0]),
        temperature_run("gfs_seamless", utc(1, 0), [1.0, 2.0, 3.0]),
    ];

    let outcomes = pipeline.process_runs(&runs).await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, Err(EnsembleError::Collaborator { .. }))));
    // Not recorded, so the next attempt retries the run
    assert_eq!(
        pipeline.registry().last_run("icon_seamless").await.unwrap(),
        None
    );
    assert!(pipeline.purge_expired(utc(1, 0) + Duration::days(30)).await.is_err());
}
