//! Entry point for the meteo-ensemble application.
//! Loads configuration and model documents, runs the statistics pipeline and
//! writes the formatted ensemble as JSON.

mod cli;
mod logging;

use clap::Parser;
use cli::Args;
use meteo_ensemble::prelude::*;
use meteo_ensemble::{get_parallel_info, read_model_runs, ExportReport};
use std::process;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    ParallelConfig::new(args.threads).setup_global_pool()?;
    get_parallel_info().log();

    let config = match &args.config {
        Some(path) => ForecastConfig::from_file(path)?,
        None => ForecastConfig::default(),
    };
    let timezone = config.timezone()?;
    let now = args.now.unwrap_or_else(chrono::Utc::now);

    let variables: Vec<&str> = config.variables.keys().map(String::as_str).collect();
    let (runs, failures) = read_model_runs(&args.inputs, &variables, now);
    if !failures.is_empty() {
        tracing::warn!(failed = failures.len(), loaded = runs.len(), "some model inputs were skipped");
    }

    let pipeline = ForecastPipeline::new(
        config,
        InMemoryRunRegistry::new(),
        InMemoryStatisticsSink::new(),
    );

    let statistics: Vec<ModelStatistics> = pipeline
        .process_runs(&runs)
        .await
        .into_iter()
        .filter_map(|outcome| outcome.ok().map(|o| o.statistics))
        .collect();
    let ensemble = pipeline.publish_ensemble(&statistics, now).await?;
    pipeline.purge_expired(now).await?;

    let per_model: &[ModelStatistics] = if args.per_model { &statistics } else { &[] };
    let report = ExportReport::build(&ensemble, per_model, timezone);
    if report.is_empty() {
        tracing::info!("nothing to write");
        return Ok(());
    }

    let json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)?;
            tracing::info!(path = %path.display(), "saved ensemble statistics");
        }
        None => println!("{json}"),
    }
    Ok(())
}
