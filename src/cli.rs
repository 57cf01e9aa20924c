//! Defines command-line interface options using `clap` for the meteo-ensemble application.

use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

/// Ensemble statistics and multi-model aggregation for Open-Meteo forecasts
#[derive(Parser, Debug)]
#[command(
    version,
    name = "meteo-ensemble",
    about = "Compute ensemble forecast statistics and average them across models"
)]
pub struct Args {
    /// Path to the TOML configuration. Defaults apply when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Ensemble document of one model, formatted as <model>=<path>. Repeatable.
    #[arg(short, long = "input", value_parser = parse_input_arg, required = true)]
    pub inputs: Vec<(String, PathBuf)>,

    /// Reference time for the forecast window (RFC 3339). Defaults to now.
    #[arg(long, value_parser = parse_now_arg)]
    pub now: Option<DateTime<Utc>>,

    /// Path to save the rendered tables as JSON. If not set, prints to stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also render each model's own statistics.
    #[arg(long, default_value_t = false)]
    pub per_model: bool,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Number of threads to use for parallel processing. Defaults to number of CPU cores.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,
}

fn parse_input_arg(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((model, path)) if !model.is_empty() && !path.is_empty() => {
            Ok((model.to_string(), PathBuf::from(path)))
        }
        _ => Err("Invalid format: Expected '<model>=<path>'.".to_string()),
    }
}

fn parse_now_arg(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("Invalid timestamp '{s}': {e}"))
}
