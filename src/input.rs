//! Decoding of Open-Meteo ensemble documents
//!
//! An ensemble response carries an `hourly` object with a shared `time` array,
//! a control column named after the variable and one `{variable}_memberNN`
//! column per perturbed member:
//!
//! ```json
//! {
//!   "utc_offset_seconds": 0,
//!   "hourly": {
//!     "time": ["2024-05-01T00:00", "2024-05-01T01:00"],
//!     "temperature_2m": [11.2, 10.9],
//!     "temperature_2m_member01": [11.0, null]
//!   }
//! }
//! ```

use crate::errors::{EnsembleError, Result};
use crate::model::{ModelRun, VariableFailure};
use crate::table::{TimeIndex, VariableTable};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Member name of the unperturbed control column
pub const CONTROL_MEMBER: &str = "control";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

/// A model run decoded from one document
#[derive(Debug)]
pub struct DecodedRun {
    pub run: ModelRun,
    /// Requested variables without any column in the document
    pub missing: Vec<String>,
    /// Variables present but not decodable
    pub failures: Vec<VariableFailure>,
}

struct HourlyBlock<'a> {
    columns: &'a Map<String, Value>,
    index: TimeIndex,
}

impl<'a> HourlyBlock<'a> {
    fn parse(document: &'a Value) -> Result<Self> {
        let columns = document
            .get("hourly")
            .and_then(Value::as_object)
            .ok_or_else(|| EnsembleError::Document("missing 'hourly' object".to_string()))?;
        let times = columns
            .get("time")
            .and_then(Value::as_array)
            .ok_or_else(|| EnsembleError::Document("missing 'hourly.time' array".to_string()))?;
        let utc_offset = document
            .get("utc_offset_seconds")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let index = decode_time(times, utc_offset)?;
        Ok(Self { columns, index })
    }

    fn variable(&self, variable: &str) -> Result<Option<VariableTable>> {
        let mut control = None;
        let mut perturbed = BTreeMap::new();
        for (key, values) in self.columns {
            if key == variable {
                control = Some(values);
            } else if let Some(number) = member_number(key, variable) {
                perturbed.insert(number, (key.as_str(), values));
            }
        }
        if control.is_none() && perturbed.is_empty() {
            return Ok(None);
        }

        let mut members = Vec::with_capacity(perturbed.len() + 1);
        let mut columns = Vec::with_capacity(perturbed.len() + 1);
        if let Some(values) = control {
            members.push(CONTROL_MEMBER.to_string());
            columns.push(decode_column(variable, CONTROL_MEMBER, values)?);
        }
        for (key, values) in perturbed.into_values() {
            let member = &key[variable.len() + 1..];
            members.push(member.to_string());
            columns.push(decode_column(variable, member, values)?);
        }

        VariableTable::new(variable, self.index.clone(), members, columns).map(Some)
    }
}

/// `temperature_2m_member07` under `temperature_2m` is member 7
fn member_number(key: &str, variable: &str) -> Option<u32> {
    let digits = key
        .strip_prefix(variable)?
        .strip_prefix('_')?
        .strip_prefix("member")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn decode_column(variable: &str, member: &str, values: &Value) -> Result<Vec<Option<f64>>> {
    let values = values.as_array().ok_or_else(|| {
        EnsembleError::Document(format!("column '{member}' of '{variable}' is not an array"))
    })?;
    values
        .iter()
        .enumerate()
        .map(|(row, value)| match value {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(n.as_f64()),
            other => Err(EnsembleError::NonNumeric {
                variable: variable.to_string(),
                member: member.to_string(),
                row,
                found: other.to_string(),
            }),
        })
        .collect()
}

enum Stamp {
    Naive(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

fn parse_stamp(value: &Value) -> Result<Stamp> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .map(|ts| Stamp::Zoned(ts.fixed_offset()))
            .ok_or_else(|| EnsembleError::Timestamp(n.to_string())),
        Value::String(s) => {
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Ok(Stamp::Zoned(ts));
            }
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(Stamp::Naive)
                .ok_or_else(|| EnsembleError::Timestamp(s.clone()))
        }
        other => Err(EnsembleError::Timestamp(other.to_string())),
    }
}

/// Decode the shared time axis.
///
/// Naive wall-clock times stay naive unless the document declares a non-zero
/// UTC offset, in which case they are read in that offset.
fn decode_time(values: &[Value], utc_offset: i64) -> Result<TimeIndex> {
    let stamps = values.iter().map(parse_stamp).collect::<Result<Vec<_>>>()?;

    let offset = if utc_offset == 0 {
        None
    } else {
        let offset = i32::try_from(utc_offset)
            .ok()
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| EnsembleError::Document(format!("invalid utc_offset_seconds {utc_offset}")))?;
        Some(offset)
    };

    let all_naive = stamps.iter().all(|s| matches!(s, Stamp::Naive(_)));
    if all_naive && offset.is_none() {
        return Ok(TimeIndex::Naive(
            stamps
                .into_iter()
                .filter_map(|s| match s {
                    Stamp::Naive(t) => Some(t),
                    Stamp::Zoned(_) => None,
                })
                .collect(),
        ));
    }

    stamps
        .into_iter()
        .map(|stamp| match (stamp, offset) {
            (Stamp::Zoned(ts), _) => Ok(ts),
            (Stamp::Naive(t), Some(offset)) => offset
                .from_local_datetime(&t)
                .single()
                .ok_or_else(|| EnsembleError::Timestamp(t.to_string())),
            (Stamp::Naive(t), None) => Err(EnsembleError::Timestamp(format!(
                "{t} has no offset while other timestamps do"
            ))),
        })
        .collect::<Result<Vec<_>>>()
        .map(TimeIndex::Zoned)
}

/// Decode one variable's member table.
///
/// Returns `Ok(None)` when the document has no column for `variable`.
///
/// # Errors
///
/// Returns an error if the document layout or its time axis is malformed, a
/// member holds a non-numeric value, or the columns do not line up with the
/// time axis.
pub fn decode_variable(document: &Value, variable: &str) -> Result<Option<VariableTable>> {
    HourlyBlock::parse(document)?.variable(variable)
}

/// Decode every requested variable of one model run.
///
/// A variable that fails to decode is logged and reported in
/// [`DecodedRun::failures`]; the other variables are unaffected.
///
/// # Errors
///
/// Returns an error only if the shared parts of the document (the `hourly`
/// object or its time axis) are malformed.
pub fn decode_model_run<'v>(
    model: &str,
    run: DateTime<Utc>,
    document: &Value,
    variables: impl IntoIterator<Item = &'v str>,
) -> Result<DecodedRun> {
    let block = HourlyBlock::parse(document)?;
    let mut decoded = DecodedRun {
        run: ModelRun::new(model, run),
        missing: Vec::new(),
        failures: Vec::new(),
    };

    for variable in variables {
        match block.variable(variable) {
            Ok(Some(table)) => decoded.run.insert(table),
            Ok(None) => {
                tracing::info!(model, variable, "variable not present in document");
                decoded.missing.push(variable.to_string());
            }
            Err(error) => {
                tracing::warn!(model, variable, %error, "skipping undecodable variable");
                decoded.failures.push(VariableFailure {
                    variable: variable.to_string(),
                    error,
                });
            }
        }
    }
    Ok(decoded)
}

/// Initialisation time of the latest run, from an Open-Meteo metadata
/// document (`last_run_initialisation_time`, unix seconds).
#[must_use]
pub fn run_initialisation_time(metadata: &Value) -> Option<DateTime<Utc>> {
    metadata
        .get("last_run_initialisation_time")
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

/// A model whose input document could not be read or decoded
#[derive(Debug)]
pub struct InputFailure {
    pub model: String,
    pub error: EnsembleError,
}

/// Read and decode one model's document from `path`.
///
/// The run time is the document's `last_run_initialisation_time`, or
/// `fallback_run` when the document has none.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not JSON, or its shared
/// layout is malformed.
pub fn read_model_run(
    model: &str,
    path: impl AsRef<Path>,
    variables: &[&str],
    fallback_run: DateTime<Utc>,
) -> Result<DecodedRun> {
    let document: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let run = run_initialisation_time(&document).unwrap_or(fallback_run);
    decode_model_run(model, run, &document, variables.iter().copied())
}

/// Read every `(model, path)` input.
///
/// A model whose document fails is logged, reported in the failures and left
/// out; the other models are unaffected.
pub fn read_model_runs(
    inputs: &[(String, PathBuf)],
    variables: &[&str],
    fallback_run: DateTime<Utc>,
) -> (Vec<ModelRun>, Vec<InputFailure>) {
    let mut runs = Vec::with_capacity(inputs.len());
    let mut failures = Vec::new();
    for (model, path) in inputs {
        match read_model_run(model, path, variables, fallback_run) {
            Ok(decoded) => runs.push(decoded.run),
            Err(error) => {
                tracing::warn!(model = model.as_str(), path = %path.display(), %error, "skipping model input");
                failures.push(InputFailure {
                    model: model.clone(),
                    error,
                });
            }
        }
    }
    (runs, failures)
}
