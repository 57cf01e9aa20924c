//! Forecast configuration loaded from TOML

use crate::ensemble::ForecastWindow;
use crate::errors::{EnsembleError, Result};
use crate::statistics::{StatisticsOptions, VariableKind};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Longest accepted forecast horizon, one year.
pub const MAX_FORECAST_HOURS: u32 = 366 * 24;

/// Longest accepted retention, ten years.
pub const MAX_RETENTION_DAYS: u32 = 3660;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForecastConfig {
    /// Hours after "now" kept in the ensemble.
    #[serde(default = "default_forecast_hours")]
    pub forecast_hours: u32,

    /// Days a stored run is kept before it is purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Location settings.
    #[serde(default)]
    pub location: LocationConfig,

    /// Statistics engine conventions.
    #[serde(default)]
    pub statistics: StatisticsOptions,

    /// Variable name to kind. Replaces the default set when present.
    #[serde(default = "default_variables")]
    pub variables: BTreeMap<String, VariableKind>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationConfig {
    /// IANA timezone name, e.g. "Europe/Berlin".
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

fn default_forecast_hours() -> u32 {
    72
}
fn default_retention_days() -> u32 {
    7
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_variables() -> BTreeMap<String, VariableKind> {
    [
        ("temperature_2m", VariableKind::Continuous),
        ("dew_point_2m", VariableKind::Continuous),
        ("pressure_msl", VariableKind::Continuous),
        ("temperature_850hPa", VariableKind::Continuous),
        ("precipitation", VariableKind::PrecipitationLike),
        ("cloud_cover", VariableKind::CloudCover),
        ("wind_direction_10m", VariableKind::WindDirection),
        ("weather_code", VariableKind::WeatherCode),
    ]
    .into_iter()
    .map(|(name, kind)| (name.to_string(), kind))
    .collect()
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            forecast_hours: default_forecast_hours(),
            retention_days: default_retention_days(),
            location: LocationConfig::default(),
            statistics: StatisticsOptions::default(),
            variables: default_variables(),
        }
    }
}

impl ForecastConfig {
    /// Parse and validate a configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML, has unknown keys,
    /// or fails [`ForecastConfig::validate`].
    pub fn from_toml_str(document: &str) -> Result<Self> {
        let config: Self = toml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its content is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&document)?;
        tracing::debug!(path = %path.display(), variables = config.variables.len(), "loaded configuration");
        Ok(config)
    }

    /// Check values serde cannot check.
    ///
    /// # Errors
    ///
    /// Returns [`EnsembleError::Config`] for an unknown timezone, a forecast
    /// horizon outside `1..=MAX_FORECAST_HOURS`, a retention above
    /// `MAX_RETENTION_DAYS` or an empty variable set.
    pub fn validate(&self) -> Result<()> {
        self.timezone()?;
        if !(1..=MAX_FORECAST_HOURS).contains(&self.forecast_hours) {
            return Err(EnsembleError::Config(format!(
                "forecast_hours must be between 1 and {MAX_FORECAST_HOURS}, got {}",
                self.forecast_hours
            )));
        }
        if self.retention_days > MAX_RETENTION_DAYS {
            return Err(EnsembleError::Config(format!(
                "retention_days must be at most {MAX_RETENTION_DAYS}, got {}",
                self.retention_days
            )));
        }
        if self.variables.is_empty() {
            return Err(EnsembleError::Config(
                "at least one variable must be configured".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured timezone.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not in the IANA database.
    pub fn timezone(&self) -> Result<Tz> {
        self.location.timezone.parse::<Tz>().map_err(|e| {
            EnsembleError::Config(format!(
                "unknown timezone '{}': {e}",
                self.location.timezone
            ))
        })
    }

    /// Forecast window in the configured timezone.
    ///
    /// # Errors
    ///
    /// Returns an error if the timezone is unknown.
    pub fn window(&self) -> Result<ForecastWindow> {
        Ok(ForecastWindow::new(self.timezone()?, self.forecast_hours))
    }

    /// Runs older than this are purged.
    ///
    /// # Errors
    ///
    /// Returns [`EnsembleError::Config`] if the cutoff leaves the
    /// representable date range.
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        now.checked_sub_signed(Duration::days(i64::from(self.retention_days)))
            .ok_or_else(|| {
                EnsembleError::Config(format!(
                    "retention of {} days is out of range for now = {now}",
                    self.retention_days
                ))
            })
    }

    /// Configured kind of `variable`, if any.
    #[must_use]
    pub fn kind_of(&self, variable: &str) -> Option<VariableKind> {
        self.variables.get(variable).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = ForecastConfig::from_toml_str("").unwrap();
        assert_eq!(config.forecast_hours, 72);
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.location.timezone, "UTC");
        assert_eq!(config.variables.len(), 8);
        assert_eq!(
            config.kind_of("precipitation"),
            Some(VariableKind::PrecipitationLike)
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ForecastConfig::from_toml_str("forecast_days = 3").unwrap_err();
        assert!(matches!(err, EnsembleError::Toml(_)));
    }

    #[test]
    fn test_out_of_range_durations_rejected() {
        for document in [
            "forecast_hours = 4000000000",
            "forecast_hours = 8785",
            "retention_days = 4000000000",
            "retention_days = 3661",
        ] {
            let err = ForecastConfig::from_toml_str(document).unwrap_err();
            assert!(matches!(err, EnsembleError::Config(_)), "{document}");
        }
        assert!(ForecastConfig::from_toml_str("forecast_hours = 8784\nretention_days = 3660").is_ok());
    }

    #[test]
    fn test_retention_cutoff_overflow_is_an_error() {
        let config = ForecastConfig {
            retention_days: u32::MAX,
            ..ForecastConfig::default()
        };
        let err = config.retention_cutoff(Utc::now()).unwrap_err();
        assert!(matches!(err, EnsembleError::Config(_)));
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let err = ForecastConfig::from_toml_str("[location]\ntimezone = \"Mars/Olympus\"")
            .unwrap_err();
        assert!(matches!(err, EnsembleError::Config(_)));
    }
}
