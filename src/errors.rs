//! Centralized error handling for meteo_ensemble
//!
//! One error type covers the statistics core, configuration, input decoding
//! and the collaborator seams. Contract violations (wrong shape, non-numeric
//! members) are errors; missing data is not.

/// Main error type for ensemble statistics operations
#[derive(Debug, thiserror::Error)]
pub enum EnsembleError {
    /// A member value that must be numeric was something else
    #[error("non-numeric value {found} for member '{member}' of '{variable}' at row {row}")]
    NonNumeric {
        variable: String,
        member: String,
        row: usize,
        found: String,
    },

    /// A numeric value outside the domain a statistic accepts
    #[error("invalid value {value} for {statistic}: {reason}")]
    InvalidValue {
        statistic: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// Timestamps must be strictly increasing
    #[error("index of '{variable}' is not strictly increasing at row {row}")]
    UnsortedIndex { variable: String, row: usize },

    /// Row or column counts do not line up
    #[error("shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    /// Tables with naive and timezone-aware indexes cannot be joined
    #[error("cannot join '{variable}': naive and timezone-aware indexes are mixed")]
    MixedIndex { variable: String },

    /// An input document does not have the expected layout
    #[error("malformed forecast document: {0}")]
    Document(String),

    /// A timestamp could not be parsed or is out of range
    #[error("invalid timestamp '{0}'")]
    Timestamp(String),

    /// Configuration is missing or inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    /// Thread pool configuration error
    #[error("thread pool error: {0}")]
    ThreadPool(String),

    /// An external collaborator (registry, sink) failed
    #[error("{collaborator} failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    /// Array shape or dimension error
    #[error("array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding or encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias for ensemble statistics operations
pub type Result<T> = std::result::Result<T, EnsembleError>;
