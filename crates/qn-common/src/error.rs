//! Error types for the nowcast system.

use thiserror::Error;

/// Result type alias for nowcast operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the nowcast system.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    // Request errors (20-29)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "grid too large: {estimated_cells} cells exceeds budget of {budget}; \
         try cellDeg >= {suggested_cell_deg}"
    )]
    GridTooLarge {
        estimated_cells: usize,
        budget: usize,
        suggested_cell_deg: f64,
    },

    #[error("rate limit exceeded for client {client}")]
    RateLimited { client: String },

    // Upstream catalog errors (30-39)
    #[error("upstream catalog error: {0}")]
    Upstream(String),

    #[error("upstream catalog returned status {status}")]
    UpstreamStatus { status: u16 },

    // Model errors (40-49)
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("incompatible model artifact version: {version}")]
    IncompatibleModel { version: String },

    // Training errors (50-59)
    #[error("insufficient training data: {0}")]
    InsufficientData(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidInput(_) => 20,
            Error::GridTooLarge { .. } => 21,
            Error::RateLimited { .. } => 22,
            Error::Upstream(_) => 30,
            Error::UpstreamStatus { .. } => 31,
            Error::ModelUnavailable(_) => 40,
            Error::IncompatibleModel { .. } => 41,
            Error::InsufficientData(_) => 50,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// HTTP-equivalent status for callers that expose the core over a transport.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidInput(_) | Error::GridTooLarge { .. } => 400,
            Error::RateLimited { .. } => 429,
            _ => 500,
        }
    }

    /// Suggested cell size carried by a grid-budget rejection.
    pub fn suggested_cell_deg(&self) -> Option<f64> {
        match self {
            Error::GridTooLarge {
                suggested_cell_deg, ..
            } => Some(*suggested_cell_deg),
            _ => None,
        }
    }

    /// Shorthand for an input validation failure.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}
