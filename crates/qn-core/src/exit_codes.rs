//! Process exit codes for the `qn` CLI.
//!
//! Stable across releases so scripts can branch on them.

use qn_common::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Ok = 0,

    /// Configuration could not be loaded or failed validation
    ConfigError = 10,

    /// Request parameters rejected (including grid budget)
    InvalidInput = 11,

    /// Catalog fetch failed
    UpstreamError = 12,

    /// Filesystem or serialization failure
    IoError = 13,

    /// Training could not produce a model
    TrainingError = 14,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Ok
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Map a failure onto its exit code.
    pub fn for_error(error: &Error) -> Self {
        match error {
            Error::Config(_) => ExitCode::ConfigError,
            Error::InvalidInput(_) | Error::GridTooLarge { .. } | Error::RateLimited { .. } => {
                ExitCode::InvalidInput
            }
            Error::Upstream(_) | Error::UpstreamStatus { .. } => ExitCode::UpstreamError,
            Error::Io(_) | Error::Json(_) => ExitCode::IoError,
            Error::InsufficientData(_) => ExitCode::TrainingError,
            Error::ModelUnavailable(_) | Error::IncompatibleModel { .. } => ExitCode::ConfigError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}
