//! Configuration validation errors and field checks.

use thiserror::Error;

/// Result of a validation pass.
pub type ValidationResult = Result<(), ValidationError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ValidationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

impl From<ValidationError> for qn_common::Error {
    fn from(err: ValidationError) -> Self {
        qn_common::Error::Config(err.to_string())
    }
}

/// Require a finite, strictly positive value.
pub fn require_positive(field: &'static str, value: f64) -> ValidationResult {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::invalid(
            field,
            format!("must be a positive finite number, got {value}"),
        ));
    }
    Ok(())
}

/// Require a finite value (any sign).
pub fn require_finite(field: &'static str, value: f64) -> ValidationResult {
    if !value.is_finite() {
        return Err(ValidationError::invalid(
            field,
            format!("must be finite, got {value}"),
        ));
    }
    Ok(())
}

/// Require a finite value within `[lo, hi]`.
pub fn require_range(field: &'static str, value: f64, lo: f64, hi: f64) -> ValidationResult {
    require_finite(field, value)?;
    if value < lo || value > hi {
        return Err(ValidationError::invalid(
            field,
            format!("must lie in [{lo}, {hi}], got {value}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_rejects_zero_and_nan() {
        assert!(require_positive("x", 1.0).is_ok());
        assert!(require_positive("x", 0.0).is_err());
        assert!(require_positive("x", f64::NAN).is_err());
        assert!(require_positive("x", f64::INFINITY).is_err());
    }

    #[test]
    fn range_reports_field() {
        let err = require_range("probability", 1.5, 0.0, 1.0).unwrap_err();
        assert!(err.to_string().contains("probability"));
    }

    #[test]
    fn converts_into_common_error() {
        let err: qn_common::Error = ValidationError::invalid("cell_deg", "too small").into();
        assert_eq!(err.code(), 10);
    }
}
