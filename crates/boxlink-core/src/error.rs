//! # Error Types
//!
//! Domain-specific error types for boxlink-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  boxlink-core errors (this file)                                       │
//! │  ├── CoreError        - Malformed domain values                        │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  boxlink-db errors (separate crate)                                    │
//! │  └── DbError          - SQLite failures                                │
//! │                                                                         │
//! │  boxlink-delivery errors                                               │
//! │  ├── TransportError   - A transport could not carry the message        │
//! │  ├── DeliveryError    - Outcome of one orchestrated action             │
//! │  └── QueueError       - Blackbox queue failures                        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DeliveryError → caller            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while interpreting domain values.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A box reference could not be reduced to a single numeric id.
    ///
    /// ## When This Occurs
    /// - Empty array `[]`
    /// - First array element is not an integer (`["abc"]`)
    #[error("Invalid box reference: {0}")]
    InvalidBoxRef(String),

    /// A queue snapshot read back from storage is not a list of queue items.
    #[error("Corrupt queue snapshot: {0}")]
    CorruptQueue(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., address with a scheme, id with spaces).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidBoxRef("empty array".to_string());
        assert_eq!(err.to_string(), "Invalid box reference: empty array");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "device_id".to_string(),
        };
        assert_eq!(err.to_string(), "device_id is required");

        let err = ValidationError::TooLong {
            field: "identity".to_string(),
            max: 64,
        };
        assert_eq!(err.to_string(), "identity must be at most 64 characters");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "network_address".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
