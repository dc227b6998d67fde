//! # Error Types
//!
//! Domain-specific error types for fiscal-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  fiscal-core errors (this file)                                        │
//! │  ├── CoreError           - Umbrella for everything below               │
//! │  ├── ValidationError     - Malformed invoice / item input              │
//! │  └── SerializationError  - Document invariant violated                 │
//! │                                                                         │
//! │  fiscal-sign errors (separate crate)                                   │
//! │  ├── CertificateError    - Container / key material failures           │
//! │  └── SignError           - What the issuance workflow sees             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SignError → Issuance caller       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (field, expected vs actual)
//! 3. Errors are enum variants, never String
//! 4. Validation runs before any computation; nothing half-built escapes

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Umbrella error for fiscal-core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input was rejected before any computation ran.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The document could not be built or read back.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when invoice or item input doesn't meet requirements.
/// Always surfaced to the caller, never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    ///
    /// ## When This Occurs
    /// - Series above 999 or number above 999 999 999 (access key widths)
    /// - Tax rate above 100 %
    /// - A line total or header sum that does not fit in i64 cents
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must not be negative (amounts, quantities).
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (non-digit tax id, bad UF, bad access key).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Check digits of a CPF / CNPJ / access key don't match.
    #[error("{field} has invalid check digits: {value}")]
    InvalidCheckDigit { field: String, value: String },

    /// Two values that must agree don't.
    ///
    /// ## When This Occurs
    /// - `total_invoice != total_products - total_discount + total_freight`
    /// - Item total doesn't match unit price × quantity
    /// - Item tax value doesn't match `round(base × rate / 10000)`
    #[error("{field} is inconsistent: expected {expected}, got {actual}")]
    Inconsistent {
        field: String,
        expected: i64,
        actual: i64,
    },
}

impl ValidationError {
    /// A monetary amount whose computation left the i64 cents range.
    pub fn amount_overflow(field: &str) -> Self {
        ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        }
    }
}

// =============================================================================
// Serialization Error
// =============================================================================

/// Internal invariant violations while building or reading a document.
///
/// These are fatal: the caller must abort issuance.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SerializationError {
    /// Totals are non-zero but there is nothing to itemise.
    #[error("Invoice has non-zero totals but no items")]
    EmptyItems,

    /// A mandatory element is missing from the tree.
    #[error("Missing element: {0}")]
    MissingElement(String),

    /// A mandatory attribute is missing from an element.
    #[error("Missing attribute {attribute} on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    /// The XML text could not be read.
    #[error("Malformed XML: {0}")]
    MalformedXml(String),

    /// An element's text is not what the layout requires.
    #[error("Invalid value in <{element}>: {value}")]
    InvalidValue { element: String, value: String },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Unit Tests
// =============================================================================
