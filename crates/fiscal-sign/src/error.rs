//! # Signing Error Types
//!
//! Error types for certificate handling, signing, storage and issuance.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sign Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Certificate   │  │     Storage             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  WrongPassword  │  │  NotFound               │ │
//! │  │  InvalidUrl     │  │  Corrupt...     │  │  InvalidKey             │ │
//! │  │  ConfigLoad...  │  │  RealRequired   │  │  Io                     │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Validation    │  │  Serialization  │  │     Signing             │ │
//! │  │  (fiscal-core)  │  │  (fiscal-core)  │  │                         │ │
//! │  │                 │  │                 │  │  Signing                │ │
//! │  │  Required, ...  │  │  EmptyItems ... │  │  Internal               │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use fiscal_core::{CoreError, SerializationError, ValidationError};
use thiserror::Error;

/// Result type alias for signing and issuance operations.
pub type SignResult<T> = Result<T, SignError>;

/// Result type alias for object store operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Certificate Error
// =============================================================================

/// Failures while obtaining key material.
///
/// A certificate error is never answered with a fallback: once a real
/// container was fetched, any problem opening it is final.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// The container's MAC did not verify with the given password.
    #[error("Certificate password is incorrect")]
    WrongPassword,

    /// The bytes are not a PKCS#12 container, or it could not be decrypted.
    #[error("Certificate container is corrupt: {0}")]
    CorruptContainer(String),

    /// The container holds no private key.
    #[error("Certificate container has no private key")]
    MissingPrivateKey,

    /// The container holds no leaf certificate.
    #[error("Certificate container has no leaf certificate")]
    MissingCertificate,

    /// Ephemeral key pair or self-signed certificate could not be created.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// No real certificate is available and the policy forbids a fallback.
    ///
    /// ## When This Occurs
    /// - `certificate.policy = "require_real"` and the tenant has no certificate
    /// - `certificate.policy = "require_real"` and no object store is wired in
    #[error("A real certificate is required but none is available")]
    RealCertificateRequired,

    /// Reading certificate attributes failed.
    #[error("Certificate inspection failed: {0}")]
    Inspection(String),
}

// =============================================================================
// Storage Error
// =============================================================================

/// Object store failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Nothing is stored under the key.
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// The key cannot be mapped to a location (empty, absolute, `..`).
    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Underlying file system failure.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Sign Error
// =============================================================================

/// Error type covering every failure of the signing layer.
///
/// ## Design Principles
/// - Core errors keep their original variant (`Validation`, `Serialization`)
/// - Errors are categorized for different handling strategies
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum SignError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid fiscal configuration.
    #[error("Invalid fiscal configuration: {0}")]
    InvalidConfig(String),

    /// Invalid consultation endpoint.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Document Errors (from fiscal-core)
    // =========================================================================
    /// Invoice or item input rejected.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Document invariant violated.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    // =========================================================================
    // Key Material / Storage
    // =========================================================================
    /// Key material could not be obtained.
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    /// Object store read or write failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // =========================================================================
    // Signing
    // =========================================================================
    /// Digest or signature computation failed.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// A blocking task panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for SignError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => SignError::Validation(e),
            CoreError::Serialization(e) => SignError::Serialization(e),
        }
    }
}

impl From<openssl::error::ErrorStack> for SignError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        SignError::Signing(err.to_string())
    }
}

impl From<base64::DecodeError> for SignError {
    fn from(err: base64::DecodeError) -> Self {
        SignError::Signing(format!("invalid base64: {}", err))
    }
}

impl From<tokio::task::JoinError> for SignError {
    fn from(err: tokio::task::JoinError) -> Self {
        SignError::Internal(err.to_string())
    }
}

impl From<url::ParseError> for SignError {
    fn from(err: url::ParseError) -> Self {
        SignError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SignError {
    fn from(err: std::io::Error) -> Self {
        SignError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SignError {
    fn from(err: toml::de::Error) -> Self {
        SignError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SignError {
    fn from(err: toml::ser::Error) -> Self {
        SignError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Classification
// =============================================================================

impl SignError {
    /// Returns true if retrying the same issuance may succeed.
    ///
    /// ## Retryable Errors
    /// - Storage I/O failures
    ///
    /// ## Non-Retryable Errors
    /// - Validation and serialization errors (same input, same failure)
    /// - Certificate errors (wrong password stays wrong)
    /// - Configuration errors
    pub fn is_retryable(&self) -> bool {
        matches!(self, SignError::Storage(StorageError::Io(_)))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SignError::InvalidConfig(_)
                | SignError::InvalidUrl(_)
                | SignError::ConfigLoadFailed(_)
                | SignError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if key material could not be obtained.
    pub fn is_certificate_error(&self) -> bool {
        matches!(self, SignError::Certificate(_))
    }

    /// Returns true if the invoice itself was rejected.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, SignError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert!(SignError::Storage(StorageError::Io(io)).is_retryable());

        assert!(!SignError::Storage(StorageError::NotFound { key: "a".into() }).is_retryable());
        assert!(!SignError::Certificate(CertificateError::WrongPassword).is_retryable());
        assert!(!SignError::Serialization(SerializationError::EmptyItems).is_retryable());
    }

    #[test]
    fn test_core_errors_keep_their_variant() {
        let err: SignError = CoreError::Validation(ValidationError::Required {
            field: "emitter.name".into(),
        })
        .into();
        assert!(err.is_validation_error());

        let err: SignError = CoreError::Serialization(SerializationError::EmptyItems).into();
        assert!(matches!(
            err,
            SignError::Serialization(SerializationError::EmptyItems)
        ));
    }

    #[test]
    fn test_categories() {
        assert!(SignError::InvalidConfig("x".into()).is_config_error());
        assert!(SignError::Certificate(CertificateError::RealCertificateRequired)
            .is_certificate_error());
        assert!(!SignError::Signing("x".into()).is_certificate_error());
    }

    #[test]
    fn test_error_display() {
        let err = SignError::Storage(StorageError::NotFound {
            key: "tenant-1/cert.pfx".into(),
        });
        assert_eq!(
            err.to_string(),
            "Storage error: Object not found: tenant-1/cert.pfx"
        );

        let err = SignError::Certificate(CertificateError::WrongPassword);
        assert_eq!(
            err.to_string(),
            "Certificate error: Certificate password is incorrect"
        );
    }
}
