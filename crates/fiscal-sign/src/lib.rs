//! # fiscal-sign: Signing and Issuance for Fiscal Documents
//!
//! This crate takes the unsigned documents built by `fiscal-core`, signs them
//! with the tenant's certificate (or a throwaway pair in homologation) and
//! stores the result.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Issuance Architecture                             │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                   InvoiceIssuer (orchestrator)                   │  │
//! │  │                                                                  │  │
//! │  │  Called by the ERP's issuance workflow, one invoice at a time   │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Certificate    │  │    Signer      │  │     ObjectStore        │    │
//! │  │ Resolver       │  │                │  │                        │    │
//! │  │                │  │ C14N, SHA-1    │  │ Certificate containers │    │
//! │  │ Real PKCS#12   │  │ RSA-SHA1       │  │ in, signed documents   │    │
//! │  │ or ephemeral   │  │ enveloped sig  │  │ out                    │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  CPU-bound work (PKCS#12 decrypt, RSA keygen) runs on                  │
//! │  tokio::task::spawn_blocking. Nothing is cached or retried.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`certificate`] - Certificate records, key material, resolver
//! - [`config`] - Fiscal configuration (TOML + env)
//! - [`error`] - Signing error types
//! - [`issuance`] - The issuance pipeline
//! - [`signer`] - XML-DSig signing and verification
//! - [`storage`] - Object store boundary

pub mod certificate;
pub mod config;
pub mod error;
pub mod issuance;
pub mod signer;
pub mod storage;

// =============================================================================
// Re-exports
// =============================================================================

pub use certificate::{
    CertificateInfo, CertificateResolver, DigitalCertificate, KeyMaterial, SigningCredentials,
};
pub use config::{CertificatePolicy, FiscalConfig};
pub use error::{CertificateError, SignError, SignResult, StorageError, StorageResult};
pub use issuance::{InvoiceIssuer, IssuedDocument};
pub use signer::{sign, verify_signature, SignatureCheck, SignedDocument};
pub use storage::{InMemoryStore, LocalDirectoryStore, ObjectStore};
