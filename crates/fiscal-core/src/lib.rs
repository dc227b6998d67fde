//! # fiscal-core: Pure Fiscal Document Logic
//!
//! This crate turns a sale into an unsigned NF-e document. Everything here is
//! a pure function with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Fiscal Document Subsystem                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Invoice issuance workflow (ERP)                    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               fiscal-sign (certificates, signing, storage)      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ fiscal-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │    tax    │  │access_key │  │ document  │  │consultation│ │   │
//! │  │   │ basis pts │  │  mod 11   │  │ tree/xml  │  │    URL    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO GLOBALS • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Invoice, items, tax breakdowns, regimes
//! - [`money`] - Integer cents and the two-decimal text form
//! - [`tax`] - Tax calculation engine
//! - [`access_key`] - 44-digit access key and its check digit
//! - [`document`] - Document builder, XML tree and parser
//! - [`consultation`] - Public verification URL
//! - [`validation`] - Input rules, CPF / CNPJ
//! - [`codes`] - State codes, default CFOPs
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use fiscal_core::money::Money;
//! use fiscal_core::tax::compute_tax;
//! use fiscal_core::types::TaxRate;
//!
//! // R$ 1500.00 at 18% ICMS
//! let icms = compute_tax(Money::from_cents(150000), TaxRate::from_bps(1800));
//! assert_eq!(icms.value.cents(), 27000);
//! assert_eq!(icms.value.to_decimal_string(), "270.00");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod access_key;
pub mod codes;
pub mod consultation;
pub mod document;
pub mod error;
pub mod money;
pub mod tax;
pub mod types;
pub mod validation;

#[cfg(any(test, feature = "test-support"))]
pub mod fixtures;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use access_key::{AccessKey, AccessKeyHeader};
pub use consultation::build_consultation_url;
pub use document::{build_document, parse_document, BuildOptions, StructuredDocument};
pub use error::{CoreError, CoreResult, SerializationError, ValidationError};
pub use money::Money;
pub use tax::{compute_invoice_totals, compute_item_taxes, compute_tax};
pub use types::*;
