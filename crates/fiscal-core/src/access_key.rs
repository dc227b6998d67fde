//! # Access Key Generator
//!
//! Builds the 44-digit access key (chave de acesso) that names one fiscal
//! document.
//!
//! ## Layout
//! ```text
//! ┌────┬──────┬────────────────┬─────┬─────┬───────────┬───┬──────────┬───┐
//! │ UF │ YYMM │ tax id (14)    │ mod │ ser │ number    │ t │ nonce    │ D │
//! │ 52 │ 2403 │ 11222333000181 │ 55  │ 001 │ 000000042 │ 1 │ 12345678 │ 9 │
//! └────┴──────┴────────────────┴─────┴─────┴───────────┴───┴──────────┴───┘
//!   2     4          14           2     3        9        1      8      1
//! ```
//!
//! ## Check Digit (modulo 11)
//! Walk the 43 digits right to left with weights 2,3,…,9,2,3,…; the digit is
//! `0` when `sum % 11 < 2`, else `11 − sum % 11`.

use chrono::Datelike;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::codes::state_code;
use crate::error::{ValidationError, ValidationResult};
use crate::types::Invoice;
use crate::validation::{validate_field_width, validate_tax_id, MAX_NUMBER, MAX_SERIES};

/// Number of digits in a complete key.
pub const ACCESS_KEY_LEN: usize = 44;

/// Exclusive upper bound of the random nonce (`cNF`, 8 digits).
pub const NONCE_LIMIT: u32 = 100_000_000;

/// Prefix of the `infNFe` `Id` attribute.
pub const DOCUMENT_ID_PREFIX: &str = "NFe";

// =============================================================================
// Access Key
// =============================================================================

/// A validated 44-digit access key.
///
/// Only constructed by the generator or by [`AccessKey::parse`], so the
/// check digit always matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AccessKey(String);

impl AccessKey {
    /// Parses and verifies a key (length, digits, check digit).
    ///
    /// ```rust
    /// use fiscal_core::access_key::AccessKey;
    ///
    /// let key = AccessKey::parse("52240311222333000181550010000000421123456789").unwrap();
    /// assert_eq!(key.number(), 42);
    /// assert!(AccessKey::parse("52240311222333000181550010000000421123456780").is_err());
    /// ```
    pub fn parse(value: &str) -> ValidationResult<AccessKey> {
        if value.len() != ACCESS_KEY_LEN || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidFormat {
                field: "access_key".to_string(),
                reason: format!("must be exactly {} digits", ACCESS_KEY_LEN),
            });
        }

        let expected = check_digit(&value[..ACCESS_KEY_LEN - 1]);
        if value.as_bytes()[ACCESS_KEY_LEN - 1] != b'0' + expected {
            return Err(ValidationError::InvalidCheckDigit {
                field: "access_key".to_string(),
                value: value.to_string(),
            });
        }

        Ok(AccessKey(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Id` attribute of `infNFe`: `"NFe" + key`.
    pub fn document_id(&self) -> String {
        format!("{}{}", DOCUMENT_ID_PREFIX, self.0)
    }

    // Every slice below is digits-only and in range: guaranteed by parse().
    fn field(&self, start: usize, len: usize) -> u64 {
        self.0[start..start + len]
            .bytes()
            .fold(0, |acc, b| acc * 10 + u64::from(b - b'0'))
    }

    pub fn state_code(&self) -> u8 {
        self.field(0, 2) as u8
    }

    /// Two-digit year and month as `(YY, MM)`.
    pub fn year_month(&self) -> (u8, u8) {
        (self.field(2, 2) as u8, self.field(4, 2) as u8)
    }

    /// The 14-digit tax id, zero-padded.
    pub fn tax_id(&self) -> &str {
        &self.0[6..20]
    }

    pub fn model(&self) -> u8 {
        self.field(20, 2) as u8
    }

    pub fn series(&self) -> u32 {
        self.field(22, 3) as u32
    }

    pub fn number(&self) -> u64 {
        self.field(25, 9)
    }

    pub fn emission_type(&self) -> u8 {
        self.field(34, 1) as u8
    }

    /// The random code (`cNF`).
    pub fn nonce(&self) -> u32 {
        self.field(35, 8) as u32
    }

    /// The trailing check digit (`cDV`).
    pub fn check_digit(&self) -> u8 {
        self.field(43, 1) as u8
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AccessKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Header
// =============================================================================

/// The invoice fields a key is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKeyHeader {
    /// IBGE state code (`cUF`).
    pub state_code: u8,
    /// Four-digit year; only the last two digits enter the key.
    pub year: i32,
    pub month: u32,
    /// CPF or CNPJ, punctuation allowed.
    pub tax_id: String,
    pub model: u8,
    pub series: u32,
    pub number: u64,
    pub emission_type: u8,
}

impl AccessKeyHeader {
    /// Derives the header from an invoice: state from the emitter's UF,
    /// year-month from `issued_at`.
    pub fn from_invoice(invoice: &Invoice) -> ValidationResult<Self> {
        Ok(AccessKeyHeader {
            state_code: state_code(&invoice.emitter.address.state)?,
            year: invoice.issued_at.year(),
            month: invoice.issued_at.month(),
            tax_id: invoice.emitter.tax_id.clone(),
            model: invoice.model,
            series: invoice.series,
            number: invoice.number,
            emission_type: invoice.emission_type,
        })
    }

    /// Rejects any field wider than its slot. Nothing is ever truncated.
    fn validate(&self) -> ValidationResult<String> {
        validate_field_width("state_code", u64::from(self.state_code), 99)?;
        if !(1..=12).contains(&self.month) {
            return Err(ValidationError::OutOfRange {
                field: "month".to_string(),
                min: 1,
                max: 12,
            });
        }
        if self.year < 0 {
            return Err(ValidationError::Negative {
                field: "year".to_string(),
            });
        }
        validate_field_width("model", u64::from(self.model), 99)?;
        validate_field_width("series", u64::from(self.series), MAX_SERIES)?;
        validate_field_width("number", self.number, MAX_NUMBER)?;
        validate_field_width("emission_type", u64::from(self.emission_type), 9)?;
        validate_tax_id("tax_id", &self.tax_id)
    }
}

// =============================================================================
// Generation
// =============================================================================

/// Modulo-11 check digit of a digit string.
///
/// Non-digit characters are not expected; callers pass validated digits.
pub fn check_digit(digits: &str) -> u8 {
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| u32::from(b.wrapping_sub(b'0')) * (2 + (i as u32 % 8)))
        .sum();

    let rest = sum % 11;
    if rest < 2 {
        0
    } else {
        (11 - rest) as u8
    }
}

/// Generates a key with a random 8-digit nonce.
pub fn generate_access_key(header: &AccessKeyHeader) -> ValidationResult<AccessKey> {
    let nonce = rand::thread_rng().gen_range(0..NONCE_LIMIT);
    generate_access_key_with_nonce(header, nonce)
}

/// Generates a key with a pinned nonce. Same header + same nonce gives a
/// byte-identical key.
///
/// ```rust
/// use fiscal_core::access_key::{generate_access_key_with_nonce, AccessKeyHeader};
///
/// let header = AccessKeyHeader {
///     state_code: 52,
///     year: 2024,
///     month: 3,
///     tax_id: "11.222.333/0001-81".to_string(),
///     model: 55,
///     series: 1,
///     number: 42,
///     emission_type: 1,
/// };
/// let key = generate_access_key_with_nonce(&header, 12345678).unwrap();
/// assert_eq!(key.as_str(), "52240311222333000181550010000000421123456789");
/// ```
pub fn generate_access_key_with_nonce(
    header: &AccessKeyHeader,
    nonce: u32,
) -> ValidationResult<AccessKey> {
    let tax_digits = header.validate()?;
    validate_field_width("nonce", u64::from(nonce), u64::from(NONCE_LIMIT - 1))?;

    let body = format!(
        "{:02}{:02}{:02}{:0>14}{:02}{:03}{:09}{:01}{:08}",
        header.state_code,
        header.year % 100,
        header.month,
        tax_digits,
        header.model,
        header.series,
        header.number,
        header.emission_type,
        nonce
    );

    let digit = check_digit(&body);
    Ok(AccessKey(format!("{}{}", body, digit)))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_invoice;

    const SAMPLE_KEY: &str = "52240311222333000181550010000000421123456789";

    fn header() -> AccessKeyHeader {
        AccessKeyHeader {
            state_code: 52,
            year: 2024,
            month: 3,
            tax_id: "11.222.333/0001-81".to_string(),
            model: 55,
            series: 1,
            number: 42,
            emission_type: 1,
        }
    }

    #[test]
    fn test_pinned_nonce_is_digit_for_digit() {
        let key = generate_access_key_with_nonce(&header(), 12345678).unwrap();
        assert_eq!(key.as_str(), SAMPLE_KEY);
        assert_eq!(key.check_digit(), 9);
    }

    #[test]
    fn test_same_nonce_is_idempotent() {
        let a = generate_access_key_with_nonce(&header(), 87654321).unwrap();
        let b = generate_access_key_with_nonce(&header(), 87654321).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_keys_always_verify() {
        for _ in 0..50 {
            let key = generate_access_key(&header()).unwrap();
            assert_eq!(key.as_str().len(), ACCESS_KEY_LEN);
            let digit = check_digit(&key.as_str()[..43]);
            assert_eq!(key.check_digit(), digit);
            assert!(AccessKey::parse(key.as_str()).is_ok());
        }
    }

    #[test]
    fn test_short_tax_id_is_zero_padded() {
        let mut h = header();
        h.tax_id = "123.456.789-09".to_string();
        let key = generate_access_key_with_nonce(&h, 1).unwrap();
        assert_eq!(key.tax_id(), "00012345678909");
    }

    #[test]
    fn test_field_overflow_rejected_not_truncated() {
        let mut h = header();
        h.series = 1000;
        assert!(matches!(
            generate_access_key_with_nonce(&h, 1),
            Err(ValidationError::OutOfRange { ref field, .. }) if field == "series"
        ));

        let mut h = header();
        h.number = 1_000_000_000;
        assert!(generate_access_key_with_nonce(&h, 1).is_err());

        let mut h = header();
        h.tax_id = "123456789012345".to_string();
        assert!(generate_access_key_with_nonce(&h, 1).is_err());

        assert!(generate_access_key_with_nonce(&header(), NONCE_LIMIT).is_err());
    }

    #[test]
    fn test_check_digit_low_remainder_is_zero() {
        // "1" → sum 2 → 2 % 11 = 2 → 9; "0" → sum 0 → 0
        assert_eq!(check_digit("0"), 0);
        assert_eq!(check_digit("1"), 9);
        // "5" → 10 % 11 = 10 → 1
        assert_eq!(check_digit("5"), 1);
        // weights wrap back to 2 after 9: nine trailing "0"s then "1" gets weight 3
        assert_eq!(check_digit("1000000000"), 8);
    }

    #[test]
    fn test_parse_exposes_fields() {
        let key = AccessKey::parse(SAMPLE_KEY).unwrap();
        assert_eq!(key.state_code(), 52);
        assert_eq!(key.year_month(), (24, 3));
        assert_eq!(key.tax_id(), "11222333000181");
        assert_eq!(key.model(), 55);
        assert_eq!(key.series(), 1);
        assert_eq!(key.number(), 42);
        assert_eq!(key.emission_type(), 1);
        assert_eq!(key.nonce(), 12345678);
        assert_eq!(key.document_id(), format!("NFe{}", SAMPLE_KEY));
    }

    #[test]
    fn test_parse_rejects_bad_keys() {
        assert!(matches!(
            AccessKey::parse("123"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            AccessKey::parse("5224031122233300018155001000000042112345678X"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            AccessKey::parse("52240311222333000181550010000000421123456788"),
            Err(ValidationError::InvalidCheckDigit { .. })
        ));
    }

    #[test]
    fn test_header_from_invoice() {
        let (invoice, _) = sample_invoice();
        let h = AccessKeyHeader::from_invoice(&invoice).unwrap();
        assert_eq!(h, header());
    }

    #[test]
    fn test_unknown_uf_rejected() {
        let (mut invoice, _) = sample_invoice();
        invoice.emitter.address.state = "ZZ".to_string();
        assert!(AccessKeyHeader::from_invoice(&invoice).is_err());
    }
}
