//! # Validation Module
//!
//! Input validation for invoices and items. Runs before any computation so
//! that nothing half-built is ever produced.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Sales / invoice CRUD (outside this workspace)                │
//! │  ├── Required fields, user feedback                                    │
//! │  └── Draft persistence                                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── CPF / CNPJ check digits                                           │
//! │  ├── Access key field widths (series ≤ 3 digits, number ≤ 9 digits)   │
//! │  ├── Non-negative amounts, consistent line totals                      │
//! │  └── Header totals == Σ items, total == products − discount + freight │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Document builder                                             │
//! │  └── Structural invariants (SerializationError)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use fiscal_core::validation::{validate_cnpj, validate_cpf, format_document};
//!
//! assert!(validate_cnpj("11.222.333/0001-81"));
//! assert!(validate_cpf("123.456.789-09"));
//! assert_eq!(format_document("11222333000181"), "11.222.333/0001-81");
//! ```

use crate::codes::state_code;
use crate::error::{ValidationError, ValidationResult};
use crate::money::Money;
use crate::tax::{compute_invoice_totals, compute_tax};
use crate::types::{Invoice, InvoiceItem, Party, TaxBreakdown, TaxRate};

/// Widest value each access-key field accepts.
pub const MAX_SERIES: u64 = 999;
pub const MAX_NUMBER: u64 = 999_999_999;

/// Layout limits for free text (`xNome`, `natOp`: 60; `xProd`: 120).
pub const MAX_NAME_LEN: usize = 60;
pub const MAX_DESCRIPTION_LEN: usize = 120;

// =============================================================================
// Tax Identifiers (CPF / CNPJ)
// =============================================================================

/// Strips everything that isn't an ASCII digit.
pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn all_same_digit(digits: &[u32]) -> bool {
    digits.windows(2).all(|w| w[0] == w[1])
}

fn to_digits(value: &str) -> Vec<u32> {
    digits_only(value)
        .chars()
        .filter_map(|c| c.to_digit(10))
        .collect()
}

/// Validates a CPF (individual tax id, 11 digits, two check digits).
pub fn validate_cpf(cpf: &str) -> bool {
    let digits = to_digits(cpf);
    if digits.len() != 11 || all_same_digit(&digits) {
        return false;
    }

    let check = |len: usize| -> u32 {
        let sum: u32 = digits[..len]
            .iter()
            .enumerate()
            .map(|(i, d)| d * (len as u32 + 1 - i as u32))
            .sum();
        let digit = 11 - (sum % 11);
        if digit >= 10 {
            0
        } else {
            digit
        }
    };

    check(9) == digits[9] && check(10) == digits[10]
}

/// Validates a CNPJ (company tax id, 14 digits, two check digits).
pub fn validate_cnpj(cnpj: &str) -> bool {
    let digits = to_digits(cnpj);
    if digits.len() != 14 || all_same_digit(&digits) {
        return false;
    }

    // Weights cycle 2..=9 from the rightmost digit of the prefix.
    let check = |len: usize| -> u32 {
        let sum: u32 = digits[..len]
            .iter()
            .rev()
            .enumerate()
            .map(|(i, d)| d * (2 + (i as u32 % 8)))
            .sum();
        let rest = sum % 11;
        if rest < 2 {
            0
        } else {
            11 - rest
        }
    };

    check(12) == digits[12] && check(13) == digits[13]
}

/// Validates a CPF or CNPJ depending on its digit count.
pub fn validate_document(document: &str) -> bool {
    match digits_only(document).len() {
        11 => validate_cpf(document),
        14 => validate_cnpj(document),
        _ => false,
    }
}

/// Formats a CPF (`000.000.000-00`) or CNPJ (`00.000.000/0000-00`).
///
/// Anything else is returned untouched.
pub fn format_document(document: &str) -> String {
    let d = digits_only(document);
    match d.len() {
        11 => format!("{}.{}.{}-{}", &d[0..3], &d[3..6], &d[6..9], &d[9..11]),
        14 => format!(
            "{}.{}.{}/{}-{}",
            &d[0..2],
            &d[2..5],
            &d[5..8],
            &d[8..12],
            &d[12..14]
        ),
        _ => document.to_string(),
    }
}

/// Resolves a tax id to its digits, rejecting anything that can't fit the
/// 14-digit access key field.
pub fn validate_tax_id(field: &str, value: &str) -> ValidationResult<String> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value
        .chars()
        .any(|c| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '/' | ' ')))
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only digits and . - / separators".to_string(),
        });
    }

    let digits = digits_only(value);
    if digits.is_empty() || digits.len() > 14 {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: format!("must resolve to at most 14 digits, got {}", digits.len()),
        });
    }

    Ok(digits)
}

// =============================================================================
// Scalar Validators
// =============================================================================

/// Rejects values wider than their fixed-width field.
pub fn validate_field_width(field: &str, value: u64, max: u64) -> ValidationResult<()> {
    if value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: max as i64,
        });
    }
    Ok(())
}

/// Rejects negative monetary amounts.
pub fn validate_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a tax rate in basis points (0% to 100%).
pub fn validate_tax_rate(field: &str, rate: TaxRate) -> ValidationResult<()> {
    if rate.bps() > 10000 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 10000,
        });
    }
    Ok(())
}

/// Validates a UUID string (record and tenant ids).
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    validate_required(field, id)?;

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// A blank CFOP is allowed; the builder fills it in.
fn validate_cfop(field: &str, cfop: &str) -> ValidationResult<()> {
    let cfop = cfop.trim();
    if !cfop.is_empty() && (cfop.len() != 4 || !cfop.bytes().all(|b| b.is_ascii_digit())) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be 4 digits".to_string(),
        });
    }
    Ok(())
}

fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    validate_required(field, value)?;
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

fn validate_breakdown(field: &str, breakdown: &TaxBreakdown) -> ValidationResult<()> {
    validate_tax_rate(field, breakdown.rate)?;
    validate_amount(field, breakdown.base)?;

    let expected = compute_tax(breakdown.base, breakdown.rate).value;
    if expected != breakdown.value {
        return Err(ValidationError::Inconsistent {
            field: format!("{}.value", field),
            expected: expected.cents(),
            actual: breakdown.value.cents(),
        });
    }
    Ok(())
}

fn ensure_equal(field: &str, expected: Money, actual: Money) -> ValidationResult<()> {
    if expected != actual {
        return Err(ValidationError::Inconsistent {
            field: field.to_string(),
            expected: expected.cents(),
            actual: actual.cents(),
        });
    }
    Ok(())
}

// =============================================================================
// Record Validators
// =============================================================================

/// Validates an emitter or recipient.
///
/// ## Rules
/// - Name required
/// - Tax id must be a valid CPF or CNPJ
/// - UF must be known
pub fn validate_party(field: &str, party: &Party) -> ValidationResult<()> {
    validate_text(&format!("{}.name", field), &party.name, MAX_NAME_LEN)?;

    let tax_field = format!("{}.tax_id", field);
    let digits = validate_tax_id(&tax_field, &party.tax_id)?;
    if !validate_document(&digits) {
        return Err(ValidationError::InvalidCheckDigit {
            field: tax_field,
            value: digits,
        });
    }

    state_code(&party.address.state)?;
    Ok(())
}

/// Validates one invoice line.
///
/// ## Rules
/// - Description, NCM and unit required
/// - CFOP, when given, is four digits (blank falls back to the header's)
/// - Quantity positive, amounts non-negative, discount ≤ total
/// - `total == unit_price × quantity / 100` (half away from zero)
/// - Every tax value equals `round(base × rate / 10000)`
pub fn validate_item(index: usize, item: &InvoiceItem) -> ValidationResult<()> {
    let field = |name: &str| format!("items[{}].{}", index, name);

    validate_text(&field("description"), &item.description, MAX_DESCRIPTION_LEN)?;
    validate_required(&field("ncm"), &item.ncm)?;
    validate_cfop(&field("cfop"), &item.cfop)?;
    validate_required(&field("unit"), &item.unit)?;

    if item.quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field("quantity"),
        });
    }

    validate_amount(&field("unit_price"), item.unit_price)?;
    validate_amount(&field("total"), item.total)?;
    validate_amount(&field("discount"), item.discount)?;

    let line_total = item
        .unit_price
        .times_quantity(item.quantity)
        .ok_or_else(|| ValidationError::amount_overflow(&field("total")))?;
    ensure_equal(&field("total"), line_total, item.total)?;

    if item.discount > item.total {
        return Err(ValidationError::OutOfRange {
            field: field("discount"),
            min: 0,
            max: item.total.cents(),
        });
    }

    validate_breakdown(&field("icms"), &item.icms)?;
    validate_breakdown(&field("ipi"), &item.ipi)?;
    validate_breakdown(&field("pis"), &item.pis)?;
    validate_breakdown(&field("cofins"), &item.cofins)?;

    Ok(())
}

/// Validates an invoice header against its items.
///
/// An empty item list skips the Σ checks; the document builder rejects it
/// when the totals are non-zero.
pub fn validate_invoice(invoice: &Invoice, items: &[InvoiceItem]) -> ValidationResult<()> {
    validate_uuid("id", &invoice.id)?;
    validate_uuid("tenant_id", &invoice.tenant_id)?;
    validate_party("emitter", &invoice.emitter)?;
    if let Some(recipient) = &invoice.recipient {
        validate_party("recipient", recipient)?;
    }

    validate_text(
        "nature_of_operation",
        &invoice.nature_of_operation,
        MAX_NAME_LEN,
    )?;
    validate_cfop("cfop", &invoice.cfop)?;
    validate_field_width("series", u64::from(invoice.series), MAX_SERIES)?;
    validate_field_width("number", invoice.number, MAX_NUMBER)?;
    validate_field_width("model", u64::from(invoice.model), 99)?;
    validate_field_width("emission_type", u64::from(invoice.emission_type), 9)?;

    let totals = &invoice.totals;
    for (name, amount) in [
        ("totals.products", totals.products),
        ("totals.discount", totals.discount),
        ("totals.freight", totals.freight),
        ("totals.icms_base", totals.icms_base),
        ("totals.icms", totals.icms),
        ("totals.ipi", totals.ipi),
        ("totals.pis", totals.pis),
        ("totals.cofins", totals.cofins),
        ("totals.invoice", totals.invoice),
    ] {
        validate_amount(name, amount)?;
    }

    ensure_equal(
        "totals.invoice",
        totals.expected_invoice_total()?,
        totals.invoice,
    )?;

    for (index, item) in items.iter().enumerate() {
        validate_item(index, item)?;
    }

    if !items.is_empty() {
        let expected = compute_invoice_totals(items, totals.freight)?;
        ensure_equal("totals.products", expected.products, totals.products)?;
        ensure_equal("totals.discount", expected.discount, totals.discount)?;
        ensure_equal("totals.icms_base", expected.icms_base, totals.icms_base)?;
        ensure_equal("totals.icms", expected.icms, totals.icms)?;
        ensure_equal("totals.ipi", expected.ipi, totals.ipi)?;
        ensure_equal("totals.pis", expected.pis, totals.pis)?;
        ensure_equal("totals.cofins", expected.cofins, totals.cofins)?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
