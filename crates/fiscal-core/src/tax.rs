//! # Tax Calculation Engine
//!
//! Pure functions computing per-item tax bases and values from integer
//! cents and basis-point rates.
//!
//! ## Formula
//! ```text
//! value = round(base × rate / 10000)     rounding: half away from zero
//!
//! base  = item.total − item.discount
//! rate  = explicit item rate, else the configured default
//! ```
//!
//! ## Usage
//! ```rust
//! use fiscal_core::money::Money;
//! use fiscal_core::tax::compute_tax;
//! use fiscal_core::types::TaxRate;
//!
//! let icms = compute_tax(Money::from_cents(10000), TaxRate::from_bps(1800));
//! assert_eq!(icms.value.cents(), 1800);
//! ```

use crate::error::{ValidationError, ValidationResult};
use crate::money::{div_round_half_away, Money};
use crate::types::{
    DefaultTaxRates, InvoiceItem, InvoiceTotals, ItemTaxRates, ItemTaxes, TaxBreakdown, TaxRate,
};

/// Computes one tax over a base.
///
/// The product `base × rate` is taken in i128 so no base can overflow
/// before the division. For rates up to 100 % the value never exceeds the
/// base; larger rates (rejected by validation) saturate at the i64 bounds.
pub fn compute_tax(base: Money, rate: TaxRate) -> TaxBreakdown {
    let exact = i128::from(base.cents()) * i128::from(rate.bps());
    let value = div_round_half_away(exact, 10000)
        .and_then(|v| i64::try_from(v).ok())
        .unwrap_or(if exact < 0 { i64::MIN } else { i64::MAX });

    TaxBreakdown {
        base,
        rate,
        value: Money::from_cents(value),
    }
}

/// Computes ICMS, IPI, PIS and COFINS for an item.
///
/// An explicit rate in `rates` always wins over `defaults`.
pub fn compute_item_taxes(
    item: &InvoiceItem,
    rates: &ItemTaxRates,
    defaults: &DefaultTaxRates,
) -> ItemTaxes {
    let base = item.taxable_base();

    ItemTaxes {
        icms: compute_tax(base, rates.icms.unwrap_or(defaults.icms)),
        ipi: compute_tax(base, rates.ipi.unwrap_or(defaults.ipi)),
        pis: compute_tax(base, rates.pis.unwrap_or(defaults.pis)),
        cofins: compute_tax(base, rates.cofins.unwrap_or(defaults.cofins)),
    }
}

/// Sums item amounts into header totals.
///
/// `invoice = products − discount + freight`; taxes are summed per tax.
/// A sum that leaves the i64 range is rejected as
/// [`ValidationError::OutOfRange`] on the header field it would land in.
pub fn compute_invoice_totals(
    items: &[InvoiceItem],
    freight: Money,
) -> ValidationResult<InvoiceTotals> {
    let mut totals = InvoiceTotals {
        freight,
        ..Default::default()
    };

    for item in items {
        accumulate(&mut totals.products, item.total, "totals.products")?;
        accumulate(&mut totals.discount, item.discount, "totals.discount")?;
        accumulate(&mut totals.icms_base, item.icms.base, "totals.icms_base")?;
        accumulate(&mut totals.icms, item.icms.value, "totals.icms")?;
        accumulate(&mut totals.ipi, item.ipi.value, "totals.ipi")?;
        accumulate(&mut totals.pis, item.pis.value, "totals.pis")?;
        accumulate(&mut totals.cofins, item.cofins.value, "totals.cofins")?;
    }

    totals.invoice = totals.expected_invoice_total()?;
    Ok(totals)
}

fn accumulate(sum: &mut Money, amount: Money, field: &str) -> ValidationResult<()> {
    *sum = sum
        .checked_add(amount)
        .ok_or_else(|| ValidationError::amount_overflow(field))?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
