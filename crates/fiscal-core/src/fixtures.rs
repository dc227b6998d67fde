//! Sample invoices shared by the unit tests of this crate and, through the
//! `test-support` feature, by downstream crates.
//!
//! The sample invoice is the reference scenario: one notebook sold in Goiânia
//! for R$ 1500.00 at the default rates.

use chrono::{DateTime, TimeZone, Utc};

use crate::money::Money;
use crate::tax::{compute_invoice_totals, compute_item_taxes};
use crate::types::{
    Address, DefaultTaxRates, Invoice, InvoiceItem, InvoiceStatus, InvoiceTotals, ItemTaxRates,
    Party, PaymentIndicator, PaymentMethod, TaxBreakdown,
};

/// Nonce pinned by the golden document.
pub const SAMPLE_NONCE: u32 = 12345678;

/// Key of the sample invoice with [`SAMPLE_NONCE`].
pub const SAMPLE_ACCESS_KEY: &str = "52240311222333000181550010000000421123456789";

pub fn sample_issued_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0)
        .single()
        .expect("2024-03-15 10:30:00 is a valid UTC timestamp")
}

pub fn sample_emitter() -> Party {
    Party {
        tax_id: "11.222.333/0001-81".to_string(),
        name: "Comercial Goias Ltda".to_string(),
        trade_name: Some("Loja Centro".to_string()),
        state_registration: Some("101234567".to_string()),
        email: None,
        address: Address {
            street: "Avenida Goias".to_string(),
            number: "1000".to_string(),
            district: "Setor Central".to_string(),
            municipality_code: "5208707".to_string(),
            municipality: "Goiania".to_string(),
            state: "GO".to_string(),
            zip_code: "74005-010".to_string(),
            phone: Some("(62) 3212-0000".to_string()),
        },
    }
}

pub fn sample_recipient() -> Party {
    Party {
        tax_id: "123.456.789-09".to_string(),
        name: "Maria da Silva".to_string(),
        trade_name: None,
        state_registration: None,
        email: Some("maria@example.com".to_string()),
        address: Address {
            street: "Rua 10".to_string(),
            number: "250".to_string(),
            district: "Setor Oeste".to_string(),
            municipality_code: "5208707".to_string(),
            municipality: "Goiania".to_string(),
            state: "GO".to_string(),
            zip_code: "74120-020".to_string(),
            phone: None,
        },
    }
}

/// An item priced at `unit_price` cents, quantity 1.00, taxes at the
/// default rates.
pub fn item_with_price(unit_price: i64) -> InvoiceItem {
    let mut item = InvoiceItem {
        product_code: "P-001".to_string(),
        description: "Notebook 15 polegadas".to_string(),
        ncm: "84713012".to_string(),
        cfop: "5102".to_string(),
        unit: "UN".to_string(),
        quantity: 100,
        unit_price: Money::from_cents(unit_price),
        total: Money::from_cents(unit_price),
        discount: Money::zero(),
        icms: TaxBreakdown::default(),
        ipi: TaxBreakdown::default(),
        pis: TaxBreakdown::default(),
        cofins: TaxBreakdown::default(),
    };
    let taxes = compute_item_taxes(&item, &ItemTaxRates::default(), &DefaultTaxRates::default());
    item.apply_taxes(taxes);
    item
}

/// quantity 1.00 × R$ 1500.00
pub fn sample_item() -> InvoiceItem {
    item_with_price(150000)
}

/// A draft invoice for the given items, totals computed from them.
pub fn invoice_for(items: &[InvoiceItem]) -> Invoice {
    Invoice {
        id: "3f2a1c9e-5b7d-4e8f-9a01-000000000042".to_string(),
        tenant_id: "00000000-0000-0000-0000-000000000001".to_string(),
        number: 42,
        series: 1,
        model: Invoice::MODEL_NFE,
        emission_type: Invoice::EMISSION_NORMAL,
        issued_at: sample_issued_at(),
        emitter: sample_emitter(),
        recipient: Some(sample_recipient()),
        nature_of_operation: "Venda de mercadoria".to_string(),
        cfop: "5102".to_string(),
        payment_method: PaymentMethod::Pix,
        payment_indicator: PaymentIndicator::Upfront,
        totals: compute_invoice_totals(items, Money::zero())
            .expect("fixture totals fit in i64 cents"),
        status: InvoiceStatus::Draft,
        access_key: None,
        authorization_protocol: None,
        signed_document_url: None,
        additional_info: None,
    }
}

/// The reference invoice and its single item.
pub fn sample_invoice() -> (Invoice, Vec<InvoiceItem>) {
    let items = vec![sample_item()];
    (invoice_for(&items), items)
}

/// A draft with no items and all-zero totals.
pub fn empty_invoice() -> Invoice {
    let mut invoice = invoice_for(&[]);
    invoice.totals = InvoiceTotals::default();
    invoice
}
