//! # Domain Types
//!
//! Core fiscal types shared by the tax engine, the document builder and the
//! signing crate.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Invoice      │   │  InvoiceItem    │   │  TaxBreakdown   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  emitter        │ 1:N  description    │   │  base  (cents)  │       │
//! │  │  recipient      │──►│  quantity ×100  │──►│  rate  (bps)    │       │
//! │  │  totals         │   │  unit_price     │   │  value (cents)  │       │
//! │  │  status         │   │  icms/ipi/...   │   └─────────────────┘       │
//! │  │  access_key     │   └─────────────────┘                             │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    TaxRate      │   │   TaxRegime     │   │  Environment    │       │
//! │  │  bps (u32)      │   │  Normal         │   │  Production  1  │       │
//! │  │  1800 = 18.00%  │   │  SimplesNacional│   │  Homologation 2 │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every record has:
//! - `id`: UUID v4 - immutable, used for relations
//! - Business ID: (series + number, access key) - what the tax authority sees

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::access_key::AccessKey;
use crate::error::{ValidationError, ValidationResult};
use crate::money::{format_hundredths, Money};

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points of a percent.
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1800 bps = 18.00% (ICMS), 165 bps = 1.65% (PIS)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Percent with two decimals, as the document expects (`1800` → `"18.00"`).
    pub fn to_percent_string(&self) -> String {
        format_hundredths(i64::from(self.0))
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Tax Breakdown
// =============================================================================

/// One tax on one item: `{ base, rate, value }`.
///
/// Produced by [`crate::tax::compute_tax`]; never persisted on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxBreakdown {
    pub base: Money,
    pub rate: TaxRate,
    pub value: Money,
}

/// The four per-item taxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemTaxes {
    pub icms: TaxBreakdown,
    pub ipi: TaxBreakdown,
    pub pis: TaxBreakdown,
    pub cofins: TaxBreakdown,
}

/// Fallback rates used when an item carries no explicit rate.
///
/// ## Defaults
/// ```text
/// ICMS    1800 bps  (18.00%)
/// IPI        0 bps  ( 0.00%)
/// PIS      165 bps  ( 1.65%)
/// COFINS   760 bps  ( 7.60%)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultTaxRates {
    #[serde(default = "default_icms")]
    pub icms: TaxRate,
    #[serde(default)]
    pub ipi: TaxRate,
    #[serde(default = "default_pis")]
    pub pis: TaxRate,
    #[serde(default = "default_cofins")]
    pub cofins: TaxRate,
}

fn default_icms() -> TaxRate {
    TaxRate::from_bps(1800)
}

fn default_pis() -> TaxRate {
    TaxRate::from_bps(165)
}

fn default_cofins() -> TaxRate {
    TaxRate::from_bps(760)
}

impl Default for DefaultTaxRates {
    fn default() -> Self {
        DefaultTaxRates {
            icms: default_icms(),
            ipi: TaxRate::zero(),
            pis: default_pis(),
            cofins: default_cofins(),
        }
    }
}

/// Explicit per-item rates. `None` means "use the default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemTaxRates {
    pub icms: Option<TaxRate>,
    pub ipi: Option<TaxRate>,
    pub pis: Option<TaxRate>,
    pub cofins: Option<TaxRate>,
}

// =============================================================================
// Emission Settings
// =============================================================================

/// Target environment of the tax authority (`tpAmb`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Legally valid documents.
    Production,
    /// Test documents with no fiscal value.
    #[default]
    Homologation,
}

impl Environment {
    /// Numeric code used by `tpAmb` and the consultation URL.
    pub const fn code(&self) -> u8 {
        match self {
            Environment::Production => 1,
            Environment::Homologation => 2,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Homologation => write!(f, "homologation"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "producao" | "1" => Ok(Environment::Production),
            "homologation" | "homologacao" | "2" => Ok(Environment::Homologation),
            other => Err(format!(
                "Unknown environment: '{}'. Valid options: production, homologation",
                other
            )),
        }
    }
}

/// The tenant's tax regime. Selects the per-item tax groups and `CRT`.
///
/// ## Regime Variants
/// ```text
/// ┌──────────────────┬─────┬─────────────────┬──────────────┬──────────────┐
/// │ Regime           │ CRT │ ICMS group      │ PIS group    │ COFINS group │
/// ├──────────────────┼─────┼─────────────────┼──────────────┼──────────────┤
/// │ Normal (default) │  3  │ ICMS00  CST 00  │ PISAliq  01  │ COFINSAliq 01│
/// │ SimplesNacional  │  1  │ ICMSSN102       │ PISOutr  99  │ COFINSOutr 99│
/// └──────────────────┴─────┴─────────────────┴──────────────┴──────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TaxRegime {
    /// Regime normal: ICMS fully taxed.
    #[default]
    Normal,
    /// Simples Nacional without credit permission.
    SimplesNacional,
}

impl TaxRegime {
    /// `CRT` code of the emitter block.
    pub const fn crt(&self) -> &'static str {
        match self {
            TaxRegime::Normal => "3",
            TaxRegime::SimplesNacional => "1",
        }
    }

    /// ICMS situation code (`CST` for normal, `CSOSN` for Simples).
    pub const fn icms_situation(&self) -> &'static str {
        match self {
            TaxRegime::Normal => "00",
            TaxRegime::SimplesNacional => "102",
        }
    }

    /// PIS / COFINS `CST`.
    pub const fn pis_cofins_cst(&self) -> &'static str {
        match self {
            TaxRegime::Normal => "01",
            TaxRegime::SimplesNacional => "99",
        }
    }
}

impl std::str::FromStr for TaxRegime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(TaxRegime::Normal),
            "simples_nacional" | "simples" => Ok(TaxRegime::SimplesNacional),
            other => Err(format!(
                "Unknown tax regime: '{}'. Valid options: normal, simples_nacional",
                other
            )),
        }
    }
}

// =============================================================================
// Payment
// =============================================================================

/// Payment method (`tPag`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Cheque,
    CreditCard,
    DebitCard,
    StoreCredit,
    Pix,
    Other,
}

impl PaymentMethod {
    /// Two-digit `tPag` code.
    pub const fn code(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "01",
            PaymentMethod::Cheque => "02",
            PaymentMethod::CreditCard => "03",
            PaymentMethod::DebitCard => "04",
            PaymentMethod::StoreCredit => "05",
            PaymentMethod::Pix => "17",
            PaymentMethod::Other => "99",
        }
    }
}

/// Payment indicator (`indPag`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIndicator {
    /// Paid at once.
    #[default]
    Upfront,
    /// Paid in installments.
    Installments,
}

impl PaymentIndicator {
    /// One-digit `indPag` code.
    pub const fn code(&self) -> &'static str {
        match self {
            PaymentIndicator::Upfront => "0",
            PaymentIndicator::Installments => "1",
        }
    }
}

// =============================================================================
// Invoice Status
// =============================================================================

/// Lifecycle of an invoice.
///
/// ```text
/// Draft ──issue()──► Issued ──(authority)──► Authorized ──► Cancelled
///                       └──────(authority)──► Rejected
/// ```
/// Only `Draft → Issued` happens in this workspace; the rest belongs to the
/// status-transition collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    /// Signed and stored, awaiting authorization.
    Issued,
    Authorized,
    Cancelled,
    Rejected,
}

// =============================================================================
// Parties
// =============================================================================

/// Postal address of emitter or recipient.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Address {
    pub street: String,
    pub number: String,
    pub district: String,
    /// 7-digit IBGE municipality code.
    pub municipality_code: String,
    pub municipality: String,
    /// Two-letter UF, e.g. "GO".
    pub state: String,
    pub zip_code: String,
    pub phone: Option<String>,
}

/// Emitter or recipient identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Party {
    /// CPF (11 digits) or CNPJ (14 digits), punctuation allowed.
    pub tax_id: String,
    pub name: String,
    pub trade_name: Option<String>,
    /// State registration (`IE`). `None` serializes as "ISENTO" for emitters.
    pub state_registration: Option<String>,
    pub email: Option<String>,
    pub address: Address,
}

// =============================================================================
// Invoice
// =============================================================================

/// Monetary totals of an invoice header.
///
/// ## Invariant
/// `invoice == products - discount + freight`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceTotals {
    pub products: Money,
    pub discount: Money,
    pub freight: Money,
    pub icms_base: Money,
    pub icms: Money,
    pub ipi: Money,
    pub pis: Money,
    pub cofins: Money,
    pub invoice: Money,
}

impl InvoiceTotals {
    /// The grand total the header must carry.
    ///
    /// Fails with `OutOfRange` on `totals.invoice` when the result does not
    /// fit in i64 cents.
    pub fn expected_invoice_total(&self) -> ValidationResult<Money> {
        self.products
            .checked_sub(self.discount)
            .and_then(|net| net.checked_add(self.freight))
            .ok_or_else(|| ValidationError::amount_overflow("totals.invoice"))
    }
}

/// Invoice header.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Invoice {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Tenant this invoice belongs to.
    pub tenant_id: String,

    /// Sequential number (`nNF`), at most 9 digits.
    pub number: u64,

    /// Series (`serie`), at most 3 digits.
    pub series: u32,

    /// Document model (`mod`): 55 for NF-e, 65 for NFC-e.
    pub model: u8,

    /// Emission type (`tpEmis`): 1 for normal emission.
    pub emission_type: u8,

    #[ts(as = "String")]
    pub issued_at: DateTime<Utc>,

    pub emitter: Party,

    /// Consumer sales may omit the recipient.
    pub recipient: Option<Party>,

    /// Nature of operation (`natOp`), e.g. "Venda de mercadoria".
    pub nature_of_operation: String,

    /// Default fiscal operation code for the invoice.
    pub cfop: String,

    pub payment_method: PaymentMethod,
    pub payment_indicator: PaymentIndicator,

    pub totals: InvoiceTotals,

    pub status: InvoiceStatus,

    /// Set by the issuance pipeline.
    pub access_key: Option<AccessKey>,

    /// Set when the authority authorizes the document.
    pub authorization_protocol: Option<String>,

    /// Storage URL of the signed document.
    pub signed_document_url: Option<String>,

    /// Free text for `infCpl`.
    pub additional_info: Option<String>,
}

impl Invoice {
    /// Model 55 (NF-e).
    pub const MODEL_NFE: u8 = 55;

    /// Normal emission.
    pub const EMISSION_NORMAL: u8 = 1;

    /// Records a successful issuance. Only called once everything succeeded.
    pub fn record_issuance(&mut self, access_key: AccessKey, document_url: String) {
        self.access_key = Some(access_key);
        self.signed_document_url = Some(document_url);
        self.status = InvoiceStatus::Issued;
    }
}

// =============================================================================
// Invoice Item
// =============================================================================

/// A line of an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceItem {
    /// Product code (`cProd`).
    pub product_code: String,
    pub description: String,
    /// Mercosur classification code (8 digits).
    pub ncm: String,
    pub cfop: String,
    /// Commercial unit, e.g. "UN".
    pub unit: String,
    /// Quantity in hundredths (100 = 1.00 unit).
    pub quantity: i64,
    pub unit_price: Money,
    /// Line total before discount.
    pub total: Money,
    pub discount: Money,
    pub icms: TaxBreakdown,
    pub ipi: TaxBreakdown,
    pub pis: TaxBreakdown,
    pub cofins: TaxBreakdown,
}

impl InvoiceItem {
    /// Taxable base: line total minus line discount.
    #[inline]
    pub fn taxable_base(&self) -> Money {
        self.total.saturating_sub(self.discount)
    }

    /// Stores computed taxes on the item.
    pub fn apply_taxes(&mut self, taxes: ItemTaxes) {
        self.icms = taxes.icms;
        self.ipi = taxes.ipi;
        self.pis = taxes.pis;
        self.cofins = taxes.cofins;
    }

    /// The four taxes as one value.
    pub fn taxes(&self) -> ItemTaxes {
        ItemTaxes {
            icms: self.icms,
            ipi: self.ipi,
            pis: self.pis,
            cofins: self.cofins,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
