//! # Document Sections
//!
//! Typed model of the `infNFe` body. Each section renders itself to an
//! [`Element`]; [`DocumentSections::into_info_element`] is the only place
//! that decides their order.
//!
//! ```text
//! infNFe
//! ├── ide        Identification
//! ├── emit       Emitter
//! ├── dest       Recipient        (optional)
//! ├── det × N    ItemSection      (original item order, nItem = 1..N)
//! ├── total      Totals
//! ├── transp     Transport
//! ├── pag        Payment
//! └── infAdic    AdditionalInfo
//! ```

use crate::document::xml::Element;
use crate::money::{format_hundredths, Money};
use crate::types::{
    Environment, InvoiceTotals, ItemTaxes, PaymentIndicator, PaymentMethod, TaxBreakdown,
    TaxRegime,
};

/// Layout version written to `infNFe/@versao`.
pub const LAYOUT_VERSION: &str = "4.00";

/// `cEAN` / `cEANTrib` for products without a barcode.
const NO_GTIN: &str = "SEM GTIN";

/// Brazil in the BACEN country table.
const COUNTRY_CODE: &str = "1058";
const COUNTRY_NAME: &str = "Brasil";

fn money(value: Money) -> String {
    value.to_decimal_string()
}

/// `CNPJ` for 14 digits, `CPF` otherwise.
fn tax_id_tag(digits: &str) -> &'static str {
    if digits.len() == 14 {
        "CNPJ"
    } else {
        "CPF"
    }
}

// =============================================================================
// Identification (ide)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub state_code: u8,
    /// `cNF`: the access key nonce.
    pub nonce: u32,
    pub nature_of_operation: String,
    pub model: u8,
    pub series: u32,
    pub number: u64,
    /// RFC 3339 with offset, seconds precision.
    pub issued_at: String,
    /// `true` when emitter and recipient are in different states.
    pub interstate: bool,
    pub municipality_code: String,
    pub emission_type: u8,
    pub check_digit: u8,
    pub environment: Environment,
    pub software_version: String,
}

impl Identification {
    pub fn to_element(&self) -> Element {
        Element::new("ide")
            .with_leaf("cUF", format!("{:02}", self.state_code))
            .with_leaf("cNF", format!("{:08}", self.nonce))
            .with_leaf("natOp", self.nature_of_operation.as_str())
            .with_leaf("mod", self.model.to_string())
            .with_leaf("serie", self.series.to_string())
            .with_leaf("nNF", self.number.to_string())
            .with_leaf("dhEmi", self.issued_at.as_str())
            .with_leaf("dhSaiEnt", self.issued_at.as_str())
            .with_leaf("tpNF", "1")
            .with_leaf("idDest", if self.interstate { "2" } else { "1" })
            .with_leaf("cMunFG", self.municipality_code.as_str())
            .with_leaf("tpImp", "1")
            .with_leaf("tpEmis", self.emission_type.to_string())
            .with_leaf("cDV", self.check_digit.to_string())
            .with_leaf("tpAmb", self.environment.code().to_string())
            .with_leaf("finNFe", "1")
            .with_leaf("indFinal", "1")
            .with_leaf("indPres", "1")
            .with_leaf("procEmi", "0")
            .with_leaf("verProc", self.software_version.as_str())
    }
}

// =============================================================================
// Parties (emit / dest)
// =============================================================================

/// Address block. All text is already normalised (digits-only CEP / phone).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressBlock {
    pub street: String,
    pub number: String,
    pub district: String,
    pub municipality_code: String,
    pub municipality: String,
    pub state: String,
    pub zip_code: String,
    /// Rendered as an empty `fone` when missing.
    pub phone: String,
}

impl AddressBlock {
    pub fn to_element(&self, tag: &str) -> Element {
        Element::new(tag)
            .with_leaf("xLgr", self.street.as_str())
            .with_leaf("nro", self.number.as_str())
            .with_leaf("xBairro", self.district.as_str())
            .with_leaf("cMun", self.municipality_code.as_str())
            .with_leaf("xMun", self.municipality.as_str())
            .with_leaf("UF", self.state.as_str())
            .with_leaf("CEP", self.zip_code.as_str())
            .with_leaf("cPais", COUNTRY_CODE)
            .with_leaf("xPais", COUNTRY_NAME)
            .with_leaf("fone", self.phone.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emitter {
    /// Digits only.
    pub tax_id: String,
    pub name: String,
    pub trade_name: Option<String>,
    pub address: AddressBlock,
    /// `IE`, "ISENTO" when the emitter has none.
    pub state_registration: String,
    pub regime: TaxRegime,
}

impl Emitter {
    pub fn to_element(&self) -> Element {
        let mut emit = Element::new("emit")
            .with_leaf(tax_id_tag(&self.tax_id), self.tax_id.as_str())
            .with_leaf("xNome", self.name.as_str());
        if let Some(trade_name) = &self.trade_name {
            emit = emit.with_leaf("xFant", trade_name.as_str());
        }
        emit.with_child(self.address.to_element("enderEmit"))
            .with_leaf("IE", self.state_registration.as_str())
            .with_leaf("CRT", self.regime.crt())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub tax_id: String,
    pub name: String,
    pub address: AddressBlock,
    /// Omitted when `None`.
    pub email: Option<String>,
}

impl Recipient {
    pub fn to_element(&self) -> Element {
        let dest = Element::new("dest")
            .with_leaf(tax_id_tag(&self.tax_id), self.tax_id.as_str())
            .with_leaf("xNome", self.name.as_str())
            .with_child(self.address.to_element("enderDest"))
            // 9 = non-contributor
            .with_leaf("indIEDest", "9");
        match &self.email {
            Some(email) => dest.with_leaf("email", email.as_str()),
            None => dest,
        }
    }
}

// =============================================================================
// Items (det)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductBlock {
    pub code: String,
    pub description: String,
    pub ncm: String,
    pub cfop: String,
    pub unit: String,
    /// Hundredths.
    pub quantity: i64,
    pub unit_price: Money,
    pub total: Money,
    pub discount: Money,
}

impl ProductBlock {
    pub fn to_element(&self) -> Element {
        let quantity = format_hundredths(self.quantity);
        let unit_price = money(self.unit_price);

        let prod = Element::new("prod")
            .with_leaf("cProd", self.code.as_str())
            .with_leaf("cEAN", NO_GTIN)
            .with_leaf("xProd", self.description.as_str())
            .with_leaf("NCM", self.ncm.as_str())
            .with_leaf("CFOP", self.cfop.as_str())
            .with_leaf("uCom", self.unit.as_str())
            .with_leaf("qCom", quantity.as_str())
            .with_leaf("vUnCom", unit_price.as_str())
            .with_leaf("vProd", money(self.total))
            .with_leaf("cEANTrib", NO_GTIN)
            .with_leaf("uTrib", self.unit.as_str())
            .with_leaf("qTrib", quantity)
            .with_leaf("vUnTrib", unit_price);

        let prod = if self.discount.is_zero() {
            prod
        } else {
            prod.with_leaf("vDesc", money(self.discount))
        };
        // 1 = value composes the invoice total
        prod.with_leaf("indTot", "1")
    }
}

/// Per-item tax groups, shaped by the regime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemTaxSection {
    pub regime: TaxRegime,
    pub taxes: ItemTaxes,
}

impl ItemTaxSection {
    pub fn to_element(&self) -> Element {
        let mut imposto = Element::new("imposto").with_child(self.icms());
        if !self.taxes.ipi.value.is_zero() {
            imposto.push(ipi(&self.taxes.ipi));
        }
        imposto
            .with_child(self.contribution("PIS", &self.taxes.pis))
            .with_child(self.contribution("COFINS", &self.taxes.cofins))
    }

    fn icms(&self) -> Element {
        let icms = &self.taxes.icms;
        let group = match self.regime {
            TaxRegime::Normal => Element::new("ICMS00")
                .with_leaf("orig", "0")
                .with_leaf("CST", self.regime.icms_situation())
                // 3 = operation value
                .with_leaf("modBC", "3")
                .with_leaf("vBC", money(icms.base))
                .with_leaf("pICMS", icms.rate.to_percent_string())
                .with_leaf("vICMS", money(icms.value)),
            TaxRegime::SimplesNacional => Element::new("ICMSSN102")
                .with_leaf("orig", "0")
                .with_leaf("CSOSN", self.regime.icms_situation()),
        };
        Element::new("ICMS").with_child(group)
    }

    /// PIS and COFINS share a shape: `PISAliq` / `PISOutr`, `pPIS`, `vPIS`…
    fn contribution(&self, tax: &str, breakdown: &TaxBreakdown) -> Element {
        let variant = match self.regime {
            TaxRegime::Normal => "Aliq",
            TaxRegime::SimplesNacional => "Outr",
        };
        let group = Element::new(format!("{}{}", tax, variant))
            .with_leaf("CST", self.regime.pis_cofins_cst())
            .with_leaf("vBC", money(breakdown.base))
            .with_leaf(&format!("p{}", tax), breakdown.rate.to_percent_string())
            .with_leaf(&format!("v{}", tax), money(breakdown.value));
        Element::new(tax).with_child(group)
    }
}

fn ipi(breakdown: &TaxBreakdown) -> Element {
    Element::new("IPI")
        // 999 = no specific framing
        .with_leaf("cEnq", "999")
        .with_child(
            Element::new("IPITrib")
                .with_leaf("CST", "50")
                .with_leaf("vBC", money(breakdown.base))
                .with_leaf("pIPI", breakdown.rate.to_percent_string())
                .with_leaf("vIPI", money(breakdown.value)),
        )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSection {
    /// `nItem`, 1-based.
    pub number: usize,
    pub product: ProductBlock,
    pub taxes: ItemTaxSection,
}

impl ItemSection {
    pub fn to_element(&self) -> Element {
        Element::new("det")
            .with_attr("nItem", self.number.to_string())
            .with_child(self.product.to_element())
            .with_child(self.taxes.to_element())
    }
}

// =============================================================================
// Totals / Transport / Payment / Additional info
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Totals(pub InvoiceTotals);

impl Totals {
    pub fn to_element(&self) -> Element {
        let t = &self.0;
        let zero = money(Money::zero());
        let icms_tot = Element::new("ICMSTot")
            .with_leaf("vBC", money(t.icms_base))
            .with_leaf("vICMS", money(t.icms))
            .with_leaf("vICMSDeson", zero.as_str())
            .with_leaf("vFCP", zero.as_str())
            .with_leaf("vBCST", zero.as_str())
            .with_leaf("vST", zero.as_str())
            .with_leaf("vFCPST", zero.as_str())
            .with_leaf("vFCPSTRet", zero.as_str())
            .with_leaf("vProd", money(t.products))
            .with_leaf("vFrete", money(t.freight))
            .with_leaf("vSeg", zero.as_str())
            .with_leaf("vDesc", money(t.discount))
            .with_leaf("vII", zero.as_str())
            .with_leaf("vIPI", money(t.ipi))
            .with_leaf("vIPIDevol", zero.as_str())
            .with_leaf("vPIS", money(t.pis))
            .with_leaf("vCOFINS", money(t.cofins))
            .with_leaf("vOutro", zero.as_str())
            .with_leaf("vNF", money(t.invoice));
        Element::new("total").with_child(icms_tot)
    }
}

/// Freight modality (`modFrete`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreightMode {
    /// 0: contracted by the emitter.
    Emitter,
    /// 9: no transport.
    NoFreight,
}

impl FreightMode {
    pub fn for_freight(freight: Money) -> Self {
        if freight.is_zero() {
            FreightMode::NoFreight
        } else {
            FreightMode::Emitter
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            FreightMode::Emitter => "0",
            FreightMode::NoFreight => "9",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    pub mode: FreightMode,
}

impl Transport {
    pub fn to_element(&self) -> Element {
        Element::new("transp").with_leaf("modFrete", self.mode.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub indicator: PaymentIndicator,
    pub method: PaymentMethod,
    pub amount: Money,
}

impl Payment {
    pub fn to_element(&self) -> Element {
        Element::new("pag").with_child(
            Element::new("detPag")
                .with_leaf("indPag", self.indicator.code())
                .with_leaf("tPag", self.method.code())
                .with_leaf("vPag", money(self.amount)),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionalInfo {
    pub text: String,
}

impl AdditionalInfo {
    pub fn to_element(&self) -> Element {
        Element::new("infAdic").with_leaf("infCpl", self.text.as_str())
    }
}

// =============================================================================
// Whole Body
// =============================================================================

/// Every section of `infNFe`, in layout order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSections {
    pub identification: Identification,
    pub emitter: Emitter,
    pub recipient: Option<Recipient>,
    pub items: Vec<ItemSection>,
    pub totals: Totals,
    pub transport: Transport,
    pub payment: Payment,
    pub additional_info: AdditionalInfo,
}

impl DocumentSections {
    /// Renders `infNFe` with the given `Id`.
    pub fn into_info_element(self, document_id: &str) -> Element {
        let mut info = Element::new("infNFe")
            .with_attr("versao", LAYOUT_VERSION)
            .with_attr("Id", document_id)
            .with_child(self.identification.to_element())
            .with_child(self.emitter.to_element());

        if let Some(recipient) = &self.recipient {
            info.push(recipient.to_element());
        }
        for item in &self.items {
            info.push(item.to_element());
        }

        info.with_child(self.totals.to_element())
            .with_child(self.transport.to_element())
            .with_child(self.payment.to_element())
            .with_child(self.additional_info.to_element())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaxRate;

    fn taxes() -> ItemTaxes {
        let breakdown = |bps: u32, value: i64| TaxBreakdown {
            base: Money::from_cents(150000),
            rate: TaxRate::from_bps(bps),
            value: Money::from_cents(value),
        };
        ItemTaxes {
            icms: breakdown(1800, 27000),
            ipi: breakdown(0, 0),
            pis: breakdown(165, 2475),
            cofins: breakdown(760, 11400),
        }
    }

    fn names(element: &Element) -> Vec<&str> {
        element.elements().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_normal_regime_tax_groups() {
        let section = ItemTaxSection {
            regime: TaxRegime::Normal,
            taxes: taxes(),
        };
        let imposto = section.to_element();

        assert_eq!(names(&imposto), vec!["ICMS", "PIS", "COFINS"]);
        let icms00 = imposto.path(&["ICMS", "ICMS00"]).unwrap();
        assert_eq!(icms00.child_text("pICMS").unwrap(), "18.00");
        assert_eq!(icms00.child_text("vICMS").unwrap(), "270.00");
        assert_eq!(
            imposto.path(&["PIS", "PISAliq", "pPIS"]).unwrap().text(),
            "1.65"
        );
        assert_eq!(
            imposto.path(&["COFINS", "COFINSAliq", "vCOFINS"]).unwrap().text(),
            "114.00"
        );
    }

    #[test]
    fn test_simples_regime_tax_groups() {
        let section = ItemTaxSection {
            regime: TaxRegime::SimplesNacional,
            taxes: taxes(),
        };
        let imposto = section.to_element();

        let sn = imposto.path(&["ICMS", "ICMSSN102"]).unwrap();
        assert_eq!(names(sn), vec!["orig", "CSOSN"]);
        assert_eq!(sn.child_text("CSOSN").unwrap(), "102");
        assert_eq!(
            imposto.path(&["PIS", "PISOutr", "CST"]).unwrap().text(),
            "99"
        );
        assert!(imposto.path(&["COFINS", "COFINSOutr"]).is_some());
    }

    #[test]
    fn test_ipi_only_when_non_zero() {
        let mut t = taxes();
        t.ipi = TaxBreakdown {
            base: Money::from_cents(150000),
            rate: TaxRate::from_bps(500),
            value: Money::from_cents(7500),
        };
        let imposto = ItemTaxSection {
            regime: TaxRegime::Normal,
            taxes: t,
        }
        .to_element();

        assert_eq!(names(&imposto), vec!["ICMS", "IPI", "PIS", "COFINS"]);
        assert_eq!(
            imposto.path(&["IPI", "IPITrib", "vIPI"]).unwrap().text(),
            "75.00"
        );
    }

    #[test]
    fn test_product_discount_is_optional() {
        let mut product = ProductBlock {
            code: "P-001".to_string(),
            description: "Notebook".to_string(),
            ncm: "84713012".to_string(),
            cfop: "5102".to_string(),
            unit: "UN".to_string(),
            quantity: 250,
            unit_price: Money::from_cents(1000),
            total: Money::from_cents(2500),
            discount: Money::zero(),
        };
        let prod = product.to_element();
        assert!(prod.child("vDesc").is_none());
        assert_eq!(prod.child_text("qCom").unwrap(), "2.50");
        assert_eq!(prod.child_text("qTrib").unwrap(), "2.50");

        product.discount = Money::from_cents(100);
        let prod = product.to_element();
        assert_eq!(prod.child_text("vDesc").unwrap(), "1.00");
        assert_eq!(names(&prod).last(), Some(&"indTot"));
    }

    #[test]
    fn test_tax_id_tag() {
        assert_eq!(tax_id_tag("11222333000181"), "CNPJ");
        assert_eq!(tax_id_tag("12345678909"), "CPF");
    }

    #[test]
    fn test_freight_mode() {
        assert_eq!(FreightMode::for_freight(Money::zero()).code(), "9");
        assert_eq!(FreightMode::for_freight(Money::from_cents(1)).code(), "0");
    }
}
