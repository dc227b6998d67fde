//! # Document Builder
//!
//! Turns an invoice and its items into the `NFe` element tree.
//!
//! ## Pipeline
//! ```text
//! Invoice + items + BuildOptions
//!        │
//!        ├── validate_invoice()          ValidationError
//!        ├── items empty, totals ≠ 0     SerializationError::EmptyItems
//!        ├── AccessKeyHeader → key       (random or pinned nonce)
//!        ├── DocumentSections            typed, order fixed
//!        ▼
//! <NFe xmlns="http://www.portalfiscal.inf.br/nfe">
//!   <infNFe versao="4.00" Id="NFe<key>"> … </infNFe>
//! </NFe>
//! ```

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::access_key::{
    generate_access_key, generate_access_key_with_nonce, AccessKey, AccessKeyHeader,
};
use crate::document::sections::{
    AdditionalInfo, AddressBlock, DocumentSections, Emitter, FreightMode, Identification,
    ItemSection, ItemTaxSection, Payment, ProductBlock, Recipient, Totals, Transport,
};
use crate::codes::{default_cfop, OperationDirection};
use crate::document::xml::{Element, NFE_NAMESPACE, XML_DECLARATION};
use crate::error::{CoreResult, SerializationError};
use crate::types::{Address, Environment, Invoice, InvoiceItem, Party, TaxRegime};
use crate::validation::{digits_only, validate_invoice};

/// Emission settings the builder needs. Passed explicitly; nothing is read
/// from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    pub environment: Environment,
    pub regime: TaxRegime,
    /// `verProc`.
    pub software_version: String,
    /// `infCpl` when the invoice has no additional info of its own.
    pub default_additional_info: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            environment: Environment::default(),
            regime: TaxRegime::default(),
            software_version: concat!("fiscal ", env!("CARGO_PKG_VERSION")).to_string(),
            default_additional_info: "Documento emitido eletronicamente".to_string(),
        }
    }
}

/// A built, unsigned document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredDocument {
    root: Element,
    access_key: AccessKey,
}

impl StructuredDocument {
    /// Wraps an existing tree. `root` must be an `NFe` element whose
    /// `infNFe` carries the key's `Id`.
    pub fn from_parts(root: Element, access_key: AccessKey) -> CoreResult<Self> {
        let info = root
            .find("infNFe")
            .ok_or_else(|| SerializationError::MissingElement("infNFe".to_string()))?;
        let id = info
            .attribute("Id")
            .ok_or_else(|| SerializationError::MissingAttribute {
                element: "infNFe".to_string(),
                attribute: "Id".to_string(),
            })?;
        if id != access_key.document_id() {
            return Err(SerializationError::InvalidValue {
                element: "infNFe".to_string(),
                value: id.to_string(),
            }
            .into());
        }
        Ok(StructuredDocument { root, access_key })
    }

    pub fn access_key(&self) -> &AccessKey {
        &self.access_key
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn into_parts(self) -> (Element, AccessKey) {
        (self.root, self.access_key)
    }

    /// Declaration + compact body: the bytes that get stored and signed.
    pub fn to_xml(&self) -> String {
        format!("{}{}", XML_DECLARATION, self.root.to_xml())
    }

    pub fn to_pretty_xml(&self) -> String {
        format!("{}\n{}", XML_DECLARATION, self.root.to_pretty_xml())
    }
}

/// Builds a document with a random access key nonce.
pub fn build_document(
    invoice: &Invoice,
    items: &[InvoiceItem],
    options: &BuildOptions,
) -> CoreResult<StructuredDocument> {
    prepare(invoice, items)?;
    let key = generate_access_key(&AccessKeyHeader::from_invoice(invoice)?)?;
    Ok(assemble(invoice, items, options, key))
}

/// Builds a document with a pinned nonce (reproducible output).
pub fn build_document_with_nonce(
    invoice: &Invoice,
    items: &[InvoiceItem],
    options: &BuildOptions,
    nonce: u32,
) -> CoreResult<StructuredDocument> {
    prepare(invoice, items)?;
    let key = generate_access_key_with_nonce(&AccessKeyHeader::from_invoice(invoice)?, nonce)?;
    Ok(assemble(invoice, items, options, key))
}

fn prepare(invoice: &Invoice, items: &[InvoiceItem]) -> CoreResult<()> {
    validate_invoice(invoice, items)?;

    let totals = &invoice.totals;
    let has_value = [
        totals.products,
        totals.discount,
        totals.freight,
        totals.invoice,
    ]
    .iter()
    .any(|amount| !amount.is_zero());

    if items.is_empty() && has_value {
        return Err(SerializationError::EmptyItems.into());
    }
    Ok(())
}

fn address_block(address: &Address) -> AddressBlock {
    AddressBlock {
        street: address.street.clone(),
        number: address.number.clone(),
        district: address.district.clone(),
        municipality_code: address.municipality_code.clone(),
        municipality: address.municipality.clone(),
        state: address.state.trim().to_ascii_uppercase(),
        zip_code: digits_only(&address.zip_code),
        phone: address
            .phone
            .as_deref()
            .map(digits_only)
            .unwrap_or_default(),
    }
}

fn recipient(party: &Party) -> Recipient {
    Recipient {
        tax_id: digits_only(&party.tax_id),
        name: party.name.clone(),
        address: address_block(&party.address),
        email: party.email.clone().filter(|e| !e.trim().is_empty()),
    }
}

/// The item's own CFOP, else the header's, else the outbound sale default.
fn item_cfop(item: &InvoiceItem, invoice: &Invoice, interstate: bool) -> String {
    [item.cfop.trim(), invoice.cfop.trim()]
        .into_iter()
        .find(|cfop| !cfop.is_empty())
        .unwrap_or_else(|| default_cfop(OperationDirection::Outbound, !interstate))
        .to_string()
}

fn sections(
    invoice: &Invoice,
    items: &[InvoiceItem],
    options: &BuildOptions,
    key: &AccessKey,
) -> DocumentSections {
    let emitter_state = invoice.emitter.address.state.trim().to_ascii_uppercase();
    let interstate = invoice
        .recipient
        .as_ref()
        .map(|r| r.address.state.trim().to_ascii_uppercase() != emitter_state)
        .unwrap_or(false);

    let identification = Identification {
        state_code: key.state_code(),
        nonce: key.nonce(),
        nature_of_operation: invoice.nature_of_operation.clone(),
        model: invoice.model,
        series: invoice.series,
        number: invoice.number,
        issued_at: invoice
            .issued_at
            .to_rfc3339_opts(SecondsFormat::Secs, false),
        interstate,
        municipality_code: invoice.emitter.address.municipality_code.clone(),
        emission_type: invoice.emission_type,
        check_digit: key.check_digit(),
        environment: options.environment,
        software_version: options.software_version.clone(),
    };

    let emitter = Emitter {
        tax_id: digits_only(&invoice.emitter.tax_id),
        name: invoice.emitter.name.clone(),
        trade_name: invoice.emitter.trade_name.clone(),
        address: address_block(&invoice.emitter.address),
        state_registration: invoice
            .emitter
            .state_registration
            .clone()
            .filter(|ie| !ie.trim().is_empty())
            .unwrap_or_else(|| "ISENTO".to_string()),
        regime: options.regime,
    };

    let items = items
        .iter()
        .enumerate()
        .map(|(index, item)| ItemSection {
            number: index + 1,
            product: ProductBlock {
                code: item.product_code.clone(),
                description: item.description.clone(),
                ncm: item.ncm.clone(),
                cfop: item_cfop(item, invoice, interstate),
                unit: item.unit.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                total: item.total,
                discount: item.discount,
            },
            taxes: ItemTaxSection {
                regime: options.regime,
                taxes: item.taxes(),
            },
        })
        .collect();

    DocumentSections {
        identification,
        emitter,
        recipient: invoice.recipient.as_ref().map(recipient),
        items,
        totals: Totals(invoice.totals),
        transport: Transport {
            mode: FreightMode::for_freight(invoice.totals.freight),
        },
        payment: Payment {
            indicator: invoice.payment_indicator,
            method: invoice.payment_method,
            amount: invoice.totals.invoice,
        },
        additional_info: AdditionalInfo {
            text: invoice
                .additional_info
                .clone()
                .filter(|text| !text.trim().is_empty())
                .unwrap_or_else(|| options.default_additional_info.clone()),
        },
    }
}

fn assemble(
    invoice: &Invoice,
    items: &[InvoiceItem],
    options: &BuildOptions,
    key: AccessKey,
) -> StructuredDocument {
    let info = sections(invoice, items, options, &key).into_info_element(&key.document_id());
    let root = Element::new("NFe")
        .with_attr("xmlns", NFE_NAMESPACE)
        .with_child(info);

    StructuredDocument {
        root,
        access_key: key,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, ValidationError};
    use crate::fixtures::{empty_invoice, item_with_price, sample_invoice, SAMPLE_NONCE};
    use crate::money::Money;
    use crate::types::InvoiceTotals;

    const GOLDEN: &str = include_str!("testdata/single_item.xml");

    fn golden_options() -> BuildOptions {
        BuildOptions {
            environment: Environment::Homologation,
            regime: TaxRegime::Normal,
            software_version: "fiscal 1.0.0".to_string(),
            default_additional_info: "Documento emitido eletronicamente".to_string(),
        }
    }

    #[test]
    fn test_single_item_matches_golden_file() {
        let (invoice, items) = sample_invoice();
        let document =
            build_document_with_nonce(&invoice, &items, &golden_options(), SAMPLE_NONCE).unwrap();

        assert_eq!(document.to_pretty_xml(), GOLDEN);
    }

    #[test]
    fn test_compact_and_pretty_describe_the_same_tree() {
        let (invoice, items) = sample_invoice();
        let document =
            build_document_with_nonce(&invoice, &items, &golden_options(), SAMPLE_NONCE).unwrap();

        let compact = crate::document::xml::parse_element(&document.to_xml()).unwrap();
        let pretty = crate::document::xml::parse_element(GOLDEN).unwrap();
        assert_eq!(compact, pretty);
        assert!(document.to_xml().starts_with(XML_DECLARATION));
    }

    #[test]
    fn test_section_order_is_fixed() {
        let (mut invoice, mut items) = sample_invoice();
        let mut second = items[0].clone();
        second.product_code = "P-002".to_string();
        items.push(second);
        invoice.totals = crate::tax::compute_invoice_totals(&items, Money::zero()).unwrap();

        let document = build_document(&invoice, &items, &BuildOptions::default()).unwrap();
        let info = document.root().child("infNFe").unwrap();
        let order: Vec<&str> = info.elements().map(|e| e.name.as_str()).collect();

        assert_eq!(
            order,
            vec!["ide", "emit", "dest", "det", "det", "total", "transp", "pag", "infAdic"]
        );
        let item_numbers: Vec<&str> = info
            .children_named("det")
            .filter_map(|d| d.attribute("nItem"))
            .collect();
        assert_eq!(item_numbers, vec!["1", "2"]);
        assert_eq!(
            info.path(&["det", "prod", "cProd"]).unwrap().text(),
            "P-001"
        );
    }

    #[test]
    fn test_root_carries_namespace_and_id() {
        let (invoice, items) = sample_invoice();
        let document = build_document(&invoice, &items, &BuildOptions::default()).unwrap();

        assert_eq!(document.root().attribute("xmlns"), Some(NFE_NAMESPACE));
        let info = document.root().child("infNFe").unwrap();
        assert_eq!(
            info.attribute("Id").unwrap(),
            format!("NFe{}", document.access_key())
        );
        assert_eq!(
            info.path(&["ide", "cNF"]).unwrap().text(),
            format!("{:08}", document.access_key().nonce())
        );
    }

    #[test]
    fn test_end_to_end_totals_block() {
        let (invoice, items) = sample_invoice();
        let document = build_document(&invoice, &items, &BuildOptions::default()).unwrap();
        let totals = document.root().find("ICMSTot").unwrap();

        assert_eq!(totals.child_text("vProd").unwrap(), "1500.00");
        assert_eq!(totals.child_text("vICMS").unwrap(), "270.00");
        assert_eq!(totals.child_text("vPIS").unwrap(), "24.75");
        assert_eq!(totals.child_text("vCOFINS").unwrap(), "114.00");
        assert_eq!(totals.child_text("vIPI").unwrap(), "0.00");
        assert_eq!(totals.child_text("vNF").unwrap(), "1500.00");
    }

    #[test]
    fn test_empty_items_with_totals_is_serialization_error() {
        let (invoice, _) = sample_invoice();
        let result = build_document(&invoice, &[], &BuildOptions::default());
        assert!(matches!(
            result,
            Err(CoreError::Serialization(SerializationError::EmptyItems))
        ));
    }

    #[test]
    fn test_empty_invoice_builds() {
        let invoice = empty_invoice();
        let document = build_document(&invoice, &[], &BuildOptions::default()).unwrap();
        let info = document.root().child("infNFe").unwrap();

        assert!(info.child("det").is_none());
        assert_eq!(info.path(&["total", "ICMSTot", "vNF"]).unwrap().text(), "0.00");
    }

    #[test]
    fn test_validation_runs_first() {
        let (mut invoice, items) = sample_invoice();
        invoice.number = 1_000_000_000;
        assert!(matches!(
            build_document(&invoice, &items, &BuildOptions::default()),
            Err(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn test_overflowing_header_total_is_validation_error() {
        let (mut invoice, items) = sample_invoice();
        invoice.totals = InvoiceTotals {
            products: Money::from_cents(i64::MAX),
            freight: Money::from_cents(1),
            invoice: Money::from_cents(i64::MAX),
            ..Default::default()
        };
        assert!(matches!(
            build_document(&invoice, &items, &BuildOptions::default()),
            Err(CoreError::Validation(ref e)) if *e == ValidationError::amount_overflow("totals.invoice")
        ));
    }

    #[test]
    fn test_overflowing_item_sum_is_validation_error() {
        let big = item_with_price(5_000_000_000_000_000_000);
        let items = vec![big.clone(), big];
        let (mut invoice, _) = sample_invoice();
        invoice.totals = InvoiceTotals {
            products: Money::from_cents(1),
            invoice: Money::from_cents(1),
            ..Default::default()
        };
        assert!(matches!(
            build_document(&invoice, &items, &BuildOptions::default()),
            Err(CoreError::Validation(ValidationError::OutOfRange { ref field, .. }))
                if field == "totals.products"
        ));
    }

    #[test]
    fn test_missing_cfop_is_filled_in() {
        let (mut invoice, mut items) = sample_invoice();
        items[0].cfop = String::new();
        invoice.cfop = "5405".to_string();

        let document = build_document(&invoice, &items, &BuildOptions::default()).unwrap();
        assert_eq!(document.root().find("CFOP").unwrap().text(), "5405");

        invoice.cfop = String::new();
        let document = build_document(&invoice, &items, &BuildOptions::default()).unwrap();
        assert_eq!(document.root().find("CFOP").unwrap().text(), "5102");

        if let Some(recipient) = invoice.recipient.as_mut() {
            recipient.address.state = "SP".to_string();
        }
        let document = build_document(&invoice, &items, &BuildOptions::default()).unwrap();
        assert_eq!(document.root().find("CFOP").unwrap().text(), "6102");
    }

    #[test]
    fn test_item_cfop_wins_over_header() {
        let (mut invoice, items) = sample_invoice();
        invoice.cfop = "5405".to_string();
        let document = build_document(&invoice, &items, &BuildOptions::default()).unwrap();
        assert_eq!(document.root().find("CFOP").unwrap().text(), "5102");
    }

    #[test]
    fn test_simples_regime_and_interstate_recipient() {
        let (mut invoice, items) = sample_invoice();
        if let Some(recipient) = invoice.recipient.as_mut() {
            recipient.address.state = "SP".to_string();
        }
        let options = BuildOptions {
            regime: TaxRegime::SimplesNacional,
            ..BuildOptions::default()
        };
        let document = build_document(&invoice, &items, &options).unwrap();
        let info = document.root().child("infNFe").unwrap();

        assert_eq!(info.path(&["ide", "idDest"]).unwrap().text(), "2");
        assert_eq!(info.path(&["emit", "CRT"]).unwrap().text(), "1");
        assert!(info.find("ICMSSN102").is_some());
        assert!(info.find("ICMS00").is_none());
    }

    #[test]
    fn test_optional_fields() {
        let (mut invoice, items) = sample_invoice();
        invoice.emitter.state_registration = None;
        invoice.emitter.trade_name = None;
        invoice.additional_info = Some("Pedido 1234".to_string());
        if let Some(recipient) = invoice.recipient.as_mut() {
            recipient.email = None;
        }

        let document = build_document(&invoice, &items, &BuildOptions::default()).unwrap();
        let info = document.root().child("infNFe").unwrap();

        assert_eq!(info.path(&["emit", "IE"]).unwrap().text(), "ISENTO");
        assert!(info.path(&["emit", "xFant"]).is_none());
        assert!(info.path(&["dest", "email"]).is_none());
        assert_eq!(info.path(&["dest", "enderDest", "fone"]).unwrap().text(), "");
        assert_eq!(info.path(&["infAdic", "infCpl"]).unwrap().text(), "Pedido 1234");
    }

    #[test]
    fn test_from_parts_checks_id() {
        let (invoice, items) = sample_invoice();
        let document = build_document_with_nonce(&invoice, &items, &golden_options(), 1).unwrap();
        let (root, key) = document.into_parts();

        assert!(StructuredDocument::from_parts(root.clone(), key).is_ok());

        let other = AccessKey::parse("52240311222333000181550010000000421123456789").unwrap();
        assert!(matches!(
            StructuredDocument::from_parts(root, other),
            Err(CoreError::Serialization(SerializationError::InvalidValue { .. }))
        ));
        assert!(StructuredDocument::from_parts(
            Element::new("NFe"),
            AccessKey::parse("52240311222333000181550010000000421123456789").unwrap()
        )
        .is_err());
    }
}
