//! # Document Parser
//!
//! Reads an issued document (signed or not, bare `NFe` or wrapped in
//! `nfeProc`) back into exact integer values.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::access_key::{AccessKey, DOCUMENT_ID_PREFIX};
use crate::document::xml::{parse_element, Element};
use crate::error::{CoreResult, SerializationError};
use crate::money::{parse_hundredths, Money};
use crate::types::{Environment, InvoiceTotals};

/// One `det` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedItem {
    pub number: u32,
    pub product_code: String,
    pub description: String,
    pub cfop: String,
    /// Hundredths.
    pub quantity: i64,
    pub unit_price: Money,
    pub total: Money,
    pub discount: Money,
}

/// What [`parse_document`] extracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub access_key: AccessKey,
    pub model: u8,
    pub series: u32,
    pub number: u64,
    pub issued_at: DateTime<FixedOffset>,
    pub environment: Environment,
    pub emitter_tax_id: String,
    pub emitter_name: String,
    pub recipient_tax_id: Option<String>,
    pub items: Vec<ParsedItem>,
    pub totals: InvoiceTotals,
    /// A `Signature` element sits next to `infNFe`.
    pub signed: bool,
}

fn missing(name: &str) -> SerializationError {
    SerializationError::MissingElement(name.to_string())
}

fn invalid(element: &str, value: &str) -> SerializationError {
    SerializationError::InvalidValue {
        element: element.to_string(),
        value: value.to_string(),
    }
}

fn required<'a>(parent: &'a Element, name: &str) -> Result<&'a Element, SerializationError> {
    parent.child(name).ok_or_else(|| missing(name))
}

fn text(parent: &Element, name: &str) -> Result<String, SerializationError> {
    required(parent, name).map(Element::text)
}

fn number<T: std::str::FromStr>(parent: &Element, name: &str) -> Result<T, SerializationError> {
    let value = text(parent, name)?;
    value.trim().parse().map_err(|_| invalid(name, &value))
}

fn money(parent: &Element, name: &str) -> Result<Money, SerializationError> {
    let value = text(parent, name)?;
    Money::parse_decimal(&value).ok_or_else(|| invalid(name, &value))
}

fn optional_money(parent: &Element, name: &str) -> Result<Money, SerializationError> {
    match parent.child(name) {
        Some(_) => money(parent, name),
        None => Ok(Money::zero()),
    }
}

fn tax_id(parent: &Element) -> Option<String> {
    parent
        .child_text("CNPJ")
        .or_else(|| parent.child_text("CPF"))
}

fn parse_item(det: &Element) -> Result<ParsedItem, SerializationError> {
    let number = det
        .attribute("nItem")
        .ok_or_else(|| SerializationError::MissingAttribute {
            element: "det".to_string(),
            attribute: "nItem".to_string(),
        })?;
    let number = number.parse().map_err(|_| invalid("det", number))?;

    let prod = required(det, "prod")?;
    let quantity = text(prod, "qCom")?;

    Ok(ParsedItem {
        number,
        product_code: text(prod, "cProd")?,
        description: text(prod, "xProd")?,
        cfop: text(prod, "CFOP")?,
        quantity: parse_hundredths(&quantity).ok_or_else(|| invalid("qCom", &quantity))?,
        unit_price: money(prod, "vUnCom")?,
        total: money(prod, "vProd")?,
        discount: optional_money(prod, "vDesc")?,
    })
}

fn parse_totals(total: &Element) -> Result<InvoiceTotals, SerializationError> {
    let icms_tot = required(total, "ICMSTot")?;
    Ok(InvoiceTotals {
        products: money(icms_tot, "vProd")?,
        discount: money(icms_tot, "vDesc")?,
        freight: money(icms_tot, "vFrete")?,
        icms_base: money(icms_tot, "vBC")?,
        icms: money(icms_tot, "vICMS")?,
        ipi: money(icms_tot, "vIPI")?,
        pis: money(icms_tot, "vPIS")?,
        cofins: money(icms_tot, "vCOFINS")?,
        invoice: money(icms_tot, "vNF")?,
    })
}

/// Parses a document's identity, items and totals.
///
/// Totals come back as exact cents: `"1500.00"` is 150000, never a float.
pub fn parse_document(xml: &str) -> CoreResult<ParsedDocument> {
    let root = parse_element(xml)?;
    let nfe = root.find("NFe").ok_or_else(|| missing("NFe"))?;
    let info = required(nfe, "infNFe")?;

    let id = info
        .attribute("Id")
        .ok_or_else(|| SerializationError::MissingAttribute {
            element: "infNFe".to_string(),
            attribute: "Id".to_string(),
        })?;
    let access_key = id
        .strip_prefix(DOCUMENT_ID_PREFIX)
        .and_then(|digits| AccessKey::parse(digits).ok())
        .ok_or_else(|| invalid("infNFe", id))?;

    let ide = required(info, "ide")?;
    let issued_at = text(ide, "dhEmi")?;
    let issued_at =
        DateTime::parse_from_rfc3339(&issued_at).map_err(|_| invalid("dhEmi", &issued_at))?;
    let environment = text(ide, "tpAmb")?;
    let environment = environment
        .parse::<Environment>()
        .map_err(|_| invalid("tpAmb", &environment))?;

    let emit = required(info, "emit")?;
    let emitter_tax_id = tax_id(emit).ok_or_else(|| missing("CNPJ"))?;

    let items = info
        .children_named("det")
        .map(parse_item)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedDocument {
        access_key,
        model: number(ide, "mod")?,
        series: number(ide, "serie")?,
        number: number(ide, "nNF")?,
        issued_at,
        environment,
        emitter_tax_id,
        emitter_name: text(emit, "xNome")?,
        recipient_tax_id: info.child("dest").and_then(tax_id),
        items,
        totals: parse_totals(required(info, "total")?)?,
        signed: nfe.child("Signature").is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::builder::{build_document, build_document_with_nonce, BuildOptions};
    use crate::error::CoreError;
    use crate::fixtures::{
        invoice_for, item_with_price, sample_invoice, SAMPLE_ACCESS_KEY, SAMPLE_NONCE,
    };

    #[test]
    fn test_parse_built_document() {
        let (invoice, items) = sample_invoice();
        let document =
            build_document_with_nonce(&invoice, &items, &BuildOptions::default(), SAMPLE_NONCE)
                .unwrap();
        let parsed = parse_document(&document.to_xml()).unwrap();

        assert_eq!(parsed.access_key.as_str(), SAMPLE_ACCESS_KEY);
        assert_eq!(parsed.model, 55);
        assert_eq!(parsed.series, 1);
        assert_eq!(parsed.number, 42);
        assert_eq!(parsed.issued_at.with_timezone(&chrono::Utc), invoice.issued_at);
        assert_eq!(parsed.environment, Environment::Homologation);
        assert_eq!(parsed.emitter_tax_id, "11222333000181");
        assert_eq!(parsed.recipient_tax_id.as_deref(), Some("12345678909"));
        assert_eq!(parsed.totals, invoice.totals);
        assert!(!parsed.signed);

        assert_eq!(parsed.items.len(), 1);
        let item = &parsed.items[0];
        assert_eq!(item.number, 1);
        assert_eq!(item.quantity, 100);
        assert_eq!(item.unit_price.cents(), 150000);
        assert_eq!(item.discount, Money::zero());
    }

    #[test]
    fn test_totals_round_trip_is_exact_up_to_a_trillion_cents() {
        for cents in [
            0,
            1,
            99,
            150000,
            123_456_789,
            999_999_999_999,
            1_000_000_000_000,
            4_503_599_627_370_497,
        ] {
            let items = if cents == 0 {
                Vec::new()
            } else {
                vec![item_with_price(cents)]
            };
            let invoice = invoice_for(&items);
            let document = build_document(&invoice, &items, &BuildOptions::default()).unwrap();
            let parsed = parse_document(&document.to_xml()).unwrap();

            assert_eq!(parsed.totals, invoice.totals, "round trip of {} cents", cents);
            assert_eq!(parsed.totals.products.cents(), cents);
        }
    }

    #[test]
    fn test_pretty_output_parses_the_same() {
        let (invoice, items) = sample_invoice();
        let document = build_document(&invoice, &items, &BuildOptions::default()).unwrap();

        assert_eq!(
            parse_document(&document.to_pretty_xml()).unwrap(),
            parse_document(&document.to_xml()).unwrap()
        );
    }

    #[test]
    fn test_wrapped_in_nfe_proc() {
        let (invoice, items) = sample_invoice();
        let document = build_document(&invoice, &items, &BuildOptions::default()).unwrap();
        let wrapped = format!(
            "<nfeProc versao=\"4.00\">{}<protNFe/></nfeProc>",
            document.root().to_xml()
        );

        let parsed = parse_document(&wrapped).unwrap();
        assert_eq!(&parsed.access_key, document.access_key());
    }

    #[test]
    fn test_missing_totals_is_serialization_error() {
        let xml = format!(
            "<NFe><infNFe Id=\"NFe{}\"><ide><mod>55</mod><serie>1</serie><nNF>1</nNF>\
             <dhEmi>2024-03-15T10:30:00+00:00</dhEmi><tpAmb>2</tpAmb></ide>\
             <emit><CNPJ>11222333000181</CNPJ><xNome>X</xNome></emit></infNFe></NFe>",
            SAMPLE_ACCESS_KEY
        );
        assert!(matches!(
            parse_document(&xml),
            Err(CoreError::Serialization(SerializationError::MissingElement(ref name))) if name == "total"
        ));
    }

    #[test]
    fn test_bad_values_rejected() {
        let (invoice, items) = sample_invoice();
        let document = build_document(&invoice, &items, &BuildOptions::default()).unwrap();
        let xml = document.to_xml().replace("<vNF>1500.00</vNF>", "<vNF>1.5e3</vNF>");
        assert!(matches!(
            parse_document(&xml),
            Err(CoreError::Serialization(SerializationError::InvalidValue { .. }))
        ));

        let xml = document.to_xml().replacen("Id=\"NFe", "Id=\"NFx", 1);
        assert!(parse_document(&xml).is_err());

        assert!(matches!(
            parse_document("<NFe><infNFe>"),
            Err(CoreError::Serialization(SerializationError::MalformedXml(_)))
        ));
    }
}
