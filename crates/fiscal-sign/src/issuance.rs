//! # Invoice Issuance
//!
//! The pipeline the ERP runs when a draft invoice is issued.
//!
//! ```text
//! Invoice (Draft) + items + DigitalCertificate?
//!        │
//!        ├── build_document()          ValidationError / SerializationError
//!        ├── CertificateResolver       CertificateError / StorageError
//!        ├── sign()                    enveloped XML-DSig over infNFe
//!        ├── ObjectStore::put_object   <prefix>/<tenant>/<key>.xml
//!        ├── build_consultation_url()
//!        ▼
//! invoice.record_issuance(key, url)   only after every step succeeded
//! ```
//!
//! Any failure leaves the invoice exactly as it was: no access key, no
//! document URL, status unchanged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use fiscal_core::access_key::AccessKey;
use fiscal_core::build_consultation_url;
use fiscal_core::document::build_document;
use fiscal_core::money::Money;
use fiscal_core::tax::{compute_invoice_totals, compute_item_taxes};
use fiscal_core::types::{Invoice, InvoiceItem, InvoiceTotals, ItemTaxRates};
use fiscal_core::validation::format_document;

use crate::certificate::{CertificateResolver, DigitalCertificate};
use crate::config::FiscalConfig;
use crate::error::SignResult;
use crate::signer::sign;
use crate::storage::{ObjectStore, XML_CONTENT_TYPE};

/// Everything the DANFE renderer and the caller need after issuance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedDocument {
    /// The invoice as recorded: status `Issued`, key and URL set.
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
    pub access_key: AccessKey,
    /// Where the signed XML was stored.
    pub document_url: String,
    /// Public verification URL (QR code).
    pub consultation_url: String,
    /// Signed with a throwaway pair; no fiscal value.
    pub ephemeral: bool,
}

/// Runs the issuance pipeline against one object store.
pub struct InvoiceIssuer {
    config: FiscalConfig,
    store: Arc<dyn ObjectStore>,
    resolver: CertificateResolver,
}

impl InvoiceIssuer {
    /// Certificates are read from the same store documents are written to.
    pub fn new(config: FiscalConfig, store: Arc<dyn ObjectStore>) -> Self {
        let resolver = CertificateResolver::new(Some(store.clone()), config.certificate.clone());
        InvoiceIssuer {
            config,
            store,
            resolver,
        }
    }

    /// Uses a separately configured resolver (e.g. certificates in a vault).
    pub fn with_resolver(
        config: FiscalConfig,
        store: Arc<dyn ObjectStore>,
        resolver: CertificateResolver,
    ) -> Self {
        InvoiceIssuer {
            config,
            store,
            resolver,
        }
    }

    pub fn config(&self) -> &FiscalConfig {
        &self.config
    }

    /// Computes every item's taxes with the configured default rates, then
    /// returns the invoice totals for them.
    ///
    /// `rates[i]` overrides the defaults for `items[i]`; missing entries use
    /// the defaults. Sums too large for i64 cents are a validation error.
    pub fn price_items(
        &self,
        items: &mut [InvoiceItem],
        rates: &[ItemTaxRates],
        freight: Money,
    ) -> SignResult<InvoiceTotals> {
        for (index, item) in items.iter_mut().enumerate() {
            let item_rates = rates.get(index).copied().unwrap_or_default();
            let taxes = compute_item_taxes(item, &item_rates, &self.config.rates);
            item.apply_taxes(taxes);
        }
        Ok(compute_invoice_totals(items, freight)?)
    }

    /// Issues `invoice`: validate, build, sign, store, then record.
    pub async fn issue(
        &self,
        invoice: &mut Invoice,
        items: &[InvoiceItem],
        certificate: Option<&DigitalCertificate>,
    ) -> SignResult<IssuedDocument> {
        let options = self.config.build_options();
        let document = build_document(invoice, items, &options)?;

        let credentials = self.resolver.resolve(certificate).await?;
        let signed = sign(document, &credentials)?;
        let access_key = signed.access_key().clone();
        let ephemeral = signed.is_ephemeral();

        let object_key = self
            .config
            .document_object_key(&invoice.tenant_id, access_key.as_str());
        let document_url = self
            .store
            .put_object(&object_key, signed.into_bytes(), XML_CONTENT_TYPE)
            .await?;

        let consultation_url = build_consultation_url(
            &self.config.consultation.endpoint,
            &access_key,
            options.environment,
        );

        invoice.record_issuance(access_key.clone(), document_url.clone());

        if ephemeral {
            warn!(
                invoice_id = %invoice.id,
                access_key = %access_key,
                "Invoice issued with an ephemeral certificate"
            );
        } else {
            info!(
                invoice_id = %invoice.id,
                emitter = %format_document(&invoice.emitter.tax_id),
                access_key = %access_key,
                document_url = %document_url,
                "Invoice issued"
            );
        }

        Ok(IssuedDocument {
            invoice: invoice.clone(),
            items: items.to_vec(),
            access_key,
            document_url,
            consultation_url,
            ephemeral,
        })
    }
}
