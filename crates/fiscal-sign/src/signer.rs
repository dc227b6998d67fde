//! # Signing Engine
//!
//! Enveloped XML-DSig over the `infNFe` subtree.
//!
//! ## Signature Layout
//! ```text
//! <NFe xmlns="http://www.portalfiscal.inf.br/nfe">
//!   <infNFe Id="NFe<key>"> … </infNFe>
//!   <Signature xmlns="http://www.w3.org/2000/09/xmldsig#">
//!     <SignedInfo>
//!       <CanonicalizationMethod Algorithm="…REC-xml-c14n-20010315"/>
//!       <SignatureMethod Algorithm="…xmldsig#rsa-sha1"/>
//!       <Reference URI="#NFe<key>">
//!         <Transforms>
//!           <Transform Algorithm="…xmldsig#enveloped-signature"/>
//!           <Transform Algorithm="…REC-xml-c14n-20010315"/>
//!         </Transforms>
//!         <DigestMethod Algorithm="…xmldsig#sha1"/>
//!         <DigestValue>base64(SHA-1(C14N(infNFe)))</DigestValue>
//!       </Reference>
//!     </SignedInfo>
//!     <SignatureValue>base64(RSA-SHA1(C14N(SignedInfo)))</SignatureValue>
//!     <KeyInfo><X509Data><X509Certificate>base64(DER)</X509Certificate></X509Data></KeyInfo>
//!   </Signature>
//! </NFe>
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use openssl::hash::MessageDigest;
use openssl::sha::sha1;
use openssl::sign::{Signer, Verifier};
use openssl::x509::X509;
use serde::{Deserialize, Serialize};
use tracing::debug;

use fiscal_core::access_key::{AccessKey, DOCUMENT_ID_PREFIX};
use fiscal_core::document::xml::{parse_element, Element, XML_DECLARATION};
use fiscal_core::{SerializationError, StructuredDocument};

use crate::certificate::{CertificateInfo, SigningCredentials};
use crate::error::{SignError, SignResult};

pub const XMLDSIG_NAMESPACE: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const C14N_ALGORITHM: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub const RSA_SHA1_ALGORITHM: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub const SHA1_ALGORITHM: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
pub const ENVELOPED_SIGNATURE_TRANSFORM: &str =
    "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

const SIGNED_ELEMENT: &str = "infNFe";
const SIGNATURE_ELEMENT: &str = "Signature";

// =============================================================================
// Signed Document
// =============================================================================

/// A document with its enveloped signature attached.
#[derive(Debug, Clone)]
pub struct SignedDocument {
    root: Element,
    access_key: AccessKey,
    ephemeral: bool,
}

impl SignedDocument {
    /// True when signed with a throwaway self-signed pair.
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    pub fn access_key(&self) -> &AccessKey {
        &self.access_key
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Declaration + compact body. Any reformatting breaks the signature.
    pub fn to_xml(&self) -> String {
        format!("{}{}", XML_DECLARATION, self.root.to_xml())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.to_xml().into_bytes()
    }
}

// =============================================================================
// Signing
// =============================================================================

fn missing(name: &str) -> SerializationError {
    SerializationError::MissingElement(name.to_string())
}

/// Namespace bindings in scope for the children of `parent`.
fn scope_of(parent: &Element) -> Vec<(String, String)> {
    parent
        .attributes
        .iter()
        .filter_map(|(name, value)| {
            if name == "xmlns" {
                Some((String::new(), value.clone()))
            } else {
                name.strip_prefix("xmlns:")
                    .map(|prefix| (prefix.to_string(), value.clone()))
            }
        })
        .collect()
}

fn algorithm(name: &str, uri: &str) -> Element {
    Element::new(name).with_attr("Algorithm", uri)
}

fn signed_info(reference_uri: &str, digest: &str) -> Element {
    Element::new("SignedInfo")
        .with_child(algorithm("CanonicalizationMethod", C14N_ALGORITHM))
        .with_child(algorithm("SignatureMethod", RSA_SHA1_ALGORITHM))
        .with_child(
            Element::new("Reference")
                .with_attr("URI", reference_uri)
                .with_child(
                    Element::new("Transforms")
                        .with_child(algorithm("Transform", ENVELOPED_SIGNATURE_TRANSFORM))
                        .with_child(algorithm("Transform", C14N_ALGORITHM)),
                )
                .with_child(algorithm("DigestMethod", SHA1_ALGORITHM))
                .with_leaf("DigestValue", digest),
        )
}

fn signature_scope() -> Vec<(String, String)> {
    vec![(String::new(), XMLDSIG_NAMESPACE.to_string())]
}

/// Signs the `infNFe` subtree and appends `Signature` after it.
pub fn sign(
    document: StructuredDocument,
    credentials: &SigningCredentials,
) -> SignResult<SignedDocument> {
    let (mut root, access_key) = document.into_parts();
    let material = credentials.material();

    let info = root
        .child(SIGNED_ELEMENT)
        .ok_or_else(|| missing(SIGNED_ELEMENT))?;
    let canonical = info.canonicalize(&scope_of(&root));
    let digest = STANDARD.encode(sha1(canonical.as_bytes()));

    let signed_info = signed_info(&format!("#{}", access_key.document_id()), &digest);
    let canonical_signed_info = signed_info.canonicalize(&signature_scope());

    let mut signer = Signer::new(MessageDigest::sha1(), material.private_key())?;
    signer.update(canonical_signed_info.as_bytes())?;
    let signature_value = STANDARD.encode(signer.sign_to_vec()?);

    let certificate = STANDARD.encode(material.certificate_der()?);

    root.push(
        Element::new(SIGNATURE_ELEMENT)
            .with_attr("xmlns", XMLDSIG_NAMESPACE)
            .with_child(signed_info)
            .with_leaf("SignatureValue", signature_value)
            .with_child(
                Element::new("KeyInfo").with_child(
                    Element::new("X509Data").with_leaf("X509Certificate", certificate),
                ),
            ),
    );

    debug!(
        access_key = %access_key,
        ephemeral = credentials.is_ephemeral(),
        "Document signed"
    );

    Ok(SignedDocument {
        root,
        access_key,
        ephemeral: credentials.is_ephemeral(),
    })
}

// =============================================================================
// Verification
// =============================================================================

/// Outcome of [`verify_signature`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureCheck {
    pub access_key: AccessKey,
    /// `DigestValue` matches the digest of the current `infNFe`.
    pub digest_matches: bool,
    /// `SignatureValue` verifies against the embedded certificate.
    pub signature_matches: bool,
    pub certificate: CertificateInfo,
}

impl SignatureCheck {
    pub fn is_valid(&self) -> bool {
        self.digest_matches && self.signature_matches
    }
}

fn required<'a>(parent: &'a Element, path: &[&str]) -> Result<&'a Element, SerializationError> {
    parent
        .path(path)
        .ok_or_else(|| missing(path.last().copied().unwrap_or(parent.name.as_str())))
}

/// Recomputes the digest of `infNFe` and checks the RSA signature against
/// the certificate embedded in `KeyInfo`.
///
/// Structural problems are errors; a mismatch is reported in the result.
pub fn verify_signature(xml: &str) -> SignResult<SignatureCheck> {
    let root = parse_element(xml)?;
    let nfe = root.find("NFe").ok_or_else(|| missing("NFe"))?;
    let info = required(nfe, &[SIGNED_ELEMENT])?;
    let signature = required(nfe, &[SIGNATURE_ELEMENT])?;

    let id = info
        .attribute("Id")
        .ok_or_else(|| SerializationError::MissingAttribute {
            element: SIGNED_ELEMENT.to_string(),
            attribute: "Id".to_string(),
        })?;
    let access_key = id
        .strip_prefix(DOCUMENT_ID_PREFIX)
        .and_then(|digits| AccessKey::parse(digits).ok())
        .ok_or_else(|| SerializationError::InvalidValue {
            element: SIGNED_ELEMENT.to_string(),
            value: id.to_string(),
        })?;

    let signed_info = required(signature, &["SignedInfo"])?;
    let reference = required(signed_info, &["Reference"])?;
    if reference.attribute("URI") != Some(format!("#{}", id).as_str()) {
        return Err(SerializationError::InvalidValue {
            element: "Reference".to_string(),
            value: reference.attribute("URI").unwrap_or_default().to_string(),
        }
        .into());
    }

    let claimed_digest = required(reference, &["DigestValue"])?.text();
    let actual_digest = STANDARD.encode(sha1(info.canonicalize(&scope_of(nfe)).as_bytes()));

    let signature_value = STANDARD.decode(required(signature, &["SignatureValue"])?.text().trim())?;
    let certificate_der = STANDARD.decode(
        required(signature, &["KeyInfo", "X509Data", "X509Certificate"])?
            .text()
            .trim(),
    )?;
    let certificate = X509::from_der(&certificate_der)?;
    let public_key = certificate.public_key()?;

    let mut inherited = scope_of(nfe);
    inherited.extend(scope_of(signature));
    let canonical_signed_info = signed_info.canonicalize(&dedupe(inherited));

    let mut verifier = Verifier::new(MessageDigest::sha1(), &public_key)?;
    verifier.update(canonical_signed_info.as_bytes())?;
    let signature_matches = verifier.verify(&signature_value).unwrap_or(false);

    Ok(SignatureCheck {
        access_key,
        digest_matches: claimed_digest.trim() == actual_digest,
        signature_matches,
        certificate: CertificateInfo::from_x509(&certificate).map_err(SignError::from)?,
    })
}

/// Later bindings of a prefix win.
fn dedupe(bindings: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut scope: Vec<(String, String)> = Vec::new();
    for (prefix, uri) in bindings {
        match scope.iter_mut().find(|(p, _)| *p == prefix) {
            Some(entry) => entry.1 = uri,
            None => scope.push((prefix, uri)),
        }
    }
    scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::{generate_ephemeral, KeyMaterial};
    use fiscal_core::fixtures::{empty_invoice, sample_invoice, SAMPLE_NONCE};
    use fiscal_core::{build_document, parse_document, BuildOptions};
    use fiscal_core::document::build_document_with_nonce;

    fn ephemeral() -> SigningCredentials {
        SigningCredentials::Ephemeral(generate_ephemeral("NF-e Homologacao", 2048).unwrap())
    }

    fn sample_document() -> StructuredDocument {
        let (invoice, items) = sample_invoice();
        build_document_with_nonce(&invoice, &items, &BuildOptions::default(), SAMPLE_NONCE)
            .unwrap()
    }

    #[test]
    fn test_signature_is_next_sibling_of_inf_nfe() {
        let signed = sign(sample_document(), &ephemeral()).unwrap();
        let names: Vec<&str> = signed.root().elements().map(|e| e.name.as_str()).collect();

        assert_eq!(names, vec!["infNFe", "Signature"]);
        assert_eq!(
            signed.root().child("Signature").and_then(|s| s.attribute("xmlns")),
            Some(XMLDSIG_NAMESPACE)
        );
        assert_eq!(
            signed
                .root()
                .path(&["Signature", "SignedInfo", "Reference"])
                .and_then(|r| r.attribute("URI")),
            Some("#NFe52240311222333000181550010000000421123456789")
        );
        assert!(signed.is_ephemeral());
        assert!(signed.to_xml().starts_with(XML_DECLARATION));
    }

    #[test]
    fn test_ephemeral_signing_with_zero_items() {
        let invoice = empty_invoice();
        let document = build_document(&invoice, &[], &BuildOptions::default()).unwrap();
        let signed = sign(document, &ephemeral()).unwrap();

        assert!(signed.is_ephemeral());
        let parsed = parse_document(&signed.to_xml()).unwrap();
        assert!(parsed.signed);
        assert!(parsed.items.is_empty());
        assert_eq!(&parsed.access_key, signed.access_key());
    }

    #[test]
    fn test_verify_signed_document() {
        let signed = sign(sample_document(), &ephemeral()).unwrap();
        let check = verify_signature(&signed.to_xml()).unwrap();

        assert!(check.digest_matches);
        assert!(check.signature_matches);
        assert!(check.is_valid());
        assert_eq!(&check.access_key, signed.access_key());
        assert_eq!(check.certificate.subject, "CN=NF-e Homologacao");
    }

    #[test]
    fn test_tampered_content_fails_digest() {
        let signed = sign(sample_document(), &ephemeral()).unwrap();
        let tampered = signed
            .to_xml()
            .replace("<xNome>Maria da Silva</xNome>", "<xNome>Maria da Souza</xNome>");

        let check = verify_signature(&tampered).unwrap();
        assert!(!check.digest_matches);
        assert!(check.signature_matches);
        assert!(!check.is_valid());
    }

    #[test]
    fn test_tampered_digest_fails_signature() {
        let signed = sign(sample_document(), &ephemeral()).unwrap();
        let digest = signed
            .root()
            .path(&["Signature", "SignedInfo", "Reference", "DigestValue"])
            .unwrap()
            .text();
        let tampered = signed.to_xml().replace(
            &format!("<DigestValue>{}</DigestValue>", digest),
            "<DigestValue>AAAAAAAAAAAAAAAAAAAAAAAAAAA=</DigestValue>",
        );

        let check = verify_signature(&tampered).unwrap();
        assert!(!check.signature_matches);
        assert!(!check.is_valid());
    }

    #[test]
    fn test_signed_with_other_key_fails() {
        let signed = sign(sample_document(), &ephemeral()).unwrap();
        let other = generate_ephemeral("Outra", 2048).unwrap();
        let own_certificate = signed
            .root()
            .path(&["Signature", "KeyInfo", "X509Data", "X509Certificate"])
            .unwrap()
            .text();
        let swapped = signed.to_xml().replace(
            &own_certificate,
            &STANDARD.encode(other.certificate_der().unwrap()),
        );

        let check = verify_signature(&swapped).unwrap();
        assert!(check.digest_matches);
        assert!(!check.signature_matches);
    }

    #[test]
    fn test_unsigned_document_is_error() {
        let document = sample_document();
        assert!(matches!(
            verify_signature(&document.to_xml()),
            Err(SignError::Serialization(SerializationError::MissingElement(ref name))) if name == "Signature"
        ));
    }

    #[test]
    fn test_real_credentials_are_not_ephemeral() {
        let material: KeyMaterial = generate_ephemeral("Comercial Goias Ltda", 2048).unwrap();
        let signed = sign(sample_document(), &SigningCredentials::Real(material)).unwrap();

        assert!(!signed.is_ephemeral());
        assert!(verify_signature(&signed.to_xml()).unwrap().is_valid());
    }
}
