//! # Certificate Resolution
//!
//! Chooses the key material a document is signed with.
//!
//! ## Strategy Selection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CertificateResolver::resolve                         │
//! │                                                                         │
//! │  tenant certificate + object store?                                    │
//! │     │                                                                   │
//! │     ├── yes ──► get_object(storage_key)      StorageError propagates   │
//! │     │           PKCS#12 decrypt (blocking)    CertificateError, final   │
//! │     │             unreadable + fallback_on_unreadable ──► ephemeral   │
//! │     │           expired? warn! only                                     │
//! │     │           ──► SigningCredentials::Real                            │
//! │     │                                                                   │
//! │     └── no ───► policy = allow_ephemeral?                               │
//! │                    ├── yes ──► warn!, RSA keygen (blocking)             │
//! │                    │           ──► SigningCredentials::Ephemeral        │
//! │                    └── no  ──► CertificateError::RealCertificateRequired│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! By default the fallback only covers a certificate that is *absent*.
//! `fallback_on_unreadable` extends it to containers that are corrupt or
//! lack a key or certificate. A wrong password never degrades to an
//! ephemeral pair.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::bn::{BigNum, MsbOption};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::{X509NameBuilder, X509NameRef, X509Ref, X509};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{CertificatePolicy, CertificateSettings};
use crate::error::{CertificateError, SignResult};
use crate::storage::ObjectStore;

/// Validity of the self-signed fallback certificate.
pub const EPHEMERAL_VALIDITY_DAYS: u32 = 365;

// =============================================================================
// Digital Certificate (tenant record)
// =============================================================================

/// A tenant's encrypted key container: where it is stored and how to open
/// it. The metadata fields are descriptive and never used for signing.
#[derive(Debug, Clone)]
pub struct DigitalCertificate {
    pub id: String,
    pub tenant_id: String,
    /// Object store key of the PKCS#12 bytes.
    pub storage_key: String,
    pub password: Secret<String>,
    pub issuer: Option<String>,
    pub serial: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl DigitalCertificate {
    pub fn new(
        tenant_id: impl Into<String>,
        storage_key: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        DigitalCertificate {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            storage_key: storage_key.into(),
            password: Secret::new(password.into()),
            issuer: None,
            serial: None,
            expires_at: None,
        }
    }
}

// =============================================================================
// Certificate Info
// =============================================================================

/// Attributes read from an X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    /// Upper-case hex.
    pub serial: String,
    pub not_after: DateTime<Utc>,
}

impl CertificateInfo {
    pub fn from_x509(certificate: &X509Ref) -> Result<Self, CertificateError> {
        let inspect = |e: ErrorStack| CertificateError::Inspection(e.to_string());

        let serial = certificate
            .serial_number()
            .to_bn()
            .and_then(|bn| bn.to_hex_str().map(|s| s.to_string()))
            .map_err(inspect)?;

        Ok(CertificateInfo {
            subject: render_name(certificate.subject_name()),
            issuer: render_name(certificate.issuer_name()),
            serial,
            not_after: asn1_to_utc(certificate.not_after()).map_err(inspect)?,
        })
    }

    /// Expiry is advisory; callers log it and carry on.
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.not_after <= at
    }

    /// The subject's common name, if any.
    pub fn common_name(&self) -> Option<&str> {
        self.subject
            .split(", ")
            .find_map(|part| part.strip_prefix("CN="))
    }
}

fn render_name(name: &X509NameRef) -> String {
    name.entries()
        .map(|entry| {
            let key = entry.object().nid().short_name().unwrap_or("?");
            let value = entry
                .data()
                .as_utf8()
                .map(|s| s.to_string())
                .unwrap_or_default();
            format!("{}={}", key, value)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn asn1_to_utc(time: &Asn1TimeRef) -> Result<DateTime<Utc>, ErrorStack> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    let seconds = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    Ok(Utc
        .timestamp_opt(seconds, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC))
}

// =============================================================================
// Key Material & Credentials
// =============================================================================

/// A private key and the certificate that vouches for it.
#[derive(Clone)]
pub struct KeyMaterial {
    key: PKey<Private>,
    certificate: X509,
}

impl KeyMaterial {
    pub fn new(key: PKey<Private>, certificate: X509) -> Self {
        KeyMaterial { key, certificate }
    }

    pub fn private_key(&self) -> &PKey<Private> {
        &self.key
    }

    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    /// DER bytes of the certificate, as embedded in `X509Certificate`.
    pub fn certificate_der(&self) -> SignResult<Vec<u8>> {
        Ok(self.certificate.to_der()?)
    }

    pub fn info(&self) -> Result<CertificateInfo, CertificateError> {
        CertificateInfo::from_x509(&self.certificate)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"[REDACTED]")
            .field("certificate", &render_name(self.certificate.subject_name()))
            .finish()
    }
}

/// Which kind of key material a document gets signed with.
#[derive(Debug, Clone)]
pub enum SigningCredentials {
    /// Opened from the tenant's PKCS#12 container.
    Real(KeyMaterial),

    /// Throwaway self-signed pair. Documents signed with it have no fiscal
    /// value.
    Ephemeral(KeyMaterial),
}

impl SigningCredentials {
    pub fn material(&self) -> &KeyMaterial {
        match self {
            SigningCredentials::Real(m) | SigningCredentials::Ephemeral(m) => m,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, SigningCredentials::Ephemeral(_))
    }
}

// =============================================================================
// Container / Key Generation
// =============================================================================

/// Opens a PKCS#12 container.
///
/// ## Errors
/// - Not DER, or undecryptable → `CorruptContainer`
/// - MAC check fails → `WrongPassword`
/// - No key / no leaf certificate → `MissingPrivateKey` / `MissingCertificate`
pub fn open_container(bytes: &[u8], password: &str) -> Result<KeyMaterial, CertificateError> {
    let container =
        Pkcs12::from_der(bytes).map_err(|e| CertificateError::CorruptContainer(e.to_string()))?;

    let parsed = container.parse2(password).map_err(|e| {
        let mac_failure = e
            .errors()
            .iter()
            .any(|err| err.reason() == Some("mac verify failure"));
        if mac_failure {
            CertificateError::WrongPassword
        } else {
            CertificateError::CorruptContainer(e.to_string())
        }
    })?;

    let key = parsed.pkey.ok_or(CertificateError::MissingPrivateKey)?;
    let certificate = parsed.cert.ok_or(CertificateError::MissingCertificate)?;
    Ok(KeyMaterial::new(key, certificate))
}

/// Generates an RSA key pair and a self-signed certificate for it.
pub fn generate_ephemeral(common_name: &str, key_bits: u32) -> Result<KeyMaterial, CertificateError> {
    build_self_signed(common_name, key_bits)
        .map_err(|e| CertificateError::KeyGeneration(e.to_string()))
}

fn build_self_signed(common_name: &str, key_bits: u32) -> Result<KeyMaterial, ErrorStack> {
    let key = PKey::from_rsa(Rsa::generate(key_bits)?)?;

    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    let name = name.build();

    let mut serial = BigNum::new()?;
    serial.rand(63, MsbOption::MAYBE_ZERO, false)?;

    let mut builder = X509::builder()?;
    builder.set_version(2)?;
    let serial = serial.to_asn1_integer()?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(&key)?;
    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(EPHEMERAL_VALIDITY_DAYS)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;
    builder.sign(&key, MessageDigest::sha256())?;

    Ok(KeyMaterial::new(key, builder.build()))
}

// =============================================================================
// Resolver
// =============================================================================

/// Picks [`SigningCredentials`] for a tenant before signing begins.
pub struct CertificateResolver {
    store: Option<Arc<dyn ObjectStore>>,
    settings: CertificateSettings,
}

impl CertificateResolver {
    pub fn new(store: Option<Arc<dyn ObjectStore>>, settings: CertificateSettings) -> Self {
        CertificateResolver { store, settings }
    }

    pub fn policy(&self) -> CertificatePolicy {
        self.settings.policy
    }

    /// Resolves the credentials for `certificate`.
    ///
    /// Storage read failures and container errors propagate as-is.
    pub async fn resolve(
        &self,
        certificate: Option<&DigitalCertificate>,
    ) -> SignResult<SigningCredentials> {
        match (certificate, &self.store) {
            (Some(certificate), Some(store)) => self.open_real(certificate, store.as_ref()).await,
            (None, _) => self.fallback("no certificate configured").await,
            (Some(_), None) => self.fallback("no object store available").await,
        }
    }

    async fn open_real(
        &self,
        certificate: &DigitalCertificate,
        store: &dyn ObjectStore,
    ) -> SignResult<SigningCredentials> {
        debug!(
            certificate_id = %certificate.id,
            tenant_id = %certificate.tenant_id,
            storage_key = %certificate.storage_key,
            "Fetching certificate container"
        );
        let bytes = store.get_object(&certificate.storage_key).await?;

        let password = certificate.password.clone();
        let opened = tokio::task::spawn_blocking(move || {
            open_container(&bytes, password.expose_secret())
        })
        .await?;

        let material = match opened {
            Ok(material) => material,
            Err(error) if self.falls_back_on(&error) => {
                warn!(
                    certificate_id = %certificate.id,
                    error = %error,
                    "Certificate container unreadable"
                );
                return self.fallback("certificate container unreadable").await;
            }
            Err(error) => return Err(error.into()),
        };

        let info = material.info()?;
        if info.is_expired_at(Utc::now()) {
            warn!(
                certificate_id = %certificate.id,
                subject = %info.subject,
                not_after = %info.not_after,
                "Signing with an expired certificate"
            );
        } else {
            info!(
                certificate_id = %certificate.id,
                subject = %info.subject,
                serial = %info.serial,
                "Certificate opened"
            );
        }

        Ok(SigningCredentials::Real(material))
    }

    fn falls_back_on(&self, error: &CertificateError) -> bool {
        self.settings.fallback_on_unreadable
            && self.settings.policy == CertificatePolicy::AllowEphemeral
            && matches!(
                error,
                CertificateError::CorruptContainer(_)
                    | CertificateError::MissingPrivateKey
                    | CertificateError::MissingCertificate
            )
    }

    async fn fallback(&self, reason: &str) -> SignResult<SigningCredentials> {
        match self.settings.policy {
            CertificatePolicy::RequireReal => {
                Err(CertificateError::RealCertificateRequired.into())
            }
            CertificatePolicy::AllowEphemeral => {
                warn!(
                    reason = %reason,
                    common_name = %self.settings.ephemeral_common_name,
                    "Signing with an ephemeral self-signed certificate; the document has no fiscal value"
                );
                let common_name = self.settings.ephemeral_common_name.clone();
                let key_bits = self.settings.key_bits;
                let material = tokio::task::spawn_blocking(move || {
                    generate_ephemeral(&common_name, key_bits)
                })
                .await??;
                Ok(SigningCredentials::Ephemeral(material))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{SignError, StorageError};
    use crate::storage::{InMemoryStore, PKCS12_CONTENT_TYPE};

    /// A PKCS#12 container around a fresh self-signed pair.
    pub(crate) fn container(password: &str, common_name: &str) -> Vec<u8> {
        let material = generate_ephemeral(common_name, 2048).unwrap();
        Pkcs12::builder()
            .name("fiscal")
            .pkey(material.private_key())
            .cert(material.certificate())
            .build2(password)
            .unwrap()
            .to_der()
            .unwrap()
    }

    pub(crate) async fn store_with_container(
        password: &str,
    ) -> (Arc<InMemoryStore>, DigitalCertificate) {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_object(
                "t1/certificate.pfx",
                container(password, "Comercial Goias Ltda"),
                PKCS12_CONTENT_TYPE,
            )
            .await
            .unwrap();
        let certificate = DigitalCertificate::new("t1", "t1/certificate.pfx", password);
        (store, certificate)
    }

    fn settings(policy: CertificatePolicy) -> CertificateSettings {
        CertificateSettings {
            policy,
            ..CertificateSettings::default()
        }
    }

    #[test]
    fn test_open_container() {
        let material = open_container(&container("s3cret", "Loja"), "s3cret").unwrap();
        assert_eq!(material.info().unwrap().common_name(), Some("Loja"));
    }

    #[test]
    fn test_open_container_wrong_password() {
        let result = open_container(&container("s3cret", "Loja"), "wrong");
        assert!(matches!(result, Err(CertificateError::WrongPassword)));
    }

    #[test]
    fn test_open_garbage_is_corrupt() {
        assert!(matches!(
            open_container(b"definitely not pkcs12", "x"),
            Err(CertificateError::CorruptContainer(_))
        ));
    }

    #[test]
    fn test_ephemeral_certificate_info() {
        let material = generate_ephemeral("NF-e Homologacao", 2048).unwrap();
        let info = material.info().unwrap();

        assert_eq!(info.subject, "CN=NF-e Homologacao");
        assert_eq!(info.subject, info.issuer);
        assert!(!info.serial.is_empty());

        let now = Utc::now();
        assert!(!info.is_expired_at(now));
        assert!(info.is_expired_at(now + chrono::Duration::days(366)));
        assert!(info.not_after > now + chrono::Duration::days(364));
    }

    #[test]
    fn test_ephemeral_validity_window() {
        let before = Utc::now() - chrono::Duration::minutes(5);
        let material = generate_ephemeral("Loja", 2048).unwrap();
        let certificate = material.certificate();

        let not_before = asn1_to_utc(certificate.not_before()).unwrap();
        let not_after = asn1_to_utc(certificate.not_after()).unwrap();

        assert!(not_before >= before);
        assert!(not_before <= Utc::now());
        let window = (not_after - not_before).num_days();
        assert_eq!(window, EPHEMERAL_VALIDITY_DAYS as i64);
    }

    #[test]
    fn test_key_material_debug_hides_key() {
        let material = generate_ephemeral("Loja", 2048).unwrap();
        let debug = format!("{:?}", material);
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("CN=Loja"));
    }

    #[test]
    fn test_password_not_in_debug() {
        let certificate = DigitalCertificate::new("t1", "k", "hunter2");
        assert!(!format!("{:?}", certificate).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_resolve_real_certificate() {
        let (store, certificate) = store_with_container("s3cret").await;
        let resolver = CertificateResolver::new(
            Some(store),
            settings(CertificatePolicy::RequireReal),
        );

        let credentials = resolver.resolve(Some(&certificate)).await.unwrap();
        assert!(!credentials.is_ephemeral());
        assert_eq!(
            credentials.material().info().unwrap().common_name(),
            Some("Comercial Goias Ltda")
        );
    }

    #[tokio::test]
    async fn test_wrong_password_never_falls_back() {
        let (store, mut certificate) = store_with_container("s3cret").await;
        certificate.password = Secret::new("wrong".to_string());
        let resolver = CertificateResolver::new(
            Some(store),
            settings(CertificatePolicy::AllowEphemeral),
        );

        let err = resolver.resolve(Some(&certificate)).await.unwrap_err();
        assert!(err.is_certificate_error());
    }

    async fn store_with_garbage() -> (Arc<InMemoryStore>, DigitalCertificate) {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_object("t1/certificate.pfx", b"not pkcs12".to_vec(), PKCS12_CONTENT_TYPE)
            .await
            .unwrap();
        (store, DigitalCertificate::new("t1", "t1/certificate.pfx", "x"))
    }

    fn unreadable_fallback(policy: CertificatePolicy, enabled: bool) -> CertificateSettings {
        CertificateSettings {
            fallback_on_unreadable: enabled,
            ..settings(policy)
        }
    }

    #[tokio::test]
    async fn test_corrupt_container_without_fallback_errors() {
        let (store, certificate) = store_with_garbage().await;
        let resolver = CertificateResolver::new(
            Some(store),
            unreadable_fallback(CertificatePolicy::AllowEphemeral, false),
        );

        assert!(matches!(
            resolver.resolve(Some(&certificate)).await,
            Err(SignError::Certificate(CertificateError::CorruptContainer(_)))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_container_with_fallback_goes_ephemeral() {
        let (store, certificate) = store_with_garbage().await;
        let resolver = CertificateResolver::new(
            Some(store),
            unreadable_fallback(CertificatePolicy::AllowEphemeral, true),
        );

        let credentials = resolver.resolve(Some(&certificate)).await.unwrap();
        assert!(credentials.is_ephemeral());
        assert_eq!(
            credentials.material().info().unwrap().common_name(),
            Some("NF-e Homologacao")
        );
    }

    #[tokio::test]
    async fn test_unreadable_fallback_ignored_when_real_required() {
        let (store, certificate) = store_with_garbage().await;
        let resolver = CertificateResolver::new(
            Some(store),
            unreadable_fallback(CertificatePolicy::RequireReal, true),
        );

        assert!(matches!(
            resolver.resolve(Some(&certificate)).await,
            Err(SignError::Certificate(CertificateError::CorruptContainer(_)))
        ));
    }

    #[tokio::test]
    async fn test_wrong_password_never_falls_back_even_when_enabled() {
        let (store, mut certificate) = store_with_container("s3cret").await;
        certificate.password = Secret::new("wrong".to_string());
        let resolver = CertificateResolver::new(
            Some(store),
            unreadable_fallback(CertificatePolicy::AllowEphemeral, true),
        );

        assert!(matches!(
            resolver.resolve(Some(&certificate)).await,
            Err(SignError::Certificate(CertificateError::WrongPassword))
        ));
    }

    #[tokio::test]
    async fn test_missing_container_propagates() {
        let store = Arc::new(InMemoryStore::new());
        let certificate = DigitalCertificate::new("t1", "t1/missing.pfx", "x");
        let resolver = CertificateResolver::new(
            Some(store),
            settings(CertificatePolicy::AllowEphemeral),
        );

        assert!(matches!(
            resolver.resolve(Some(&certificate)).await,
            Err(SignError::Storage(StorageError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_ephemeral_when_no_certificate() {
        let resolver = CertificateResolver::new(
            Some(Arc::new(InMemoryStore::new())),
            settings(CertificatePolicy::AllowEphemeral),
        );

        let credentials = resolver.resolve(None).await.unwrap();
        assert!(credentials.is_ephemeral());
        assert_eq!(
            credentials.material().info().unwrap().common_name(),
            Some("NF-e Homologacao")
        );
    }

    #[tokio::test]
    async fn test_ephemeral_when_no_store() {
        let certificate = DigitalCertificate::new("t1", "t1/certificate.pfx", "x");
        let resolver =
            CertificateResolver::new(None, settings(CertificatePolicy::AllowEphemeral));

        assert!(resolver
            .resolve(Some(&certificate))
            .await
            .unwrap()
            .is_ephemeral());
    }

    #[tokio::test]
    async fn test_require_real_without_certificate() {
        let resolver = CertificateResolver::new(None, settings(CertificatePolicy::RequireReal));

        assert!(matches!(
            resolver.resolve(None).await,
            Err(SignError::Certificate(
                CertificateError::RealCertificateRequired
            ))
        ));
    }
}
