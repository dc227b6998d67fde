//! # Fiscal Configuration
//!
//! Emission settings, default tax rates and certificate policy.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     FISCAL_ENVIRONMENT=production                                      │
//! │     FISCAL_CERTIFICATE_POLICY=require_real                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/fiscal/fiscal.toml (Linux)                               │
//! │     ~/Library/Application Support/br.fiscal.fiscal/fiscal.toml (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     Homologation, regime normal, ephemeral fallback allowed            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # fiscal.toml
//! [emission]
//! environment = "homologation"  # production | homologation
//! regime = "normal"             # normal | simples_nacional
//!
//! [rates]
//! icms = 1800   # basis points
//! pis = 165
//! cofins = 760
//!
//! [consultation]
//! endpoint = "http://www.fazenda.go.gov.br/nfeweb/sites/consulta.jsp"
//!
//! [certificate]
//! policy = "allow_ephemeral"    # allow_ephemeral | require_real
//!
//! [storage]
//! prefix = "fiscal/documents"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use fiscal_core::consultation::DEFAULT_CONSULTATION_ENDPOINT;
use fiscal_core::types::{DefaultTaxRates, Environment, TaxRegime};
use fiscal_core::BuildOptions;

use crate::error::{SignError, SignResult};

// =============================================================================
// Certificate Policy
// =============================================================================

/// What to do when a tenant has no usable real certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificatePolicy {
    /// Sign with a throwaway self-signed pair (homologation, local testing).
    #[default]
    AllowEphemeral,

    /// Refuse to sign without a real certificate.
    RequireReal,
}

impl std::fmt::Display for CertificatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CertificatePolicy::AllowEphemeral => write!(f, "allow_ephemeral"),
            CertificatePolicy::RequireReal => write!(f, "require_real"),
        }
    }
}

impl std::str::FromStr for CertificatePolicy {
    type Err = SignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "allow_ephemeral" | "ephemeral" => Ok(CertificatePolicy::AllowEphemeral),
            "require_real" | "real" => Ok(CertificatePolicy::RequireReal),
            other => Err(SignError::InvalidConfig(format!(
                "Unknown certificate policy: '{}'. Valid options: allow_ephemeral, require_real",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// `[emission]`: what ends up in `ide` and `infAdic`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionSettings {
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub regime: TaxRegime,

    /// `verProc` of every document.
    #[serde(default = "default_software_version")]
    pub software_version: String,

    #[serde(default = "default_additional_info")]
    pub default_additional_info: String,
}

fn default_software_version() -> String {
    BuildOptions::default().software_version
}

fn default_additional_info() -> String {
    BuildOptions::default().default_additional_info
}

impl Default for EmissionSettings {
    fn default() -> Self {
        EmissionSettings {
            environment: Environment::default(),
            regime: TaxRegime::default(),
            software_version: default_software_version(),
            default_additional_info: default_additional_info(),
        }
    }
}

/// `[consultation]`: public verification portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationSettings {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    DEFAULT_CONSULTATION_ENDPOINT.to_string()
}

impl Default for ConsultationSettings {
    fn default() -> Self {
        ConsultationSettings {
            endpoint: default_endpoint(),
        }
    }
}

/// `[certificate]`: fallback policy and ephemeral pair parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateSettings {
    #[serde(default)]
    pub policy: CertificatePolicy,

    /// Subject CN of the self-signed fallback certificate.
    #[serde(default = "default_common_name")]
    pub ephemeral_common_name: String,

    /// RSA modulus size of the fallback key.
    #[serde(default = "default_key_bits")]
    pub key_bits: u32,

    /// Also fall back when a fetched container cannot be opened (corrupt
    /// bytes, no key, no certificate). A wrong password is never covered.
    /// Only honored under `allow_ephemeral`.
    #[serde(default)]
    pub fallback_on_unreadable: bool,
}

fn default_common_name() -> String {
    "NF-e Homologacao".to_string()
}

fn default_key_bits() -> u32 {
    2048
}

/// Smallest RSA key accepted for the ephemeral pair.
pub const MIN_KEY_BITS: u32 = 2048;

impl Default for CertificateSettings {
    fn default() -> Self {
        CertificateSettings {
            policy: CertificatePolicy::default(),
            ephemeral_common_name: default_common_name(),
            key_bits: default_key_bits(),
            fallback_on_unreadable: false,
        }
    }
}

/// `[storage]`: where signed documents are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Object key prefix; documents land at `<prefix>/<tenant>/<key>.xml`.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "fiscal/documents".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            prefix: default_prefix(),
        }
    }
}

// =============================================================================
// Fiscal Configuration
// =============================================================================

/// Complete configuration of the signing layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FiscalConfig {
    #[serde(default)]
    pub emission: EmissionSettings,

    #[serde(default)]
    pub rates: DefaultTaxRates,

    #[serde(default)]
    pub consultation: ConsultationSettings,

    #[serde(default)]
    pub certificate: CertificateSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl FiscalConfig {
    /// Loads config: defaults, then the TOML file, then `FISCAL_*` variables.
    pub fn load(config_path: Option<PathBuf>) -> SignResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading fiscal config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load fiscal config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SignResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SignError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SignError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SignError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Fiscal config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SignResult<()> {
        let endpoint = url::Url::parse(&self.consultation.endpoint)?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(SignError::InvalidUrl(format!(
                "Consultation endpoint must be http or https, got: {}",
                self.consultation.endpoint
            )));
        }
        if endpoint.query().is_some() {
            return Err(SignError::InvalidUrl(format!(
                "Consultation endpoint must not carry a query string: {}",
                self.consultation.endpoint
            )));
        }

        for (name, rate) in [
            ("icms", self.rates.icms),
            ("ipi", self.rates.ipi),
            ("pis", self.rates.pis),
            ("cofins", self.rates.cofins),
        ] {
            if rate.bps() > 10_000 {
                return Err(SignError::InvalidConfig(format!(
                    "rates.{} must be at most 10000 basis points, got {}",
                    name,
                    rate.bps()
                )));
            }
        }

        if self.certificate.key_bits < MIN_KEY_BITS {
            return Err(SignError::InvalidConfig(format!(
                "certificate.key_bits must be at least {}",
                MIN_KEY_BITS
            )));
        }

        if self.certificate.ephemeral_common_name.trim().is_empty() {
            return Err(SignError::InvalidConfig(
                "certificate.ephemeral_common_name must not be empty".into(),
            ));
        }

        if self.emission.software_version.trim().is_empty() {
            return Err(SignError::InvalidConfig(
                "emission.software_version must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(env) = std::env::var("FISCAL_ENVIRONMENT") {
            match env.parse() {
                Ok(parsed) => {
                    debug!(environment = %env, "Overriding environment from environment");
                    self.emission.environment = parsed;
                }
                Err(e) => warn!(environment = %env, "{}", e),
            }
        }

        if let Ok(regime) = std::env::var("FISCAL_REGIME") {
            match regime.parse() {
                Ok(parsed) => self.emission.regime = parsed,
                Err(e) => warn!(regime = %regime, "{}", e),
            }
        }

        if let Ok(endpoint) = std::env::var("FISCAL_CONSULTATION_ENDPOINT") {
            debug!(endpoint = %endpoint, "Overriding consultation endpoint from environment");
            self.consultation.endpoint = endpoint;
        }

        if let Ok(policy) = std::env::var("FISCAL_CERTIFICATE_POLICY") {
            match policy.parse() {
                Ok(parsed) => {
                    debug!(policy = %policy, "Overriding certificate policy from environment");
                    self.certificate.policy = parsed;
                }
                Err(e) => warn!(policy = %policy, "{}", e),
            }
        }

        if let Ok(flag) = std::env::var("FISCAL_CERTIFICATE_FALLBACK_ON_UNREADABLE") {
            match flag.parse() {
                Ok(parsed) => self.certificate.fallback_on_unreadable = parsed,
                Err(_) => warn!(value = %flag, "Expected true or false"),
            }
        }

        if let Ok(prefix) = std::env::var("FISCAL_STORAGE_PREFIX") {
            self.storage.prefix = prefix;
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("br", "fiscal", "fiscal")
            .map(|dirs| dirs.config_dir().join("fiscal.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// The pure builder options the core consumes.
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            environment: self.emission.environment,
            regime: self.emission.regime,
            software_version: self.emission.software_version.clone(),
            default_additional_info: self.emission.default_additional_info.clone(),
        }
    }

    /// Object key for a signed document.
    pub fn document_object_key(&self, tenant_id: &str, access_key: &str) -> String {
        let prefix = self.storage.prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}/{}.xml", tenant_id, access_key)
        } else {
            format!("{}/{}/{}.xml", prefix, tenant_id, access_key)
        }
    }
}
