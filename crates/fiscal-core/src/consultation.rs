//! # Consultation URL Builder
//!
//! Public verification URL printed as a QR code on the DANFE.
//!
//! ```text
//! <endpoint>?chave=<44-digit key>&ambiente=<1|2>
//! ```

use crate::access_key::AccessKey;
use crate::types::Environment;

/// Portal used when no endpoint is configured.
pub const DEFAULT_CONSULTATION_ENDPOINT: &str =
    "http://www.fazenda.go.gov.br/nfeweb/sites/consulta.jsp";

/// Builds the consultation URL for a key.
///
/// Pure string template; the endpoint is validated once when configuration
/// is loaded, not here.
///
/// ```rust
/// use fiscal_core::access_key::AccessKey;
/// use fiscal_core::consultation::build_consultation_url;
/// use fiscal_core::types::Environment;
///
/// let key = AccessKey::parse("52240311222333000181550010000000421123456789").unwrap();
/// let url = build_consultation_url("https://sefaz.example/consulta", &key, Environment::Production);
/// assert_eq!(
///     url,
///     "https://sefaz.example/consulta?chave=52240311222333000181550010000000421123456789&ambiente=1"
/// );
/// ```
pub fn build_consultation_url(
    endpoint: &str,
    access_key: &AccessKey,
    environment: Environment,
) -> String {
    format!(
        "{}?chave={}&ambiente={}",
        endpoint,
        access_key.as_str(),
        environment.code()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_homologation_flag() {
        let key = AccessKey::parse("52240311222333000181550010000000421123456789").unwrap();
        let url = build_consultation_url(
            DEFAULT_CONSULTATION_ENDPOINT,
            &key,
            Environment::Homologation,
        );

        assert!(url.starts_with(DEFAULT_CONSULTATION_ENDPOINT));
        assert!(url.ends_with("?chave=52240311222333000181550010000000421123456789&ambiente=2"));
    }
}
