//! # Fiscal Code Tables
//!
//! Static lookups the document needs: IBGE state codes and default CFOPs.

use crate::error::{ValidationError, ValidationResult};

/// IBGE code of every UF.
const STATE_CODES: [(&str, u8); 27] = [
    ("RO", 11),
    ("AC", 12),
    ("AM", 13),
    ("RR", 14),
    ("PA", 15),
    ("AP", 16),
    ("TO", 17),
    ("MA", 21),
    ("PI", 22),
    ("CE", 23),
    ("RN", 24),
    ("PB", 25),
    ("PE", 26),
    ("AL", 27),
    ("SE", 28),
    ("BA", 29),
    ("MG", 31),
    ("ES", 32),
    ("RJ", 33),
    ("SP", 35),
    ("PR", 41),
    ("SC", 42),
    ("RS", 43),
    ("MS", 50),
    ("MT", 51),
    ("GO", 52),
    ("DF", 53),
];

/// Resolves a UF abbreviation to its two-digit IBGE code (`cUF`).
///
/// An unknown UF is an error; there is no silent default jurisdiction.
///
/// ```rust
/// use fiscal_core::codes::state_code;
///
/// assert_eq!(state_code("GO").unwrap(), 52);
/// assert_eq!(state_code("sp").unwrap(), 35);
/// assert!(state_code("XX").is_err());
/// ```
pub fn state_code(uf: &str) -> ValidationResult<u8> {
    let uf = uf.trim().to_ascii_uppercase();
    STATE_CODES
        .iter()
        .find(|(abbr, _)| *abbr == uf)
        .map(|(_, code)| *code)
        .ok_or_else(|| ValidationError::InvalidFormat {
            field: "state".to_string(),
            reason: format!("unknown UF '{}'", uf),
        })
}

/// Direction of the goods movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationDirection {
    /// Sale (saída).
    Outbound,
    /// Purchase (entrada).
    Inbound,
}

/// Default CFOP for a plain merchandise sale or purchase.
///
/// ```text
///                 same state   other state
/// Outbound          5102          6102
/// Inbound           1102          2102
/// ```
pub fn default_cfop(direction: OperationDirection, same_state: bool) -> &'static str {
    match (direction, same_state) {
        (OperationDirection::Outbound, true) => "5102",
        (OperationDirection::Outbound, false) => "6102",
        (OperationDirection::Inbound, true) => "1102",
        (OperationDirection::Inbound, false) => "2102",
    }
}
