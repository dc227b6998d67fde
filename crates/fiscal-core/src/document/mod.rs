//! # Fiscal Document
//!
//! ```text
//! sections  ──►  builder  ──►  xml (Element tree)  ──►  text
//!                                    ▲
//!                    parser  ◄───────┘ (quick-xml)
//! ```
//!
//! - [`xml`]: ordered element tree, compact / pretty / canonical rendering
//! - [`sections`]: typed `infNFe` sections in layout order
//! - [`builder`]: invoice + items → [`StructuredDocument`]
//! - [`parser`]: text → [`ParsedDocument`] with exact cents

pub mod builder;
pub mod parser;
pub mod sections;
pub mod xml;

pub use builder::{build_document, build_document_with_nonce, BuildOptions, StructuredDocument};
pub use parser::{parse_document, ParsedDocument, ParsedItem};
pub use xml::{Element, Node};
