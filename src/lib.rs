//! # schematron
//!
//! A native Rust implementation of the ISO Schematron validation language
//! over the XPath 1.0 query binding.
//!
//! ISO Schematron is a relatively simple XML-based language for specifying
//! XML schemas. It expresses a valid document directly as a set of rules and
//! assertions written in an external query language, a different style of
//! validation than the typical grammar-based schemas (DTD, XSD, Relax NG).
//!
//! ## Features
//!
//! - Full schema preprocessing: inclusions, abstract patterns and rules,
//!   phases, diagnostics, `let` variables, documentation markup
//! - Self-validation of schemas against built-in meta-schemas at each
//!   preprocessing checkpoint
//! - Compile once, validate many documents
//! - Full or partial (stop at first violation) validation
//!
//! ## Example
//!
//! ```rust,ignore
//! use schematron::Validator;
//!
//! let validator = Validator::from_str(schema_xml)?;
//! let document = sxd_document::parser::parse(document_xml)?;
//! let results = validator.validate(&document, true)?;
//!
//! assert!(results.is_valid());
//! ```
//!
//! Validation of distinct documents against one compiled schema is cheap;
//! creating the validator carries the preprocessing and XPath compilation
//! cost. A `Validator` is not safe for concurrent use from multiple threads
//! because the underlying compiled expressions make no thread-safety
//! guarantees.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;

pub mod documents;
pub mod resolver;

pub(crate) mod compile;
pub(crate) mod engine;
pub mod model;
pub(crate) mod preprocess;
pub(crate) mod query;
pub(crate) mod resources;
pub mod results;
pub mod validator;

// Re-exports for convenience
pub use error::{Error, Result, SyntaxError};
pub use resolver::{FileInclusionResolver, InclusionResolver};
pub use results::{AssertionInfo, ValidatorResults};
pub use validator::{Phase, Validator, ValidatorSettings};

/// Version of the schematron library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Namespace of the ISO/IEC 19757-3 Schematron vocabulary
pub const ISO_NAMESPACE: &str = "http://purl.oclc.org/dsdl/schematron";

/// Namespace of the pre-ISO Schematron 1.5 vocabulary
pub const ONE_DOT_FIVE_NAMESPACE: &str = "http://www.ascc.net/xml/schematron";
