//! Compiled schema model
//!
//! The immutable in-memory form of a schema after preprocessing and
//! expression compilation. All query strings have been compiled; message
//! templates carry positional `{n}` placeholders referring into the owning
//! assertion's diagnostic expression list.

use crate::query::Query;

/// A namespace binding declared by a schema `ns` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// Prefix usable in the schema's query expressions
    pub prefix: String,
    /// Namespace URI the prefix binds to
    pub uri: String,
}

/// A compiled schema
#[derive(Debug)]
pub struct Schema {
    /// Schema id, if any
    pub id: Option<String>,
    /// Declared query language binding (`queryBinding` attribute)
    pub query_binding: Option<String>,
    /// Namespace bindings in effect for every expression in the schema
    pub namespaces: Vec<Namespace>,
    /// Patterns in document order
    pub patterns: Vec<Pattern>,
}

/// A compiled pattern
#[derive(Debug)]
pub struct Pattern {
    /// Pattern id, if any
    pub id: Option<String>,
    /// Rules in document order; earlier rules shadow later ones for nodes
    /// matched by both
    pub rules: Vec<Rule>,
}

/// A compiled rule
#[derive(Debug)]
pub struct Rule {
    /// Rule id, if any
    pub id: Option<String>,
    /// Compiled context expression (relative contexts were made absolute
    /// with a `//` prefix during compilation)
    pub context: Query,
    /// Assertions in document order
    pub asserts: Vec<Assert>,
}

/// A compiled assertion (`assert` or `report`)
#[derive(Debug)]
pub struct Assert {
    /// Assertion id, if any
    pub id: Option<String>,
    /// Whether this originated from a `report` element; its stored test is
    /// the negation of the authored one, so the engine treats both kinds
    /// uniformly
    pub is_report: bool,
    /// Compiled test expression
    pub test: Query,
    /// Message template with positional `{n}` placeholders
    pub message: String,
    /// Deduplicated diagnostic expressions referenced by the placeholders
    pub diagnostics: Vec<Query>,
}
