//! Compiled-expression seam over the XPath engine
//!
//! Everything that touches `sxd-xpath` directly lives here: compiling
//! expression strings, building evaluation contexts from a schema's
//! namespace bindings, and restoring document order on node-sets, which the
//! engine does not guarantee.

use std::fmt;

use sxd_document::dom::{ChildOfElement, ChildOfRoot};
use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Factory, Value, XPath};

use crate::error::{Error, Result};
use crate::model::Namespace;

/// A compiled XPath 1.0 expression together with its source string
pub struct Query {
    source: String,
    xpath: XPath,
}

impl Query {
    /// Compile an expression.
    ///
    /// On failure the engine's diagnostic message is returned so the caller
    /// can fold it into an aggregated syntax error.
    pub fn compile(factory: &Factory, source: &str) -> std::result::Result<Query, String> {
        match factory.build(source) {
            Ok(Some(xpath)) => Ok(Query {
                source: source.to_string(),
                xpath,
            }),
            Ok(None) => Err("empty expression".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    /// The expression source string
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against a node under the given context
    pub fn evaluate<'d>(&self, context: &Context<'d>, node: impl Into<Node<'d>>) -> Result<Value<'d>> {
        self.xpath
            .evaluate(context, node)
            .map_err(|e| Error::Query(format!("'{}': {}", self.source, e)))
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Query").field(&self.source).finish()
    }
}

/// Build an evaluation context carrying the schema's namespace bindings.
///
/// The context registers the XPath 1.0 core function library by default.
pub fn build_context<'d>(namespaces: &[Namespace]) -> Context<'d> {
    let mut context = Context::new();
    for ns in namespaces {
        context.set_namespace(&ns.prefix, &ns.uri);
    }
    context
}

/// Sort nodes into document order.
///
/// The engine's node-sets iterate in an unspecified order; selected rule
/// contexts must be visited in document order, so each node gets a path key
/// computed by walking its ancestry.
pub fn sort_document_order<'d>(nodes: &mut Vec<Node<'d>>) {
    nodes.sort_by_cached_key(|node| sort_key(*node));
}

fn sort_key(node: Node<'_>) -> Vec<(u8, usize)> {
    let mut key = Vec::new();
    let mut current = node;
    while let Some(parent) = current.parent() {
        key.push(position_in_parent(parent, current));
        current = parent;
    }
    key.reverse();
    key
}

// Attributes and namespaces order before child nodes of the same element.
fn position_in_parent(parent: Node<'_>, child: Node<'_>) -> (u8, usize) {
    if let (Node::Element(e), Node::Attribute(a)) = (parent, child) {
        let idx = e
            .attributes()
            .iter()
            .position(|candidate| *candidate == a)
            .unwrap_or(0);
        return (0, idx);
    }
    if let Node::Namespace(_) = child {
        return (0, 0);
    }
    let idx = match parent {
        Node::Root(r) => r
            .children()
            .into_iter()
            .position(|c| root_child_is(c, child))
            .unwrap_or(0),
        Node::Element(e) => e
            .children()
            .into_iter()
            .position(|c| element_child_is(c, child))
            .unwrap_or(0),
        _ => 0,
    };
    (1, idx)
}

fn root_child_is(candidate: ChildOfRoot<'_>, node: Node<'_>) -> bool {
    match (candidate, node) {
        (ChildOfRoot::Element(a), Node::Element(b)) => a == b,
        (ChildOfRoot::Comment(a), Node::Comment(b)) => a == b,
        (ChildOfRoot::ProcessingInstruction(a), Node::ProcessingInstruction(b)) => a == b,
        _ => false,
    }
}

fn element_child_is(candidate: ChildOfElement<'_>, node: Node<'_>) -> bool {
    match (candidate, node) {
        (ChildOfElement::Element(a), Node::Element(b)) => a == b,
        (ChildOfElement::Text(a), Node::Text(b)) => a == b,
        (ChildOfElement::Comment(a), Node::Comment(b)) => a == b,
        (ChildOfElement::ProcessingInstruction(a), Node::ProcessingInstruction(b)) => a == b,
        _ => false,
    }
}
