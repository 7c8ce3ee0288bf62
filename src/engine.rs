//! Validation engine
//!
//! Walks a compiled schema against an instance document: patterns in
//! order, rules in order, rule contexts in document order, assertions in
//! order. Within a pattern, the first rule whose context selects a node
//! owns that node; later rules skip it. Short-circuiting for partial
//! validation threads through the loops as `ControlFlow`.

use std::ops::ControlFlow;

use sxd_document::dom::{self, ParentOfChild};
use sxd_document::Package;
use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Value};

use crate::error::{Error, Result};
use crate::model::{Assert, Pattern, Rule, Schema};
use crate::query::{self, Query};
use crate::results::{AssertionInfo, ValidatorResults};

/// Validate a document against a compiled schema.
///
/// With `full_validation` the whole schema is evaluated; without it the
/// run stops at the first violated assertion.
pub(crate) fn validate(
    schema: &Schema,
    document: &Package,
    full_validation: bool,
) -> Result<ValidatorResults> {
    let context = query::build_context(&schema.namespaces);
    let doc = document.as_document();

    let mut evaluator = Evaluator {
        context,
        root: doc.root(),
        full_validation,
        results: ValidatorResults::new(),
    };
    for pattern in &schema.patterns {
        if let ControlFlow::Break(()) = evaluator.evaluate_pattern(pattern)? {
            break;
        }
    }
    Ok(evaluator.results)
}

struct Evaluator<'d> {
    context: Context<'d>,
    root: dom::Root<'d>,
    full_validation: bool,
    results: ValidatorResults,
}

impl<'d> Evaluator<'d> {
    fn evaluate_pattern(&mut self, pattern: &Pattern) -> Result<ControlFlow<()>> {
        // Nodes already claimed by an earlier rule of this pattern.
        let mut fired: Vec<Node<'d>> = Vec::new();
        for rule in &pattern.rules {
            if let ControlFlow::Break(()) = self.evaluate_rule(pattern, rule, &mut fired)? {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn evaluate_rule(
        &mut self,
        pattern: &Pattern,
        rule: &Rule,
        fired: &mut Vec<Node<'d>>,
    ) -> Result<ControlFlow<()>> {
        let value = rule.context.evaluate(&self.context, self.root)?;
        let nodeset = match value {
            Value::Nodeset(nodeset) => nodeset,
            _ => {
                return Err(Error::Query(format!(
                    "rule context '{}' did not select a node-set",
                    rule.context.source()
                )))
            }
        };

        let mut nodes: Vec<Node<'d>> = nodeset.iter().collect();
        query::sort_document_order(&mut nodes);

        for node in nodes {
            if fired.contains(&node) {
                continue;
            }
            fired.push(node);

            for assert in &rule.asserts {
                if let ControlFlow::Break(()) = self.evaluate_assert(pattern, rule, assert, node)? {
                    return Ok(ControlFlow::Break(()));
                }
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn evaluate_assert(
        &mut self,
        pattern: &Pattern,
        rule: &Rule,
        assert: &Assert,
        node: Node<'d>,
    ) -> Result<ControlFlow<()>> {
        let violated = match assert.test.evaluate(&self.context, node)? {
            Value::Boolean(satisfied) => !satisfied,
            Value::Number(number) => number.is_nan(),
            Value::Nodeset(nodeset) => nodeset.size() == 0,
            Value::String(_) => {
                return Err(Error::UnsupportedResultType(
                    assert.test.source().to_string(),
                ))
            }
        };
        if !violated {
            return Ok(ControlFlow::Continue(()));
        }

        let user_message = self.render_message(assert, node)?;
        self.results.push(AssertionInfo {
            is_report: assert.is_report,
            pattern_id: pattern.id.clone(),
            rule_id: rule.id.clone(),
            rule_context: rule.context.source().to_string(),
            assertion_id: assert.id.clone(),
            assertion_test: assert.test.source().to_string(),
            line_number: None,
            line_position: None,
            location: node_location(node),
            user_message,
        });

        if self.full_validation {
            Ok(ControlFlow::Continue(()))
        } else {
            Ok(ControlFlow::Break(()))
        }
    }

    /// Render an assertion's user message by evaluating its diagnostic
    /// expressions at the violating node and substituting the results into
    /// the positional placeholders.
    fn render_message(&self, assert: &Assert, node: Node<'d>) -> Result<String> {
        if assert.diagnostics.is_empty() {
            return Ok(assert.message.trim().to_string());
        }

        let mut values = Vec::with_capacity(assert.diagnostics.len());
        for diagnostic in &assert.diagnostics {
            values.push(self.render_diagnostic(diagnostic, node)?);
        }
        Ok(substitute_placeholders(&assert.message, &values)
            .trim()
            .to_string())
    }

    fn render_diagnostic(&self, diagnostic: &Query, node: Node<'d>) -> Result<String> {
        let rendered = match diagnostic.evaluate(&self.context, node)? {
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => format_number(n),
            Value::String(s) => s,
            Value::Nodeset(nodeset) => {
                let mut nodes: Vec<Node<'d>> = nodeset.iter().collect();
                query::sort_document_order(&mut nodes);
                nodes
                    .first()
                    .map(|n| n.string_value())
                    .unwrap_or_default()
            }
        };
        Ok(rendered)
    }
}

/// Replace `{n}` placeholders with the n-th value. Braces that do not form
/// a placeholder, and placeholders without a value, pass through verbatim.
fn substitute_placeholders(template: &str, values: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) if !after[..end].is_empty() && after[..end].bytes().all(|b| b.is_ascii_digit()) =>
            {
                match after[..end].parse::<usize>().ok().and_then(|i| values.get(i)) {
                    Some(value) => {
                        out.push_str(value);
                        rest = &after[end + 1..];
                    }
                    None => {
                        out.push('{');
                        rest = after;
                    }
                }
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// XPath-style rendering of a number: integral values print without a
/// fractional part
fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Build an XPath-like location for a node: element steps carry 1-based
/// same-name sibling positions, attributes render as `@name`, text nodes
/// as `text()`.
fn node_location(node: Node<'_>) -> String {
    let mut segments = Vec::new();
    let mut current = Some(node);
    while let Some(node) = current {
        match node {
            Node::Element(e) => {
                segments.push(format!("{}[{}]", qualified_name(e), element_position(e)));
            }
            Node::Attribute(a) => {
                let name = a.name();
                let step = match a.preferred_prefix() {
                    Some(prefix) => format!("@{}:{}", prefix, name.local_part()),
                    None => format!("@{}", name.local_part()),
                };
                segments.push(step);
            }
            Node::Text(_) => segments.push("text()".to_string()),
            Node::Root(_) => break,
            _ => {}
        }
        current = node.parent();
    }
    segments.reverse();
    format!("/{}", segments.join("/"))
}

fn qualified_name(element: dom::Element<'_>) -> String {
    let name = element.name();
    match element.preferred_prefix() {
        Some(prefix) => format!("{}:{}", prefix, name.local_part()),
        None => name.local_part().to_string(),
    }
}

/// 1-based position of an element among its same-name element siblings
fn element_position(element: dom::Element<'_>) -> usize {
    let parent = match element.parent() {
        Some(ParentOfChild::Element(p)) => p,
        _ => return 1,
    };
    let mut position = 0;
    for sibling in crate::documents::child_elements(parent) {
        if sibling.name() == element.name() {
            position += 1;
        }
        if sibling == element {
            break;
        }
    }
    position.max(1)
}
