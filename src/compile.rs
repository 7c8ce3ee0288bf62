//! Schema compilation
//!
//! Turns a schema in canonical minimal syntax (post-preprocessing) into the
//! compiled [`Schema`] model. Deserialization walks the tree into raw
//! string form; compilation then builds every XPath expression, collecting
//! all failures into one aggregated syntax error instead of stopping at
//! the first.

use indexmap::IndexSet;
use sxd_document::dom::{ChildOfElement, Element};
use sxd_document::Package;
use sxd_xpath::Factory;

use crate::documents::{child_elements, is_schematron, root_element};
use crate::error::{Error, Result, SyntaxError};
use crate::model::{Assert, Namespace, Pattern, Rule, Schema};
use crate::query::Query;

/// Compile a canonical-form schema document into the executable model
pub(crate) fn compile_schema(package: &Package) -> Result<Schema> {
    let doc = package.as_document();
    let root = root_element(&doc)
        .ok_or_else(|| Error::Xml("schema document has no root element".to_string()))?;
    let raw = deserialize(root);
    compile(raw)
}

struct RawSchema {
    id: Option<String>,
    query_binding: Option<String>,
    namespaces: Vec<Namespace>,
    patterns: Vec<RawPattern>,
}

struct RawPattern {
    id: Option<String>,
    rules: Vec<RawRule>,
}

struct RawRule {
    id: Option<String>,
    context: Option<String>,
    asserts: Vec<RawAssert>,
}

struct RawAssert {
    id: Option<String>,
    is_report: bool,
    /// Stored test; for a `report`, the authored test wrapped in `not(..)`
    test: Option<String>,
    message: String,
    diagnostics: Vec<String>,
}

fn attr(element: Element<'_>, name: &str) -> Option<String> {
    element.attribute_value(name).map(str::to_string)
}

fn deserialize(root: Element<'_>) -> RawSchema {
    let mut namespaces = Vec::new();
    let mut patterns = Vec::new();

    for child in child_elements(root) {
        if is_schematron(child, "ns") {
            if let (Some(prefix), Some(uri)) = (attr(child, "prefix"), attr(child, "uri")) {
                namespaces.push(Namespace { prefix, uri });
            }
        } else if is_schematron(child, "pattern") {
            patterns.push(deserialize_pattern(child));
        }
    }

    RawSchema {
        id: attr(root, "id"),
        query_binding: attr(root, "queryBinding"),
        namespaces,
        patterns,
    }
}

fn deserialize_pattern(pattern: Element<'_>) -> RawPattern {
    let rules = child_elements(pattern)
        .into_iter()
        .filter(|e| is_schematron(*e, "rule"))
        .map(deserialize_rule)
        .collect();
    RawPattern {
        id: attr(pattern, "id"),
        rules,
    }
}

fn deserialize_rule(rule: Element<'_>) -> RawRule {
    let asserts = child_elements(rule)
        .into_iter()
        .filter_map(|e| {
            if is_schematron(e, "assert") {
                Some(deserialize_assert(e, false))
            } else if is_schematron(e, "report") {
                Some(deserialize_assert(e, true))
            } else {
                None
            }
        })
        .collect();
    RawRule {
        id: attr(rule, "id"),
        context: attr(rule, "context"),
        asserts,
    }
}

/// Flatten an assertion's mixed content into a message template.
///
/// Text passes through verbatim. `name` and `value-of` children become
/// positional `{n}` placeholders referring into the diagnostic expression
/// list; identical expressions share one placeholder.
fn deserialize_assert(assertion: Element<'_>, is_report: bool) -> RawAssert {
    let mut message = String::new();
    let mut expressions: IndexSet<String> = IndexSet::new();

    for child in assertion.children() {
        match child {
            ChildOfElement::Text(t) => message.push_str(t.text()),
            ChildOfElement::Element(e) if is_schematron(e, "name") => {
                let expression = match attr(e, "path") {
                    Some(path) => format!("name({})", path),
                    None => "name()".to_string(),
                };
                let (index, _) = expressions.insert_full(expression);
                message.push_str(&format!("{{{}}}", index));
            }
            ChildOfElement::Element(e) if is_schematron(e, "value-of") => {
                // A select-less value-of is rejected during compilation.
                let expression = attr(e, "select").unwrap_or_default();
                let (index, _) = expressions.insert_full(expression);
                message.push_str(&format!("{{{}}}", index));
            }
            _ => {}
        }
    }

    let test = attr(assertion, "test").map(|t| {
        if is_report {
            format!("not({})", t)
        } else {
            t
        }
    });

    RawAssert {
        id: attr(assertion, "id"),
        is_report,
        test,
        message,
        diagnostics: expressions.into_iter().collect(),
    }
}

fn compile(raw: RawSchema) -> Result<Schema> {
    let factory = Factory::new();
    let mut errors: Vec<String> = Vec::new();
    let mut patterns = Vec::with_capacity(raw.patterns.len());

    for raw_pattern in raw.patterns {
        let mut rules = Vec::with_capacity(raw_pattern.rules.len());
        for raw_rule in raw_pattern.rules {
            match compile_rule(&factory, raw_rule, &mut errors) {
                Some(rule) => rules.push(rule),
                None => continue,
            }
        }
        patterns.push(Pattern {
            id: raw_pattern.id,
            rules,
        });
    }

    if !errors.is_empty() {
        return Err(SyntaxError::new(errors).into());
    }
    Ok(Schema {
        id: raw.id,
        query_binding: raw.query_binding,
        namespaces: raw.namespaces,
        patterns,
    })
}

fn compile_rule(factory: &Factory, raw: RawRule, errors: &mut Vec<String>) -> Option<Rule> {
    let context_source = match raw.context {
        Some(context) => context,
        None => {
            errors.push("rule has no context attribute".to_string());
            return None;
        }
    };
    // A relative context applies anywhere in the document.
    let absolute = if context_source.starts_with('/') {
        context_source.clone()
    } else {
        format!("//{}", context_source)
    };
    let context = match Query::compile(factory, &absolute) {
        Ok(query) => Some(query),
        Err(reason) => {
            errors.push(format!(
                "Invalid XPath 1.0 context='{}': {}",
                context_source, reason
            ));
            None
        }
    };

    let mut asserts = Vec::with_capacity(raw.asserts.len());
    for raw_assert in raw.asserts {
        if let Some(assert) = compile_assert(factory, raw_assert, errors) {
            asserts.push(assert);
        }
    }

    Some(Rule {
        id: raw.id,
        context: context?,
        asserts,
    })
}

fn compile_assert(factory: &Factory, raw: RawAssert, errors: &mut Vec<String>) -> Option<Assert> {
    let test_source = match raw.test {
        Some(test) => test,
        None => {
            errors.push("assertion has no test attribute".to_string());
            return None;
        }
    };
    let test = match Query::compile(factory, &test_source) {
        Ok(query) => Some(query),
        Err(reason) => {
            errors.push(format!(
                "Invalid XPath 1.0 test='{}': {}",
                test_source, reason
            ));
            None
        }
    };

    let mut diagnostics = Vec::with_capacity(raw.diagnostics.len());
    let mut diagnostics_ok = true;
    for source in raw.diagnostics {
        match Query::compile(factory, &source) {
            Ok(query) => diagnostics.push(query),
            Err(reason) => {
                errors.push(format!(
                    "Invalid XPath 1.0 diagnostic='{}': {}",
                    source, reason
                ));
                diagnostics_ok = false;
            }
        }
    }
    if !diagnostics_ok {
        return None;
    }

    Some(Assert {
        id: raw.id,
        is_report: raw.is_report,
        test: test?,
        message: raw.message,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::parse_str;

    const SCH: &str = "http://purl.oclc.org/dsdl/schematron";

    fn canonical(body: &str) -> Package {
        parse_str(&format!(r#"<schema xmlns="{}">{}</schema>"#, SCH, body)).unwrap()
    }

    #[test]
    fn test_compile_minimal_schema() {
        let package = canonical(
            r#"<ns prefix="x" uri="urn:x"/>
               <pattern id="p1">
                 <rule id="r1" context="/x:root">
                   <assert id="a1" test="@version">no version</assert>
                 </rule>
               </pattern>"#,
        );
        let schema = compile_schema(&package).unwrap();

        assert_eq!(schema.namespaces.len(), 1);
        assert_eq!(schema.namespaces[0].prefix, "x");
        assert_eq!(schema.patterns.len(), 1);

        let rule = &schema.patterns[0].rules[0];
        assert_eq!(rule.context.source(), "/x:root");
        assert_eq!(rule.asserts[0].message, "no version");
        assert!(!rule.asserts[0].is_report);
    }

    #[test]
    fn test_relative_context_made_absolute() {
        let package = canonical(
            r#"<pattern><rule context="item"><assert test="@id">x</assert></rule></pattern>"#,
        );
        let schema = compile_schema(&package).unwrap();
        assert_eq!(schema.patterns[0].rules[0].context.source(), "//item");
    }

    #[test]
    fn test_report_test_negated() {
        let package = canonical(
            r#"<pattern><rule context="/"><report test="//deprecated">found</report></rule></pattern>"#,
        );
        let schema = compile_schema(&package).unwrap();
        let assert = &schema.patterns[0].rules[0].asserts[0];
        assert!(assert.is_report);
        assert_eq!(assert.test.source(), "not(//deprecated)");
    }

    #[test]
    fn test_message_placeholders_dedup() {
        let package = canonical(
            r#"<pattern>
                 <rule context="/">
                   <assert test="false()">element <name/> count <value-of select="count(*)"/> named <name/></assert>
                 </rule>
               </pattern>"#,
        );
        let schema = compile_schema(&package).unwrap();
        let assert = &schema.patterns[0].rules[0].asserts[0];
        assert_eq!(assert.message, "element {0} count {1} named {0}");
        assert_eq!(assert.diagnostics.len(), 2);
        assert_eq!(assert.diagnostics[0].source(), "name()");
        assert_eq!(assert.diagnostics[1].source(), "count(*)");
    }

    #[test]
    fn test_name_with_path() {
        let package = canonical(
            r#"<pattern>
                 <rule context="/"><assert test="false()">parent <name path=".."/></assert></rule>
               </pattern>"#,
        );
        let schema = compile_schema(&package).unwrap();
        let assert = &schema.patterns[0].rules[0].asserts[0];
        assert_eq!(assert.diagnostics[0].source(), "name(..)");
    }

    #[test]
    fn test_aggregates_all_compile_errors() {
        let package = canonical(
            r#"<pattern>
                 <rule context="\bad">
                   <assert test="count(">one</assert>
                 </rule>
                 <rule context="/">
                   <report test=")(">two</report>
                 </rule>
               </pattern>"#,
        );
        let err = compile_schema(&package).unwrap_err();
        match err {
            Error::Syntax(syntax) => {
                assert_eq!(syntax.messages.len(), 3);
                assert!(syntax.messages[0].contains("context='\\bad'"));
                assert!(syntax.messages[1].contains("test='count('"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
