//! Schema preprocessing passes
//!
//! A schema goes through a fixed sequence of in-place rewrites before
//! deserialization: inclusion resolution, abstract pattern instantiation,
//! abstract rule expansion, phase selection, diagnostics merging, `let`
//! substitution, and documentation-markup stripping. Each pass takes the
//! working document and rewrites the tree; the caller interleaves
//! self-validation checkpoints between passes.

use sxd_document::dom::{ChildOfElement, Document, Element, ParentOfChild};

use crate::documents::{
    child_elements, descendant_elements, import_element, is_schematron, is_schematron_any,
    replace_in_parent, root_element,
};
use crate::error::{Error, Result};
use crate::resolver::InclusionResolver;

/// Bound on inclusion-resolution steps; exceeding it signals a likely
/// cyclic reference
pub(crate) const MAX_INCLUDE_STEPS: usize = 500;

/// Documentation markup stripped by the final pass
const ANCILLARY_NAMES: [&str; 5] = ["dir", "emph", "p", "span", "title"];

fn schema_root<'d>(doc: &Document<'d>) -> Result<Element<'d>> {
    root_element(doc).ok_or_else(|| Error::Xml("schema document has no root element".to_string()))
}

fn parent_element(element: Element<'_>) -> Result<Element<'_>> {
    match element.parent() {
        Some(ParentOfChild::Element(e)) => Ok(e),
        _ => Err(Error::Xml(format!(
            "unexpected '{}' element at document root",
            element.name().local_part()
        ))),
    }
}

/// Clone an element within its document, dropping the named un-prefixed
/// attributes. The engine exposes no attribute removal, so stripping an
/// attribute means rebuilding the element.
fn clone_without_attributes<'d>(
    doc: &Document<'d>,
    source: Element<'d>,
    skip: &[&str],
) -> Element<'d> {
    let copied = doc.create_element(source.name());
    if let Some(prefix) = source.preferred_prefix() {
        copied.set_preferred_prefix(Some(prefix));
    }
    for attribute in source.attributes() {
        let name = attribute.name();
        if name.namespace_uri().is_none() && skip.contains(&name.local_part()) {
            continue;
        }
        copied.set_attribute_value(name, attribute.value());
    }
    // Moves the children; the source element is expected to be discarded.
    for child in source.children() {
        copied.append_child(child);
    }
    copied
}

/// Replace every `include` element with the root element of its resolved
/// target, repeatedly, until none remain.
///
/// Resolved content may itself contain `include` elements; resolution is
/// bounded at [`MAX_INCLUDE_STEPS`] steps to terminate on cyclic
/// references.
pub(crate) fn resolve_inclusions(
    doc: &Document<'_>,
    resolver: &mut dyn InclusionResolver,
) -> Result<()> {
    for _ in 0..MAX_INCLUDE_STEPS {
        let root = schema_root(doc)?;
        let include = descendant_elements(root)
            .into_iter()
            .find(|e| is_schematron(*e, "include"));
        let include = match include {
            Some(e) => e,
            None => return Ok(()),
        };

        let href = include.attribute_value("href").ok_or_else(|| Error::Inclusion {
            href: String::new(),
            reason: "include element has no href attribute".to_string(),
        })?;
        let href = href.to_string();

        let resolved = resolver.resolve(&href)?;
        let resolved_doc = resolved.as_document();
        let resolved_root = root_element(&resolved_doc).ok_or_else(|| Error::Inclusion {
            href: href.clone(),
            reason: "resolved document has no root element".to_string(),
        })?;

        let imported = import_element(doc, resolved_root);
        let parent = parent_element(include)?;
        replace_in_parent(parent, include, &[imported]);
    }
    Err(Error::IncludeRecursionOverflow(MAX_INCLUDE_STEPS))
}

/// Instantiate `is-a` pattern instances from their abstract templates and
/// remove the templates.
///
/// Each `param` is substituted textually: every `$name` token in rule
/// `context` and assertion `test` attributes of the instantiated copy is
/// replaced by the param value.
pub(crate) fn resolve_abstract_patterns(doc: &Document<'_>) -> Result<()> {
    let root = schema_root(doc)?;

    let patterns: Vec<_> = child_elements(root)
        .into_iter()
        .filter(|e| is_schematron(*e, "pattern"))
        .collect();

    for instance in &patterns {
        let template_id = match instance.attribute_value("is-a") {
            Some(id) => id.to_string(),
            None => continue,
        };
        let template = patterns
            .iter()
            .find(|p| {
                p.attribute_value("abstract") == Some("true")
                    && p.attribute_value("id") == Some(template_id.as_str())
            })
            .copied();
        let template = match template {
            Some(t) => t,
            // Left for the canonical-form checkpoint to reject.
            None => continue,
        };

        let copy = import_element(doc, template);
        let copy = clone_without_attributes(doc, copy, &["abstract", "id"]);
        if let Some(id) = instance.attribute_value("id") {
            copy.set_attribute_value("id", id);
        }

        for param in child_elements(*instance) {
            if !is_schematron(param, "param") {
                continue;
            }
            let (name, value) = match (param.attribute_value("name"), param.attribute_value("value"))
            {
                (Some(n), Some(v)) => (n.to_string(), v.to_string()),
                _ => continue,
            };
            for descendant in descendant_elements(copy) {
                if is_schematron(descendant, "rule") {
                    substitute_in_attribute(descendant, "context", &name, &value);
                } else if is_schematron_any(descendant, &["assert", "report"]) {
                    substitute_in_attribute(descendant, "test", &name, &value);
                }
            }
        }

        replace_in_parent(root, *instance, &[copy]);
    }

    for pattern in patterns {
        if pattern.attribute_value("abstract") == Some("true") {
            pattern.remove_from_parent();
        }
    }
    Ok(())
}

fn substitute_in_attribute(element: Element<'_>, attribute: &str, name: &str, value: &str) {
    if let Some(current) = element.attribute_value(attribute) {
        let token = format!("${}", name);
        if current.contains(&token) {
            let replaced = current.replace(&token, value);
            element.set_attribute_value(attribute, &replaced);
        }
    }
}

/// Expand `extends` elements by splicing deep copies of the referenced
/// abstract rule's child elements, then remove the abstract rules.
///
/// Expansion works from one snapshot of the `extends` sites outside the
/// templates; templates referencing other templates are expanded
/// recursively at each site. A template that transitively extends itself
/// keeps the cyclic `extends` in its output, and an `extends` naming an
/// unknown rule stays in place; both are rejected by the canonical-form
/// checkpoint.
pub(crate) fn resolve_abstract_rules(doc: &Document<'_>) -> Result<()> {
    let root = schema_root(doc)?;
    let all = descendant_elements(root);
    let templates: Vec<_> = all
        .iter()
        .filter(|e| is_schematron(**e, "rule") && e.attribute_value("abstract") == Some("true"))
        .copied()
        .collect();

    for extends in all
        .iter()
        .filter(|e| is_schematron(**e, "extends") && !inside_abstract_rule(**e))
    {
        let target = match extends.attribute_value("rule") {
            Some(id) => id.to_string(),
            None => continue,
        };
        let template = match find_template(&templates, &target) {
            Some(t) => t,
            None => continue,
        };

        let mut expanding = vec![target];
        let copies = expanded_template_content(doc, &templates, template, &mut expanding);
        let parent = parent_element(*extends)?;
        replace_in_parent(parent, *extends, &copies);
    }

    for template in templates {
        template.remove_from_parent();
    }
    Ok(())
}

fn find_template<'d>(templates: &[Element<'d>], id: &str) -> Option<Element<'d>> {
    templates
        .iter()
        .find(|t| t.attribute_value("id") == Some(id))
        .copied()
}

fn inside_abstract_rule(element: Element<'_>) -> bool {
    let mut current = element;
    while let Some(ParentOfChild::Element(parent)) = current.parent() {
        if is_schematron(parent, "rule") && parent.attribute_value("abstract") == Some("true") {
            return true;
        }
        current = parent;
    }
    false
}

/// Deep copies of a template's child elements with nested `extends`
/// expanded in place. `expanding` holds the template ids on the current
/// expansion path; an `extends` back into that path is copied unexpanded,
/// which keeps a cyclic chain finite and leaves evidence for the
/// canonical-form checkpoint.
fn expanded_template_content<'d>(
    doc: &Document<'d>,
    templates: &[Element<'d>],
    template: Element<'d>,
    expanding: &mut Vec<String>,
) -> Vec<Element<'d>> {
    let mut out = Vec::new();
    for child in child_elements(template) {
        if is_schematron(child, "extends") {
            if let Some(target) = child.attribute_value("rule") {
                if !expanding.iter().any(|id| id == target) {
                    if let Some(nested) = find_template(templates, target) {
                        expanding.push(target.to_string());
                        out.extend(expanded_template_content(doc, templates, nested, expanding));
                        expanding.pop();
                        continue;
                    }
                }
            }
        }
        out.push(import_element(doc, child));
    }
    out
}

/// Reduce the schema to the patterns active in the selected phase and
/// remove all `phase` elements.
///
/// With no phase selected (`#ALL`), every pattern stays and the phase
/// machinery is simply stripped. With a named phase, patterns not activated
/// by it are removed, and the phase's `let` bindings move to schema level,
/// shadowing same-named schema bindings.
pub(crate) fn resolve_phase(doc: &Document<'_>, active_phase: Option<&str>) -> Result<()> {
    let root = schema_root(doc)?;
    let phases: Vec<_> = child_elements(root)
        .into_iter()
        .filter(|e| is_schematron(*e, "phase"))
        .collect();

    let name = match active_phase {
        Some(name) => name,
        None => {
            for phase in phases {
                phase.remove_from_parent();
            }
            return Ok(());
        }
    };

    let selected = phases
        .iter()
        .find(|p| p.attribute_value("id") == Some(name))
        .copied()
        .ok_or_else(|| Error::Argument(format!("phase '{}' is not declared in the schema", name)))?;

    let active_patterns: Vec<String> = child_elements(selected)
        .into_iter()
        .filter(|e| is_schematron(*e, "active"))
        .filter_map(|e| e.attribute_value("pattern").map(str::to_string))
        .collect();
    let phase_lets: Vec<_> = child_elements(selected)
        .into_iter()
        .filter(|e| is_schematron(*e, "let"))
        .collect();
    let phase_let_names: Vec<String> = phase_lets
        .iter()
        .filter_map(|e| e.attribute_value("name").map(str::to_string))
        .collect();

    for pattern in child_elements(root) {
        if !is_schematron(pattern, "pattern") {
            continue;
        }
        let keep = pattern
            .attribute_value("id")
            .map(|id| active_patterns.iter().any(|a| a == id))
            .unwrap_or(false);
        if !keep {
            pattern.remove_from_parent();
        }
    }

    // Phase bindings shadow schema-level bindings of the same name.
    for let_element in child_elements(root) {
        if !is_schematron(let_element, "let") {
            continue;
        }
        let shadowed = let_element
            .attribute_value("name")
            .map(|n| phase_let_names.iter().any(|p| p == n))
            .unwrap_or(false);
        if shadowed {
            let_element.remove_from_parent();
        }
    }

    for phase in phases {
        if phase == selected {
            replace_in_parent(root, phase, &phase_lets);
        } else {
            phase.remove_from_parent();
        }
    }
    Ok(())
}

/// Merge referenced `diagnostic` content into each assertion and remove
/// the `diagnostics` containers.
///
/// The content of each diagnostic named by an assertion's `diagnostics`
/// attribute is appended to the assertion, after which the attribute is
/// dropped. References to undeclared diagnostics are ignored.
pub(crate) fn resolve_diagnostics(doc: &Document<'_>) -> Result<()> {
    let root = schema_root(doc)?;
    let all = descendant_elements(root);
    let diagnostics: Vec<_> = all
        .iter()
        .filter(|e| is_schematron(**e, "diagnostic"))
        .copied()
        .collect();

    for assertion in all
        .iter()
        .filter(|e| is_schematron_any(**e, &["assert", "report"]))
    {
        let references = match assertion.attribute_value("diagnostics") {
            Some(refs) => refs.to_string(),
            None => continue,
        };

        for reference in references.split_whitespace() {
            let diagnostic = diagnostics
                .iter()
                .find(|d| d.attribute_value("id") == Some(reference))
                .copied();
            let diagnostic = match diagnostic {
                Some(d) => d,
                None => continue,
            };
            for child in diagnostic.children() {
                match child {
                    ChildOfElement::Element(e) => {
                        let copy = import_element(doc, e);
                        assertion.append_child(copy);
                    }
                    ChildOfElement::Text(t) => {
                        let copy = doc.create_text(t.text());
                        assertion.append_child(copy);
                    }
                    _ => {}
                }
            }
        }

        let stripped = clone_without_attributes(doc, *assertion, &["diagnostics"]);
        let parent = parent_element(*assertion)?;
        replace_in_parent(parent, *assertion, &[stripped]);
    }

    let root = schema_root(doc)?;
    for container in descendant_elements(root) {
        if is_schematron(container, "diagnostics") {
            container.remove_from_parent();
        }
    }
    Ok(())
}

/// Substitute `let` bindings into query-bearing attributes and remove the
/// `let` elements.
///
/// Scoping is innermost-first: rule bindings apply to the rule's
/// descendants, pattern bindings to the pattern's, schema bindings to the
/// whole schema. Pattern and schema bindings also reach rule `context`
/// attributes; rule bindings do not, since a rule's context is evaluated
/// outside the rule's own scope.
pub(crate) fn resolve_lets(doc: &Document<'_>) -> Result<()> {
    let root = schema_root(doc)?;

    for rule in descendant_elements(root) {
        if !is_schematron(rule, "rule") {
            continue;
        }
        for (name, value) in take_let_bindings(rule) {
            for descendant in descendant_elements(rule) {
                substitute_in_query_attributes(descendant, &name, &value, false);
            }
        }
    }

    for pattern in child_elements(root) {
        if !is_schematron(pattern, "pattern") {
            continue;
        }
        for (name, value) in take_let_bindings(pattern) {
            for descendant in descendant_elements(pattern) {
                substitute_in_query_attributes(descendant, &name, &value, true);
            }
        }
    }

    for (name, value) in take_let_bindings(root) {
        for descendant in descendant_elements(root) {
            substitute_in_query_attributes(descendant, &name, &value, true);
        }
    }
    Ok(())
}

/// Collect and remove the direct `let` children of an element
fn take_let_bindings(element: Element<'_>) -> Vec<(String, String)> {
    let mut bindings = Vec::new();
    for child in child_elements(element) {
        if !is_schematron(child, "let") {
            continue;
        }
        if let (Some(name), Some(value)) =
            (child.attribute_value("name"), child.attribute_value("value"))
        {
            bindings.push((name.to_string(), value.to_string()));
        }
        child.remove_from_parent();
    }
    bindings
}

fn substitute_in_query_attributes(
    element: Element<'_>,
    name: &str,
    value: &str,
    include_contexts: bool,
) {
    if is_schematron_any(element, &["assert", "report"]) {
        substitute_in_attribute(element, "test", name, value);
    } else if is_schematron(element, "name") {
        substitute_in_attribute(element, "path", name, value);
    } else if is_schematron(element, "value-of") {
        substitute_in_attribute(element, "select", name, value);
    } else if include_contexts && is_schematron(element, "rule") {
        substitute_in_attribute(element, "context", name, value);
    }
}

/// Strip documentation markup (`dir`, `emph`, `p`, `span`, `title`)
/// everywhere in the schema
pub(crate) fn resolve_ancillary_elements(doc: &Document<'_>) -> Result<()> {
    let root = schema_root(doc)?;
    for element in descendant_elements(root) {
        if is_schematron_any(element, &ANCILLARY_NAMES) {
            element.remove_from_parent();
        }
    }
    Ok(())
}
