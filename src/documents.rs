//! Thin layer over the XML engine
//!
//! Wraps `sxd-document` parsing, serialization, and the handful of tree
//! manipulations the preprocessor needs: deep copies into fresh packages,
//! cross-package element import, and element iteration helpers. Keeping
//! these in one place keeps the rest of the crate free of engine details.

use sxd_document::dom::{ChildOfElement, ChildOfRoot, Document, Element};
use sxd_document::{parser, writer, Package};

use crate::error::{Error, Result};
use crate::ISO_NAMESPACE;

/// Parse an XML document from a string
pub fn parse_str(xml: &str) -> Result<Package> {
    parser::parse(xml).map_err(|e| Error::Xml(e.to_string()))
}

/// Parse an XML document from a file on disk
pub fn parse_file(path: &std::path::Path) -> Result<Package> {
    let xml = std::fs::read_to_string(path)?;
    parse_str(&xml)
}

/// Serialize a document to an XML string
pub fn serialize(document: &Document<'_>) -> Result<String> {
    let mut buffer = Vec::new();
    writer::format_document(document, &mut buffer).map_err(Error::Io)?;
    String::from_utf8(buffer).map_err(|e| Error::Xml(e.to_string()))
}

/// Root element of a document, if any
pub fn root_element<'d>(document: &Document<'d>) -> Option<Element<'d>> {
    document.root().children().into_iter().find_map(|c| match c {
        ChildOfRoot::Element(e) => Some(e),
        _ => None,
    })
}

/// Deep copy a package into a fresh one.
///
/// Only the root element and its subtree are carried over; prolog comments
/// and processing instructions are irrelevant to schema semantics.
pub fn copy_package(source: &Package) -> Result<Package> {
    let target = Package::new();
    {
        let source_doc = source.as_document();
        let target_doc = target.as_document();
        let root = root_element(&source_doc)
            .ok_or_else(|| Error::Xml("document has no root element".to_string()))?;
        let copied = import_element(&target_doc, root);
        target_doc.root().append_child(copied);
    }
    Ok(target)
}

/// Deep copy an element from one document into another.
///
/// Element and text children are carried over; comments and processing
/// instructions are dropped. Namespace declarations survive through the
/// expanded names and preferred prefixes.
pub fn import_element<'d>(target: &Document<'d>, source: Element<'_>) -> Element<'d> {
    let name = source.name();
    let copied = target.create_element(name);
    if let Some(prefix) = source.preferred_prefix() {
        copied.set_preferred_prefix(Some(prefix));
    }
    for attribute in source.attributes() {
        copied.set_attribute_value(attribute.name(), attribute.value());
    }
    for child in source.children() {
        match child {
            ChildOfElement::Element(e) => {
                let imported = import_element(target, e);
                copied.append_child(imported);
            }
            ChildOfElement::Text(t) => {
                let text = target.create_text(t.text());
                copied.append_child(text);
            }
            _ => {}
        }
    }
    copied
}

/// Replace `old` among its parent element's children with `replacements`,
/// preserving the position of the removed node.
///
/// The engine's `append_child` re-parents nodes, so the surviving siblings
/// are re-appended in order with the replacements spliced in.
pub fn replace_in_parent<'d>(parent: Element<'d>, old: Element<'d>, replacements: &[Element<'d>]) {
    let children = parent.children();
    for child in children {
        match child {
            ChildOfElement::Element(e) if e == old => {
                e.remove_from_parent();
                for replacement in replacements {
                    parent.append_child(*replacement);
                }
            }
            other => {
                parent.append_child(other);
            }
        }
    }
}

/// Element children of an element, in document order
pub fn child_elements(element: Element<'_>) -> Vec<Element<'_>> {
    element
        .children()
        .into_iter()
        .filter_map(|c| match c {
            ChildOfElement::Element(e) => Some(e),
            _ => None,
        })
        .collect()
}

/// All descendant elements of an element, in document order (the element
/// itself is not included)
pub fn descendant_elements(element: Element<'_>) -> Vec<Element<'_>> {
    let mut out = Vec::new();
    collect_descendants(element, &mut out);
    out
}

fn collect_descendants<'d>(element: Element<'d>, out: &mut Vec<Element<'d>>) {
    for child in child_elements(element) {
        out.push(child);
        collect_descendants(child, out);
    }
}

/// Whether an element has the given local name in the ISO Schematron
/// namespace
pub fn is_schematron(element: Element<'_>, local_name: &str) -> bool {
    let name = element.name();
    name.namespace_uri() == Some(ISO_NAMESPACE) && name.local_part() == local_name
}

/// Whether an element is any of the given ISO Schematron local names
pub fn is_schematron_any(element: Element<'_>, local_names: &[&str]) -> bool {
    local_names.iter().any(|n| is_schematron(element, n))
}

/// Concatenated text content of an element's direct text children
pub fn direct_text(element: Element<'_>) -> String {
    element
        .children()
        .into_iter()
        .filter_map(|c| match c {
            ChildOfElement::Text(t) => Some(t.text().to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_root() {
        let package = parse_str("<a><b/><c/></a>").unwrap();
        let doc = package.as_document();
        let root = root_element(&doc).unwrap();
        assert_eq!(root.name().local_part(), "a");
        assert_eq!(child_elements(root).len(), 2);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(parse_str("<a><b></a>"), Err(Error::Xml(_))));
    }

    #[test]
    fn test_copy_package_is_deep() {
        let source = parse_str(r#"<a x="1"><b>hi</b></a>"#).unwrap();
        let copy = copy_package(&source).unwrap();

        let doc = copy.as_document();
        let root = root_element(&doc).unwrap();
        root.set_attribute_value("x", "2");

        let original_doc = source.as_document();
        let original_root = root_element(&original_doc).unwrap();
        assert_eq!(original_root.attribute_value("x"), Some("1"));
        assert_eq!(root.attribute_value("x"), Some("2"));

        let b = child_elements(root)[0];
        assert_eq!(direct_text(b), "hi");
    }

    #[test]
    fn test_import_keeps_namespace() {
        let source = parse_str(
            r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron"><sch:pattern/></sch:schema>"#,
        )
        .unwrap();
        let copy = copy_package(&source).unwrap();
        let doc = copy.as_document();
        let root = root_element(&doc).unwrap();
        assert!(is_schematron(root, "schema"));
        assert!(is_schematron(child_elements(root)[0], "pattern"));
    }

    #[test]
    fn test_replace_in_parent_keeps_position() {
        let package = parse_str("<a><b/><c/><d/></a>").unwrap();
        let doc = package.as_document();
        let root = root_element(&doc).unwrap();
        let c = child_elements(root)[1];

        let x = doc.create_element("x");
        let y = doc.create_element("y");
        replace_in_parent(root, c, &[x, y]);

        let names: Vec<_> = child_elements(root)
            .into_iter()
            .map(|e| e.name().local_part().to_string())
            .collect();
        assert_eq!(names, vec!["b", "x", "y", "d"]);
    }

    #[test]
    fn test_descendant_elements_order() {
        let package = parse_str("<a><b><c/></b><d/></a>").unwrap();
        let doc = package.as_document();
        let root = root_element(&doc).unwrap();
        let names: Vec<_> = descendant_elements(root)
            .into_iter()
            .map(|e| e.name().local_part().to_string())
            .collect();
        assert_eq!(names, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_serialize_round_trip() {
        let package = parse_str("<a><b>text</b></a>").unwrap();
        let xml = serialize(&package.as_document()).unwrap();
        assert!(xml.contains("<b>text</b>"));
    }
}
