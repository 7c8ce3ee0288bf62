//! End-to-end validation behavior: rule matching, assertion semantics,
//! phases, abstract constructs, and violation reporting.

use pretty_assertions::assert_eq;
use schematron::{documents, Error, Phase, Validator, ValidatorSettings};
use sxd_document::Package;

const SCH: &str = "http://purl.oclc.org/dsdl/schematron";

fn schema(body: &str) -> String {
    format!(r#"<schema xmlns="{}">{}</schema>"#, SCH, body)
}

fn validator(body: &str) -> Validator {
    Validator::from_str(&schema(body)).unwrap()
}

fn doc(xml: &str) -> Package {
    documents::parse_str(xml).unwrap()
}

#[test]
fn assert_fires_when_test_is_false() {
    let validator = validator(
        r#"<pattern id="p1">
             <rule id="r1" context="/doc/item">
               <assert id="a1" test="@code">item has no code</assert>
             </rule>
           </pattern>"#,
    );

    let results = validator.validate(&doc(r#"<doc><item code="x"/></doc>"#), true).unwrap();
    assert!(results.is_valid());

    let results = validator.validate(&doc("<doc><item/></doc>"), true).unwrap();
    assert!(!results.is_valid());
    assert_eq!(results.violations().len(), 1);

    let violation = &results.violations()[0];
    assert!(!violation.is_report);
    assert_eq!(violation.pattern_id.as_deref(), Some("p1"));
    assert_eq!(violation.rule_id.as_deref(), Some("r1"));
    assert_eq!(violation.assertion_id.as_deref(), Some("a1"));
    assert_eq!(violation.rule_context, "/doc/item");
    assert_eq!(violation.assertion_test, "@code");
    assert_eq!(violation.location, "/doc[1]/item[1]");
    assert_eq!(violation.user_message, "item has no code");
}

#[test]
fn report_fires_when_test_is_true() {
    let validator = validator(
        r#"<pattern>
             <rule context="/doc">
               <report test="deprecated">doc contains deprecated elements</report>
             </rule>
           </pattern>"#,
    );

    assert!(validator.validate(&doc("<doc/>"), true).unwrap().is_valid());

    let results = validator
        .validate(&doc("<doc><deprecated/></doc>"), true)
        .unwrap();
    assert!(!results.is_valid());
    let violation = &results.violations()[0];
    assert!(violation.is_report);
    assert_eq!(violation.assertion_test, "not(deprecated)");
}

#[test]
fn root_element_location_has_position() {
    let validator = validator(
        r#"<pattern><rule context="/a"><assert test="@x">a has no x</assert></rule></pattern>"#,
    );
    let results = validator.validate(&doc("<a/>"), true).unwrap();
    assert_eq!(results.violations()[0].location, "/a[1]");
}

#[test]
fn line_information_is_absent() {
    let validator = validator(
        r#"<pattern><rule context="/a"><assert test="@x">a has no x</assert></rule></pattern>"#,
    );
    let results = validator.validate(&doc("<a/>"), true).unwrap();
    assert_eq!(results.violations()[0].line_number, None);
    assert_eq!(results.violations()[0].line_position, None);
}

#[test]
fn number_result_violates_only_on_nan() {
    let validator = validator(
        r#"<pattern>
             <rule context="/doc"><assert test="number(@count)">count is not a number</assert></rule>
           </pattern>"#,
    );
    assert!(validator
        .validate(&doc(r#"<doc count="3"/>"#), true)
        .unwrap()
        .is_valid());
    // Zero is a number, not a violation.
    assert!(validator
        .validate(&doc(r#"<doc count="0"/>"#), true)
        .unwrap()
        .is_valid());
    assert!(!validator
        .validate(&doc(r#"<doc count="abc"/>"#), true)
        .unwrap()
        .is_valid());
}

#[test]
fn string_result_is_an_error() {
    let validator = validator(
        r#"<pattern><rule context="/doc"><assert test="name()">x</assert></rule></pattern>"#,
    );
    let err = validator.validate(&doc("<doc/>"), true).unwrap_err();
    assert!(matches!(err, Error::UnsupportedResultType(_)));
}

#[test]
fn violations_follow_document_order() {
    let validator = validator(
        r#"<pattern><rule context="//b"><assert test="@x">b has no x</assert></rule></pattern>"#,
    );
    let results = validator
        .validate(&doc("<a><b/><c><b/></c></a>"), true)
        .unwrap();
    let locations: Vec<_> = results
        .violations()
        .iter()
        .map(|v| v.location.clone())
        .collect();
    assert_eq!(locations, vec!["/a[1]/b[1]", "/a[1]/c[1]/b[1]"]);
}

#[test]
fn first_matching_rule_claims_the_node() {
    let validator = validator(
        r#"<pattern>
             <rule context="//item[@special]">
               <assert test="@id">special item has no id</assert>
             </rule>
             <rule context="//item">
               <assert test="@name">item has no name</assert>
             </rule>
           </pattern>"#,
    );
    let results = validator
        .validate(&doc(r#"<doc><item special="y"/><item/></doc>"#), true)
        .unwrap();
    assert_eq!(
        results.messages(),
        vec!["special item has no id", "item has no name"]
    );
}

#[test]
fn rules_in_separate_patterns_both_apply() {
    let validator = validator(
        r#"<pattern>
             <rule context="//item"><assert test="@id">item has no id</assert></rule>
           </pattern>
           <pattern>
             <rule context="//item"><assert test="@name">item has no name</assert></rule>
           </pattern>"#,
    );
    let results = validator.validate(&doc("<doc><item/></doc>"), true).unwrap();
    assert_eq!(results.violations().len(), 2);
}

#[test]
fn partial_validation_stops_at_first_violation() {
    let validator = validator(
        r#"<pattern>
             <rule context="/doc">
               <assert test="@a">no a</assert>
               <assert test="@b">no b</assert>
             </rule>
           </pattern>"#,
    );
    let full = validator.validate(&doc("<doc/>"), true).unwrap();
    assert_eq!(full.violations().len(), 2);

    let partial = validator.validate(&doc("<doc/>"), false).unwrap();
    assert_eq!(partial.violations().len(), 1);
    assert_eq!(partial.messages(), vec!["no a"]);
}

#[test]
fn namespace_bindings_apply_to_expressions() {
    let validator = validator(
        r#"<ns prefix="t" uri="urn:test"/>
           <pattern>
             <rule context="/t:doc"><assert test="t:item">doc has no item</assert></rule>
           </pattern>"#,
    );
    assert!(validator
        .validate(&doc(r#"<doc xmlns="urn:test"><item/></doc>"#), true)
        .unwrap()
        .is_valid());
    assert!(!validator
        .validate(&doc(r#"<doc xmlns="urn:test"/>"#), true)
        .unwrap()
        .is_valid());
    // Same names outside the bound namespace do not match.
    assert!(validator
        .validate(&doc("<doc><item/></doc>"), true)
        .unwrap()
        .is_valid());
}

#[test]
fn relative_context_matches_anywhere() {
    let validator = validator(
        r#"<pattern><rule context="item"><assert test="@id">item has no id</assert></rule></pattern>"#,
    );
    let results = validator
        .validate(&doc("<doc><nested><item/></nested></doc>"), true)
        .unwrap();
    assert_eq!(results.violations().len(), 1);
}

#[test]
fn message_renders_name_and_value_of() {
    let validator = validator(
        r#"<pattern>
             <rule context="/doc/item">
               <assert test="@code">element <name/> with <value-of select="count(@*)"/> attributes has no code</assert>
             </rule>
           </pattern>"#,
    );
    let results = validator
        .validate(&doc(r#"<doc><item name="widget"/></doc>"#), true)
        .unwrap();
    assert_eq!(
        results.messages(),
        vec!["element item with 1 attributes has no code"]
    );
}

#[test]
fn diagnostics_append_to_message() {
    let validator = validator(
        r#"<pattern>
             <rule context="/doc/item">
               <assert test="@code" diagnostics="d1">item <value-of select="@name"/> has no code</assert>
             </rule>
           </pattern>
           <diagnostics>
             <diagnostic id="d1"> (inside <value-of select="name(..)"/>)</diagnostic>
           </diagnostics>"#,
    );
    let results = validator
        .validate(&doc(r#"<doc><item name="widget"/></doc>"#), true)
        .unwrap();
    assert_eq!(
        results.messages(),
        vec!["item widget has no code (inside doc)"]
    );
}

#[test]
fn phase_selection_controls_active_patterns() {
    let xml = schema(
        r#"<phase id="A"><active pattern="p1"/></phase>
           <phase id="B"><active pattern="p2"/></phase>
           <pattern id="p1">
             <rule context="/doc"><assert test="@a">no a</assert></rule>
           </pattern>
           <pattern id="p2">
             <rule context="/doc"><assert test="@b">no b</assert></rule>
           </pattern>"#,
    )
    .replace("<schema", r#"<schema defaultPhase="A""#);
    let package = documents::parse_str(&xml).unwrap();
    let document = doc(r#"<doc a="1"/>"#);

    let all = Validator::create(&package).unwrap();
    assert!(!all.validate(&document, true).unwrap().is_valid());

    let phase_a = Validator::create_with_settings(
        &package,
        ValidatorSettings::with_phase(Phase::Named("A".to_string())),
    )
    .unwrap();
    assert!(phase_a.validate(&document, true).unwrap().is_valid());

    let phase_b = Validator::create_with_settings(
        &package,
        ValidatorSettings::with_phase(Phase::Named("B".to_string())),
    )
    .unwrap();
    assert!(!phase_b.validate(&document, true).unwrap().is_valid());

    let default = Validator::create_with_settings(
        &package,
        ValidatorSettings::with_phase(Phase::Default),
    )
    .unwrap();
    assert!(default.validate(&document, true).unwrap().is_valid());
}

#[test]
fn abstract_pattern_instances_validate() {
    let validator = validator(
        r#"<pattern abstract="true" id="req-attr">
             <rule context="$elem"><assert test="$attr">required attribute missing</assert></rule>
           </pattern>
           <pattern is-a="req-attr" id="check-code">
             <param name="elem" value="/doc/item"/>
             <param name="attr" value="@code"/>
           </pattern>"#,
    );
    assert!(validator
        .validate(&doc(r#"<doc><item code="x"/></doc>"#), true)
        .unwrap()
        .is_valid());

    let results = validator.validate(&doc("<doc><item/></doc>"), true).unwrap();
    assert_eq!(results.messages(), vec!["required attribute missing"]);
    assert_eq!(
        results.violations()[0].pattern_id.as_deref(),
        Some("check-code")
    );
}

#[test]
fn abstract_rules_extend_across_patterns() {
    let validator = validator(
        r#"<pattern id="definitions">
             <rule abstract="true" id="has-id">
               <assert test="@id">element has no id</assert>
             </rule>
           </pattern>
           <pattern id="checks">
             <rule context="/doc/item">
               <extends rule="has-id"/>
               <assert test="@name">element has no name</assert>
             </rule>
           </pattern>"#,
    );
    assert!(validator
        .validate(&doc(r#"<doc><item id="1" name="n"/></doc>"#), true)
        .unwrap()
        .is_valid());

    let results = validator.validate(&doc("<doc><item/></doc>"), true).unwrap();
    assert_eq!(
        results.messages(),
        vec!["element has no id", "element has no name"]
    );
}

#[test]
fn ancillary_markup_is_stripped_from_messages() {
    let validator = validator(
        r#"<title>demo schema</title>
           <pattern>
             <rule context="/doc">
               <assert test="@id">the id <emph>must</emph> be present</assert>
             </rule>
           </pattern>"#,
    );
    let results = validator.validate(&doc("<doc/>"), true).unwrap();
    let message = &results.messages()[0];
    assert!(message.contains("the id"));
    assert!(message.contains("be present"));
    assert!(!message.contains("must"));
}

#[test]
fn invalid_schema_xml_is_an_xml_error() {
    let err = Validator::from_str("<schema").unwrap_err();
    assert!(matches!(err, Error::Xml(_)));
}

#[test]
fn unknown_phase_is_an_argument_error() {
    let xml = schema(
        r#"<phase id="A"><active pattern="p1"/></phase>
           <pattern id="p1"><rule context="/"><assert test="true()">x</assert></rule></pattern>"#,
    );
    let package = documents::parse_str(&xml).unwrap();
    let err = Validator::create_with_settings(
        &package,
        ValidatorSettings::with_phase(Phase::Named("Z".to_string())),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Argument(_)));
}
