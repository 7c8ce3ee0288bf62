//! Built-in meta-schemas
//!
//! Schemas are themselves validated during preprocessing, at three
//! checkpoints: raw syntax right after parsing, referential integrity
//! after inclusion resolution, and canonical form after the abstract and
//! phase machinery has been resolved away. The meta-schemas are ordinary
//! Schematron schemas compiled with preprocessing disabled; compiled
//! validators are cached per thread, since the underlying engine types are
//! not `Sync`.

use once_cell::unsync::OnceCell;
use sxd_document::Package;

use crate::error::{Result, SyntaxError};
use crate::validator::Validator;

/// A self-validation checkpoint in the preprocessing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Checkpoint {
    /// Right after parsing, before inclusion resolution
    RawSyntax,
    /// After inclusion resolution, when all referenced content is present
    PostInclusion,
    /// After abstract patterns/rules, phase, and diagnostics resolution
    CanonicalForm,
}

/// Validate a schema document against a checkpoint's meta-schema.
///
/// All violation messages are folded into one aggregated syntax error.
pub(crate) fn check(checkpoint: Checkpoint, schema_document: &Package) -> Result<()> {
    with_validator(checkpoint, |validator| {
        let results = validator.validate(schema_document, true)?;
        if results.is_valid() {
            Ok(())
        } else {
            Err(SyntaxError::new(results.messages()).into())
        }
    })?
}

thread_local! {
    static RAW_SYNTAX: OnceCell<Validator> = OnceCell::new();
    static POST_INCLUSION: OnceCell<Validator> = OnceCell::new();
    static CANONICAL_FORM: OnceCell<Validator> = OnceCell::new();
}

fn with_validator<R>(checkpoint: Checkpoint, f: impl FnOnce(&Validator) -> R) -> Result<R> {
    let apply = |cell: &OnceCell<Validator>, source: &str| -> Result<R> {
        let validator = cell.get_or_try_init(|| Validator::for_meta_schema(source))?;
        Ok(f(validator))
    };
    match checkpoint {
        Checkpoint::RawSyntax => RAW_SYNTAX.with(|cell| apply(cell, RAW_SYNTAX_SCHEMA)),
        Checkpoint::PostInclusion => POST_INCLUSION.with(|cell| apply(cell, POST_INCLUSION_SCHEMA)),
        Checkpoint::CanonicalForm => CANONICAL_FORM.with(|cell| apply(cell, CANONICAL_FORM_SCHEMA)),
    }
}

/// Raw-syntax meta-schema: structural attribute requirements checked on a
/// freshly parsed schema. Inclusion targets are not yet present, so no
/// referential checks happen here.
const RAW_SYNTAX_SCHEMA: &str = r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
  <ns prefix="sch" uri="http://purl.oclc.org/dsdl/schematron"/>
  <pattern>
    <rule context="/sch:schema">
      <assert test="count(sch:pattern) + count(sch:include) &gt; 0">Schema contains no pattern or include elements.</assert>
      <assert test="not(@queryBinding) or @queryBinding = 'xpath'">Only the xpath query language binding is supported.</assert>
    </rule>
    <rule context="/*[not(self::sch:schema)]">
      <assert test="false()">The root element must be a schema element in the ISO Schematron namespace.</assert>
    </rule>
    <rule context="sch:ns">
      <assert test="@prefix">The ns element has no prefix attribute.</assert>
      <assert test="@uri">The ns element has no uri attribute.</assert>
    </rule>
    <rule context="sch:include">
      <assert test="@href">The include element has no href attribute.</assert>
    </rule>
    <rule context="sch:phase">
      <assert test="@id">The phase element has no id attribute.</assert>
    </rule>
    <rule context="sch:active">
      <assert test="@pattern">The active element has no pattern attribute.</assert>
    </rule>
    <rule context="sch:pattern[@abstract='true']">
      <assert test="@id">An abstract pattern has no id attribute.</assert>
      <assert test="not(@is-a)">A pattern cannot be both abstract and an is-a instance.</assert>
    </rule>
    <rule context="sch:param">
      <assert test="@name">The param element has no name attribute.</assert>
      <assert test="@value">The param element has no value attribute.</assert>
    </rule>
    <rule context="sch:rule[@abstract='true']">
      <assert test="@id">An abstract rule has no id attribute.</assert>
      <assert test="not(@context)">An abstract rule must not carry a context attribute.</assert>
    </rule>
    <rule context="sch:rule">
      <assert test="@context">The rule element has no context attribute.</assert>
    </rule>
    <rule context="sch:extends">
      <assert test="@rule">The extends element has no rule attribute.</assert>
    </rule>
    <rule context="//sch:assert | //sch:report">
      <assert test="@test">An assertion has no test attribute.</assert>
    </rule>
    <rule context="sch:let">
      <assert test="@name">The let element has no name attribute.</assert>
      <assert test="@value">The let element has no value attribute.</assert>
    </rule>
    <rule context="sch:diagnostic">
      <assert test="@id">The diagnostic element has no id attribute.</assert>
    </rule>
  </pattern>
</schema>"#;

/// Post-inclusion meta-schema: the raw-syntax checks repeated over the now
/// complete tree, plus referential integrity between ids and references.
const POST_INCLUSION_SCHEMA: &str = r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
  <ns prefix="sch" uri="http://purl.oclc.org/dsdl/schematron"/>
  <pattern>
    <rule context="/sch:schema">
      <assert test="count(sch:pattern) &gt; 0">Schema contains no pattern elements.</assert>
      <assert test="not(@queryBinding) or @queryBinding = 'xpath'">Only the xpath query language binding is supported.</assert>
      <assert test="not(@defaultPhase) or @defaultPhase = sch:phase/@id">The phase referenced by the defaultPhase attribute is not declared.</assert>
    </rule>
    <rule context="sch:ns">
      <assert test="@prefix">The ns element has no prefix attribute.</assert>
      <assert test="@uri">The ns element has no uri attribute.</assert>
    </rule>
    <rule context="sch:phase">
      <assert test="@id">The phase element has no id attribute.</assert>
    </rule>
    <rule context="sch:active">
      <assert test="@pattern">The active element has no pattern attribute.</assert>
      <assert test="@pattern = //sch:pattern/@id">An active element references an undeclared pattern.</assert>
    </rule>
    <rule context="sch:pattern[@abstract='true']">
      <assert test="@id">An abstract pattern has no id attribute.</assert>
      <assert test="not(@is-a)">A pattern cannot be both abstract and an is-a instance.</assert>
    </rule>
    <rule context="sch:pattern[@is-a]">
      <assert test="@is-a = //sch:pattern[@abstract='true']/@id">An is-a pattern references an undeclared abstract pattern.</assert>
    </rule>
    <rule context="sch:param">
      <assert test="@name">The param element has no name attribute.</assert>
      <assert test="@value">The param element has no value attribute.</assert>
    </rule>
    <rule context="sch:rule[@abstract='true']">
      <assert test="@id">An abstract rule has no id attribute.</assert>
      <assert test="not(@context)">An abstract rule must not carry a context attribute.</assert>
    </rule>
    <rule context="sch:rule">
      <assert test="@context">The rule element has no context attribute.</assert>
    </rule>
    <rule context="sch:extends">
      <assert test="@rule">The extends element has no rule attribute.</assert>
      <assert test="@rule = //sch:rule[@abstract='true']/@id">An extends element references an undeclared abstract rule.</assert>
    </rule>
    <rule context="//sch:assert | //sch:report">
      <assert test="@test">An assertion has no test attribute.</assert>
    </rule>
    <rule context="sch:let">
      <assert test="@name">The let element has no name attribute.</assert>
      <assert test="@value">The let element has no value attribute.</assert>
    </rule>
    <rule context="sch:diagnostic">
      <assert test="@id">The diagnostic element has no id attribute.</assert>
    </rule>
  </pattern>
</schema>"#;

/// Canonical-form meta-schema: after the resolution passes nothing of the
/// abstract, phase, or diagnostics machinery may remain.
const CANONICAL_FORM_SCHEMA: &str = r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
  <ns prefix="sch" uri="http://purl.oclc.org/dsdl/schematron"/>
  <pattern>
    <rule context="/sch:schema">
      <assert test="count(//sch:include) = 0">Inclusions were not fully resolved.</assert>
      <assert test="count(//sch:pattern[@abstract='true']) = 0">Abstract patterns were not fully resolved.</assert>
      <assert test="count(//sch:pattern[@is-a]) = 0">An is-a pattern references an undeclared abstract pattern.</assert>
      <assert test="count(//sch:param) = 0">A param element remains outside an is-a pattern instance.</assert>
      <assert test="count(//sch:rule[@abstract='true']) = 0">Abstract rules were not fully resolved.</assert>
      <assert test="count(//sch:extends) = 0">An extends element references an undeclared abstract rule.</assert>
      <assert test="count(//sch:phase) = 0">Phases were not fully resolved.</assert>
      <assert test="count(//sch:diagnostics) = 0">Diagnostics were not fully resolved.</assert>
    </rule>
    <rule context="sch:rule">
      <assert test="@context">The rule element has no context attribute.</assert>
    </rule>
    <rule context="//sch:assert | //sch:report">
      <assert test="@test">An assertion has no test attribute.</assert>
    </rule>
  </pattern>
</schema>"#;
