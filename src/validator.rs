//! Validator facade
//!
//! [`Validator`] ties the pipeline together: copy the schema document,
//! run the checkpointed preprocessing passes, compile the canonical form,
//! and expose validation of instance documents. A validator is created
//! once per schema and reused across documents.

use std::path::Path;

use sxd_document::Package;

use crate::compile;
use crate::documents;
use crate::engine;
use crate::error::{Error, Result};
use crate::model::Schema;
use crate::preprocess;
use crate::resolver::{FileInclusionResolver, InclusionResolver};
use crate::resources::{self, Checkpoint};
use crate::results::ValidatorResults;

/// Phase selection for validator creation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    /// Ignore phases; all patterns are active (`#ALL`)
    #[default]
    All,
    /// Use the phase named by the schema's `defaultPhase` attribute
    /// (`#DEFAULT`)
    Default,
    /// Use the named phase
    Named(String),
}

impl From<&str> for Phase {
    fn from(name: &str) -> Self {
        match name {
            "#ALL" => Phase::All,
            "#DEFAULT" => Phase::Default,
            other => Phase::Named(other.to_string()),
        }
    }
}

/// Settings for validator creation
pub struct ValidatorSettings {
    /// Phase to activate
    pub phase: Phase,
    /// Resolver for `include/@href` references; a [`FileInclusionResolver`]
    /// with no base directory is used when unset
    pub resolver: Option<Box<dyn InclusionResolver>>,
    /// Disabled only for the built-in meta-schemas, which are already in
    /// canonical form
    pub(crate) preprocessing: bool,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            phase: Phase::All,
            resolver: None,
            preprocessing: true,
        }
    }
}

impl ValidatorSettings {
    /// Settings with the given phase and defaults otherwise
    pub fn with_phase(phase: Phase) -> Self {
        Self {
            phase,
            ..Self::default()
        }
    }
}

/// A compiled Schematron validator
#[derive(Debug)]
pub struct Validator {
    schema: Schema,
    min_syntax: String,
}

impl Validator {
    /// Create a validator from a parsed schema document with default
    /// settings (`#ALL` phase, filesystem inclusion resolution)
    pub fn create(schema: &Package) -> Result<Validator> {
        Self::create_with_settings(schema, ValidatorSettings::default())
    }

    /// Create a validator from a parsed schema document.
    ///
    /// The schema document is deep-copied first; preprocessing never
    /// touches the caller's tree.
    pub fn create_with_settings(
        schema: &Package,
        mut settings: ValidatorSettings,
    ) -> Result<Validator> {
        let work = documents::copy_package(schema)?;
        if settings.preprocessing {
            let phase = determine_phase(&work, &settings.phase)?;
            preprocess_checked(&work, phase.as_deref(), &mut settings)?;
        }
        let min_syntax = documents::serialize(&work.as_document())?;
        let schema = compile::compile_schema(&work)?;
        Ok(Validator { schema, min_syntax })
    }

    /// Create a validator from schema XML text
    pub fn from_str(xml: &str) -> Result<Validator> {
        Self::create(&documents::parse_str(xml)?)
    }

    /// Create a validator from a schema file.
    ///
    /// Relative `include/@href` values resolve against the schema file's
    /// directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Validator> {
        let path = path.as_ref();
        let package = documents::parse_file(path)?;
        let mut settings = ValidatorSettings::default();
        if let Some(parent) = path.parent() {
            settings.resolver = Some(Box::new(FileInclusionResolver::with_base_dir(parent)));
        }
        Self::create_with_settings(&package, settings)
    }

    /// Compile a built-in meta-schema, which is already canonical
    pub(crate) fn for_meta_schema(xml: &str) -> Result<Validator> {
        let package = documents::parse_str(xml)?;
        let schema = compile::compile_schema(&package)?;
        Ok(Validator {
            schema,
            min_syntax: xml.to_string(),
        })
    }

    /// Validate an instance document.
    ///
    /// With `full_validation` every assertion is evaluated; without it
    /// validation stops at the first violation.
    pub fn validate(&self, document: &Package, full_validation: bool) -> Result<ValidatorResults> {
        engine::validate(&self.schema, document, full_validation)
    }

    /// The preprocessed schema in canonical minimal syntax, serialized as
    /// XML
    pub fn min_syntax(&self) -> &str {
        &self.min_syntax
    }
}

/// Resolve the phase selection against the raw schema document.
///
/// `#DEFAULT` requires the schema root to carry a `defaultPhase`
/// attribute. Whether a named phase is actually declared is checked later,
/// once inclusions have been resolved.
fn determine_phase(work: &Package, phase: &Phase) -> Result<Option<String>> {
    match phase {
        Phase::All => Ok(None),
        Phase::Named(name) => Ok(Some(name.clone())),
        Phase::Default => {
            let doc = work.as_document();
            let root = documents::root_element(&doc)
                .ok_or_else(|| Error::Xml("schema document has no root element".to_string()))?;
            match root.attribute_value("defaultPhase") {
                Some(name) => Ok(Some(name.to_string())),
                None => Err(Error::Argument(
                    "the #DEFAULT phase was requested but the schema has no defaultPhase attribute"
                        .to_string(),
                )),
            }
        }
    }
}

/// Run the preprocessing passes with self-validation checkpoints between
/// them
fn preprocess_checked(
    work: &Package,
    phase: Option<&str>,
    settings: &mut ValidatorSettings,
) -> Result<()> {
    resources::check(Checkpoint::RawSyntax, work)?;

    {
        let doc = work.as_document();
        let mut default_resolver;
        let resolver: &mut dyn InclusionResolver = match settings.resolver.as_mut() {
            Some(resolver) => resolver.as_mut(),
            None => {
                default_resolver = FileInclusionResolver::new();
                &mut default_resolver
            }
        };
        preprocess::resolve_inclusions(&doc, resolver)?;
    }
    resources::check(Checkpoint::PostInclusion, work)?;

    let doc = work.as_document();
    preprocess::resolve_abstract_patterns(&doc)?;
    preprocess::resolve_abstract_rules(&doc)?;
    preprocess::resolve_phase(&doc, phase)?;
    preprocess::resolve_diagnostics(&doc)?;
    resources::check(Checkpoint::CanonicalForm, work)?;

    preprocess::resolve_lets(&doc)?;
    preprocess::resolve_ancillary_elements(&doc)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCH: &str = "http://purl.oclc.org/dsdl/schematron";

    fn schema(body: &str) -> String {
        format!(r#"<schema xmlns="{}">{}</schema>"#, SCH, body)
    }

    #[test]
    fn test_create_and_validate() {
        let validator = Validator::from_str(&schema(
            r#"<pattern>
                 <rule context="/item">
                   <assert test="@id">item has no id</assert>
                 </rule>
               </pattern>"#,
        ))
        .unwrap();

        let valid = documents::parse_str(r#"<item id="1"/>"#).unwrap();
        assert!(validator.validate(&valid, true).unwrap().is_valid());

        let invalid = documents::parse_str("<item/>").unwrap();
        let results = validator.validate(&invalid, true).unwrap();
        assert!(!results.is_valid());
        assert_eq!(results.messages(), vec!["item has no id"]);
    }

    #[test]
    fn test_default_phase_requires_attribute() {
        let xml = schema(
            r#"<pattern id="p"><rule context="/"><assert test="true()">x</assert></rule></pattern>"#,
        );
        let package = documents::parse_str(&xml).unwrap();
        let err = Validator::create_with_settings(
            &package,
            ValidatorSettings::with_phase(Phase::Default),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn test_unknown_named_phase_is_argument_error() {
        let xml = schema(
            r#"<phase id="known"><active pattern="p"/></phase>
               <pattern id="p"><rule context="/"><assert test="true()">x</assert></rule></pattern>"#,
        );
        let package = documents::parse_str(&xml).unwrap();
        let err = Validator::create_with_settings(
            &package,
            ValidatorSettings::with_phase(Phase::Named("unknown".to_string())),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn test_min_syntax_is_canonical() {
        let validator = Validator::from_str(&schema(
            r#"<phase id="p1"><active pattern="a"/></phase>
               <pattern id="a">
                 <rule context="/"><assert test="true()">ok</assert></rule>
               </pattern>"#,
        ))
        .unwrap();
        let min = validator.min_syntax();
        assert!(min.contains("pattern"));
        assert!(!min.contains("phase"));
    }

    #[test]
    fn test_source_schema_untouched() {
        let xml = schema(
            r#"<phase id="p1"><active pattern="a"/></phase>
               <pattern id="a">
                 <rule context="/"><assert test="true()">ok</assert></rule>
               </pattern>"#,
        );
        let package = documents::parse_str(&xml).unwrap();
        Validator::create(&package).unwrap();

        let doc = package.as_document();
        let root = documents::root_element(&doc).unwrap();
        let phases = documents::child_elements(root)
            .into_iter()
            .filter(|e| documents::is_schematron(*e, "phase"))
            .count();
        assert_eq!(phases, 1);
    }

    #[test]
    fn test_phase_from_str() {
        assert_eq!(Phase::from("#ALL"), Phase::All);
        assert_eq!(Phase::from("#DEFAULT"), Phase::Default);
        assert_eq!(Phase::from("mine"), Phase::Named("mine".to_string()));
    }
}
