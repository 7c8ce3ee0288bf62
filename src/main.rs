//! Command-line front end
//!
//! Validates one or more XML documents against a Schematron schema and
//! prints the violated assertions. Built only with the `cli` feature.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use schematron::{documents, Phase, Validator, ValidatorSettings};

#[derive(Parser)]
#[command(
    name = "schematron",
    version,
    about = "Validate XML documents against an ISO Schematron schema"
)]
struct Cli {
    /// Schematron schema file
    schema: PathBuf,

    /// XML documents to validate
    #[arg(required = true)]
    documents: Vec<PathBuf>,

    /// Validation phase: #ALL, #DEFAULT, or a phase name
    #[arg(long, default_value = "#ALL")]
    phase: String,

    /// Stop at the first violated assertion per document
    #[arg(short, long)]
    partial: bool,

    /// Print violation details (-v) and rule information (-vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(all_valid) => {
            if all_valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> schematron::Result<bool> {
    let mut settings = ValidatorSettings::with_phase(Phase::from(cli.phase.as_str()));
    if let Some(parent) = cli.schema.parent() {
        settings.resolver = Some(Box::new(schematron::FileInclusionResolver::with_base_dir(
            parent,
        )));
    }
    let package = documents::parse_file(&cli.schema)?;
    let validator = Validator::create_with_settings(&package, settings)?;

    let mut all_valid = true;
    for path in &cli.documents {
        let document = match documents::parse_file(path) {
            Ok(document) => document,
            Err(e) => {
                eprintln!("{}: {e}", path.display());
                all_valid = false;
                continue;
            }
        };

        let results = validator.validate(&document, !cli.partial)?;
        if results.is_valid() {
            println!("{}: valid", path.display());
            continue;
        }

        all_valid = false;
        println!(
            "{}: invalid ({} violated assertion{})",
            path.display(),
            results.violations().len(),
            if results.violations().len() == 1 { "" } else { "s" }
        );
        if cli.verbose > 0 {
            for violation in results.violations() {
                println!("  {}: {}", violation.location, violation.user_message);
                if cli.verbose > 1 {
                    let kind = if violation.is_report { "report" } else { "assert" };
                    println!(
                        "    {} test='{}' in rule context='{}'",
                        kind, violation.assertion_test, violation.rule_context
                    );
                }
            }
        }
    }
    Ok(all_valid)
}
