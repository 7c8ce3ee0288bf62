//! Error types for the schematron crate
//!
//! This module defines all error types used throughout the library.
//! Schema-syntax problems are aggregated: a failing self-validation
//! checkpoint or expression-compilation stage reports every message it
//! discovered in one error rather than stopping at the first.

use std::fmt;
use thiserror::Error;

/// Result type alias using the schematron Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for schematron operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid argument (null-equivalent input, unresolvable phase name)
    #[error("argument error: {0}")]
    Argument(String),

    /// Schema syntax error aggregating one or more user messages
    #[error("schema syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    /// The include-resolution loop exceeded its step bound, which signals
    /// a likely cyclic reference rather than malformed markup
    #[error(
        "there is a possibility of infinite recursion of include elements; \
         terminated after the maximum of {0} steps"
    )]
    IncludeRecursionOverflow(usize),

    /// An `include/@href` target could not be resolved
    #[error("failed to resolve inclusion '{href}': {reason}")]
    Inclusion {
        /// The unresolvable href value
        href: String,
        /// Why resolution failed
        reason: String,
    },

    /// An XPath expression failed during evaluation
    #[error("query evaluation error: {0}")]
    Query(String),

    /// A compiled expression produced a result type the evaluator does not
    /// understand; indicates an engine mismatch, not a user-recoverable
    /// condition
    #[error("unsupported query result type for expression '{0}'")]
    UnsupportedResultType(String),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One or more schema syntax errors with their user-facing messages.
///
/// Produced by the self-validation checkpoints during preprocessing and by
/// the expression-compilation stage, both of which collect every broken
/// construct they find before failing.
#[derive(Debug, Clone)]
pub struct SyntaxError {
    /// User messages, one per discovered syntax error
    pub messages: Vec<String>,
}

impl SyntaxError {
    /// Create a new syntax error from a collection of user messages
    pub fn new(messages: Vec<String>) -> Self {
        Self { messages }
    }

    /// Create a syntax error carrying a single message
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.messages.len() {
            0 => write!(f, "unspecified schema syntax error"),
            1 => write!(f, "{}", self.messages[0]),
            n => {
                write!(f, "{} syntax errors:", n)?;
                for message in &self.messages {
                    write!(f, "\n  - {}", message)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for SyntaxError {}
