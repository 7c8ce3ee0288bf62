//! Validation results
//!
//! A validation run produces a [`ValidatorResults`] carrying one
//! [`AssertionInfo`] record per violated assertion, in the order the
//! violations were detected.

/// Information about one violated assertion
#[derive(Debug, Clone)]
pub struct AssertionInfo {
    /// Whether the violated element was a `report` (true) or an `assert`
    pub is_report: bool,
    /// Id of the pattern containing the assertion
    pub pattern_id: Option<String>,
    /// Id of the rule containing the assertion
    pub rule_id: Option<String>,
    /// Context expression of the rule containing the assertion
    pub rule_context: String,
    /// Id of the assertion
    pub assertion_id: Option<String>,
    /// The test expression the engine evaluated; for a `report` this is the
    /// negated form of the authored test
    pub assertion_test: String,
    /// Source line of the violating node, when the engine can supply it
    pub line_number: Option<usize>,
    /// Source column of the violating node, when the engine can supply it
    pub line_position: Option<usize>,
    /// XPath-like location of the violating node within the instance
    /// document
    pub location: String,
    /// Rendered user message with diagnostic values substituted
    pub user_message: String,
}

/// Results of validating one document
#[derive(Debug, Default)]
pub struct ValidatorResults {
    violations: Vec<AssertionInfo>,
}

impl ValidatorResults {
    pub(crate) fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, info: AssertionInfo) {
        self.violations.push(info);
    }

    /// Whether the document satisfied every assertion
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Violated assertions in detection order
    pub fn violations(&self) -> &[AssertionInfo] {
        &self.violations
    }

    /// User messages of all violations, in detection order
    pub fn messages(&self) -> Vec<String> {
        self.violations
            .iter()
            .map(|v| v.user_message.clone())
            .collect()
    }
}
