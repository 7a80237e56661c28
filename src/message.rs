//! Finding vocabulary shared by every stage of a validation run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How serious a finding is. Only `Fatal` makes a document invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "Info",
            Severity::Warning => "Warning",
            Severity::Fatal => "Fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stage that produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Empty or malformed input, raised before the pipeline starts
    WellFormedness,
    Configuration,
    SchemaDetection,
    StructuralSchema,
    RuleCheck,
    Filter,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::WellFormedness => "WellFormedness",
            Category::Configuration => "Configuration",
            Category::SchemaDetection => "SchemaDetection",
            Category::StructuralSchema => "StructuralSchema",
            Category::RuleCheck => "RuleCheck",
            Category::Filter => "Filter",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remediation guidance attached to a finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub title: String,
    pub description: String,
}

impl Hint {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

/// One reported issue or note. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub category: Category,
    /// Originating rule, empty when the finding is not rule-scoped
    pub rule_id: String,
    pub title: String,
    pub description: String,
    pub hints: Vec<Hint>,
}

impl Finding {
    pub fn new(
        severity: Severity,
        category: Category,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            rule_id: String::new(),
            title: title.into(),
            description: description.into(),
            hints: Vec::new(),
        }
    }

    /// Shorthand for the fatal findings every failure path produces
    pub fn fatal(
        category: Category,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Fatal, category, title, description)
    }

    pub fn with_rule_id(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = rule_id.into();
        self
    }

    pub fn with_hints(mut self, hints: Vec<Hint>) -> Self {
        self.hints = hints;
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

/// The findings collected by one validation run.
///
/// Insertion order is preserved; removal by rule id keeps the relative
/// order of the survivors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Findings {
    items: Vec<Finding>,
}

impl Findings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, finding: Finding) {
        self.items.push(finding);
    }

    pub fn extend(&mut self, findings: impl IntoIterator<Item = Finding>) {
        self.items.extend(findings);
    }

    /// Remove every finding carrying `rule_id`, returning how many were removed
    pub fn remove_rule(&mut self, rule_id: &str) -> usize {
        let before = self.items.len();
        self.items.retain(|finding| finding.rule_id != rule_id);
        before - self.items.len()
    }

    pub fn has_fatal(&self) -> bool {
        self.items.iter().any(Finding::is_fatal)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.items
            .iter()
            .filter(|finding| finding.severity == severity)
            .count()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Finding> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[Finding] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Finding> {
        self.items
    }
}

impl From<Vec<Finding>> for Findings {
    fn from(items: Vec<Finding>) -> Self {
        Self { items }
    }
}

impl<'a> IntoIterator for &'a Findings {
    type Item = &'a Finding;
    type IntoIter = std::slice::Iter<'a, Finding>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
