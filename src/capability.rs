//! Seams to the engines the pipeline drives.
//!
//! Every capability reports internal failures as [`StepError`] values; the
//! pipeline turns them into findings.

use std::path::Path;

use crate::document::XmlDocument;
use crate::error::StepResult;
use crate::message::{Category, Finding, Hint, Severity};

/// One violation reported by a structural (XML Schema) validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub message: String,
    pub line: Option<u32>,
}

impl Violation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

/// One message emitted by a rule transformation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMessage {
    pub severity: Severity,
    pub rule_id: String,
    pub title: String,
    pub description: String,
    pub hints: Vec<Hint>,
}

impl From<RuleMessage> for Finding {
    fn from(message: RuleMessage) -> Self {
        Finding::new(
            message.severity,
            Category::RuleCheck,
            message.title,
            message.description,
        )
        .with_rule_id(message.rule_id)
        .with_hints(message.hints)
    }
}

/// Validates document structure against a schema resource
#[cfg_attr(test, mockall::automock)]
pub trait StructuralValidator: Send + Sync {
    fn validate(&self, document: &XmlDocument, schema: &Path) -> StepResult<Vec<Violation>>;
}

/// Evaluates business rules expressed as a transformation
#[cfg_attr(test, mockall::automock)]
pub trait RuleEvaluator: Send + Sync {
    fn evaluate(&self, document: &XmlDocument, rules: &Path) -> StepResult<Vec<RuleMessage>>;
}

/// Evaluates a boolean predicate expressed as a transformation
#[cfg_attr(test, mockall::automock)]
pub trait PredicateEvaluator: Send + Sync {
    fn evaluate(&self, document: &XmlDocument, predicate: &Path) -> StepResult<bool>;
}
