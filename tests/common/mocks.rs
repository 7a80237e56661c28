use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rule_validator::error::{StepError, StepResult};
use rule_validator::{
    Hint, PipelineEngine, PredicateEvaluator, RuleEvaluator, RuleMessage, Severity,
    StructuralValidator, Violation, XmlDocument,
};

/// Canned answer for one resource
#[derive(Clone, Debug)]
pub enum Scripted {
    Violations(Vec<Violation>),
    Messages(Vec<RuleMessage>),
    Predicate(bool),
    Fail(StepError),
}

/// Capabilities that answer from a table keyed by resource path and record
/// every resource they were asked about, in order
#[derive(Default)]
pub struct ScriptedEngine {
    responses: HashMap<PathBuf, Scripted>,
    calls: Mutex<Vec<PathBuf>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, resource: impl Into<PathBuf>, answer: Scripted) -> Self {
        self.responses.insert(resource.into(), answer);
        self
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }

    pub fn pipeline(self: &Arc<Self>) -> PipelineEngine {
        PipelineEngine::new(self.clone(), self.clone(), self.clone())
    }

    fn answer(&self, resource: &Path) -> Option<Scripted> {
        self.calls.lock().unwrap().push(resource.to_path_buf());
        self.responses.get(resource).cloned()
    }

    fn not_found(resource: &Path) -> StepError {
        StepError::ResourceNotFound {
            path: resource.to_path_buf(),
        }
    }
}

impl StructuralValidator for ScriptedEngine {
    fn validate(&self, _document: &XmlDocument, schema: &Path) -> StepResult<Vec<Violation>> {
        match self.answer(schema) {
            Some(Scripted::Violations(violations)) => Ok(violations),
            Some(Scripted::Fail(err)) => Err(err),
            _ => Err(Self::not_found(schema)),
        }
    }
}

impl RuleEvaluator for ScriptedEngine {
    fn evaluate(&self, _document: &XmlDocument, rules: &Path) -> StepResult<Vec<RuleMessage>> {
        match self.answer(rules) {
            Some(Scripted::Messages(messages)) => Ok(messages),
            Some(Scripted::Fail(err)) => Err(err),
            _ => Err(Self::not_found(rules)),
        }
    }
}

impl PredicateEvaluator for ScriptedEngine {
    fn evaluate(&self, _document: &XmlDocument, predicate: &Path) -> StepResult<bool> {
        match self.answer(predicate) {
            Some(Scripted::Predicate(value)) => Ok(value),
            Some(Scripted::Fail(err)) => Err(err),
            _ => Err(Self::not_found(predicate)),
        }
    }
}

pub fn rule(severity: Severity, rule_id: &str) -> RuleMessage {
    RuleMessage {
        severity,
        rule_id: rule_id.to_string(),
        title: format!("[{}] rule violated", rule_id),
        description: "/*:Invoice[1]".to_string(),
        hints: vec![Hint::new("fix", format!("See {}", rule_id))],
    }
}

pub fn engine_failure(details: &str) -> StepError {
    StepError::Engine {
        details: details.to_string(),
    }
}
