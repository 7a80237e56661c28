//! Pipeline engine: runs rule plans against one document.
//!
//! Steps run strictly in plan order on the caller's findings collection.
//! A failing capability never stops the run; its error becomes a fatal
//! finding and the next step executes.
//!
//! Filter steps act retroactively on everything already collected in the
//! run, including findings from the standard plan when the filter sits in
//! the custom plan. A filter placed before the rule check it targets finds
//! nothing to remove. That ordering is a configuration contract the engine
//! only warns about.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::capability::{PredicateEvaluator, RuleEvaluator, StructuralValidator, Violation};
use crate::configuration::{ResolvedPlans, RulePlan, Step};
use crate::document::XmlDocument;
use crate::error::StepError;
use crate::message::{Category, Finding, Findings};

/// Executes rule plans through the three capabilities
#[derive(Clone)]
pub struct PipelineEngine {
    structural: Arc<dyn StructuralValidator>,
    rules: Arc<dyn RuleEvaluator>,
    predicates: Arc<dyn PredicateEvaluator>,
}

impl PipelineEngine {
    pub fn new(
        structural: Arc<dyn StructuralValidator>,
        rules: Arc<dyn RuleEvaluator>,
        predicates: Arc<dyn PredicateEvaluator>,
    ) -> Self {
        Self {
            structural,
            rules,
            predicates,
        }
    }

    /// Run the standard plan, then the custom plan, on one collection
    pub fn execute_all(&self, plans: &ResolvedPlans, document: &XmlDocument, findings: &mut Findings) {
        warn_misordered_filters(&plans.standard);
        // Custom filters may target rules checked by the standard plan
        if !plans.standard.has_rule_check() {
            warn_misordered_filters(&plans.custom);
        }

        self.run_steps(&plans.standard, document, findings);
        self.run_steps(&plans.custom, document, findings);
    }

    /// Run every step of `plan` in order
    pub fn execute(&self, plan: &RulePlan, document: &XmlDocument, findings: &mut Findings) {
        warn_misordered_filters(plan);
        self.run_steps(plan, document, findings);
    }

    fn run_steps(&self, plan: &RulePlan, document: &XmlDocument, findings: &mut Findings) {
        for step in plan.steps() {
            debug!(kind = step.kind(), resource = %step.resource().display(), "executing step");
            self.execute_step(step, document, findings);
        }
    }

    fn execute_step(&self, step: &Step, document: &XmlDocument, findings: &mut Findings) {
        match step {
            Step::StructuralCheck { resource } => {
                match self.structural.validate(document, resource) {
                    Ok(violations) => {
                        findings.extend(violations.into_iter().map(violation_finding));
                    }
                    Err(err) => {
                        findings.push(failure_finding(Category::StructuralSchema, resource, &err))
                    }
                }
            }
            Step::RuleCheck { resource } => match self.rules.evaluate(document, resource) {
                Ok(messages) => findings.extend(messages.into_iter().map(Finding::from)),
                Err(err) => findings.push(failure_finding(Category::RuleCheck, resource, &err)),
            },
            Step::Filter {
                resource,
                target_rule_id,
            } => match self.predicates.evaluate(document, resource) {
                Ok(true) => {
                    let removed = findings.remove_rule(target_rule_id);
                    debug!(rule = %target_rule_id, removed, "filter predicate matched");
                }
                Ok(false) => {}
                Err(err) => findings.push(failure_finding(Category::Filter, resource, &err)),
            },
        }
    }
}

fn warn_misordered_filters(plan: &RulePlan) {
    for warning in plan.filter_ordering_warnings() {
        warn!("{}", warning);
    }
}

fn violation_finding(violation: Violation) -> Finding {
    let description = match violation.line {
        Some(line) => format!("Line {}: {}", line, violation.message),
        None => violation.message.clone(),
    };
    Finding::fatal(Category::StructuralSchema, violation.message, description)
}

fn failure_finding(category: Category, resource: &Path, err: &StepError) -> Finding {
    warn!(category = %category, resource = %resource.display(), error = %err, "step failed");
    Finding::fatal(
        category,
        err.to_string(),
        format!("{:#?}\nwhile executing {}", err, resource.display()),
    )
}
