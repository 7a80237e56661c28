//! # rule-validator Library
//!
//! Validates XML documents against configuration-selected rule plans: XML
//! Schema checks through libxml2, Schematron rule checks and retroactive
//! filters through an XSLT processor. Every run yields a findings report
//! and a pass/fail verdict.

pub mod cache;
pub mod capability;
pub mod cli;
pub mod configuration;
pub mod detect;
pub mod document;
pub mod error;
pub mod file_discovery;
pub mod libxml2;
pub mod message;
pub mod output;
pub mod pipeline;
pub mod properties;
pub mod report;
pub mod stats;
pub mod transform;
pub mod validator;

pub use cache::LoadOnceCache;
pub use capability::{PredicateEvaluator, RuleEvaluator, RuleMessage, StructuralValidator, Violation};
pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use configuration::{
    Configuration, ConfigurationSource, ConfigurationStore, ResolvedPlans, RulePlan, Step,
};
pub use detect::{DetectionRule, DetectionRuleConfig, SchemaAutodetector};
pub use document::XmlDocument;
pub use error::{
    ConfigError, DocumentError, LibXml2Error, PropertiesError, ReportError, StepError,
    ValidatorError,
};
pub use file_discovery::FileDiscovery;
pub use libxml2::{LibXml2Validator, LibXml2Wrapper, ValidationResult, XmlSchemaPtr};
pub use message::{Category, Finding, Findings, Hint, Severity};
pub use output::Output;
pub use pipeline::PipelineEngine;
pub use properties::{EnvProvider, PropertiesLoader, SystemEnvProvider, ValidatorProperties};
pub use report::{Report, ReportEntry, render, verdict};
pub use stats::{FileStatisticsSink, RunStatistics, StatisticsSink};
pub use transform::{TransformerCommand, XsltPredicateEvaluator, XsltRuleEvaluator};
pub use validator::{
    FileStatus, FileValidationResult, RunOptions, ValidationOutcome, ValidationResults, Validator,
};
