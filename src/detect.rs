//! Schema autodetection from document shape.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::XmlDocument;
use crate::message::{Category, Finding, Findings};

/// UBL 2 namespace prefix shared by every document type
const UBL_NAMESPACE_PREFIX: &str = "urn:oasis:names:specification:ubl:schema:xsd:";

/// Document types recognised without any configured rules
const UBL_DOCUMENT_TYPES: &[&str] = &[
    "Invoice",
    "CreditNote",
    "Order",
    "OrderResponse",
    "OrderChange",
    "OrderCancellation",
    "Catalogue",
    "DespatchAdvice",
    "ApplicationResponse",
    "Reminder",
];

/// Serializable form of a detection rule, as written in the properties file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionRuleConfig {
    /// Schema identifier assigned when the rule matches
    pub schema: String,
    /// Versions the rule applies to; empty means every version
    #[serde(default)]
    pub versions: Vec<String>,
    /// Required namespace URI of the root element
    pub root_namespace: String,
    /// Required local name of the root element
    #[serde(default)]
    pub root_name: Option<String>,
    /// Regex over the text of the first `CustomizationID` element
    #[serde(default)]
    pub customization_id: Option<String>,
    /// Regex over the text of the first `ProfileID` element
    #[serde(default)]
    pub profile_id: Option<String>,
}

/// A compiled heuristic that classifies a document
#[derive(Debug, Clone)]
pub struct DetectionRule {
    schema: String,
    versions: Vec<String>,
    root_namespace: String,
    root_name: Option<String>,
    customization_id: Option<Regex>,
    profile_id: Option<Regex>,
}

impl DetectionRule {
    pub fn new(schema: impl Into<String>, root_namespace: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            versions: Vec::new(),
            root_namespace: root_namespace.into(),
            root_name: None,
            customization_id: None,
            profile_id: None,
        }
    }

    pub fn with_root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = Some(name.into());
        self
    }

    pub fn with_versions(mut self, versions: Vec<String>) -> Self {
        self.versions = versions;
        self
    }

    pub fn with_customization_id(mut self, pattern: Regex) -> Self {
        self.customization_id = Some(pattern);
        self
    }

    pub fn with_profile_id(mut self, pattern: Regex) -> Self {
        self.profile_id = Some(pattern);
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn applies_to(&self, version: &str) -> bool {
        self.versions.is_empty() || self.versions.iter().any(|v| v == version)
    }

    fn matches(&self, document: &XmlDocument, version: &str) -> bool {
        if !self.applies_to(version) {
            return false;
        }
        if document.root_namespace() != Some(self.root_namespace.as_str()) {
            return false;
        }
        if let Some(name) = &self.root_name
            && document.root_name() != name
        {
            return false;
        }
        header_matches(document, "CustomizationID", self.customization_id.as_ref())
            && header_matches(document, "ProfileID", self.profile_id.as_ref())
    }
}

fn header_matches(document: &XmlDocument, element: &str, pattern: Option<&Regex>) -> bool {
    match pattern {
        None => true,
        Some(pattern) => document
            .first_text(element)
            .is_some_and(|text| pattern.is_match(&text)),
    }
}

impl TryFrom<&DetectionRuleConfig> for DetectionRule {
    type Error = regex::Error;

    fn try_from(config: &DetectionRuleConfig) -> Result<Self, Self::Error> {
        let mut rule = DetectionRule::new(&config.schema, &config.root_namespace)
            .with_versions(config.versions.clone());
        rule.root_name = config.root_name.clone();
        if let Some(pattern) = &config.customization_id {
            rule = rule.with_customization_id(Regex::new(pattern)?);
        }
        if let Some(pattern) = &config.profile_id {
            rule = rule.with_profile_id(Regex::new(pattern)?);
        }
        Ok(rule)
    }
}

/// Ordered detection rules; the first match wins
#[derive(Debug, Clone, Default)]
pub struct SchemaAutodetector {
    rules: Vec<DetectionRule>,
}

impl SchemaAutodetector {
    pub fn new(rules: Vec<DetectionRule>) -> Self {
        Self { rules }
    }

    /// UBL 2 document types, identified by root element and namespace.
    ///
    /// The schema identifier is the root element name, for every version.
    pub fn builtin() -> Self {
        let rules = UBL_DOCUMENT_TYPES
            .iter()
            .map(|name| {
                DetectionRule::new(*name, format!("{}{}-2", UBL_NAMESPACE_PREFIX, name))
                    .with_root_name(*name)
            })
            .collect();
        Self { rules }
    }

    /// Configured rules first, then the built-in ones
    pub fn from_config(configs: &[DetectionRuleConfig]) -> Result<Self, regex::Error> {
        let mut rules = configs
            .iter()
            .map(DetectionRule::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        rules.extend(Self::builtin().rules);
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[DetectionRule] {
        &self.rules
    }

    /// Classify `document` for `version`.
    ///
    /// On failure a fatal detection finding is recorded and the run must stop.
    pub fn detect(
        &self,
        document: &XmlDocument,
        version: &str,
        findings: &mut Findings,
    ) -> Option<String> {
        match self.rules.iter().find(|rule| rule.matches(document, version)) {
            Some(rule) => {
                debug!(schema = rule.schema(), version, "schema detected");
                Some(rule.schema.clone())
            }
            None => {
                findings.push(Finding::fatal(
                    Category::SchemaDetection,
                    "Unable to detect schema",
                    format!(
                        "No known schema for version '{}' matches root element '{}' in namespace '{}'",
                        version,
                        document.root_name(),
                        document.root_namespace().unwrap_or("")
                    ),
                ));
                None
            }
        }
    }
}
