//! Rule plans and the two configuration sources they come from.
//!
//! A data directory holds `STANDARD/config.xml` and `CUSTOM/config.xml`:
//!
//! ```xml
//! <config>
//!   <validate id="INVOICE" version="2.0">
//!     <step id="XSD" file="/STANDARD/xsd/Invoice.xsd"/>
//!     <step id="XSL" file="/STANDARD/xsl/rules.xsl"/>
//!     <step id="FILTER" file="/STANDARD/xsl/filter.xsl" rule="R1"/>
//!   </validate>
//! </config>
//! ```
//!
//! Step tags are mapped to [`Step`] when the file is loaded, so the
//! pipeline never sees an unknown kind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::cache::LoadOnceCache;
use crate::error::{ConfigError, ConfigResult};
use crate::message::{Category, Finding, Findings};

/// Directory of the standard configuration source inside the data directory
pub const STANDARD_DIR: &str = "STANDARD";
/// Directory of the custom configuration source inside the data directory
pub const CUSTOM_DIR: &str = "CUSTOM";
/// File name of a configuration source
pub const CONFIG_FILE: &str = "config.xml";

/// One step of a rule plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Validate structure against an XML Schema
    StructuralCheck { resource: PathBuf },
    /// Evaluate business rules with a transformation that emits messages
    RuleCheck { resource: PathBuf },
    /// Remove earlier findings for `target_rule_id` when the predicate holds
    Filter {
        resource: PathBuf,
        target_rule_id: String,
    },
}

impl Step {
    pub fn resource(&self) -> &Path {
        match self {
            Step::StructuralCheck { resource }
            | Step::RuleCheck { resource }
            | Step::Filter { resource, .. } => resource,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Step::StructuralCheck { .. } => "XSD",
            Step::RuleCheck { .. } => "XSL",
            Step::Filter { .. } => "FILTER",
        }
    }
}

/// Ordered steps for one (schema identifier, version) pair from one source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RulePlan {
    steps: Vec<Step>,
}

impl RulePlan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn has_rule_check(&self) -> bool {
        self.steps
            .iter()
            .any(|step| matches!(step, Step::RuleCheck { .. }))
    }

    /// Filter steps that no rule check precedes within this plan.
    ///
    /// Such a filter can still act on findings from an earlier plan in the
    /// same run, so this is advisory only.
    pub fn filter_ordering_warnings(&self) -> Vec<String> {
        let mut seen_rule_check = false;
        let mut warnings = Vec::new();
        for (index, step) in self.steps.iter().enumerate() {
            match step {
                Step::RuleCheck { .. } => seen_rule_check = true,
                Step::Filter {
                    resource,
                    target_rule_id,
                } if !seen_rule_check => warnings.push(format!(
                    "step {} filters rule '{}' with {} but no rule check runs before it",
                    index + 1,
                    target_rule_id,
                    resource.display()
                )),
                _ => {}
            }
        }
        warnings
    }
}

/// One configuration source: (schema identifier, version) to rule plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationSource {
    plans: HashMap<(String, String), RulePlan>,
}

impl ConfigurationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plan. Steps for a pair that already exists are appended.
    pub fn with_plan(
        mut self,
        schema_id: impl Into<String>,
        version: impl Into<String>,
        plan: RulePlan,
    ) -> Self {
        self.add_steps(schema_id.into(), version.into(), plan.steps);
        self
    }

    fn add_steps(&mut self, schema_id: String, version: String, steps: Vec<Step>) {
        self.plans
            .entry((schema_id, version))
            .or_default()
            .steps
            .extend(steps);
    }

    /// Plan for the pair, empty when the source has no entry
    pub fn plan(&self, schema_id: &str, version: &str) -> RulePlan {
        self.plans
            .get(&(schema_id.to_string(), version.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Parse a `config.xml` document, resolving step files against `data_dir`
    pub fn from_xml(xml: &str, data_dir: &Path, origin: &Path) -> ConfigResult<Self> {
        let raw: RawConfig =
            quick_xml::de::from_str(xml).map_err(|e| ConfigError::InvalidFormat {
                path: origin.to_path_buf(),
                details: e.to_string(),
            })?;

        let mut source = Self::new();
        for validate in raw.validates {
            let steps = validate
                .steps
                .into_iter()
                .map(|step| step.into_step(&validate.id, &validate.version, data_dir))
                .collect::<ConfigResult<Vec<_>>>()?;
            source.add_steps(validate.id, validate.version, steps);
        }
        Ok(source)
    }

    /// Load a source file. A missing file is an empty source.
    pub fn load(path: &Path, data_dir: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "configuration file not present, using empty source");
            return Ok(Self::new());
        }

        let xml = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;
        let source = Self::from_xml(&xml, data_dir, path)?;
        info!(path = %path.display(), entries = source.len(), "loaded configuration source");
        Ok(source)
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(rename = "validate", default)]
    validates: Vec<RawValidate>,
}

#[derive(Debug, Deserialize)]
struct RawValidate {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@version")]
    version: String,
    #[serde(rename = "step", default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@file")]
    file: String,
    #[serde(rename = "@rule", default)]
    rule: Option<String>,
}

impl RawStep {
    fn into_step(self, schema: &str, version: &str, data_dir: &Path) -> ConfigResult<Step> {
        let resource = resolve_resource(data_dir, &self.file);
        match self.id.as_str() {
            "XSD" => Ok(Step::StructuralCheck { resource }),
            "XSL" => Ok(Step::RuleCheck { resource }),
            "FILTER" => {
                // A blank target would match every finding without a rule id
                let target_rule_id = self
                    .rule
                    .filter(|rule| !rule.trim().is_empty())
                    .ok_or_else(|| ConfigError::MissingFilterRule {
                        schema: schema.to_string(),
                        version: version.to_string(),
                    })?;
                Ok(Step::Filter {
                    resource,
                    target_rule_id,
                })
            }
            other => Err(ConfigError::UnknownStepKind {
                kind: other.to_string(),
                schema: schema.to_string(),
                version: version.to_string(),
            }),
        }
    }
}

/// Step files are written relative to the data directory, usually with a
/// leading slash.
fn resolve_resource(data_dir: &Path, file: &str) -> PathBuf {
    data_dir.join(file.trim_start_matches(['/', '\\']))
}

/// The standard and custom sources of one data directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    pub standard: ConfigurationSource,
    pub custom: ConfigurationSource,
}

/// Plans selected for one run. Standard runs first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlans {
    pub standard: RulePlan,
    pub custom: RulePlan,
}

impl Configuration {
    pub fn new(standard: ConfigurationSource, custom: ConfigurationSource) -> Self {
        Self { standard, custom }
    }

    /// Load `STANDARD/config.xml` and `CUSTOM/config.xml` from `data_dir`
    pub fn load(data_dir: &Path) -> ConfigResult<Self> {
        let standard = ConfigurationSource::load(
            &data_dir.join(STANDARD_DIR).join(CONFIG_FILE),
            data_dir,
        )?;
        let custom =
            ConfigurationSource::load(&data_dir.join(CUSTOM_DIR).join(CONFIG_FILE), data_dir)?;
        Ok(Self { standard, custom })
    }

    /// Look up both sources for the pair.
    ///
    /// When neither source has steps, a fatal configuration finding is
    /// recorded and `None` tells the caller to stop the run.
    pub fn resolve(
        &self,
        schema_id: &str,
        version: &str,
        findings: &mut Findings,
    ) -> Option<ResolvedPlans> {
        let standard = self.standard.plan(schema_id, version);
        let custom = self.custom.plan(schema_id, version);

        if standard.is_empty() && custom.is_empty() {
            findings.push(Finding::fatal(
                Category::Configuration,
                "No validation definition found",
                format!(
                    "No entry is found in configuration for version '{}' and identifier '{}', unable to perform validation",
                    version, schema_id
                ),
            ));
            return None;
        }

        debug!(
            schema = schema_id,
            version,
            standard_steps = standard.len(),
            custom_steps = custom.len(),
            "resolved rule plans"
        );
        Some(ResolvedPlans { standard, custom })
    }
}

/// Loaded configurations keyed by data directory.
///
/// Loading happens at most once per directory for the lifetime of the
/// store; concurrent runs share the `Arc`.
#[derive(Default)]
pub struct ConfigurationStore {
    cache: LoadOnceCache<PathBuf, Configuration>,
}

impl ConfigurationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the configuration for `data_dir`, loading it on first use
    pub fn get(&self, data_dir: &Path) -> ConfigResult<Arc<Configuration>> {
        self.cache
            .get_or_load(data_dir.to_path_buf(), || Configuration::load(data_dir))
    }

    /// Register an already built configuration for `data_dir`
    pub fn insert(&self, data_dir: impl Into<PathBuf>, configuration: Configuration) {
        self.cache.insert(data_dir.into(), configuration);
    }

    /// Drop the cached configuration so the next run reloads it
    pub fn invalidate(&self, data_dir: &Path) {
        self.cache.invalidate(&data_dir.to_path_buf());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Severity;
    use std::fs;
    use tempfile::TempDir;

    const STANDARD_CONFIG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<config>
    <validate id="INVOICE" version="2.0">
        <step id="XSD" file="/STANDARD/xsd/Invoice.xsd"/>
        <step id="XSL" file="/STANDARD/xsl/rules.xsl"/>
        <step id="FILTER" file="/STANDARD/xsl/filter.xsl" rule="R1"/>
    </validate>
    <validate id="ORDER" version="2.0">
        <step id="XSD" file="/STANDARD/xsd/Order.xsd"/>
    </validate>
</config>"#;

    fn write_config(dir: &Path, source: &str, content: &str) {
        let source_dir = dir.join(source);
        fs::create_dir_all(&source_dir).unwrap();
        fs::write(source_dir.join(CONFIG_FILE), content).unwrap();
    }

    #[test]
    fn test_parse_steps_in_order() {
        let data_dir = Path::new("/data");
        let source =
            ConfigurationSource::from_xml(STANDARD_CONFIG, data_dir, Path::new("config.xml"))
                .unwrap();

        let plan = source.plan("INVOICE", "2.0");
        assert_eq!(
            plan.steps(),
            &[
                Step::StructuralCheck {
                    resource: PathBuf::from("/data/STANDARD/xsd/Invoice.xsd")
                },
                Step::RuleCheck {
                    resource: PathBuf::from("/data/STANDARD/xsl/rules.xsl")
                },
                Step::Filter {
                    resource: PathBuf::from("/data/STANDARD/xsl/filter.xsl"),
                    target_rule_id: "R1".to_string(),
                },
            ]
        );
        assert_eq!(source.plan("ORDER", "2.0").len(), 1);
        assert!(source.plan("ORDER", "1.0").is_empty());
    }

    #[test]
    fn test_duplicate_entries_are_concatenated() {
        let xml = r#"<config>
            <validate id="A" version="1"><step id="XSD" file="a.xsd"/></validate>
            <validate id="B" version="1"><step id="XSD" file="b.xsd"/></validate>
            <validate id="A" version="1"><step id="XSL" file="a.xsl"/></validate>
        </config>"#;
        let source =
            ConfigurationSource::from_xml(xml, Path::new("d"), Path::new("config.xml")).unwrap();

        let kinds: Vec<_> = source.plan("A", "1").steps().iter().map(Step::kind).collect();
        assert_eq!(kinds, vec!["XSD", "XSL"]);
    }

    #[test]
    fn test_unknown_step_kind_rejected() {
        let xml = r#"<config><validate id="A" version="1"><step id="XQUERY" file="q"/></validate></config>"#;
        let err =
            ConfigurationSource::from_xml(xml, Path::new("d"), Path::new("config.xml")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStepKind { ref kind, .. } if kind == "XQUERY"));
    }

    #[test]
    fn test_filter_without_rule_rejected() {
        let xml = r#"<config><validate id="A" version="1"><step id="FILTER" file="f.xsl"/></validate></config>"#;
        let err =
            ConfigurationSource::from_xml(xml, Path::new("d"), Path::new("config.xml")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFilterRule { .. }));
    }

    #[test]
    fn test_filter_with_blank_rule_rejected() {
        for rule in ["", "  "] {
            let xml = format!(
                r#"<config><validate id="A" version="1"><step id="XSD" file="a.xsd"/><step id="FILTER" file="f.xsl" rule="{}"/></validate></config>"#,
                rule
            );
            let err = ConfigurationSource::from_xml(&xml, Path::new("d"), Path::new("config.xml"))
                .unwrap_err();
            assert!(matches!(err, ConfigError::MissingFilterRule { .. }));
        }
    }

    #[test]
    fn test_malformed_config_rejected() {
        let err = ConfigurationSource::from_xml(
            "<config><validate id=",
            Path::new("d"),
            Path::new("config.xml"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFormat { .. }));
    }

    #[test]
    fn test_resolve_from_either_source() {
        let configuration = Configuration::new(
            ConfigurationSource::new().with_plan(
                "INVOICE",
                "2.0",
                RulePlan::new(vec![Step::RuleCheck {
                    resource: PathBuf::from("std.xsl"),
                }]),
            ),
            ConfigurationSource::new().with_plan(
                "ORDER",
                "2.0",
                RulePlan::new(vec![Step::RuleCheck {
                    resource: PathBuf::from("custom.xsl"),
                }]),
            ),
        );
        let mut findings = Findings::new();

        let invoice = configuration.resolve("INVOICE", "2.0", &mut findings).unwrap();
        assert_eq!(invoice.standard.len(), 1);
        assert!(invoice.custom.is_empty());

        let order = configuration.resolve("ORDER", "2.0", &mut findings).unwrap();
        assert!(order.standard.is_empty());
        assert_eq!(order.custom.len(), 1);

        assert!(findings.is_empty());
    }

    #[test]
    fn test_resolve_missing_everywhere_records_one_fatal() {
        let configuration = Configuration::default();
        let mut findings = Findings::new();

        assert!(configuration.resolve("INVOICE", "9.9", &mut findings).is_none());
        assert_eq!(findings.len(), 1);

        let finding = &findings.as_slice()[0];
        assert_eq!(finding.severity, Severity::Fatal);
        assert_eq!(finding.category, Category::Configuration);
        assert_eq!(finding.title, "No validation definition found");
        assert!(finding.description.contains("INVOICE"));
        assert!(finding.description.contains("9.9"));
    }

    #[test]
    fn test_filter_ordering_warnings() {
        let plan = RulePlan::new(vec![
            Step::Filter {
                resource: PathBuf::from("early.xsl"),
                target_rule_id: "R1".to_string(),
            },
            Step::RuleCheck {
                resource: PathBuf::from("rules.xsl"),
            },
            Step::Filter {
                resource: PathBuf::from("late.xsl"),
                target_rule_id: "R1".to_string(),
            },
        ]);

        let warnings = plan.filter_ordering_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("early.xsl"));
    }

    #[test]
    fn test_load_from_data_dir_with_missing_custom() {
        let temp_dir = TempDir::new().unwrap();
        write_config(temp_dir.path(), STANDARD_DIR, STANDARD_CONFIG);

        let configuration = Configuration::load(temp_dir.path()).unwrap();
        assert_eq!(configuration.standard.len(), 2);
        assert!(configuration.custom.is_empty());
        assert_eq!(
            configuration.standard.plan("INVOICE", "2.0").steps()[0].resource(),
            temp_dir.path().join("STANDARD/xsd/Invoice.xsd")
        );
    }

    #[test]
    fn test_store_loads_once_and_invalidates() {
        let temp_dir = TempDir::new().unwrap();
        write_config(temp_dir.path(), STANDARD_DIR, STANDARD_CONFIG);

        let store = ConfigurationStore::new();
        let first = store.get(temp_dir.path()).unwrap();

        // Changes on disk are not seen until the entry is invalidated
        write_config(
            temp_dir.path(),
            STANDARD_DIR,
            r#"<config><validate id="X" version="1"><step id="XSD" file="x.xsd"/></validate></config>"#,
        );
        let second = store.get(temp_dir.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        store.invalidate(temp_dir.path());
        let third = store.get(temp_dir.path()).unwrap();
        assert_eq!(third.standard.len(), 1);
        assert_eq!(third.standard.plan("X", "1").len(), 1);
    }

    #[test]
    fn test_store_reports_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        write_config(temp_dir.path(), CUSTOM_DIR, "<config><validate");

        let store = ConfigurationStore::new();
        assert!(store.get(temp_dir.path()).is_err());
    }
}
