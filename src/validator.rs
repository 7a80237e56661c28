//! Validation Engine
//!
//! One run validates one document: empty-input and well-formedness checks,
//! optional schema autodetection, configuration resolution, the standard
//! and custom rule plans, then the verdict. A run never fails; every
//! problem becomes a fatal finding and the run stops early only where
//! there is nothing left to execute.
//!
//! Batches run one independent run per document:
//! - **Async I/O**: documents are read with `tokio::fs`
//! - **Blocking work**: each run executes in `spawn_blocking` (libxml2 and
//!   the XSLT processor block the calling thread)
//! - **Bounded concurrency**: a semaphore caps concurrent runs

use futures::future::try_join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::configuration::ConfigurationStore;
use crate::detect::SchemaAutodetector;
use crate::document::XmlDocument;
use crate::error::{DocumentError, PropertiesError, Result, ValidatorError};
use crate::libxml2::LibXml2Validator;
use crate::message::{Category, Finding, Findings};
use crate::pipeline::PipelineEngine;
use crate::properties::ValidatorProperties;
use crate::report::{self, Report};
use crate::stats::{FileStatisticsSink, RunStatistics, StatisticsSink};
use crate::transform::{XsltPredicateEvaluator, XsltRuleEvaluator};

/// What to validate a document against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Explicit schema identifier; `None` requests autodetection
    pub schema: Option<String>,
    pub version: String,
    pub suppress_warnings: bool,
}

impl RunOptions {
    pub fn explicit(schema: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            version: version.into(),
            suppress_warnings: false,
        }
    }

    pub fn autodetect(version: impl Into<String>) -> Self {
        Self {
            schema: None,
            version: version.into(),
            suppress_warnings: false,
        }
    }

    pub fn with_suppress_warnings(mut self, suppress: bool) -> Self {
        self.suppress_warnings = suppress;
        self
    }
}

/// Result of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub valid: bool,
    /// Schema identifier used, or the detected one; `None` when detection failed
    pub schema: Option<String>,
    pub version: String,
    pub findings: Findings,
    pub suppress_warnings: bool,
}

impl ValidationOutcome {
    pub fn report(&self) -> Report {
        report::render(
            &self.findings,
            self.schema.as_deref().unwrap_or_default(),
            &self.version,
            self.suppress_warnings,
        )
    }
}

/// Outcome of one file in a batch
#[derive(Debug, Clone)]
pub enum FileStatus {
    /// The run finished; see the outcome for the verdict
    Completed(ValidationOutcome),
    /// The file could not be read
    Error { message: String },
}

#[derive(Debug, Clone)]
pub struct FileValidationResult {
    pub path: PathBuf,
    pub status: FileStatus,
    pub duration: Duration,
}

impl FileValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(&self.status, FileStatus::Completed(outcome) if outcome.valid)
    }

    pub fn outcome(&self) -> Option<&ValidationOutcome> {
        match &self.status {
            FileStatus::Completed(outcome) => Some(outcome),
            FileStatus::Error { .. } => None,
        }
    }
}

/// Aggregated results of a batch
#[derive(Debug, Clone)]
pub struct ValidationResults {
    pub total_files: usize,
    pub valid_files: usize,
    pub invalid_files: usize,
    pub error_files: usize,
    pub total_duration: Duration,
    pub file_results: Vec<FileValidationResult>,
}

impl ValidationResults {
    pub fn aggregate(file_results: Vec<FileValidationResult>, total_duration: Duration) -> Self {
        let mut valid_files = 0;
        let mut invalid_files = 0;
        let mut error_files = 0;

        for result in &file_results {
            match &result.status {
                FileStatus::Completed(outcome) if outcome.valid => valid_files += 1,
                FileStatus::Completed(_) => invalid_files += 1,
                FileStatus::Error { .. } => error_files += 1,
            }
        }

        Self {
            total_files: file_results.len(),
            valid_files,
            invalid_files,
            error_files,
            total_duration,
            file_results,
        }
    }

    /// Check if all files validated successfully
    pub fn all_valid(&self) -> bool {
        self.valid_files == self.total_files && self.total_files > 0
    }

    pub fn has_errors(&self) -> bool {
        self.error_files > 0 || self.invalid_files > 0
    }

    /// Get success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.valid_files as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Runs validations against the rule plans of one data directory
pub struct Validator {
    properties: ValidatorProperties,
    configurations: Arc<ConfigurationStore>,
    engine: PipelineEngine,
    detector: SchemaAutodetector,
    statistics: Option<Arc<dyn StatisticsSink>>,
}

impl Validator {
    pub fn new(properties: ValidatorProperties, engine: PipelineEngine) -> Self {
        Self {
            properties,
            configurations: Arc::new(ConfigurationStore::new()),
            engine,
            detector: SchemaAutodetector::builtin(),
            statistics: None,
        }
    }

    /// Production wiring: libxml2 for schemas, the configured XSLT processor
    /// for rules and filters, statistics to files when enabled
    pub fn from_properties(properties: ValidatorProperties) -> Result<Self> {
        let engine = PipelineEngine::new(
            Arc::new(LibXml2Validator::new()),
            Arc::new(XsltRuleEvaluator::new(properties.transformer.clone())),
            Arc::new(XsltPredicateEvaluator::new(properties.transformer.clone())),
        );
        let detector = SchemaAutodetector::from_config(&properties.detection)
            .map_err(|e| PropertiesError::Validation(format!("Invalid detection pattern: {}", e)))?;

        let statistics: Option<Arc<dyn StatisticsSink>> = properties
            .log_statistics
            .then(|| {
                Arc::new(FileStatisticsSink::new(properties.statistics_directory()))
                    as Arc<dyn StatisticsSink>
            });

        let mut validator = Self::new(properties, engine).with_detector(detector);
        validator.statistics = statistics;
        Ok(validator)
    }

    pub fn with_detector(mut self, detector: SchemaAutodetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_statistics(mut self, sink: Arc<dyn StatisticsSink>) -> Self {
        self.statistics = Some(sink);
        self
    }

    /// Share a configuration store between validators
    pub fn with_configurations(mut self, configurations: Arc<ConfigurationStore>) -> Self {
        self.configurations = configurations;
        self
    }

    pub fn properties(&self) -> &ValidatorProperties {
        &self.properties
    }

    pub fn configurations(&self) -> &Arc<ConfigurationStore> {
        &self.configurations
    }

    /// Validate one document. Always produces an outcome.
    pub fn validate(&self, document: &str, options: &RunOptions) -> ValidationOutcome {
        let mut outcome = ValidationOutcome {
            valid: false,
            schema: options.schema.clone(),
            version: options.version.clone(),
            findings: Findings::new(),
            suppress_warnings: self.properties.suppress_warnings || options.suppress_warnings,
        };

        if self.run(document, &mut outcome) {
            outcome.valid = report::verdict(&outcome.findings);
            self.record_statistics(&outcome);
        }

        info!(
            schema = outcome.schema.as_deref().unwrap_or(""),
            version = %outcome.version,
            valid = outcome.valid,
            findings = outcome.findings.len(),
            "validation finished"
        );
        outcome
    }

    /// Returns false when the run stopped before its plans executed
    fn run(&self, source: &str, outcome: &mut ValidationOutcome) -> bool {
        let findings = &mut outcome.findings;

        let document = match XmlDocument::parse(source) {
            Ok(document) => document,
            Err(err) => {
                findings.push(document_finding(&err));
                return false;
            }
        };

        let schema = match outcome.schema.clone() {
            Some(schema) => schema,
            None => {
                let Some(detected) = self.detector.detect(&document, &outcome.version, findings)
                else {
                    return false;
                };
                outcome.schema = Some(detected.clone());
                detected
            }
        };

        let configuration = match self.configurations.get(&self.properties.data_dir) {
            Ok(configuration) => configuration,
            Err(err) => {
                warn!(data_dir = %self.properties.data_dir.display(), error = %err, "configuration unavailable");
                findings.push(Finding::fatal(
                    Category::Configuration,
                    "Configuration could not be loaded",
                    err.to_string(),
                ));
                return false;
            }
        };

        let Some(plans) = configuration.resolve(&schema, &outcome.version, findings) else {
            return false;
        };

        debug!(schema = %schema, version = %outcome.version, "executing rule plans");
        self.engine.execute_all(&plans, &document, findings);
        true
    }

    fn record_statistics(&self, outcome: &ValidationOutcome) {
        let Some(sink) = &self.statistics else {
            return;
        };
        let stats = RunStatistics::new(
            outcome.schema.as_deref().unwrap_or_default(),
            &outcome.version,
            outcome.valid,
            &outcome.findings,
        );
        if let Err(err) = sink.record(&stats) {
            warn!(error = %err, "failed to record run statistics");
        }
    }

    /// Validate many files concurrently, one independent run per file
    pub async fn validate_files(
        self: &Arc<Self>,
        files: Vec<PathBuf>,
        options: &RunOptions,
        max_concurrent: usize,
    ) -> Result<ValidationResults> {
        let started = Instant::now();
        let semaphore = Arc::new(tokio::sync::Semaphore::new(max_concurrent.max(1)));

        let tasks: Vec<_> = files
            .into_iter()
            .map(|path| {
                let validator = Arc::clone(self);
                let semaphore = Arc::clone(&semaphore);
                let options = options.clone();

                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.map_err(|_| {
                        ValidatorError::Concurrency {
                            details: "Failed to acquire validation semaphore".to_string(),
                        }
                    })?;
                    validator.validate_file(path, options).await
                })
            })
            .collect();

        let task_results = try_join_all(tasks)
            .await
            .map_err(|e| ValidatorError::Concurrency {
                details: format!("Task join error: {}", e),
            })?;

        let file_results = task_results.into_iter().collect::<Result<Vec<_>>>()?;
        Ok(ValidationResults::aggregate(file_results, started.elapsed()))
    }

    /// Read and validate one file
    pub async fn validate_file(
        self: Arc<Self>,
        path: PathBuf,
        options: RunOptions,
    ) -> Result<FileValidationResult> {
        let started = Instant::now();

        let source = match tokio::fs::read_to_string(&path).await {
            Ok(source) => source,
            Err(err) => {
                return Ok(FileValidationResult {
                    status: FileStatus::Error {
                        message: format!("Cannot read {}: {}", path.display(), err),
                    },
                    path,
                    duration: started.elapsed(),
                });
            }
        };

        let validator = Arc::clone(&self);
        let outcome = tokio::task::spawn_blocking(move || validator.validate(&source, &options))
            .await
            .map_err(|e| ValidatorError::Concurrency {
                details: format!("Validation task failed for {}: {}", path.display(), e),
            })?;

        Ok(FileValidationResult {
            path,
            status: FileStatus::Completed(outcome),
            duration: started.elapsed(),
        })
    }
}

fn document_finding(err: &DocumentError) -> Finding {
    let title = match err {
        DocumentError::Empty => "Document is empty",
        DocumentError::NotWellFormed { .. } | DocumentError::MissingRoot => {
            "Document is not well-formed"
        }
    };
    Finding::fatal(Category::WellFormedness, title, err.to_string())
}
