//! Per-run statistics logging.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Findings, Severity};

/// Summary of one completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub schema: String,
    pub version: String,
    pub valid: bool,
    pub fatal: usize,
    pub warnings: usize,
    pub info: usize,
    /// Rule identifiers of fatal rule-scoped findings, in order
    pub failed_rules: Vec<String>,
}

impl RunStatistics {
    pub fn new(schema: &str, version: &str, valid: bool, findings: &Findings) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            schema: schema.to_string(),
            version: version.to_string(),
            valid,
            fatal: findings.count(Severity::Fatal),
            warnings: findings.count(Severity::Warning),
            info: findings.count(Severity::Info),
            failed_rules: findings
                .iter()
                .filter(|f| f.is_fatal() && !f.rule_id.is_empty())
                .map(|f| f.rule_id.clone())
                .collect(),
        }
    }
}

/// Receives statistics for completed runs. Failures never affect the verdict.
#[cfg_attr(test, mockall::automock)]
pub trait StatisticsSink: Send + Sync {
    fn record(&self, stats: &RunStatistics) -> std::io::Result<()>;
}

/// Appends one JSON line per run to a daily file
#[derive(Debug, Clone)]
pub struct FileStatisticsSink {
    directory: PathBuf,
}

impl FileStatisticsSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// `stat-YYYY-MM-DD.log` for the day the run finished
    pub fn file_for(&self, stats: &RunStatistics) -> PathBuf {
        self.directory
            .join(format!("stat-{}.log", stats.timestamp.format("%Y-%m-%d")))
    }
}

impl StatisticsSink for FileStatisticsSink {
    fn record(&self, stats: &RunStatistics) -> std::io::Result<()> {
        fs::create_dir_all(&self.directory)?;
        let line = serde_json::to_string(stats)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(stats))?;
        writeln!(file, "{}", line)
    }
}
