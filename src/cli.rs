use clap::{ArgGroup, Parser, ValueEnum};
use std::path::PathBuf;

use crate::file_discovery::FileDiscovery;
use crate::validator::RunOptions;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum VerbosityLevel {
    /// Only the final verdict line per invalid file
    Quiet,
    /// Summary plus findings of invalid files
    #[default]
    Normal,
    /// Findings of every file
    Verbose,
}

/// Report format written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
    Xml,
}

/// Validate XML documents against configured rule plans
#[derive(Parser, Debug, Clone)]
#[command(name = "rule-validator")]
#[command(about = "Validate XML documents against XSD and Schematron rule plans")]
#[command(group(ArgGroup::new("target").required(true).args(["schema", "autodetect"])))]
pub struct Cli {
    /// Documents or directories to validate
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Schema identifier to validate against
    #[arg(short = 's', long = "schema")]
    pub schema: Option<String>,

    /// Detect the schema identifier from each document
    #[arg(short = 'a', long = "autodetect")]
    pub autodetect: bool,

    /// Version of the rule set
    #[arg(long = "version")]
    pub version: String,

    /// Properties file (TOML or JSON)
    #[arg(short = 'p', long = "properties")]
    pub properties: Option<PathBuf>,

    /// Directory holding STANDARD/ and CUSTOM/ configurations
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Leave warnings out of the report
    #[arg(long = "suppress-warnings")]
    pub suppress_warnings: bool,

    /// Report format
    #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,

    /// File extensions to process when walking directories (comma-separated)
    #[arg(short = 'e', long = "extensions", default_value = "xml")]
    pub extensions: String,

    /// Include file patterns (glob syntax)
    #[arg(long = "include", action = clap::ArgAction::Append)]
    pub include_patterns: Vec<String>,

    /// Exclude file patterns (glob syntax)
    #[arg(long = "exclude", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Maximum directory depth to walk
    #[arg(long = "max-depth")]
    pub max_depth: Option<usize>,

    /// Follow symbolic links while walking directories
    #[arg(long = "follow-symlinks")]
    pub follow_symlinks: bool,

    /// Number of documents validated concurrently
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet mode
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn get_extensions(&self) -> Vec<String> {
        self.extensions
            .split(',')
            .map(|s| s.trim().trim_start_matches('.').to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        for path in &self.paths {
            if !path.exists() {
                return Err(format!("Path does not exist: {}", path.display()));
            }
        }
        if let Some(threads) = self.threads
            && threads == 0
        {
            return Err("Number of threads must be greater than 0".to_string());
        }
        if self.get_extensions().is_empty() {
            return Err("At least one file extension must be specified".to_string());
        }
        Ok(())
    }

    /// File discovery configured from the walk options
    pub fn discovery(&self) -> FileDiscovery {
        FileDiscovery::new()
            .with_extensions(self.get_extensions())
            .with_include_patterns(self.include_patterns.clone())
            .with_exclude_patterns(self.exclude_patterns.clone())
            .with_max_depth(self.max_depth)
            .with_follow_symlinks(self.follow_symlinks)
    }

    pub fn get_thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    /// Per-run options; warning suppression from properties is applied by the validator
    pub fn run_options(&self) -> RunOptions {
        let options = match &self.schema {
            Some(schema) => RunOptions::explicit(schema, &self.version),
            None => RunOptions::autodetect(&self.version),
        };
        options.with_suppress_warnings(self.suppress_warnings)
    }
}
