//! Output and reporting for batches of validation runs.

use std::io::Cursor;
use std::time::Duration;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use serde::Serialize;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::error::ReportError;
use crate::message::Severity;
use crate::report::{self, Report, ReportEntry};
use crate::validator::{FileStatus, FileValidationResult, ValidationResults};

/// Formats batch results for stdout
pub struct Output {
    format: OutputFormat,
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(format: OutputFormat, verbosity: VerbosityLevel) -> Self {
        Self {
            format,
            verbosity,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    pub fn without_colors(mut self) -> Self {
        self.show_colors = false;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_results(&self, results: &ValidationResults) -> Result<String, ReportError> {
        match self.format {
            OutputFormat::Human => Ok(self.format_human(results)),
            OutputFormat::Json => format_json(results),
            OutputFormat::Xml => format_xml(results),
        }
    }

    fn format_human(&self, results: &ValidationResults) -> String {
        let mut output = String::new();

        for file_result in &results.file_results {
            let show_findings = match self.verbosity {
                VerbosityLevel::Quiet => {
                    if !file_result.is_valid() {
                        output.push_str(&self.format_file_result(file_result));
                        output.push('\n');
                    }
                    continue;
                }
                VerbosityLevel::Normal => !file_result.is_valid(),
                VerbosityLevel::Verbose => true,
            };

            output.push_str(&self.format_file_result(file_result));
            output.push('\n');
            if show_findings && let Some(outcome) = file_result.outcome() {
                for entry in outcome.report().entries() {
                    output.push_str(&self.format_entry(entry));
                }
            }
        }

        if self.verbosity != VerbosityLevel::Quiet {
            output.push_str(&self.format_summary(results));
        }

        output
    }

    pub fn format_file_result(&self, result: &FileValidationResult) -> String {
        let path_display = result.path.display();
        let duration_str = format_duration(result.duration);

        match &result.status {
            FileStatus::Completed(outcome) => {
                let target = format!(
                    "{} {}",
                    outcome.schema.as_deref().unwrap_or("?"),
                    outcome.version
                );
                if outcome.valid {
                    format!(
                        "{}  {} [{}] ({})",
                        self.colorize("✓ VALID", "32"),
                        path_display,
                        target,
                        duration_str
                    )
                } else {
                    let fatal = outcome.findings.count(Severity::Fatal);
                    format!(
                        "{}  {} [{}] ({}) - {} fatal finding{}",
                        self.colorize("✗ INVALID", "31"),
                        path_display,
                        target,
                        duration_str,
                        fatal,
                        if fatal == 1 { "" } else { "s" }
                    )
                }
            }
            FileStatus::Error { message } => {
                format!(
                    "{}  {} ({}) - {}",
                    self.colorize("⚠ ERROR", "33"),
                    path_display,
                    duration_str,
                    message
                )
            }
        }
    }

    fn format_entry(&self, entry: &ReportEntry) -> String {
        let severity = match entry.severity {
            Severity::Fatal => self.colorize("Fatal", "31"),
            Severity::Warning => self.colorize("Warning", "33"),
            Severity::Info => self.colorize("Info", "36"),
        };
        let rule = if entry.rule_id.is_empty() {
            String::new()
        } else {
            format!(" {}", entry.rule_id)
        };

        let mut output = format!("    [{}] {}{}: {}\n", severity, entry.category, rule, entry.title);
        for line in entry.description.lines().filter(|l| !l.trim().is_empty()) {
            output.push_str(&format!("        {}\n", line));
        }
        for hint in &entry.hints {
            output.push_str(&format!("        hint: {} {}\n", hint.title, hint.description));
        }
        output
    }

    fn format_summary(&self, results: &ValidationResults) -> String {
        let mut output = String::new();
        output.push_str("Validation Summary:\n");
        output.push_str(&format!("  Total files: {}\n", results.total_files));
        output.push_str(&format!(
            "  {} {}\n",
            self.colorize("Valid:", "32"),
            results.valid_files
        ));

        if results.invalid_files > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Invalid:", "31"),
                results.invalid_files
            ));
        }
        if results.error_files > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Errors:", "33"),
                results.error_files
            ));
        }

        output.push_str(&format!("  Success rate: {:.1}%\n", results.success_rate()));
        output.push_str(&format!(
            "  Duration: {}\n",
            format_duration(results.total_duration)
        ));
        output
    }
}

#[derive(Serialize)]
struct JsonFileResult<'a> {
    path: String,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    messages: Report,
}

fn format_json(results: &ValidationResults) -> Result<String, ReportError> {
    let files: Vec<_> = results
        .file_results
        .iter()
        .map(|result| match &result.status {
            FileStatus::Completed(outcome) => JsonFileResult {
                path: result.path.display().to_string(),
                valid: outcome.valid,
                schema: outcome.schema.as_deref(),
                version: Some(outcome.version.as_str()),
                error: None,
                messages: outcome.report(),
            },
            FileStatus::Error { message } => JsonFileResult {
                path: result.path.display().to_string(),
                valid: false,
                schema: None,
                version: None,
                error: Some(message.as_str()),
                messages: Report::default(),
            },
        })
        .collect();

    Ok(serde_json::to_string_pretty(&files)?)
}

/// One `<validation>` element per file, each holding the file's `<messages>`
fn format_xml(results: &ValidationResults) -> Result<String, ReportError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    report::write(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;
    report::write(&mut writer, Event::Start(BytesStart::new("validations")))?;

    for result in &results.file_results {
        let path = result.path.display().to_string();
        let mut element = BytesStart::new("validation");
        element.push_attribute(("path", path.as_str()));
        element.push_attribute(("valid", if result.is_valid() { "true" } else { "false" }));

        match &result.status {
            FileStatus::Completed(outcome) => {
                report::write(&mut writer, Event::Start(element))?;
                outcome.report().write_xml(&mut writer)?;
                report::write(&mut writer, Event::End(BytesEnd::new("validation")))?;
            }
            FileStatus::Error { message } => {
                element.push_attribute(("error", message.as_str()));
                report::write(&mut writer, Event::Empty(element))?;
            }
        }
    }

    report::write(&mut writer, Event::End(BytesEnd::new("validations")))?;
    String::from_utf8(writer.into_inner().into_inner()).map_err(|e| ReportError::Xml(e.to_string()))
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}
