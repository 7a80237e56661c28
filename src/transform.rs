//! Rule and predicate evaluation through an external XSLT processor.
//!
//! The processor is any command line program that applies a stylesheet to
//! the document it reads on stdin and writes the result to stdout. Rule
//! stylesheets are compiled Schematron and produce SVRL; predicate
//! stylesheets produce `status` elements.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capability::{PredicateEvaluator, RuleEvaluator, RuleMessage};
use crate::document::XmlDocument;
use crate::error::{StepError, StepResult};
use crate::message::{Hint, Severity};

/// Placeholder replaced by the stylesheet path in processor arguments
pub const STYLESHEET_PLACEHOLDER: &str = "{stylesheet}";

/// How to invoke the XSLT processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for TransformerCommand {
    fn default() -> Self {
        Self {
            program: "xsltproc".to_string(),
            args: vec![STYLESHEET_PLACEHOLDER.to_string(), "-".to_string()],
        }
    }
}

impl TransformerCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn arguments(&self, stylesheet: &Path) -> Vec<String> {
        let path = stylesheet.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(STYLESHEET_PLACEHOLDER, &path))
            .collect()
    }

    /// Apply `stylesheet` to `input` and return the processor's stdout
    pub fn run(&self, stylesheet: &Path, input: &[u8]) -> StepResult<String> {
        if !stylesheet.is_file() {
            return Err(StepError::ResourceNotFound {
                path: stylesheet.to_path_buf(),
            });
        }

        debug!(program = %self.program, stylesheet = %stylesheet.display(), "running transformation");

        let mut child = Command::new(&self.program)
            .args(self.arguments(stylesheet))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| StepError::Engine {
                details: format!("cannot start '{}': {}", self.program, e),
            })?;

        // Feed stdin from a separate thread so a large output cannot block us
        let mut stdin = child.stdin.take().ok_or_else(|| StepError::Engine {
            details: "processor stdin unavailable".to_string(),
        })?;
        let input = input.to_vec();
        let writer = thread::spawn(move || stdin.write_all(&input));

        let output = child.wait_with_output().map_err(|e| StepError::Engine {
            details: format!("waiting for '{}' failed: {}", self.program, e),
        })?;

        // A processor that exits early closes the pipe; its status says why
        let write_result = writer.join().map_err(|_| StepError::Engine {
            details: "stdin writer thread panicked".to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let details = match stderr.trim() {
                "" => format!("processor exited with {}", output.status),
                message => format!("processor exited with {}: {}", output.status, message),
            };
            return Err(StepError::Transformation {
                resource: stylesheet.to_path_buf(),
                details,
            });
        }
        if let Err(e) = write_result {
            return Err(StepError::Transformation {
                resource: stylesheet.to_path_buf(),
                details: format!("cannot write document to processor: {}", e),
            });
        }

        String::from_utf8(output.stdout).map_err(|e| StepError::InvalidOutput {
            resource: stylesheet.to_path_buf(),
            details: e.to_string(),
        })
    }
}

/// [`RuleEvaluator`] that reads SVRL produced by a compiled Schematron stylesheet
#[derive(Debug, Clone, Default)]
pub struct XsltRuleEvaluator {
    command: TransformerCommand,
}

impl XsltRuleEvaluator {
    pub fn new(command: TransformerCommand) -> Self {
        Self { command }
    }
}

impl RuleEvaluator for XsltRuleEvaluator {
    fn evaluate(&self, document: &XmlDocument, rules: &Path) -> StepResult<Vec<RuleMessage>> {
        let output = self.command.run(rules, document.as_bytes())?;
        parse_svrl(&output).map_err(|details| StepError::InvalidOutput {
            resource: rules.to_path_buf(),
            details,
        })
    }
}

/// [`PredicateEvaluator`] that reads the `status` elements of the output
#[derive(Debug, Clone, Default)]
pub struct XsltPredicateEvaluator {
    command: TransformerCommand,
}

impl XsltPredicateEvaluator {
    pub fn new(command: TransformerCommand) -> Self {
        Self { command }
    }
}

impl PredicateEvaluator for XsltPredicateEvaluator {
    fn evaluate(&self, document: &XmlDocument, predicate: &Path) -> StepResult<bool> {
        let output = self.command.run(predicate, document.as_bytes())?;
        parse_status(&output).map_err(|details| StepError::InvalidOutput {
            resource: PathBuf::from(predicate),
            details,
        })
    }
}

fn severity_from_flag(flag: Option<&str>) -> Severity {
    match flag.map(|f| f.trim().to_ascii_lowercase()).as_deref() {
        Some("warning") | Some("warn") => Severity::Warning,
        Some("information") | Some("info") => Severity::Info,
        _ => Severity::Fatal,
    }
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, String> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.local_name().as_ref() == name {
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[derive(Clone, Copy)]
enum TextTarget {
    Title,
    Hint,
}

/// Collect SVRL `failed-assert` and `successful-report` entries in order
pub fn parse_svrl(svrl: &str) -> Result<Vec<RuleMessage>, String> {
    let mut reader = Reader::from_str(svrl);
    let mut messages = Vec::new();
    let mut current: Option<RuleMessage> = None;
    let mut target: Option<TextTarget> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            format!("malformed SVRL at byte {}: {}", reader.buffer_position(), e)
        })?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"failed-assert" | b"successful-report" => {
                        let flag = match attribute(e, b"flag")? {
                            Some(flag) => Some(flag),
                            None => attribute(e, b"role")?,
                        };
                        let message = RuleMessage {
                            severity: severity_from_flag(flag.as_deref()),
                            rule_id: attribute(e, b"id")?.unwrap_or_default(),
                            title: String::new(),
                            description: attribute(e, b"location")?.unwrap_or_default(),
                            hints: Vec::new(),
                        };
                        if is_empty {
                            messages.push(message);
                        } else {
                            current = Some(message);
                        }
                    }
                    b"text" if current.is_some() && !is_empty => target = Some(TextTarget::Title),
                    b"diagnostic-reference" => {
                        if let Some(message) = current.as_mut() {
                            let title = attribute(e, b"diagnostic")?.unwrap_or_default();
                            message.hints.push(Hint::new(title, ""));
                            if !is_empty {
                                target = Some(TextTarget::Hint);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(ref t) => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                append_text(current.as_mut(), target, &text);
            }
            Event::CData(ref c) => {
                append_text(current.as_mut(), target, &String::from_utf8_lossy(c));
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"failed-assert" | b"successful-report" => {
                    if let Some(mut message) = current.take() {
                        message.title = normalize(&message.title);
                        for hint in message.hints.iter_mut() {
                            hint.description = normalize(&hint.description);
                        }
                        messages.push(message);
                    }
                    target = None;
                }
                b"text" | b"diagnostic-reference" => target = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(messages)
}

fn append_text(message: Option<&mut RuleMessage>, target: Option<TextTarget>, text: &str) {
    let Some(message) = message else {
        return;
    };
    match target {
        Some(TextTarget::Title) => message.title.push_str(text),
        Some(TextTarget::Hint) => {
            if let Some(hint) = message.hints.last_mut() {
                hint.description.push_str(text);
            }
        }
        None => {}
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Read every `status` element; the last one decides
pub fn parse_status(output: &str) -> Result<bool, String> {
    let mut reader = Reader::from_str(output);
    let mut in_status = false;
    let mut text = String::new();
    let mut last: Option<String> = None;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) if e.local_name().as_ref() == b"status" => {
                in_status = true;
                text.clear();
            }
            Event::Empty(e) if e.local_name().as_ref() == b"status" => {
                last = Some(String::new());
            }
            Event::Text(t) if in_status => text.push_str(&t.unescape().map_err(|e| e.to_string())?),
            Event::End(e) if e.local_name().as_ref() == b"status" => {
                in_status = false;
                last = Some(std::mem::take(&mut text));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(last.is_some_and(|status| status.trim() == "true"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SVRL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<svrl:schematron-output xmlns:svrl="http://purl.oclc.org/dsdl/svrl">
  <svrl:active-pattern document=""/>
  <svrl:fired-rule context="/Invoice"/>
  <svrl:failed-assert id="BR-01" flag="fatal" test="cbc:CustomizationID" location="/*:Invoice[1]">
    <svrl:text>[BR-01]-An Invoice shall have a
      Specification identifier.</svrl:text>
    <svrl:diagnostic-reference diagnostic="hint-customization">Add cbc:CustomizationID</svrl:diagnostic-reference>
  </svrl:failed-assert>
  <svrl:successful-report id="W-07" role="warning" test="true()" location="/*:Invoice[1]/*:Note[1]">
    <svrl:text>Note &amp; remark present</svrl:text>
  </svrl:successful-report>
  <svrl:failed-assert id="I-3" flag="information" location="/">
    <svrl:text>Informational</svrl:text>
  </svrl:failed-assert>
  <svrl:failed-assert location="/x"/>
</svrl:schematron-output>"#;

    #[test]
    fn test_parse_svrl_messages_in_order() {
        let messages = parse_svrl(SVRL).unwrap();
        assert_eq!(messages.len(), 4);

        assert_eq!(messages[0].severity, Severity::Fatal);
        assert_eq!(messages[0].rule_id, "BR-01");
        assert_eq!(
            messages[0].title,
            "[BR-01]-An Invoice shall have a Specification identifier."
        );
        assert_eq!(messages[0].description, "/*:Invoice[1]");
        assert_eq!(
            messages[0].hints,
            vec![Hint::new("hint-customization", "Add cbc:CustomizationID")]
        );

        assert_eq!(messages[1].severity, Severity::Warning);
        assert_eq!(messages[1].rule_id, "W-07");
        assert_eq!(messages[1].title, "Note & remark present");

        assert_eq!(messages[2].severity, Severity::Info);

        // No flag or id: fatal and not rule-scoped
        assert_eq!(messages[3].severity, Severity::Fatal);
        assert_eq!(messages[3].rule_id, "");
    }

    #[test]
    fn test_parse_svrl_without_failures() {
        let svrl = r#"<svrl:schematron-output xmlns:svrl="http://purl.oclc.org/dsdl/svrl">
            <svrl:fired-rule context="/"/></svrl:schematron-output>"#;
        assert!(parse_svrl(svrl).unwrap().is_empty());
    }

    #[test]
    fn test_parse_svrl_malformed() {
        assert!(parse_svrl("<svrl:schematron-output><a></b>").is_err());
    }

    #[test]
    fn test_severity_from_flag() {
        assert_eq!(severity_from_flag(Some("ERROR")), Severity::Fatal);
        assert_eq!(severity_from_flag(Some("warn")), Severity::Warning);
        assert_eq!(severity_from_flag(Some("info")), Severity::Info);
        assert_eq!(severity_from_flag(None), Severity::Fatal);
    }

    #[test]
    fn test_parse_status_last_wins() {
        assert!(parse_status("<result><status>false</status><status>true</status></result>").unwrap());
        assert!(!parse_status("<result><status>true</status><status>false</status></result>").unwrap());
        assert!(parse_status("<status> true </status>").unwrap());
        assert!(!parse_status("<status>TRUE</status>").unwrap());
        assert!(!parse_status("<result/>").unwrap());
        assert!(!parse_status("").unwrap());
    }

    #[test]
    fn test_arguments_substitute_stylesheet() {
        let command = TransformerCommand::new(
            "java",
            vec!["-jar".into(), "saxon.jar".into(), "-xsl:{stylesheet}".into(), "-s:-".into()],
        );
        assert_eq!(
            command.arguments(Path::new("/data/rules.xsl")),
            vec!["-jar", "saxon.jar", "-xsl:/data/rules.xsl", "-s:-"]
        );
    }

    #[test]
    fn test_run_missing_stylesheet() {
        let err = TransformerCommand::default()
            .run(Path::new("/nonexistent/rules.xsl"), b"<a/>")
            .unwrap_err();
        assert!(matches!(err, StepError::ResourceNotFound { .. }));
    }

    #[test]
    fn test_run_missing_program_is_engine_error() {
        let temp_dir = TempDir::new().unwrap();
        let stylesheet = temp_dir.path().join("rules.xsl");
        fs::write(&stylesheet, "<xsl:stylesheet/>").unwrap();

        let command = TransformerCommand::new("rule-validator-no-such-program", vec![]);
        let err = command.run(&stylesheet, b"<a/>").unwrap_err();
        assert!(matches!(err, StepError::Engine { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_passes_document_on_stdin() {
        let temp_dir = TempDir::new().unwrap();
        let stylesheet = temp_dir.path().join("echo.xsl");
        fs::write(&stylesheet, "unused").unwrap();

        let command = TransformerCommand::new("cat", vec![]);
        let output = command.run(&stylesheet, b"<status>true</status>").unwrap();
        assert_eq!(output, "<status>true</status>");
    }

    #[cfg(unix)]
    #[test]
    fn test_predicate_evaluator_reads_status() {
        let temp_dir = TempDir::new().unwrap();
        let stylesheet = temp_dir.path().join("filter.xsl");
        fs::write(&stylesheet, "unused").unwrap();

        let evaluator = XsltPredicateEvaluator::new(TransformerCommand::new("cat", vec![]));
        let document = XmlDocument::parse("<r><status>true</status></r>").unwrap();
        assert!(evaluator.evaluate(&document, &stylesheet).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_processor_is_transformation_error() {
        let temp_dir = TempDir::new().unwrap();
        let stylesheet = temp_dir.path().join("rules.xsl");
        fs::write(&stylesheet, "unused").unwrap();

        let command = TransformerCommand::new("false", vec![]);
        let err = command.run(&stylesheet, b"<a/>").unwrap_err();
        assert!(matches!(err, StepError::Transformation { .. }));
    }
}
