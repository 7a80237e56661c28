//! Verdict computation and report rendering.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::message::{Category, Finding, Findings, Hint, Severity};

/// A document is valid unless at least one finding is fatal
pub fn verdict(findings: &Findings) -> bool {
    !findings.has_fatal()
}

/// Build the report for a finished run, dropping warnings when `suppress_warnings` is set.
///
/// Entries keep collection order. Fatal and informational findings are
/// always kept.
pub fn render(findings: &Findings, schema: &str, version: &str, suppress_warnings: bool) -> Report {
    let entries = findings
        .iter()
        .filter(|finding| !(suppress_warnings && finding.severity == Severity::Warning))
        .map(|finding| ReportEntry::new(finding, schema, version))
        .collect();
    Report { entries }
}

/// One rendered finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub schema: String,
    pub version: String,
    pub severity: Severity,
    pub category: Category,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rule_id: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<Hint>,
}

impl ReportEntry {
    fn new(finding: &Finding, schema: &str, version: &str) -> Self {
        Self {
            schema: schema.to_string(),
            version: version.to_string(),
            severity: finding.severity,
            category: finding.category,
            rule_id: finding.rule_id.clone(),
            title: finding.title.clone(),
            description: finding.description.clone(),
            hints: finding.hints.clone(),
        }
    }
}

/// Ordered report entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report {
    entries: Vec<ReportEntry>,
}

impl Report {
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render the `<messages>` XML layout
    pub fn to_xml(&self) -> Result<String, ReportError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.write_xml(&mut writer)?;

        String::from_utf8(writer.into_inner().into_inner()).map_err(|e| ReportError::Xml(e.to_string()))
    }

    /// Write the `<messages>` element into an enclosing document
    pub fn write_xml<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<(), ReportError> {
        write(writer, Event::Start(BytesStart::new("messages")))?;

        for entry in &self.entries {
            let mut message = BytesStart::new("message");
            message.push_attribute(("schema", entry.schema.as_str()));
            message.push_attribute(("version", entry.version.as_str()));
            message.push_attribute(("validationType", entry.category.as_str()));
            write(writer, Event::Start(message))?;

            text_element(writer, "messageType", entry.severity.as_str())?;
            text_element(writer, "title", &entry.title)?;
            text_element(writer, "description", &entry.description)?;
            text_element(writer, "schematronRuleId", &entry.rule_id)?;

            write(writer, Event::Start(BytesStart::new("hints")))?;
            for hint in &entry.hints {
                write(writer, Event::Start(BytesStart::new("hint")))?;
                text_element(writer, "title", &hint.title)?;
                text_element(writer, "description", &hint.description)?;
                write(writer, Event::End(BytesEnd::new("hint")))?;
            }
            write(writer, Event::End(BytesEnd::new("hints")))?;

            write(writer, Event::End(BytesEnd::new("message")))?;
        }

        write(writer, Event::End(BytesEnd::new("messages")))
    }
}

/// Write one event, mapping writer failures to [`ReportError::Xml`]
pub fn write<W: std::io::Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<(), ReportError> {
    writer
        .write_event(event)
        .map_err(|e| ReportError::Xml(e.to_string()))
}

fn text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), ReportError> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    write(writer, Event::Text(BytesText::new(text)))?;
    write(writer, Event::End(BytesEnd::new(name)))
}
