//! Parsed input document.
//!
//! The engines behind the capability traits re-read the raw text, so the
//! handle keeps the source together with the facts the autodetector needs.

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use crate::error::DocumentError;

/// A well-formed XML document ready for the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    source: String,
    root_name: String,
    root_namespace: Option<String>,
}

impl XmlDocument {
    /// Check well-formedness and capture the root element.
    ///
    /// Empty or whitespace-only input, unbalanced or mismatched tags,
    /// unbound prefixes, malformed attributes, content outside the root
    /// element and a second root element are all rejected.
    pub fn parse(source: impl Into<String>) -> Result<Self, DocumentError> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(DocumentError::Empty);
        }

        let mut reader = NsReader::from_str(&source);
        let mut depth = 0usize;
        let mut root: Option<(String, Option<String>)> = None;

        loop {
            let position = reader.buffer_position() as u64;
            let (resolved, event) = reader
                .read_resolved_event()
                .map_err(|e| not_well_formed(position, e))?;

            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    if depth == 0 && root.is_some() {
                        return Err(DocumentError::NotWellFormed {
                            position,
                            details: "more than one root element".to_string(),
                        });
                    }
                    let namespace = match resolved {
                        ResolveResult::Bound(ns) => {
                            Some(String::from_utf8_lossy(ns.as_ref()).into_owned())
                        }
                        ResolveResult::Unbound => None,
                        ResolveResult::Unknown(prefix) => {
                            return Err(DocumentError::NotWellFormed {
                                position,
                                details: format!(
                                    "unbound namespace prefix '{}'",
                                    String::from_utf8_lossy(&prefix)
                                ),
                            });
                        }
                    };
                    for attr in e.attributes() {
                        attr.map_err(|e| not_well_formed(position, e))?;
                    }
                    if depth == 0 {
                        let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                        root = Some((local, namespace));
                    }
                    if matches!(event, Event::Start(_)) {
                        depth += 1;
                    }
                }
                Event::End(_) => {
                    depth = depth.checked_sub(1).ok_or_else(|| DocumentError::NotWellFormed {
                        position,
                        details: "end tag without matching start tag".to_string(),
                    })?;
                }
                Event::Text(ref t) => {
                    let text = t.unescape().map_err(|e| not_well_formed(position, e))?;
                    if depth == 0 && !text.trim().is_empty() {
                        return Err(DocumentError::NotWellFormed {
                            position,
                            details: "text content outside the root element".to_string(),
                        });
                    }
                }
                Event::CData(_) if depth == 0 => {
                    return Err(DocumentError::NotWellFormed {
                        position,
                        details: "CDATA section outside the root element".to_string(),
                    });
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if depth != 0 {
            return Err(DocumentError::NotWellFormed {
                position: source.len() as u64,
                details: format!("{} element(s) left unclosed", depth),
            });
        }

        let (root_name, root_namespace) = root.ok_or(DocumentError::MissingRoot)?;
        Ok(Self {
            source,
            root_name,
            root_namespace,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }

    /// Local name of the root element
    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    /// Namespace URI of the root element, if it has one
    pub fn root_namespace(&self) -> Option<&str> {
        self.root_namespace.as_deref()
    }

    /// Trimmed text of the first element with the given local name, in
    /// document order. Nested markup inside that element is skipped.
    pub fn first_text(&self, local_name: &str) -> Option<String> {
        let mut reader = NsReader::from_str(&self.source);
        let mut capture: Option<(usize, String)> = None;
        let mut depth = 0usize;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    depth += 1;
                    if capture.is_none() && e.local_name().as_ref() == local_name.as_bytes() {
                        capture = Some((depth, String::new()));
                    }
                }
                Ok(Event::Empty(e)) => {
                    if capture.is_none() && e.local_name().as_ref() == local_name.as_bytes() {
                        return Some(String::new());
                    }
                }
                Ok(Event::Text(t)) => {
                    if let Some((_, text)) = capture.as_mut() {
                        text.push_str(&t.unescape().ok()?);
                    }
                }
                Ok(Event::CData(c)) => {
                    if let Some((_, text)) = capture.as_mut() {
                        text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Ok(Event::End(_)) => {
                    if let Some((level, text)) = capture.take() {
                        if level == depth {
                            return Some(text.trim().to_string());
                        }
                        capture = Some((level, text));
                    }
                    depth = depth.saturating_sub(1);
                }
                Ok(Event::Eof) | Err(_) => return None,
                Ok(_) => {}
            }
        }
    }
}

fn not_well_formed(position: u64, err: impl std::fmt::Display) -> DocumentError {
    DocumentError::NotWellFormed {
        position,
        details: err.to_string(),
    }
}
