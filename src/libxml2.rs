//! LibXML2 FFI wrapper for XML Schema validation
//!
//! No mature pure Rust XSD validator exists, so structural checks go
//! through libxml2 directly. The wrapper owns every libxml2 pointer through
//! RAII types and reports validation errors through libxml2's structured
//! error callback.
//!
//! ## Thread Safety Strategy
//!
//! - **Initialization**: `xmlInitParser` runs exactly once behind `std::sync::Once`
//! - **Schema parsing**: serialized behind a process-wide mutex (the libxml2
//!   schema parser is NOT thread-safe) and cached per schema file
//! - **Validation**: fully parallel, each call creates its own validation
//!   context and parses its own copy of the document
//! - **Schema sharing**: compiled schemas are read-only and shared via `Arc`

use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};

use libc::{c_char, c_int, c_void};
use tracing::debug;

use crate::cache::{DEFAULT_MAX_ENTRIES, LoadOnceCache};
use crate::capability::{StructuralValidator, Violation};
use crate::document::XmlDocument;
use crate::error::{LibXml2Error, LibXml2Result, StepError, StepResult};

/// Global initialization flag for libxml2
static LIBXML2_INIT: Once = Once::new();

/// Serializes schema parsing across threads
static SCHEMA_PARSE_LOCK: Mutex<()> = Mutex::new(());

/// xmlParserOption values used when reading documents
const XML_PARSE_NOERROR: c_int = 1 << 5;
const XML_PARSE_NOWARNING: c_int = 1 << 6;
const XML_PARSE_NONET: c_int = 1 << 11;
const XML_PARSE_IGNORE_ENC: c_int = 1 << 21;

/// xmlErrorLevel value for recoverable errors; warnings are below it
const XML_ERR_ERROR: c_int = 2;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut xmlError)>;

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();

    // Document functions
    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);

    // Schema parsing functions
    pub fn xmlSchemaNewParserCtxt(url: *const c_char) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    // Schema validation functions
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaValidateDoc(ctxt: *mut XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;
}

/// Callback for libxml2 to report errors (structured)
unsafe extern "C" fn structured_error_callback(user_data: *mut c_void, error: *mut xmlError) {
    if user_data.is_null() || error.is_null() {
        return;
    }
    let violations = unsafe { &mut *(user_data as *mut Vec<Violation>) };
    let error = unsafe { &*error };

    if error.level < XML_ERR_ERROR || error.message.is_null() {
        return;
    }

    let c_str = unsafe { CStr::from_ptr(error.message) };
    let mut violation = Violation::new(c_str.to_string_lossy().trim());
    if error.line > 0 {
        violation = violation.at_line(error.line as u32);
    }
    violations.push(violation);
}

/// Compiled XML schema, freed on drop
#[derive(Debug)]
pub struct XmlSchemaPtr {
    ptr: *mut XmlSchema,
}

// Safety: libxml2 documentation states that xmlSchema structures are thread-safe for reading
// See: http://xmlsoft.org/threads.html
unsafe impl Send for XmlSchemaPtr {}
unsafe impl Sync for XmlSchemaPtr {}

impl XmlSchemaPtr {
    /// # Safety
    ///
    /// The pointer must come from `xmlSchemaParse` and must not be freed elsewhere.
    unsafe fn from_raw(ptr: *mut XmlSchema) -> Option<Self> {
        (!ptr.is_null()).then_some(Self { ptr })
    }

    fn as_ptr(&self) -> *const XmlSchema {
        self.ptr
    }
}

impl Drop for XmlSchemaPtr {
    fn drop(&mut self) {
        unsafe { xmlSchemaFree(self.ptr) };
    }
}

/// Parsed libxml2 document, freed on drop. Never shared between threads.
struct XmlDocPtr {
    ptr: *mut XmlDoc,
}

impl Drop for XmlDocPtr {
    fn drop(&mut self) {
        unsafe { xmlFreeDoc(self.ptr) };
    }
}

/// Outcome of one schema validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Validation succeeded (return code 0)
    Valid,
    /// Validation failed with errors (return code > 0)
    Invalid {
        error_count: i32,
        violations: Vec<Violation>,
    },
    /// Internal error occurred (return code < 0)
    InternalError { code: i32 },
}

impl ValidationResult {
    /// Create ValidationResult from libxml2 return code and captured errors
    pub fn from_code(code: c_int, violations: Vec<Violation>) -> Self {
        match code {
            0 => ValidationResult::Valid,
            n if n > 0 => ValidationResult::Invalid {
                error_count: n,
                violations,
            },
            n => ValidationResult::InternalError { code: n },
        }
    }

    /// Violations to report; an invalid result always reports at least one
    pub fn into_violations(self) -> LibXml2Result<Vec<Violation>> {
        match self {
            ValidationResult::Valid => Ok(Vec::new()),
            ValidationResult::Invalid {
                error_count,
                violations,
            } if violations.is_empty() => Ok(vec![Violation::new(format!(
                "Document is not valid against the schema ({} error(s))",
                error_count
            ))]),
            ValidationResult::Invalid { violations, .. } => Ok(violations),
            ValidationResult::InternalError { code } => {
                Err(LibXml2Error::ValidationFailed { code })
            }
        }
    }
}

/// Safe access to libxml2 schema parsing and validation
pub struct LibXml2Wrapper {
    _private: (),
}

impl LibXml2Wrapper {
    /// Initializes libxml2 on first use; safe to call repeatedly
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
        });

        LibXml2Wrapper { _private: () }
    }

    /// Parse an XML schema file. Includes and imports resolve relative to it.
    pub fn parse_schema_file(&self, path: &Path) -> LibXml2Result<XmlSchemaPtr> {
        let c_path = path
            .to_str()
            .and_then(|p| CString::new(p).ok())
            .ok_or_else(|| LibXml2Error::InvalidPath {
                path: path.to_path_buf(),
            })?;

        let _guard = SCHEMA_PARSE_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut errors: Vec<Violation> = Vec::new();
        let schema = unsafe {
            let parser_ctxt = xmlSchemaNewParserCtxt(c_path.as_ptr());
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::SchemaParseFailed {
                    path: path.to_path_buf(),
                    details: "cannot create parser context".to_string(),
                });
            }

            xmlSchemaSetParserStructuredErrors(
                parser_ctxt,
                Some(structured_error_callback),
                &mut errors as *mut Vec<Violation> as *mut c_void,
            );

            let schema_ptr = xmlSchemaParse(parser_ctxt);

            // Always free the parser context
            xmlSchemaFreeParserCtxt(parser_ctxt);

            XmlSchemaPtr::from_raw(schema_ptr)
        };

        schema.ok_or_else(|| LibXml2Error::SchemaParseFailed {
            path: path.to_path_buf(),
            details: join_messages(&errors),
        })
    }

    /// Validate an in-memory document against a compiled schema.
    ///
    /// Safe to call concurrently; each call uses its own contexts.
    pub fn validate_memory(
        &self,
        schema: &XmlSchemaPtr,
        xml_content: &[u8],
    ) -> LibXml2Result<ValidationResult> {
        let doc = self.parse_document(xml_content)?;

        unsafe {
            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }

            let mut violations: Vec<Violation> = Vec::new();
            xmlSchemaSetValidStructuredErrors(
                valid_ctxt,
                Some(structured_error_callback),
                &mut violations as *mut Vec<Violation> as *mut c_void,
            );

            let result_code = xmlSchemaValidateDoc(valid_ctxt, doc.ptr);

            // Always free the validation context
            xmlSchemaFreeValidCtxt(valid_ctxt);

            Ok(ValidationResult::from_code(result_code, violations))
        }
    }

    fn parse_document(&self, xml_content: &[u8]) -> LibXml2Result<XmlDocPtr> {
        let size = c_int::try_from(xml_content.len()).map_err(|_| {
            LibXml2Error::DocumentParseFailed {
                details: "document too large".to_string(),
            }
        })?;

        // Documents reach libxml2 already decoded; the declared encoding is ignored
        let ptr = unsafe {
            xmlReadMemory(
                xml_content.as_ptr() as *const c_char,
                size,
                std::ptr::null(),
                c"UTF-8".as_ptr(),
                XML_PARSE_NOERROR | XML_PARSE_NOWARNING | XML_PARSE_NONET | XML_PARSE_IGNORE_ENC,
            )
        };

        if ptr.is_null() {
            return Err(LibXml2Error::DocumentParseFailed {
                details: "libxml2 could not parse the document".to_string(),
            });
        }
        Ok(XmlDocPtr { ptr })
    }
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}

fn join_messages(violations: &[Violation]) -> String {
    if violations.is_empty() {
        return "schema could not be compiled".to_string();
    }
    violations
        .iter()
        .map(|v| v.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// [`StructuralValidator`] backed by libxml2 with compiled schemas cached per file
pub struct LibXml2Validator {
    wrapper: LibXml2Wrapper,
    schemas: LoadOnceCache<PathBuf, XmlSchemaPtr>,
}

impl LibXml2Validator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(max_schemas: u64) -> Self {
        Self {
            wrapper: LibXml2Wrapper::new(),
            schemas: LoadOnceCache::new(max_schemas),
        }
    }

    fn schema(&self, path: &Path) -> LibXml2Result<Arc<XmlSchemaPtr>> {
        self.schemas.get_or_load(path.to_path_buf(), || {
            debug!(schema = %path.display(), "compiling schema");
            self.wrapper.parse_schema_file(path)
        })
    }
}

impl Default for LibXml2Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuralValidator for LibXml2Validator {
    fn validate(&self, document: &XmlDocument, schema: &Path) -> StepResult<Vec<Violation>> {
        if !schema.is_file() {
            return Err(StepError::ResourceNotFound {
                path: schema.to_path_buf(),
            });
        }

        let compiled = self.schema(schema)?;
        let result = self.wrapper.validate_memory(&compiled, document.as_bytes())?;
        Ok(result.into_violations()?)
    }
}
