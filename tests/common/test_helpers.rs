use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub const UBL_INVOICE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2"
         xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2">
    <cbc:CustomizationID>urn:cen.eu:en16931:2017</cbc:CustomizationID>
    <cbc:ID>INV-1</cbc:ID>
</Invoice>"#;

pub const SIMPLE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="root">
        <xs:complexType>
            <xs:sequence>
                <xs:element name="element" type="xs:string"/>
            </xs:sequence>
        </xs:complexType>
    </xs:element>
</xs:schema>"#;

pub const SIMPLE_VALID_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root><element>content</element></root>"#;

pub const SIMPLE_INVALID_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root>
    <unexpected/>
</root>"#;

/// A throwaway data directory with STANDARD/ and CUSTOM/ trees
pub struct DataDir {
    temp_dir: TempDir,
}

impl DataDir {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Absolute path of a step file written as `/STANDARD/...` in config.xml
    pub fn resource(&self, relative: &str) -> PathBuf {
        self.path().join(relative.trim_start_matches('/'))
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.resource(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn write_standard(&self, config: &str) -> PathBuf {
        self.write("STANDARD/config.xml", config)
    }

    pub fn write_custom(&self, config: &str) -> PathBuf {
        self.write("CUSTOM/config.xml", config)
    }
}

/// `<config>` with one `validate` entry
pub fn config_xml(schema: &str, version: &str, steps: &[&str]) -> String {
    format!(
        "<config>\n  <validate id=\"{}\" version=\"{}\">\n    {}\n  </validate>\n</config>",
        schema,
        version,
        steps.join("\n    ")
    )
}
