//! Package writer.
//!
//! Regenerates a package from decoded parts. The output is equivalent to the
//! package the parts were read from, not byte-identical: members are
//! recompressed, written in catalog order and `[Content_Types].xml` is
//! rebuilt from the members actually present.

use crate::common::encoding::TextEncoding;
use crate::common::xml::{XmlDocument, escape_xml};
use crate::common::{Error, Result};
use crate::mashup::MashupPackage;
use crate::package::packuri::{CONTENT_TYPES_URI, PackURI};
use crate::package::parts::{PartKind, PbixPart};
use crate::package::phys_pkg::PhysPkgWriter;
use crate::package::records;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Collects parts and serializes them into a new package.
///
/// # Example
///
/// ```
/// use pbixproj::{MashupPackage, PbixPackage, PbixWriter};
///
/// let mut writer = PbixWriter::new();
/// writer.set_version("1.28");
/// writer.set_mashup(&MashupPackage::default())?;
/// let bytes = writer.to_bytes()?;
///
/// let package = PbixPackage::from_bytes(bytes)?;
/// assert_eq!(package.read_version()?, "1.28");
/// # Ok::<(), pbixproj::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct PbixWriter {
    /// Single-member parts, already encoded
    parts: BTreeMap<PbixPart, Vec<u8>>,
    /// Resource tree members by part and identifier
    resources: BTreeMap<PbixPart, BTreeMap<String, Vec<u8>>>,
}

impl PbixWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_text(&mut self, part: PbixPart, text: &str) {
        let encoding = part.encoding().unwrap_or(TextEncoding::Utf8);
        self.parts.insert(part, encoding.encode(text));
    }

    fn set_json(&mut self, part: PbixPart, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.set_text(part, &text);
        Ok(())
    }

    pub fn set_version(&mut self, version: &str) {
        self.set_text(PbixPart::Version, version);
    }

    pub fn set_connections(&mut self, connections: &Value) -> Result<()> {
        self.set_json(PbixPart::Connections, connections)
    }

    pub fn set_data_model_schema(&mut self, schema: &Value) -> Result<()> {
        self.set_json(PbixPart::DataModelSchema, schema)
    }

    pub fn set_data_model(&mut self, model: Vec<u8>) {
        self.parts.insert(PbixPart::DataModel, model);
    }

    pub fn set_report(&mut self, layout: &Value) -> Result<()> {
        self.set_json(PbixPart::Report, layout)
    }

    pub fn set_diagram_layout(&mut self, layout: &Value) -> Result<()> {
        self.set_json(PbixPart::DiagramLayout, layout)
    }

    pub fn set_report_metadata(&mut self, metadata: &Value) -> Result<()> {
        let bytes = records::encode(metadata, &records::REPORT_METADATA)
            .map_err(|e| e.in_part(PbixPart::ReportMetadata.name()))?;
        self.parts.insert(PbixPart::ReportMetadata, bytes);
        Ok(())
    }

    pub fn set_report_settings(&mut self, settings: &Value) -> Result<()> {
        let bytes = records::encode(settings, &records::REPORT_SETTINGS)
            .map_err(|e| e.in_part(PbixPart::ReportSettings.name()))?;
        self.parts.insert(PbixPart::ReportSettings, bytes);
        Ok(())
    }

    /// Store the linguistic schema, declaring the part's UTF-16 encoding.
    pub fn set_linguistic_schema(&mut self, schema: &XmlDocument) {
        let text = schema.to_string_declaring(TextEncoding::Utf16Le);
        self.set_text(PbixPart::LinguisticSchema, &text);
    }

    pub fn set_mashup(&mut self, mashup: &MashupPackage) -> Result<()> {
        let bytes = mashup
            .encode()
            .map_err(|e| e.in_part(PbixPart::DataMashup.name()))?;
        self.parts.insert(PbixPart::DataMashup, bytes);
        Ok(())
    }

    pub fn add_static_resource(&mut self, id: &str, bytes: Vec<u8>) -> Result<()> {
        self.add_resource(PbixPart::StaticResources, id, bytes)
    }

    pub fn add_custom_visual(&mut self, id: &str, bytes: Vec<u8>) -> Result<()> {
        self.add_resource(PbixPart::CustomVisuals, id, bytes)
    }

    fn add_resource(&mut self, part: PbixPart, id: &str, bytes: Vec<u8>) -> Result<()> {
        let uri = resource_uri(part, id);
        if !uri.is_safe() || uri.relative_to(part.member()).is_none() {
            return Err(Error::InvalidPath(format!(
                "resource identifier '{}' is not a relative path",
                id
            )));
        }
        let id = uri.relative_to(part.member()).unwrap_or(id).to_string();
        self.resources.entry(part).or_default().insert(id, bytes);
        Ok(())
    }

    /// Serialize all collected parts into package bytes.
    ///
    /// # Errors
    /// [`Error::CorruptContainer`] when a required part was never set.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        for part in PbixPart::ALL.iter().filter(|p| p.is_required()) {
            if !self.parts.contains_key(part) {
                return Err(Error::CorruptContainer(format!(
                    "cannot write a package without '{}'",
                    part.member()
                )));
            }
        }

        let mut phys_writer = PhysPkgWriter::new();
        let mut content_types = ContentTypesItem::new();
        let mut members: Vec<(PackURI, &[u8], bool)> = Vec::new();

        for part in PbixPart::ALL {
            if part.kind() == PartKind::ResourceTree {
                for (id, bytes) in self.resources.get(&part).into_iter().flatten() {
                    members.push((resource_uri(part, id), bytes.as_slice(), false));
                }
            } else if let Some(bytes) = self.parts.get(&part) {
                // The binary model is compressed already
                let stored = part == PbixPart::DataModel;
                members.push((PackURI::from_membername(part.member()), bytes.as_slice(), stored));
            }
        }

        for (uri, _, _) in &members {
            content_types.add(uri);
        }
        let content_types_uri = PackURI::new(CONTENT_TYPES_URI).map_err(Error::InvalidPath)?;
        phys_writer.write(&content_types_uri, content_types.to_xml().as_bytes())?;

        for (uri, bytes, stored) in &members {
            if *stored {
                phys_writer.write_stored(uri, bytes)?;
            } else {
                phys_writer.write(uri, bytes)?;
            }
        }

        tracing::debug!(members = members.len(), "package serialized");
        phys_writer.finish()
    }

    /// Serialize into a file, replacing it if it exists.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

fn resource_uri(part: PbixPart, id: &str) -> PackURI {
    let id = id.replace('\\', "/");
    PackURI::from_membername(&format!("{}/{}", part.member(), id.trim_start_matches('/')))
}

/// Helper for building `[Content_Types].xml`.
///
/// Parts carry no content type of their own, so every member gets an
/// override with an empty type and resource extensions get an empty
/// default.
struct ContentTypesItem {
    defaults: BTreeSet<String>,
    overrides: BTreeSet<String>,
}

impl ContentTypesItem {
    fn new() -> Self {
        Self {
            defaults: BTreeSet::new(),
            overrides: BTreeSet::new(),
        }
    }

    fn add(&mut self, partname: &PackURI) {
        let ext = partname.ext();
        let is_resource = [PbixPart::StaticResources, PbixPart::CustomVisuals]
            .iter()
            .any(|part| partname.relative_to(part.member()).is_some());
        if is_resource && !ext.is_empty() {
            self.defaults.insert(ext.to_ascii_lowercase());
        } else {
            self.overrides.insert(partname.to_string());
        }
    }

    fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(1024);

        xml.push_str(r#"<?xml version="1.0" encoding="utf-8"?>"#);
        xml.push_str(
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        );
        for ext in &self.defaults {
            xml.push_str(&format!(
                r#"<Default Extension="{}" ContentType="" />"#,
                escape_xml(ext)
            ));
        }
        for partname in &self.overrides {
            xml.push_str(&format!(
                r#"<Override PartName="{}" ContentType="" />"#,
                escape_xml(partname)
            ));
        }
        xml.push_str("</Types>");

        xml
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PbixPackage;
    use serde_json::json;

    fn minimal() -> PbixWriter {
        let mut writer = PbixWriter::new();
        writer.set_version("1.28");
        writer.set_mashup(&MashupPackage::default()).unwrap();
        writer
    }

    #[test]
    fn test_content_types_xml() {
        let mut cti = ContentTypesItem::new();
        cti.add(&PackURI::new("/Report/Layout").unwrap());
        cti.add(&PackURI::new("/Report/StaticResources/logo.PNG").unwrap());

        let xml = cti.to_xml();
        assert!(xml.contains(r#"<Default Extension="png" ContentType="" />"#));
        assert!(xml.contains(r#"<Override PartName="/Report/Layout" ContentType="" />"#));
        assert!(!xml.contains("logo"));
    }

    #[test]
    fn test_required_parts_enforced() {
        let mut writer = PbixWriter::new();
        writer.set_version("1.28");
        assert!(matches!(writer.to_bytes(), Err(Error::CorruptContainer(_))));
    }

    #[test]
    fn test_written_package_reads_back() {
        let mut writer = minimal();
        writer.set_report(&json!({"sections": []})).unwrap();
        writer
            .set_report_metadata(&json!({"version": 5, "createdFrom": "Cloud"}))
            .unwrap();
        writer
            .set_linguistic_schema(
                &XmlDocument::parse(r#"<?xml version="1.0" encoding="utf-8"?><LinguisticSchema/>"#)
                    .unwrap(),
            );
        writer
            .add_static_resource("SharedResources/BaseThemes/CY24SU02.json", b"{}".to_vec())
            .unwrap();

        let package = PbixPackage::from_bytes(writer.to_bytes().unwrap()).unwrap();
        assert!(package.part_names().contains(&"[Content_Types].xml".to_string()));
        assert_eq!(package.read_report().unwrap().unwrap(), json!({"sections": []}));
        assert_eq!(package.read_report_metadata().unwrap().unwrap()["createdFrom"], "Cloud");
        assert_eq!(
            package.read_linguistic_schema().unwrap().unwrap().declared_encoding(),
            Some("utf-16")
        );
        assert_eq!(
            package.read_static_resources().unwrap()["SharedResources/BaseThemes/CY24SU02.json"],
            b"{}"
        );
    }

    #[test]
    fn test_rejects_escaping_resource_id() {
        let mut writer = minimal();
        assert!(matches!(
            writer.add_custom_visual("../../etc/passwd", vec![]),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn test_invalid_record_value() {
        let mut writer = minimal();
        let err = writer
            .set_report_settings(&json!({"reportSettings": {"exportDataMode": "all"}}))
            .unwrap_err();
        assert!(matches!(err, Error::PartCorrupt { ref part, .. } if part == "ReportSettings"));
    }
}
