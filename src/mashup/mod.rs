//! The mashup sub-container stored in the `DataMashup` part.
//!
//! # Envelope
//!
//! All integers are little-endian `u32`.
//!
//! ```text
//! version (=0)
//! len, package parts      zip archive of query sections
//! len, permissions        UTF-8 XML, optional BOM
//! len, metadata           version (=0), len, XML, len, content zip
//! len, permission bindings  opaque
//! ```
//!
//! The metadata range decodes into two outputs, the structured metadata and
//! the embedded content archive, through [`decode_metadata`], which yields
//! both or fails.

mod metadata;
mod permissions;
mod section;

pub use metadata::{MetadataEntry, MetadataItem, PackageMetadata, QUERY_GROUPS_ENTRY, QueryGroup};
pub use permissions::Permissions;
pub use section::{SECTION_NAME, generate_section_document, quote_identifier};

use crate::common::binary::{ByteCursor, write_length_prefixed};
use crate::common::{Error, Result};
use crate::package::Archive;

/// Envelope and metadata format version.
const ENVELOPE_VERSION: u32 = 0;

/// Path of the section document inside the query-sections archive.
pub const SECTION_DOCUMENT_PATH: &str = "Formulas/Section1.m";

/// A decoded mashup sub-container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MashupPackage {
    /// Package parts: `[Content_Types].xml`, `Config/Package.xml` and the
    /// section documents under `Formulas/`
    pub query_sections: Archive,
    pub permissions: Permissions,
    pub metadata: PackageMetadata,
    /// Loose files carried after the metadata XML
    pub embedded_content: Archive,
    /// Derived from `metadata`; not consulted when encoding
    pub query_groups: Option<Vec<QueryGroup>>,
    /// Opaque, usually encrypted, credential bindings
    pub permission_bindings: Vec<u8>,
}

impl MashupPackage {
    /// Decode the raw bytes of a `DataMashup` part.
    ///
    /// Errors carry no part name; the package reader attaches it.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(raw);
        let version = cursor.read_u32()?;
        if version != ENVELOPE_VERSION {
            return Err(Error::CorruptContainer(format!(
                "unsupported mashup envelope version {}",
                version
            )));
        }

        let package_parts = cursor.read_length_prefixed()?;
        let permissions = cursor.read_length_prefixed()?;
        let metadata = cursor.read_length_prefixed()?;
        let bindings = cursor.read_length_prefixed()?;
        if !cursor.is_at_end() {
            tracing::debug!(
                trailing = cursor.remaining(),
                "ignoring bytes after the mashup envelope"
            );
        }

        let query_sections = if package_parts.is_empty() {
            Archive::new()
        } else {
            Archive::from_zip_bytes(package_parts)?
        };
        let permissions = if permissions.is_empty() {
            Permissions::default()
        } else {
            Permissions::from_xml(permissions)?
        };
        let (metadata, embedded_content) = decode_metadata(metadata)?;
        let query_groups = metadata.query_groups()?;

        tracing::debug!(
            sections = query_sections.len(),
            items = metadata.items.len(),
            content = embedded_content.len(),
            "decoded mashup"
        );

        Ok(Self {
            query_sections,
            permissions,
            metadata,
            embedded_content,
            query_groups,
            permission_bindings: bindings.to_vec(),
        })
    }

    /// Encode back into envelope bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let package_parts = self.query_sections.to_zip_bytes()?;
        let permissions = self.permissions.to_xml();
        let metadata = encode_metadata(&self.metadata, &self.embedded_content)?;

        let mut out = Vec::with_capacity(
            16 + package_parts.len() + permissions.len() + metadata.len() + self.permission_bindings.len(),
        );
        out.extend_from_slice(&ENVELOPE_VERSION.to_le_bytes());
        write_length_prefixed(&mut out, &package_parts)?;
        write_length_prefixed(&mut out, permissions.as_bytes())?;
        write_length_prefixed(&mut out, &metadata)?;
        write_length_prefixed(&mut out, &self.permission_bindings)?;
        Ok(out)
    }

    /// A mashup holding a single section document and default permissions.
    pub fn from_section_document(document: &str) -> Self {
        let mut query_sections = Archive::new();
        query_sections.insert("[Content_Types].xml", CONTENT_TYPES.as_bytes().to_vec());
        query_sections.insert("Config/Package.xml", PACKAGE_CONFIG.as_bytes().to_vec());
        query_sections.insert(SECTION_DOCUMENT_PATH, document.as_bytes().to_vec());
        Self {
            query_sections,
            ..Self::default()
        }
    }

    /// The main section document, when present and valid UTF-8.
    pub fn section_document(&self) -> Option<&str> {
        self.query_sections
            .get(SECTION_DOCUMENT_PATH)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="utf-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="text/xml" /><Default Extension="m" ContentType="application/x-ms-m" /></Types>"#;

const PACKAGE_CONFIG: &str = r#"<?xml version="1.0" encoding="utf-8"?><Package xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><Version>1.0.0</Version><MinVersion>1.0.0</MinVersion><Culture>en-US</Culture></Package>"#;

/// Decode the metadata range into the structured metadata and the embedded
/// content archive.
///
/// An empty range stands for empty metadata and no content.
pub fn decode_metadata(bytes: &[u8]) -> Result<(PackageMetadata, Archive)> {
    if bytes.is_empty() {
        return Ok((PackageMetadata::default(), Archive::new()));
    }

    let mut cursor = ByteCursor::new(bytes);
    let version = cursor.read_u32()?;
    if version != ENVELOPE_VERSION {
        return Err(Error::CorruptContainer(format!(
            "unsupported mashup metadata version {}",
            version
        )));
    }
    let xml = cursor.read_length_prefixed()?;
    let content = cursor.read_length_prefixed()?;

    let metadata = PackageMetadata::from_xml(xml)?;
    let archive = if content.is_empty() {
        Archive::new()
    } else {
        Archive::from_zip_bytes(content)?
    };
    Ok((metadata, archive))
}

/// Inverse of [`decode_metadata`]. No content is written for an empty
/// archive.
pub fn encode_metadata(metadata: &PackageMetadata, content: &Archive) -> Result<Vec<u8>> {
    let xml = metadata.to_xml();
    let content = if content.is_empty() {
        Vec::new()
    } else {
        content.to_zip_bytes()?
    };

    let mut out = Vec::with_capacity(12 + xml.len() + content.len());
    out.extend_from_slice(&ENVELOPE_VERSION.to_le_bytes());
    write_length_prefixed(&mut out, xml.as_bytes())?;
    write_length_prefixed(&mut out, &content)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MashupPackage {
        let mut mashup = MashupPackage::from_section_document(
            "section Section1;\n\nshared Orders = Sql.Database(\"db\", \"sales\");",
        );
        mashup.metadata.items.push(MetadataItem {
            item_type: "AllFormulas".into(),
            item_path: String::new(),
            stable_entries: vec![MetadataEntry {
                kind: QUERY_GROUPS_ENTRY.into(),
                value: r#"s[{"Id":"g1","Name":"Staging","Description":null,"Order":0,"ParentId":null}]"#.into(),
            }],
            entries: Vec::new(),
        });
        mashup
            .embedded_content
            .insert("Content/readme.txt", b"notes".to_vec());
        mashup.permission_bindings = vec![0xDE, 0xAD];
        mashup
    }

    #[test]
    fn test_envelope_round_trip() {
        let mashup = sample();
        let decoded = MashupPackage::decode(&mashup.encode().unwrap()).unwrap();

        assert_eq!(decoded.query_sections, mashup.query_sections);
        assert_eq!(decoded.permissions, mashup.permissions);
        assert_eq!(decoded.metadata, mashup.metadata);
        assert_eq!(decoded.embedded_content, mashup.embedded_content);
        assert_eq!(decoded.permission_bindings, vec![0xDE, 0xAD]);
        assert_eq!(decoded.query_groups.as_ref().unwrap()[0].name, "Staging");
        assert!(decoded.section_document().unwrap().contains("shared Orders"));
    }

    #[test]
    fn test_metadata_decodes_both_or_neither() {
        let mashup = sample();
        let bytes = encode_metadata(&mashup.metadata, &mashup.embedded_content).unwrap();
        let (metadata, content) = decode_metadata(&bytes).unwrap();
        assert_eq!(metadata.items.len(), 1);
        assert_eq!(content.get("Content/readme.txt"), Some(&b"notes"[..]));

        // Cut into the content zip: the whole call fails
        assert!(decode_metadata(&bytes[..bytes.len() - 4]).is_err());
    }

    #[test]
    fn test_empty_metadata_content() {
        let bytes = encode_metadata(&PackageMetadata::default(), &Archive::new()).unwrap();
        let (metadata, content) = decode_metadata(&bytes).unwrap();
        assert!(metadata.items.is_empty());
        assert!(content.is_empty());
    }

    #[test]
    fn test_truncated_envelope() {
        let bytes = sample().encode().unwrap();
        assert!(matches!(
            MashupPackage::decode(&bytes[..10]),
            Err(Error::CorruptContainer(_))
        ));
        assert!(MashupPackage::decode(&[1, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_absent_query_groups() {
        let mashup = MashupPackage::from_section_document("section Section1;");
        let decoded = MashupPackage::decode(&mashup.encode().unwrap()).unwrap();
        assert!(decoded.query_groups.is_none());
    }
}
