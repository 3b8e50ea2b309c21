//! Catalog of the named parts of a package.
//!
//! Each part has a fixed zip member (or member prefix for resource trees),
//! a declared kind and, for text parts, a declared encoding. The encoding is
//! part of the catalog and never inferred from the bytes.

use crate::common::encoding::TextEncoding;

/// Declared kind of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    /// Structured object tree serialized as JSON
    Json,
    /// XML document
    Xml,
    /// Plain text
    Text,
    /// Length-prefixed binary records
    BinaryRecords,
    /// Nested mashup envelope
    Mashup,
    /// Opaque bytes
    Binary,
    /// All members below a folder prefix, keyed by identifier
    ResourceTree,
}

/// The named parts a package may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PbixPart {
    Version,
    Connections,
    DataModelSchema,
    DataModel,
    DataMashup,
    Report,
    ReportMetadata,
    ReportSettings,
    LinguisticSchema,
    DiagramLayout,
    StaticResources,
    CustomVisuals,
}

impl PbixPart {
    /// Every part, in the order they are written to a new package.
    pub const ALL: [PbixPart; 12] = [
        PbixPart::Version,
        PbixPart::DataMashup,
        PbixPart::DiagramLayout,
        PbixPart::Report,
        PbixPart::LinguisticSchema,
        PbixPart::StaticResources,
        PbixPart::CustomVisuals,
        PbixPart::ReportSettings,
        PbixPart::ReportMetadata,
        PbixPart::Connections,
        PbixPart::DataModelSchema,
        PbixPart::DataModel,
    ];

    /// Human-readable part name, used in errors and logs.
    pub const fn name(self) -> &'static str {
        match self {
            PbixPart::Version => "Version",
            PbixPart::Connections => "Connections",
            PbixPart::DataModelSchema => "DataModelSchema",
            PbixPart::DataModel => "DataModel",
            PbixPart::DataMashup => "DataMashup",
            PbixPart::Report => "Report",
            PbixPart::ReportMetadata => "ReportMetadata",
            PbixPart::ReportSettings => "ReportSettings",
            PbixPart::LinguisticSchema => "LinguisticSchema",
            PbixPart::DiagramLayout => "DiagramLayout",
            PbixPart::StaticResources => "StaticResources",
            PbixPart::CustomVisuals => "CustomVisuals",
        }
    }

    /// Zip member name, or member prefix for resource trees.
    pub const fn member(self) -> &'static str {
        match self {
            PbixPart::Version => "Version",
            PbixPart::Connections => "Connections",
            PbixPart::DataModelSchema => "DataModelSchema",
            PbixPart::DataModel => "DataModel",
            PbixPart::DataMashup => "DataMashup",
            PbixPart::Report => "Report/Layout",
            PbixPart::ReportMetadata => "Metadata",
            PbixPart::ReportSettings => "Settings",
            PbixPart::LinguisticSchema => "Report/LinguisticSchema",
            PbixPart::DiagramLayout => "DiagramLayout",
            PbixPart::StaticResources => "Report/StaticResources",
            PbixPart::CustomVisuals => "Report/CustomVisuals",
        }
    }

    pub const fn kind(self) -> PartKind {
        match self {
            PbixPart::Version => PartKind::Text,
            PbixPart::Connections
            | PbixPart::DataModelSchema
            | PbixPart::Report
            | PbixPart::DiagramLayout => PartKind::Json,
            PbixPart::DataModel => PartKind::Binary,
            PbixPart::DataMashup => PartKind::Mashup,
            PbixPart::ReportMetadata | PbixPart::ReportSettings => PartKind::BinaryRecords,
            PbixPart::LinguisticSchema => PartKind::Xml,
            PbixPart::StaticResources | PbixPart::CustomVisuals => PartKind::ResourceTree,
        }
    }

    /// Text encoding of the part, `None` for binary kinds.
    ///
    /// Strings inside binary records are UTF-16LE as well; that is handled
    /// by the record codec and not reported here.
    pub const fn encoding(self) -> Option<TextEncoding> {
        match self {
            PbixPart::Connections => Some(TextEncoding::Utf8),
            PbixPart::Version
            | PbixPart::DataModelSchema
            | PbixPart::Report
            | PbixPart::LinguisticSchema
            | PbixPart::DiagramLayout => Some(TextEncoding::Utf16Le),
            _ => None,
        }
    }

    /// Whether a package without this part is corrupt.
    pub const fn is_required(self) -> bool {
        matches!(self, PbixPart::Version | PbixPart::DataMashup)
    }
}

impl std::fmt::Display for PbixPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
