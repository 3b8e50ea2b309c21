//! Structured metadata of the mashup envelope.
//!
//! The metadata range holds a `LocalPackageMetadataFile` XML document
//! describing every formula item, followed by an embedded zip of loose
//! content files. Query groups are stored as a JSON string inside one of
//! the item entries.

use crate::common::encoding::TextEncoding;
use crate::common::xml::{entity_text, escape_xml};
use crate::common::{Error, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::{Deserialize, Serialize};

/// Entry type carrying the query groups.
pub const QUERY_GROUPS_ENTRY: &str = "QueryGroups";

/// The whole `LocalPackageMetadataFile` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageMetadata {
    pub items: Vec<MetadataItem>,
}

/// One `Item`: a location plus its typed entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetadataItem {
    pub item_type: String,
    pub item_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stable_entries: Vec<MetadataEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<MetadataEntry>,
}

/// A `Type`/`Value` pair. Values keep their one-letter type prefix
/// (`s` string, `l` long, `d` date, `f` float, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// A folder in the query editor's tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EntryList {
    Stable,
    Plain,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TextField {
    ItemType,
    ItemPath,
}

impl PackageMetadata {
    /// Parse the UTF-8 metadata XML.
    pub fn from_xml(bytes: &[u8]) -> Result<Self> {
        let text = TextEncoding::Utf8
            .decode(bytes)
            .map_err(Error::CorruptContainer)?;
        // Whitespace is kept: trimming would eat the spaces around entity
        // references inside values.
        let mut reader = Reader::from_str(&text);

        let mut metadata = PackageMetadata::default();
        let mut saw_root = false;
        let mut item: Option<MetadataItem> = None;
        let mut list: Option<EntryList> = None;
        let mut field: Option<TextField> = None;
        let mut value = String::new();

        loop {
            let event = reader.read_event()?;
            match &event {
                Event::Start(e) | Event::Empty(e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    match e.local_name().as_ref() {
                        b"LocalPackageMetadataFile" => saw_root = true,
                        b"Item" if !is_empty => item = Some(MetadataItem::default()),
                        b"StableEntries" if !is_empty => list = Some(EntryList::Stable),
                        b"Entries" if !is_empty => list = Some(EntryList::Plain),
                        b"ItemType" if !is_empty => {
                            field = Some(TextField::ItemType);
                            value.clear();
                        },
                        b"ItemPath" if !is_empty => {
                            field = Some(TextField::ItemPath);
                            value.clear();
                        },
                        b"Entry" => {
                            if let (Some(current), Some(list)) = (item.as_mut(), list) {
                                let entry = parse_entry(e)?;
                                match list {
                                    EntryList::Stable => current.stable_entries.push(entry),
                                    EntryList::Plain => current.entries.push(entry),
                                }
                            }
                        },
                        _ => {},
                    }
                    if !saw_root {
                        return Err(Error::CorruptContainer(
                            "expected a LocalPackageMetadataFile document".into(),
                        ));
                    }
                },
                Event::Text(e) if field.is_some() => {
                    value.push_str(std::str::from_utf8(e.as_ref())?);
                },
                Event::GeneralRef(e) if field.is_some() => {
                    value.push_str(&entity_text(e)?);
                },
                Event::End(e) => match e.local_name().as_ref() {
                    b"ItemType" | b"ItemPath" => {
                        if let (Some(current), Some(which)) = (item.as_mut(), field.take()) {
                            let text = std::mem::take(&mut value);
                            match which {
                                TextField::ItemType => current.item_type = text,
                                TextField::ItemPath => current.item_path = text,
                            }
                        }
                    },
                    b"StableEntries" | b"Entries" => list = None,
                    b"Item" => metadata.items.extend(item.take()),
                    _ => {},
                },
                Event::Eof => break,
                _ => {},
            }
        }

        if !saw_root {
            return Err(Error::CorruptContainer(
                "metadata document has no root element".into(),
            ));
        }
        Ok(metadata)
    }

    /// Serialize to UTF-8 XML without a BOM.
    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(256 + self.items.len() * 256);
        xml.push_str(r#"<?xml version="1.0" encoding="utf-8"?>"#);
        xml.push_str(
            r#"<LocalPackageMetadataFile xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">"#,
        );
        xml.push_str("<Items>");
        for item in &self.items {
            xml.push_str("<Item><ItemLocation>");
            xml.push_str(&format!("<ItemType>{}</ItemType>", escape_xml(&item.item_type)));
            if item.item_path.is_empty() {
                xml.push_str("<ItemPath />");
            } else {
                xml.push_str(&format!("<ItemPath>{}</ItemPath>", escape_xml(&item.item_path)));
            }
            xml.push_str("</ItemLocation>");
            write_entries(&mut xml, "StableEntries", &item.stable_entries);
            if !item.entries.is_empty() {
                write_entries(&mut xml, "Entries", &item.entries);
            }
            xml.push_str("</Item>");
        }
        xml.push_str("</Items></LocalPackageMetadataFile>");
        xml
    }

    /// Query groups from the first item that has a `QueryGroups` entry.
    ///
    /// Returns `Ok(None)` when no item carries one, which is the common case
    /// for models without query folders.
    ///
    /// # Errors
    /// [`Error::CorruptContainer`] when the entry exists but does not hold a
    /// JSON array of groups.
    pub fn query_groups(&self) -> Result<Option<Vec<QueryGroup>>> {
        let entry = self.items.iter().find_map(|item| {
            item.stable_entries
                .iter()
                .chain(&item.entries)
                .find(|entry| entry.kind == QUERY_GROUPS_ENTRY)
        });
        let Some(entry) = entry else {
            return Ok(None);
        };

        let json = entry.value.strip_prefix('s').ok_or_else(|| {
            Error::CorruptContainer(format!(
                "query groups value must be a string entry, got '{}'",
                entry.value.chars().take(16).collect::<String>()
            ))
        })?;
        let groups: Vec<QueryGroup> = serde_json::from_str(json)?;
        Ok(Some(groups))
    }
}

fn parse_entry(e: &BytesStart<'_>) -> Result<MetadataEntry> {
    let mut kind = None;
    let mut value = None;
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"Type" => kind = Some(attr.unescape_value()?.to_string()),
            b"Value" => value = Some(attr.unescape_value()?.to_string()),
            _ => {},
        }
    }
    let kind = kind.ok_or_else(|| Error::CorruptContainer("Entry without a Type".into()))?;
    Ok(MetadataEntry {
        kind,
        value: value.unwrap_or_default(),
    })
}

fn write_entries(xml: &mut String, element: &str, entries: &[MetadataEntry]) {
    if entries.is_empty() {
        xml.push_str(&format!("<{} />", element));
        return;
    }
    xml.push_str(&format!("<{}>", element));
    for entry in entries {
        xml.push_str(&format!(
            r#"<Entry Type="{}" Value="{}" />"#,
            escape_xml(&entry.kind),
            escape_xml(&entry.value)
        ));
    }
    xml.push_str(&format!("</{}>", element));
}
