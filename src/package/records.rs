//! Length-prefixed binary records used by the report metadata and report
//! settings parts.
//!
//! # Layout
//!
//! All integers are little-endian.
//!
//! ```text
//! part   := u16 format_version (=1), record
//! record := u16 field_count, field*
//! field  := u16 ordinal, u8 tag, u32 payload_len, payload
//! ```
//!
//! Tags: 0 null, 1 bool, 2 int32, 3 int64, 4 double, 5 UTF-16LE string,
//! 6 nested record, 7 list (`u32 count`, then `u8 tag, u32 len, payload` per
//! element).
//!
//! A [`RecordSchema`] maps ordinals to camel-case names and kinds. Decoding
//! emits declared fields in declaration order whatever their stream order,
//! followed by undeclared fields keyed `#<ordinal>` so they survive a round
//! trip.

use crate::common::binary::{
    ByteCursor, read_f64_le, read_i32_le, read_i64_le, write_length_prefixed,
};
use crate::common::encoding::{TextEncoding, decode_utf16le};
use crate::common::{Error, Result};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Current and only supported format version.
pub const FORMAT_VERSION: u16 = 1;

/// Records nested deeper than this are treated as corrupt.
const MAX_DEPTH: usize = 32;

/// Wire tag of a field payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Null = 0,
    Bool = 1,
    Int32 = 2,
    Int64 = 3,
    Double = 4,
    String = 5,
    Record = 6,
    List = 7,
}

impl TryFrom<u8> for Tag {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Tag::Null,
            1 => Tag::Bool,
            2 => Tag::Int32,
            3 => Tag::Int64,
            4 => Tag::Double,
            5 => Tag::String,
            6 => Tag::Record,
            7 => Tag::List,
            other => return Err(corrupt(format!("unknown field tag {}", other))),
        })
    }
}

/// Declared kind of a record field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Bool,
    Int32,
    Int64,
    Double,
    String,
    Record(&'static RecordSchema),
    List,
}

impl FieldKind {
    fn tag(self) -> Tag {
        match self {
            FieldKind::Bool => Tag::Bool,
            FieldKind::Int32 => Tag::Int32,
            FieldKind::Int64 => Tag::Int64,
            FieldKind::Double => Tag::Double,
            FieldKind::String => Tag::String,
            FieldKind::Record(_) => Tag::Record,
            FieldKind::List => Tag::List,
        }
    }
}

/// One declared field.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub ordinal: u16,
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldDef {
    pub const fn new(ordinal: u16, name: &'static str, kind: FieldKind) -> Self {
        Self { ordinal, name, kind }
    }
}

/// Ordered field declarations of a record type.
#[derive(Debug)]
pub struct RecordSchema {
    pub name: &'static str,
    pub fields: &'static [FieldDef],
}

impl RecordSchema {
    fn by_ordinal(&self, ordinal: u16) -> Option<(usize, &FieldDef)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, field)| field.ordinal == ordinal)
    }

    fn by_name(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Schema used for undeclared nested records.
static OPAQUE: RecordSchema = RecordSchema {
    name: "opaque",
    fields: &[],
};

/// The `Metadata` part.
pub static REPORT_METADATA: RecordSchema = RecordSchema {
    name: "ReportMetadata",
    fields: &[
        FieldDef::new(1, "version", FieldKind::Int32),
        FieldDef::new(2, "fileDescription", FieldKind::String),
        FieldDef::new(3, "createdFrom", FieldKind::String),
        FieldDef::new(4, "createdFromRelease", FieldKind::String),
    ],
};

static REPORT_SETTINGS_BODY: RecordSchema = RecordSchema {
    name: "reportSettings",
    fields: &[
        FieldDef::new(1, "isPersistentUserStateDisabled", FieldKind::Bool),
        FieldDef::new(2, "hideVisualContainerHeader", FieldKind::Bool),
        FieldDef::new(3, "useStylableVisualContainerHeader", FieldKind::Bool),
        FieldDef::new(4, "exportDataMode", FieldKind::Int32),
        FieldDef::new(5, "useNewFilterPaneExperience", FieldKind::Bool),
        FieldDef::new(6, "allowChangeFilterTypes", FieldKind::Bool),
    ],
};

static QUERIES_SETTINGS: RecordSchema = RecordSchema {
    name: "queriesSettings",
    fields: &[
        FieldDef::new(1, "typeDetectionEnabled", FieldKind::Bool),
        FieldDef::new(2, "relationshipImportEnabled", FieldKind::Bool),
        FieldDef::new(3, "runBackgroundAnalysis", FieldKind::Bool),
        FieldDef::new(4, "version", FieldKind::String),
    ],
};

/// The `Settings` part.
pub static REPORT_SETTINGS: RecordSchema = RecordSchema {
    name: "ReportSettings",
    fields: &[
        FieldDef::new(1, "version", FieldKind::Int32),
        FieldDef::new(2, "reportSettings", FieldKind::Record(&REPORT_SETTINGS_BODY)),
        FieldDef::new(3, "queriesSettings", FieldKind::Record(&QUERIES_SETTINGS)),
    ],
};

#[inline]
fn corrupt(message: impl Into<String>) -> Error {
    Error::CorruptContainer(message.into())
}

/// Decode a whole part into a JSON object.
///
/// # Examples
///
/// ```
/// use pbixproj::package::records::{REPORT_METADATA, decode, encode};
/// use serde_json::json;
///
/// let value = json!({"version": 5, "createdFrom": "Desktop"});
/// let bytes = encode(&value, &REPORT_METADATA).unwrap();
/// assert_eq!(decode(&bytes, &REPORT_METADATA).unwrap(), value);
/// ```
pub fn decode(bytes: &[u8], schema: &RecordSchema) -> Result<Value> {
    let mut cursor = ByteCursor::new(bytes);
    let version = cursor.read_u16()?;
    if version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported {} format version {}",
            schema.name, version
        )));
    }

    let record = decode_record(&mut cursor, schema, 0)?;
    if !cursor.is_at_end() {
        return Err(corrupt(format!(
            "{} trailing bytes after {} record",
            cursor.remaining(),
            schema.name
        )));
    }
    Ok(Value::Object(record))
}

fn decode_record(
    cursor: &mut ByteCursor<'_>,
    schema: &RecordSchema,
    depth: usize,
) -> Result<Map<String, Value>> {
    if depth > MAX_DEPTH {
        return Err(corrupt("records nested too deeply"));
    }

    let count = cursor.read_u16()?;
    let mut declared: Vec<Option<Value>> = vec![None; schema.fields.len()];
    let mut undeclared: BTreeMap<u16, Value> = BTreeMap::new();

    for _ in 0..count {
        let ordinal = cursor.read_u16()?;
        let tag = Tag::try_from(cursor.read_u8()?)?;
        let payload = cursor.read_length_prefixed()?;

        match schema.by_ordinal(ordinal) {
            Some((slot, field)) => {
                if tag != Tag::Null && tag != field.kind.tag() {
                    return Err(corrupt(format!(
                        "{}.{} declared as {:?} but stored as {:?}",
                        schema.name,
                        field.name,
                        field.kind.tag(),
                        tag
                    )));
                }
                if declared[slot].is_some() {
                    return Err(duplicate(schema, ordinal));
                }
                let nested = match field.kind {
                    FieldKind::Record(nested) => nested,
                    _ => &OPAQUE,
                };
                declared[slot] = Some(decode_value(tag, payload, nested, depth)?);
            },
            None => {
                if undeclared.contains_key(&ordinal) {
                    return Err(duplicate(schema, ordinal));
                }
                undeclared.insert(ordinal, decode_value(tag, payload, &OPAQUE, depth)?);
            },
        }
    }

    let mut map = Map::new();
    for (field, value) in schema.fields.iter().zip(declared) {
        if let Some(value) = value {
            map.insert(field.name.to_string(), value);
        }
    }
    for (ordinal, value) in undeclared {
        map.insert(format!("#{}", ordinal), value);
    }
    Ok(map)
}

fn duplicate(schema: &RecordSchema, ordinal: u16) -> Error {
    corrupt(format!("{} repeats field ordinal {}", schema.name, ordinal))
}

fn expect_len(tag: Tag, payload: &[u8], len: usize) -> Result<()> {
    if payload.len() != len {
        return Err(corrupt(format!(
            "{:?} payload of {} bytes, expected {}",
            tag,
            payload.len(),
            len
        )));
    }
    Ok(())
}

fn decode_value(tag: Tag, payload: &[u8], nested: &RecordSchema, depth: usize) -> Result<Value> {
    match tag {
        Tag::Null => {
            expect_len(tag, payload, 0)?;
            Ok(Value::Null)
        },
        Tag::Bool => {
            expect_len(tag, payload, 1)?;
            match payload[0] {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                other => Err(corrupt(format!("invalid bool byte {}", other))),
            }
        },
        Tag::Int32 => {
            expect_len(tag, payload, 4)?;
            Ok(Value::from(read_i32_le(payload, 0)?))
        },
        Tag::Int64 => {
            expect_len(tag, payload, 8)?;
            Ok(Value::from(read_i64_le(payload, 0)?))
        },
        Tag::Double => {
            expect_len(tag, payload, 8)?;
            let value = read_f64_le(payload, 0)?;
            Number::from_f64(value)
                .map(Value::Number)
                .ok_or_else(|| corrupt(format!("non-finite double {}", value)))
        },
        Tag::String => decode_utf16le(payload)
            .map(Value::String)
            .map_err(|e| corrupt(e)),
        Tag::Record => {
            let mut inner = ByteCursor::new(payload);
            let record = decode_record(&mut inner, nested, depth + 1)?;
            if !inner.is_at_end() {
                return Err(corrupt(format!(
                    "{} trailing bytes in nested {} record",
                    inner.remaining(),
                    nested.name
                )));
            }
            Ok(Value::Object(record))
        },
        Tag::List => {
            let mut inner = ByteCursor::new(payload);
            let count = inner.read_u32()?;
            let mut items = Vec::new();
            for _ in 0..count {
                let item_tag = Tag::try_from(inner.read_u8()?)?;
                let item = inner.read_length_prefixed()?;
                items.push(decode_value(item_tag, item, &OPAQUE, depth + 1)?);
            }
            if !inner.is_at_end() {
                return Err(corrupt("trailing bytes after list elements"));
            }
            Ok(Value::Array(items))
        },
    }
}

/// Encode a JSON object into a whole part.
///
/// Declared fields are written first in declaration order, then `#<ordinal>`
/// fields in ordinal order. Any other key is an error.
pub fn encode(value: &Value, schema: &RecordSchema) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    encode_record(value, schema, &mut out, 0)?;
    Ok(out)
}

fn encode_record(
    value: &Value,
    schema: &RecordSchema,
    out: &mut Vec<u8>,
    depth: usize,
) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(corrupt("records nested too deeply"));
    }
    let Value::Object(map) = value else {
        return Err(corrupt(format!("{} must be a JSON object", schema.name)));
    };

    let mut undeclared: BTreeMap<u16, &Value> = BTreeMap::new();
    for (key, field_value) in map {
        if schema.by_name(key).is_some() {
            continue;
        }
        let ordinal = key
            .strip_prefix('#')
            .and_then(|ordinal| ordinal.parse::<u16>().ok())
            .filter(|ordinal| schema.by_ordinal(*ordinal).is_none())
            .ok_or_else(|| corrupt(format!("{} has no field named '{}'", schema.name, key)))?;
        undeclared.insert(ordinal, field_value);
    }

    let declared: Vec<(&FieldDef, &Value)> = schema
        .fields
        .iter()
        .filter_map(|field| map.get(field.name).map(|v| (field, v)))
        .collect();

    let count = u16::try_from(declared.len() + undeclared.len())
        .map_err(|_| corrupt(format!("{} has too many fields", schema.name)))?;
    out.extend_from_slice(&count.to_le_bytes());

    for (field, field_value) in declared {
        let (tag, payload) = encode_declared(field, field_value, depth)?;
        write_field(out, field.ordinal, tag, &payload)?;
    }
    for (ordinal, field_value) in undeclared {
        let (tag, payload) = encode_inferred(field_value, depth)?;
        write_field(out, ordinal, tag, &payload)?;
    }
    Ok(())
}

fn write_field(out: &mut Vec<u8>, ordinal: u16, tag: Tag, payload: &[u8]) -> Result<()> {
    out.extend_from_slice(&ordinal.to_le_bytes());
    out.push(tag as u8);
    write_length_prefixed(out, payload)?;
    Ok(())
}

fn encode_declared(field: &FieldDef, value: &Value, depth: usize) -> Result<(Tag, Vec<u8>)> {
    if value.is_null() {
        return Ok((Tag::Null, Vec::new()));
    }
    let mismatch = || {
        corrupt(format!(
            "field '{}' expects {:?}, got {}",
            field.name,
            field.kind.tag(),
            value
        ))
    };

    let payload = match field.kind {
        FieldKind::Bool => vec![u8::from(value.as_bool().ok_or_else(mismatch)?)],
        FieldKind::Int32 => {
            let n = value
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(mismatch)?;
            n.to_le_bytes().to_vec()
        },
        FieldKind::Int64 => value.as_i64().ok_or_else(mismatch)?.to_le_bytes().to_vec(),
        FieldKind::Double => value.as_f64().ok_or_else(mismatch)?.to_le_bytes().to_vec(),
        FieldKind::String => TextEncoding::Utf16Le.encode(value.as_str().ok_or_else(mismatch)?),
        FieldKind::Record(nested) => {
            let mut payload = Vec::new();
            encode_record(value, nested, &mut payload, depth + 1)?;
            payload
        },
        FieldKind::List => {
            if !value.is_array() {
                return Err(mismatch());
            }
            encode_inferred(value, depth)?.1
        },
    };
    Ok((field.kind.tag(), payload))
}

/// Pick a tag from the JSON value itself, for undeclared fields and list
/// elements.
fn encode_inferred(value: &Value, depth: usize) -> Result<(Tag, Vec<u8>)> {
    Ok(match value {
        Value::Null => (Tag::Null, Vec::new()),
        Value::Bool(b) => (Tag::Bool, vec![u8::from(*b)]),
        Value::Number(n) => match n.as_i64() {
            Some(i) => match i32::try_from(i) {
                Ok(small) => (Tag::Int32, small.to_le_bytes().to_vec()),
                Err(_) => (Tag::Int64, i.to_le_bytes().to_vec()),
            },
            None => {
                let f = n
                    .as_f64()
                    .ok_or_else(|| corrupt(format!("number {} out of range", n)))?;
                (Tag::Double, f.to_le_bytes().to_vec())
            },
        },
        Value::String(s) => (Tag::String, TextEncoding::Utf16Le.encode(s)),
        Value::Object(_) => {
            let mut payload = Vec::new();
            encode_record(value, &OPAQUE, &mut payload, depth + 1)?;
            (Tag::Record, payload)
        },
        Value::Array(items) => {
            let count = u32::try_from(items.len())
                .map_err(|_| corrupt("list has too many elements"))?;
            let mut payload = count.to_le_bytes().to_vec();
            for item in items {
                let (tag, item_payload) = encode_inferred(item, depth + 1)?;
                payload.push(tag as u8);
                write_length_prefixed(&mut payload, &item_payload)?;
            }
            (Tag::List, payload)
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(out: &mut Vec<u8>, ordinal: u16, tag: Tag, payload: &[u8]) {
        write_field(out, ordinal, tag, payload).unwrap();
    }

    fn utf16(s: &str) -> Vec<u8> {
        TextEncoding::Utf16Le.encode(s)
    }

    #[test]
    fn test_declaration_order_wins_over_stream_order() {
        let mut bytes = FORMAT_VERSION.to_le_bytes().to_vec();
        bytes.extend_from_slice(&3u16.to_le_bytes());
        field(&mut bytes, 4, Tag::String, &utf16("2.120"));
        field(&mut bytes, 3, Tag::String, &utf16("Cloud"));
        field(&mut bytes, 1, Tag::Int32, &5i32.to_le_bytes());

        let value = decode(&bytes, &REPORT_METADATA).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["version", "createdFrom", "createdFromRelease"]);
        assert_eq!(value["createdFrom"], "Cloud");
        assert_eq!(value["version"], 5);
    }

    #[test]
    fn test_nested_settings() {
        let mut inner = Vec::new();
        inner.extend_from_slice(&2u16.to_le_bytes());
        field(&mut inner, 4, Tag::Int32, &1i32.to_le_bytes());
        field(&mut inner, 1, Tag::Bool, &[1]);

        let mut bytes = FORMAT_VERSION.to_le_bytes().to_vec();
        bytes.extend_from_slice(&1u16.to_le_bytes());
        field(&mut bytes, 2, Tag::Record, &inner);

        let value = decode(&bytes, &REPORT_SETTINGS).unwrap();
        assert_eq!(
            value,
            json!({"reportSettings": {"isPersistentUserStateDisabled": true, "exportDataMode": 1}})
        );
        let keys: Vec<&String> = value["reportSettings"].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["isPersistentUserStateDisabled", "exportDataMode"]);
    }

    #[test]
    fn test_unknown_ordinal_survives() {
        let value = json!({"version": 3, "#9": [1, "x", {"#1": true}]});
        let bytes = encode(&value, &REPORT_METADATA).unwrap();
        assert_eq!(decode(&bytes, &REPORT_METADATA).unwrap(), value);
    }

    #[test]
    fn test_kind_mismatch_is_corrupt() {
        let mut bytes = FORMAT_VERSION.to_le_bytes().to_vec();
        bytes.extend_from_slice(&1u16.to_le_bytes());
        field(&mut bytes, 1, Tag::String, &utf16("5"));
        assert!(matches!(
            decode(&bytes, &REPORT_METADATA),
            Err(Error::CorruptContainer(_))
        ));
    }

    #[test]
    fn test_truncated_and_duplicate() {
        let value = json!({"version": 1, "fileDescription": "Sales"});
        let bytes = encode(&value, &REPORT_METADATA).unwrap();
        assert!(decode(&bytes[..bytes.len() - 1], &REPORT_METADATA).is_err());

        let mut dup = FORMAT_VERSION.to_le_bytes().to_vec();
        dup.extend_from_slice(&2u16.to_le_bytes());
        field(&mut dup, 1, Tag::Int32, &1i32.to_le_bytes());
        field(&mut dup, 1, Tag::Int32, &2i32.to_le_bytes());
        assert!(decode(&dup, &REPORT_METADATA).is_err());
    }

    #[test]
    fn test_encode_rejects_unknown_key() {
        let err = encode(&json!({"colour": "red"}), &REPORT_METADATA).unwrap_err();
        assert!(err.to_string().contains("colour"));
        assert!(encode(&json!({"version": "five"}), &REPORT_METADATA).is_err());
    }

    #[test]
    fn test_wrong_format_version() {
        let mut bytes = 2u16.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0u16.to_le_bytes());
        assert!(decode(&bytes, &REPORT_SETTINGS).is_err());
    }
}
