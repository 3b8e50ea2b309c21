//! Well-formed XML text with a rewritable declaration.

use crate::common::Result;
use crate::common::encoding::TextEncoding;
use memchr::memmem;
use quick_xml::Reader;
use quick_xml::events::Event;

/// An XML document kept as text.
///
/// The content is checked for well-formedness when constructed and is
/// otherwise left untouched, so it is written back exactly as read apart
/// from the `encoding` pseudo-attribute of its declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    text: String,
    root: String,
}

impl XmlDocument {
    /// Parse `text`, failing on malformed markup or a missing root element.
    pub fn parse(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let root = {
            let mut reader = Reader::from_str(&text);
            reader.config_mut().trim_text(true);
            let mut root = None;
            loop {
                match reader.read_event()? {
                    Event::Start(e) | Event::Empty(e) if root.is_none() => {
                        root = Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                    },
                    Event::Eof => break,
                    _ => {},
                }
            }
            root.ok_or_else(|| {
                crate::common::Error::CorruptContainer("XML document has no root element".into())
            })?
        };
        Ok(Self { text, root })
    }

    /// Local name of the root element.
    pub fn root_name(&self) -> &str {
        &self.root
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// The value of the declaration's `encoding` pseudo-attribute.
    pub fn declared_encoding(&self) -> Option<&str> {
        let (start, end) = self.encoding_value_span()?;
        Some(&self.text[start..end])
    }

    /// The document text with its declared encoding set to `encoding`.
    ///
    /// A document without a declaration, or whose declaration names no
    /// encoding, is returned unchanged.
    pub fn to_string_declaring(&self, encoding: TextEncoding) -> String {
        match self.encoding_value_span() {
            Some((start, end)) => {
                let mut out = String::with_capacity(self.text.len());
                out.push_str(&self.text[..start]);
                out.push_str(encoding.xml_label());
                out.push_str(&self.text[end..]);
                out
            },
            None => self.text.clone(),
        }
    }

    /// Byte span of the encoding value inside the declaration, quotes excluded.
    fn encoding_value_span(&self) -> Option<(usize, usize)> {
        let bytes = self.text.as_bytes();
        if !bytes.starts_with(b"<?xml") {
            return None;
        }
        let decl_end = memmem::find(bytes, b"?>")?;
        let decl = &bytes[..decl_end];

        let attr = memmem::find(decl, b"encoding")?;
        let mut pos = attr + b"encoding".len();
        while pos < decl.len() && (decl[pos] == b' ' || decl[pos] == b'=') {
            pos += 1;
        }
        let quote = *decl.get(pos)?;
        if quote != b'"' && quote != b'\'' {
            return None;
        }
        let value_start = pos + 1;
        let value_len = memchr::memchr(quote, &decl[value_start..])?;
        Some((value_start, value_start + value_len))
    }
}

impl std::fmt::Display for XmlDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}
