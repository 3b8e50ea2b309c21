//! Character encoding utilities for package parts.
//!
//! Most report-related parts of a package are stored as UTF-16LE, a few as
//! UTF-8. The encoding is a property of the part kind and is never guessed
//! from the content: decoding UTF-16 text as UTF-8 (or the other way round)
//! silently garbles non-ASCII characters instead of failing.

use crate::common::bom::Bom;
use encoding_rs::Encoding;

/// Text encoding of a package part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-8, optionally preceded by a BOM
    Utf8,
    /// UTF-16 little endian, optionally preceded by a BOM
    Utf16Le,
}

impl TextEncoding {
    /// The `encoding_rs` codec backing this encoding.
    #[inline]
    pub fn codec(self) -> &'static Encoding {
        match self {
            TextEncoding::Utf8 => encoding_rs::UTF_8,
            TextEncoding::Utf16Le => encoding_rs::UTF_16LE,
        }
    }

    #[inline]
    fn bom(self) -> Bom {
        match self {
            TextEncoding::Utf8 => Bom::Utf8,
            TextEncoding::Utf16Le => Bom::Utf16Le,
        }
    }

    /// Label used in XML declarations.
    #[inline]
    pub fn xml_label(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf16Le => "utf-16",
        }
    }

    /// Strictly decode `bytes`, stripping a leading BOM.
    ///
    /// Malformed input (an odd number of UTF-16 bytes, an unpaired surrogate,
    /// an invalid UTF-8 sequence) is an error rather than a replacement
    /// character.
    ///
    /// # Examples
    /// ```
    /// use pbixproj::common::encoding::TextEncoding;
    ///
    /// let bytes = b"\xFF\xFEH\x00\xE9\x00";
    /// assert_eq!(TextEncoding::Utf16Le.decode(bytes).unwrap(), "H\u{e9}");
    /// assert!(TextEncoding::Utf16Le.decode(b"H\x00e").is_err());
    /// ```
    pub fn decode(self, bytes: &[u8]) -> Result<String, String> {
        if let Some(found) = Bom::sniff(bytes)
            && found != self.bom()
        {
            tracing::debug!(?found, expected = ?self, "byte-order mark disagrees with part encoding");
        }

        let payload = self.bom().strip(bytes);
        self.codec()
            .decode_without_bom_handling_and_without_replacement(payload)
            .map(|text| text.into_owned())
            .ok_or_else(|| format!("content is not valid {}", self.codec().name()))
    }

    /// Encode `text` without a BOM.
    ///
    /// `encoding_rs` only encodes into UTF-8 family outputs, so the UTF-16
    /// side is produced from the string's code units directly.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Utf16Le => {
                let mut out = Vec::with_capacity(text.len() * 2);
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
                out
            },
        }
    }
}

/// Decode a UTF-16LE byte slice of known even length, as used by string
/// fields in binary records.
#[inline]
pub fn decode_utf16le(bytes: &[u8]) -> Result<String, String> {
    TextEncoding::Utf16Le.decode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16_round_trip() {
        let text = "Umsätze \u{1F4CA} 売上";
        let bytes = TextEncoding::Utf16Le.encode(text);
        assert_eq!(bytes.len() % 2, 0);
        assert_eq!(TextEncoding::Utf16Le.decode(&bytes).unwrap(), text);
    }

    #[test]
    fn test_utf8_strips_bom() {
        let decoded = TextEncoding::Utf8.decode(b"\xEF\xBB\xBF{\"a\":1}").unwrap();
        assert_eq!(decoded, "{\"a\":1}");
    }

    #[test]
    fn test_strict_decoding() {
        // Lone high surrogate
        assert!(TextEncoding::Utf16Le.decode(&[0x00, 0xD8]).is_err());
        assert!(TextEncoding::Utf8.decode(&[0xC3, 0x28]).is_err());
    }

    #[test]
    fn test_utf16_bytes_read_as_utf8_are_garbled() {
        // UTF-16LE ASCII decoded as UTF-8 yields interleaved NULs, which is why
        // the encoding is fixed per part instead of being sniffed.
        let bytes = TextEncoding::Utf16Le.encode("ab");
        assert_eq!(TextEncoding::Utf8.decode(&bytes).unwrap(), "a\0b\0");
    }
}
