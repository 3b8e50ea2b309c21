use crate::common::{Error, Result};
use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;

const SPECIAL: [&str; 5] = ["&", "<", ">", "\"", "'"];
const ESCAPED: [&str; 5] = ["&amp;", "&lt;", "&gt;", "&quot;", "&apos;"];

static ESCAPER: Lazy<AhoCorasick> =
    Lazy::new(|| AhoCorasick::new(SPECIAL).expect("XML escaper patterns are valid"));

/// Escape text for an attribute value or element content.
///
/// Item paths such as `Section1/Sales%20%26%20Costs` and formula names go
/// through here before they land in a permissions or metadata document.
///
/// ```
/// use pbixproj::common::xml::escape_xml;
/// assert_eq!(escape_xml("Section1/Sales & Costs"), "Section1/Sales &amp; Costs");
/// assert_eq!(escape_xml("s[\"a\"]"), "s[&quot;a&quot;]");
/// ```
#[inline]
pub fn escape_xml(s: &str) -> String {
    ESCAPER.replace_all(s, &ESCAPED)
}

/// Text a general entity reference (`amp`, `#x41`, `#65`) stands for.
/// `None` for anything but the predefined entities and character references.
pub fn resolve_entity(name: &str) -> Option<String> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)?
        },
    };
    Some(ch.to_string())
}

/// Text of a quick-xml `GeneralRef` event, by its raw name.
///
/// # Errors
/// [`Error::CorruptContainer`] for a non-UTF-8 name or an undeclared entity.
pub fn entity_text(name: &[u8]) -> Result<String> {
    let name = std::str::from_utf8(name)?;
    resolve_entity(name)
        .ok_or_else(|| Error::CorruptContainer(format!("undeclared XML entity '&{};'", name)))
}
