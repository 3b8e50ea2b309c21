//! File names for schema elements.
//!
//! Element names are free text. File names keep Unicode letters, digits and
//! a small set of punctuation, and percent-encode everything else as UTF-8
//! bytes. Because `%` itself is always encoded, decoding is the exact inverse
//! and two distinct names never share a file name.

use crate::common::{Error, Result};
use phf::phf_set;
use std::fmt::Write as _;

/// Reserved device names on Windows, matched on the part before the first dot.
static DEVICE_NAMES: phf::Set<&'static str> = phf_set! {
    "CON", "PRN", "AUX", "NUL",
    "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9",
    "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
};

const SAFE_PUNCTUATION: &str = "-_()[]{}'!$+,;=@~&#.";

/// Extension of every element file.
pub const ELEMENT_EXTENSION: &str = ".json";

fn is_safe(c: char) -> bool {
    c.is_alphanumeric() || SAFE_PUNCTUATION.contains(c)
}

fn encode_char(out: &mut String, c: char) {
    let mut buf = [0u8; 4];
    for byte in c.encode_utf8(&mut buf).bytes() {
        let _ = write!(out, "%{:02X}", byte);
    }
}

/// Encode `name` into a portable file-name stem.
///
/// ```
/// use pbixproj::model::sanitize;
///
/// assert_eq!(sanitize("Sales / Region"), "Sales%20%2F%20Region");
/// assert_eq!(sanitize("nul"), "%6Eul");
/// assert_eq!(sanitize(".hidden."), "%2Ehidden%2E");
/// ```
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 8);
    let last = name.chars().count().saturating_sub(1);
    let stem = name.split('.').next().unwrap_or(name);
    let is_device = DEVICE_NAMES.contains(stem.to_ascii_uppercase().as_str());

    for (i, c) in name.chars().enumerate() {
        let dot_at_edge = c == '.' && (i == 0 || i == last);
        let device_lead = i == 0 && is_device;
        if is_safe(c) && !dot_at_edge && !device_lead {
            out.push(c);
        } else {
            encode_char(&mut out, c);
        }
    }
    out
}

/// Inverse of [`sanitize`].
pub fn unsanitize(stem: &str) -> Result<String> {
    urlencoding::decode(stem)
        .map(|name| name.into_owned())
        .map_err(|e| Error::InvalidPath(format!("'{}' does not decode to a name: {}", stem, e)))
}

/// File name of the element called `name`.
pub fn file_name(name: &str) -> String {
    let mut file = sanitize(name);
    file.push_str(ELEMENT_EXTENSION);
    file
}

/// Element name encoded in a file name produced by [`file_name`].
pub fn element_name(file: &str) -> Result<String> {
    let stem = file
        .strip_suffix(ELEMENT_EXTENSION)
        .ok_or_else(|| Error::InvalidPath(format!("'{}' is not an element file", file)))?;
    unsanitize(stem)
}
