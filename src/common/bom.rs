//! Byte-order marks in front of package parts and project files.
//!
//! Parts are decoded with the fixed encoding of their kind. A mark in front
//! of the payload is dropped, and one that names a different encoding is only
//! worth a log line.

/// A byte-order mark found at the start of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bom {
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl Bom {
    const ALL: [Bom; 3] = [Bom::Utf8, Bom::Utf16Le, Bom::Utf16Be];

    pub const fn bytes(self) -> &'static [u8] {
        match self {
            Bom::Utf8 => b"\xEF\xBB\xBF",
            Bom::Utf16Le => b"\xFF\xFE",
            Bom::Utf16Be => b"\xFE\xFF",
        }
    }

    /// The mark `data` starts with, if any.
    pub fn sniff(data: &[u8]) -> Option<Bom> {
        Self::ALL.into_iter().find(|bom| data.starts_with(bom.bytes()))
    }

    /// `data` without this mark. Other marks are kept as payload.
    #[inline]
    pub fn strip(self, data: &[u8]) -> &[u8] {
        data.strip_prefix(self.bytes()).unwrap_or(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_only_own_mark() {
        assert_eq!(Bom::Utf8.strip(b"\xEF\xBB\xBF{}"), b"{}");
        assert_eq!(Bom::Utf8.strip(b"{}"), b"{}");
        assert_eq!(Bom::Utf8.strip(b"\xFF\xFE{\x00"), b"\xFF\xFE{\x00");
        assert_eq!(Bom::Utf16Le.strip(b"\xFF\xFE{\x00"), b"{\x00");
    }

    #[test]
    fn test_sniff() {
        assert_eq!(Bom::sniff(b"\xEF\xBB\xBF1.28"), Some(Bom::Utf8));
        assert_eq!(Bom::sniff(b"\xFF\xFE1\x00"), Some(Bom::Utf16Le));
        assert_eq!(Bom::sniff(b"\xFE\xFF\x001"), Some(Bom::Utf16Be));
        assert_eq!(Bom::sniff(b"1.28"), None);
        assert_eq!(Bom::sniff(b""), None);
    }
}
