//! Part names inside a package.
//!
//! Zip member names carry no leading slash and sometimes use backslashes;
//! a [`PackURI`] is always `/`-rooted with forward slashes, the form used in
//! `[Content_Types].xml` overrides.

use std::fmt;

/// Name of the content types part.
pub const CONTENT_TYPES_URI: &str = "/[Content_Types].xml";

/// A `/`-rooted part name such as `/Report/Layout`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackURI(String);

impl PackURI {
    /// # Errors
    /// The name does not start with `/`.
    pub fn new<S: Into<String>>(uri: S) -> Result<Self, String> {
        let uri = uri.into();
        if uri.starts_with('/') {
            Ok(Self(uri))
        } else {
            Err(format!("part name '{}' is not rooted", uri))
        }
    }

    pub fn from_membername(member: &str) -> Self {
        Self(format!("/{}", member.replace('\\', "/").trim_start_matches('/')))
    }

    /// The zip member name.
    #[inline]
    pub fn membername(&self) -> &str {
        &self.0[1..]
    }

    /// Extension of the last segment, without the dot. Empty when there is none.
    pub fn ext(&self) -> &str {
        let last = self.0.rsplit('/').next().unwrap_or_default();
        last.rsplit_once('.').map_or("", |(_, ext)| ext)
    }

    /// Every segment is a plain name: no empty, `.`, `..` or drive-qualified
    /// segment that could leave the folder the entry is mirrored into.
    pub fn is_safe(&self) -> bool {
        let member = self.membername();
        !member.is_empty()
            && member
                .split('/')
                .all(|seg| !matches!(seg, "" | "." | "..") && !seg.contains(':'))
    }

    /// Resource identifier below `prefix`, e.g. `chart1/package.json` for
    /// `/Report/CustomVisuals/chart1/package.json` under `Report/CustomVisuals`.
    pub fn relative_to(&self, prefix: &str) -> Option<&str> {
        self.membername()
            .strip_prefix(prefix.trim_matches('/'))?
            .strip_prefix('/')
            .filter(|id| !id.is_empty())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackURI {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PackURI {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rooted() {
        assert!(PackURI::new("/Report/Layout").is_ok());
        assert!(PackURI::new("Report/Layout").is_err());
    }

    #[test]
    fn test_backslash_members() {
        let uri = PackURI::from_membername("Report\\StaticResources\\theme.json");
        assert_eq!(uri.as_str(), "/Report/StaticResources/theme.json");
        assert_eq!(uri.membername(), "Report/StaticResources/theme.json");
        assert_eq!(uri.ext(), "json");
        assert_eq!(PackURI::from_membername("DataModel").ext(), "");
        assert_eq!(PackURI::from_membername("a.b/DataModel").ext(), "");
    }

    #[test]
    fn test_resource_identifier() {
        let uri = PackURI::from_membername("Report/CustomVisuals/chart1/package.json");
        assert_eq!(uri.relative_to("Report/CustomVisuals"), Some("chart1/package.json"));
        assert_eq!(uri.relative_to("/Report/CustomVisuals/"), Some("chart1/package.json"));
        assert_eq!(uri.relative_to("Report/Custom"), None);
        assert_eq!(
            PackURI::from_membername("Report/CustomVisuals/").relative_to("Report/CustomVisuals"),
            None
        );
    }

    #[test]
    fn test_unsafe_members() {
        assert!(PackURI::from_membername("Formulas/Section1.m").is_safe());
        assert!(!PackURI::from_membername("Formulas/../../evil").is_safe());
        assert!(!PackURI::from_membername("a//b").is_safe());
        assert!(!PackURI::from_membername("C:/x").is_safe());
        assert!(!PackURI::from_membername("").is_safe());
    }
}
