//! Nested zip archives held in memory.
//!
//! The mashup part carries two of them: the query sections and the embedded
//! content of the metadata range. Both are small, so they are decompressed
//! eagerly into an ordered map.

use crate::common::{Error, Result};
use crate::package::packuri::PackURI;
use crate::package::phys_pkg::{PhysPkgReader, PhysPkgWriter};
use std::collections::BTreeMap;

/// Ordered map of entry path to entry bytes. Directory entries are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    entries: BTreeMap<String, Vec<u8>>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every file entry of a zip buffer.
    ///
    /// Entry names that would escape a folder when mirrored to disk are
    /// rejected as corrupt.
    pub fn from_zip_bytes(bytes: &[u8]) -> Result<Self> {
        let reader = PhysPkgReader::from_bytes(bytes.to_vec())?;
        let mut entries = BTreeMap::new();

        for name in reader.member_names() {
            let uri = PackURI::from_membername(&name);
            if !uri.is_safe() {
                return Err(Error::CorruptContainer(format!(
                    "archive entry '{}' is not a relative path",
                    name
                )));
            }
            if let Some(blob) = reader.blob_for(&uri)? {
                entries.insert(uri.membername().to_string(), blob);
            }
        }

        Ok(Self { entries })
    }

    /// Serialize the entries into a new zip buffer, in path order.
    pub fn to_zip_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = PhysPkgWriter::new();
        for (path, blob) in &self.entries {
            writer.write(&PackURI::from_membername(path), blob)?;
        }
        writer.finish()
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries.get(path).map(Vec::as_slice)
    }

    /// Insert an entry, replacing any previous bytes at `path`.
    pub fn insert(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
        let path = path.into().replace('\\', "/");
        self.entries
            .insert(path.trim_start_matches('/').to_string(), bytes);
    }

    /// Entry paths in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(path, blob)| (path.as_str(), blob.as_slice()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Vec<u8>)> for Archive {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        let mut archive = Archive::new();
        for (path, bytes) in iter {
            archive.insert(path, bytes);
        }
        archive
    }
}
