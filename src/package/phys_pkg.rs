//! Provides a general interface to a physical package (ZIP file).
//!
//! This module handles the low-level reading and writing of zip containers:
//! the outer `.pbix` package as well as the archives nested inside the
//! mashup part.

use crate::common::{Error, Result};
use crate::package::packuri::PackURI;
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufReader, Cursor, ErrorKind, Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Physical package reader that provides access to members of a ZIP archive.
///
/// The reader owns its stream for its whole lifetime. Member contents are
/// decompressed on demand; the archive handle sits in a `RefCell` so lookups
/// work through a shared reference.
pub struct PhysPkgReader<R: Read + Seek> {
    /// The underlying ZIP archive
    archive: RefCell<ZipArchive<R>>,
}

impl PhysPkgReader<BufReader<File>> {
    /// Open a package from a file path.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the file doesn't exist and
    /// [`Error::CorruptContainer`] if it isn't a valid ZIP file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(Error::NotFound(path.display().to_string()));
        }

        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl PhysPkgReader<Cursor<Vec<u8>>> {
    /// Create a reader over owned bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::new(Cursor::new(data))
    }
}

impl<R: Read + Seek> PhysPkgReader<R> {
    /// Create a new reader from a stream, parsing the central directory.
    pub fn new(reader: R) -> Result<Self> {
        let archive = ZipArchive::new(reader)
            .map_err(|e| Error::CorruptContainer(format!("not a readable zip container: {}", e)))?;
        Ok(Self {
            archive: RefCell::new(archive),
        })
    }

    /// Get the binary content for a member, or `None` when it is absent.
    ///
    /// # Errors
    /// A member whose local header, deflate stream or checksum does not
    /// hold up is [`Error::CorruptContainer`]; other I/O failures of the
    /// underlying stream stay [`Error::Io`].
    pub fn blob_for(&self, pack_uri: &PackURI) -> Result<Option<Vec<u8>>> {
        let mut archive = self.archive.borrow_mut();
        let Some(index) = archive.index_for_name(pack_uri.membername()) else {
            return Ok(None);
        };
        let member = pack_uri.membername();

        let mut file = archive.by_index(index).map_err(|e| match e {
            zip::result::ZipError::Io(io) => member_io_error(member, io),
            other => Error::CorruptContainer(format!("member '{}': {}", member, other)),
        })?;
        let mut blob = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
        file.read_to_end(&mut blob)
            .map_err(|io| member_io_error(member, io))?;
        Ok(Some(blob))
    }

    /// Check if a specific member exists in the package.
    pub fn contains(&self, pack_uri: &PackURI) -> bool {
        self.archive
            .borrow()
            .index_for_name(pack_uri.membername())
            .is_some()
    }

    /// List all file member names in the package, sorted.
    ///
    /// Directory entries are skipped.
    pub fn member_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .archive
            .borrow()
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(String::from)
            .collect();
        names.sort();
        names
    }

    /// List the members located below a folder prefix, sorted.
    pub fn members_under(&self, prefix: &str) -> Vec<PackURI> {
        self.member_names()
            .iter()
            .map(|name| PackURI::from_membername(name))
            .filter(|uri| uri.relative_to(prefix).is_some())
            .collect()
    }
}

/// Bad checksums and truncated streams surface from `zip` as I/O errors.
fn member_io_error(member: &str, err: std::io::Error) -> Error {
    match err.kind() {
        ErrorKind::InvalidData | ErrorKind::UnexpectedEof => {
            Error::CorruptContainer(format!("member '{}': {}", member, err))
        },
        _ => Error::Io(err),
    }
}

/// Physical package writer for creating ZIP containers.
///
/// Handles the low-level writing of members to an in-memory archive.
pub struct PhysPkgWriter {
    /// The underlying ZIP archive writer
    archive: ZipWriter<Cursor<Vec<u8>>>,
}

impl PhysPkgWriter {
    /// Create a new package writer that writes to memory.
    pub fn new() -> Self {
        Self {
            archive: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Write a member with Deflate compression.
    pub fn write(&mut self, pack_uri: &PackURI, blob: &[u8]) -> Result<()> {
        self.write_with(pack_uri, blob, CompressionMethod::Deflated)
    }

    /// Write a member without compression (stored).
    pub fn write_stored(&mut self, pack_uri: &PackURI, blob: &[u8]) -> Result<()> {
        self.write_with(pack_uri, blob, CompressionMethod::Stored)
    }

    fn write_with(
        &mut self,
        pack_uri: &PackURI,
        blob: &[u8],
        method: CompressionMethod,
    ) -> Result<()> {
        let options = SimpleFileOptions::default().compression_method(method);
        self.archive.start_file(pack_uri.membername(), options)?;
        self.archive.write_all(blob)?;
        Ok(())
    }

    /// Finish writing and return the archive bytes.
    pub fn finish(self) -> Result<Vec<u8>> {
        let cursor = self.archive.finish()?;
        Ok(cursor.into_inner())
    }
}

impl Default for PhysPkgWriter {
    fn default() -> Self {
        Self::new()
    }
}
