//! Error conversion implementations.
//!
//! This module contains From trait implementations to convert from the
//! decoder errors of third-party crates to the unified Error type. Decode
//! failures carry no part name at this level; callers attach one with
//! [`Error::in_part`](super::Error::in_part).

use super::types::Error;
use crate::common::binary::BinaryError;

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Error::Io(e),
            zip::result::ZipError::FileNotFound => {
                Error::NotFound("zip entry not found".to_string())
            },
            other => Error::CorruptContainer(format!("ZIP error: {}", other)),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::CorruptContainer(format!("XML error: {}", err))
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::CorruptContainer(format!("XML attribute error: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            return Error::Io(err.into());
        }
        Error::CorruptContainer(format!("JSON error: {}", err))
    }
}

impl From<BinaryError> for Error {
    fn from(err: BinaryError) -> Self {
        Error::CorruptContainer(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Error::CorruptContainer(format!("Invalid UTF-8: {}", err))
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        let message = err.to_string();
        match err.into_io_error() {
            Some(io) => Error::Io(io),
            None => Error::Io(std::io::Error::other(message)),
        }
    }
}
