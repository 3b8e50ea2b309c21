//! Unified error types for pbixproj.
//!
//! Variants follow the failure taxonomy of the codec: a missing package,
//! a container that cannot be opened at all, a single corrupt part, an
//! unavailable analytic engine, and file-name collisions in the model layout.
use thiserror::Error;

/// Main error type for pbixproj operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Package or file missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// The container itself cannot be opened, or a required part is missing
    #[error("Corrupt container: {0}")]
    CorruptContainer(String),

    /// A present part does not match its expected sub-format
    #[error("Part '{part}' is corrupt: {cause}")]
    PartCorrupt { part: String, cause: String },

    /// The external analytic engine failed to start, load or connect
    #[error("Analytic engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Two schema elements sanitize to the same file name
    #[error(
        "Name collision in '{collection}': '{first}' and '{second}' both map to '{file_name}'"
    )]
    NameCollision {
        collection: String,
        first: String,
        second: String,
        file_name: String,
    },

    /// The tabular schema is missing required structure
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// A relative path escapes its folder or is otherwise unusable
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl Error {
    /// Build a [`Error::PartCorrupt`] for the named part.
    #[inline]
    pub fn part_corrupt(part: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Error::PartCorrupt {
            part: part.into(),
            cause: cause.to_string(),
        }
    }

    /// Attach a part name to a low-level failure.
    ///
    /// Decode errors that carry no part context become [`Error::PartCorrupt`];
    /// errors that already name a part, or that are not decode errors
    /// (I/O, engine, collisions), pass through unchanged.
    pub fn in_part(self, part: &str) -> Self {
        match self {
            Error::CorruptContainer(cause) | Error::InvalidSchema(cause) => {
                Error::part_corrupt(part, cause)
            },
            other => other,
        }
    }

    /// Whether this failure is confined to one part, so extraction of the
    /// remaining parts can continue.
    #[inline]
    pub fn is_part_local(&self) -> bool {
        matches!(
            self,
            Error::PartCorrupt { .. } | Error::EngineUnavailable(_)
        )
    }
}

// Cached decode failures are replayed to every caller, so the error must be
// cloneable even though `std::io::Error` is not.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
            Error::NotFound(s) => Error::NotFound(s.clone()),
            Error::CorruptContainer(s) => Error::CorruptContainer(s.clone()),
            Error::PartCorrupt { part, cause } => Error::PartCorrupt {
                part: part.clone(),
                cause: cause.clone(),
            },
            Error::EngineUnavailable(s) => Error::EngineUnavailable(s.clone()),
            Error::NameCollision {
                collection,
                first,
                second,
                file_name,
            } => Error::NameCollision {
                collection: collection.clone(),
                first: first.clone(),
                second: second.clone(),
                file_name: file_name.clone(),
            },
            Error::InvalidSchema(s) => Error::InvalidSchema(s.clone()),
            Error::InvalidPath(s) => Error::InvalidPath(s.clone()),
        }
    }
}

/// Result type for pbixproj operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_part_wraps_decode_errors() {
        let err = Error::CorruptContainer("bad header".to_string()).in_part("DataMashup");
        match err {
            Error::PartCorrupt { part, cause } => {
                assert_eq!(part, "DataMashup");
                assert_eq!(cause, "bad header");
            },
            other => panic!("unexpected error: {other:?}"),
        }

        let io = Error::Io(std::io::Error::other("disk")).in_part("DataMashup");
        assert!(matches!(io, Error::Io(_)));
    }

    #[test]
    fn test_clone_keeps_io_kind() {
        let err = Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        match err.clone() {
            Error::Io(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied);
                assert!(e.to_string().contains("denied"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_part_local() {
        assert!(Error::part_corrupt("Report", "x").is_part_local());
        assert!(Error::EngineUnavailable("x".into()).is_part_local());
        assert!(!Error::NotFound("x".into()).is_part_local());
    }
}
