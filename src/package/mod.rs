//! The compound package: part catalog, reader, writer and the codecs of the
//! parts that are not plain text.

pub mod archive;
pub mod engine;
pub mod packuri;
pub mod parts;
pub mod phys_pkg;
pub mod reader;
pub mod records;
pub mod writer;

pub use archive::Archive;
pub use engine::{AnalyticEngine, SchemaClient, SerializeOptions};
pub use packuri::PackURI;
pub use parts::{PartKind, PbixPart};
pub use reader::PbixPackage;
pub use writer::PbixWriter;
