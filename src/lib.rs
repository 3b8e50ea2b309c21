//! pbixproj - decompose Power BI packages into a diffable project folder
//!
//! A `.pbix` file is a zip container holding a set of named parts: the report
//! layout, the tabular model schema, a nested "mashup" container with the
//! Power Query sources, binary settings records and assorted resources. This
//! library reads every part into a generic representation, mirrors the result
//! onto a normalized folder tree suitable for version control, and can
//! regenerate an equivalent package from that tree.
//!
//! # Features
//!
//! - **Package reader**: typed accessor per part, with the text encoding fixed
//!   per part kind
//! - **Mashup codec**: decodes and encodes the nested query container,
//!   memoized per package
//! - **Project folder**: tracked writes with orphan cleanup at the end of a pass
//! - **Model serializer**: one file per table, relationship, expression, role
//!   and culture, with stable ordering
//!
//! # Example - Extracting a package
//!
//! ```no_run
//! use pbixproj::{ExtractOptions, Extractor, PbixPackage};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let package = PbixPackage::open("Sales.pbix")?;
//! let report = Extractor::new(ExtractOptions::default()).extract(&package, "Sales")?;
//!
//! for failure in &report.failures {
//!     println!("skipped {}: {}", failure.part, failure.message);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Recomposing a package
//!
//! ```no_run
//! use pbixproj::Compiler;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! Compiler::new().compile_to_file("Sales", "Sales.rebuilt.pbix")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Reading single parts
//!
//! ```no_run
//! use pbixproj::PbixPackage;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let package = PbixPackage::open("Sales.pbix")?;
//! println!("version: {}", package.read_version()?);
//!
//! if let Some(layout) = package.read_report()? {
//!     println!("sections: {}", layout["sections"].as_array().map_or(0, Vec::len));
//! }
//!
//! let mashup = package.read_mashup()?;
//! for name in mashup.query_sections.names() {
//!     println!("query source: {}", name);
//! }
//! # Ok(())
//! # }
//! ```

/// Shared error type, binary readers, encodings and small utilities
pub mod common;

/// Recomposition of a package from a project folder
pub mod compile;

/// Extraction of a package into a project folder
pub mod extract;

/// The nested Power Query container stored in the `DataMashup` part
pub mod mashup;

/// Tabular model schema serialization to and from the project folder
pub mod model;

/// The compound package: part catalog, reader, writer and record codec
pub mod package;

/// File-system facade with change tracking and orphan cleanup
pub mod project;

pub use common::{Error, Result};
pub use compile::Compiler;
pub use extract::{ExtractOptions, ExtractionReport, Extractor, PartFailure};
pub use mashup::{MashupPackage, generate_section_document};
pub use model::ModelSerializer;
pub use package::{PbixPackage, PbixWriter};
pub use project::{KnownFiles, PassSummary, ProjectFolder, ProjectRootFolder, SyncPass};
