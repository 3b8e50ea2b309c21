//! The tabular model as a folder of JSON files.
//!
//! `database.json` holds the schema with its large collections split out;
//! every table, relationship, expression, role, culture, data source and
//! perspective gets its own file named after the element.

mod names;
mod normalize;
mod serializer;

pub use names::{element_name, file_name, sanitize, unsanitize};
pub use normalize::VOLATILE_PROPERTIES;
pub use serializer::{COLLECTIONS, DATABASE_FILE, MODEL_FOLDER, ModelSerializer};
