//! XML helpers: escaping, entity resolution and a checked document type.

mod document;
mod escape;

pub use document::XmlDocument;
pub use escape::{entity_text, escape_xml, resolve_entity};
