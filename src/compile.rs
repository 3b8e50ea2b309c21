//! Project folder to package.
//!
//! Reads the canonical layout written by [`Extractor`](crate::Extractor) and
//! regenerates an equivalent package. Files missing from the folder leave
//! their part out, except the version marker, which is required.

use crate::common::xml::XmlDocument;
use crate::common::{Error, Result};
use crate::extract::{
    CONNECTIONS_FILE, CUSTOM_VISUALS_FOLDER, DIAGRAM_LAYOUT_FILE, LINGUISTIC_SCHEMA_FILE, MASHUP_CONTENTS_FOLDER,
    MASHUP_PACKAGE_FOLDER, METADATA_FILE, PERMISSIONS_FILE, REPORT_FILE, REPORT_METADATA_FILE, REPORT_SETTINGS_FILE,
    STATIC_RESOURCES_FOLDER, VERSION_FILE,
};
use crate::mashup::{MashupPackage, PackageMetadata, Permissions, generate_section_document};
use crate::model::{MODEL_FOLDER, ModelSerializer};
use crate::package::{Archive, PbixPart, PbixWriter};
use crate::project::ProjectFolder;
use serde_json::Value;
use std::path::Path;

/// Builds packages from project folders.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    model: ModelSerializer,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build package bytes from the project at `root`.
    ///
    /// # Errors
    /// [`Error::NotFound`] when `root` or its `Version.txt` is missing.
    pub fn compile<P: AsRef<Path>>(&self, root: P) -> Result<Vec<u8>> {
        let folder = ProjectFolder::new(root.as_ref());
        if !folder.exists() {
            return Err(Error::NotFound(format!(
                "project folder '{}'",
                root.as_ref().display()
            )));
        }

        let version = folder.read_text(VERSION_FILE)?.ok_or_else(|| {
            Error::NotFound(format!("{} in '{}'", VERSION_FILE, root.as_ref().display()))
        })?;

        let mut writer = PbixWriter::new();
        writer.set_version(&version);

        if let Some(connections) = folder.read_json::<Value>(CONNECTIONS_FILE)? {
            writer.set_connections(&connections)?;
        }
        if let Some(layout) = folder.read_json::<Value>(DIAGRAM_LAYOUT_FILE)? {
            writer.set_diagram_layout(&layout)?;
        }

        let schema = self.model.from_folder(&folder.folder(MODEL_FOLDER)?)?;
        if let Some(schema) = &schema {
            writer.set_data_model_schema(schema)?;
        }
        writer.set_mashup(&read_mashup(&folder, schema.as_ref())?)?;

        if let Some(report) = folder.read_json::<Value>(REPORT_FILE)? {
            writer.set_report(&report)?;
        }
        if let Some(metadata) = folder.read_json::<Value>(REPORT_METADATA_FILE)? {
            writer.set_report_metadata(&metadata)?;
        }
        if let Some(settings) = folder.read_json::<Value>(REPORT_SETTINGS_FILE)? {
            writer.set_report_settings(&settings)?;
        }
        if let Some(text) = folder.read_text(LINGUISTIC_SCHEMA_FILE)? {
            let schema = XmlDocument::parse(text)
                .map_err(|e| e.in_part(PbixPart::LinguisticSchema.name()))?;
            writer.set_linguistic_schema(&schema);
        }

        let statics = folder.folder(STATIC_RESOURCES_FOLDER)?;
        for id in statics.files("**/*")? {
            if let Some(bytes) = statics.read_bytes(&id)? {
                writer.add_static_resource(&id, bytes)?;
            }
        }
        let visuals = folder.folder(CUSTOM_VISUALS_FOLDER)?;
        for id in visuals.files("**/*")? {
            if let Some(bytes) = visuals.read_bytes(&id)? {
                writer.add_custom_visual(&id, bytes)?;
            }
        }

        let bytes = writer.to_bytes()?;
        tracing::info!(
            root = %root.as_ref().display(),
            version = %version,
            bytes = bytes.len(),
            "compiled package"
        );
        Ok(bytes)
    }

    /// Build the package and write it to `path`, replacing any existing file.
    pub fn compile_to_file<P: AsRef<Path>, Q: AsRef<Path>>(&self, root: P, path: Q) -> Result<()> {
        let bytes = self.compile(root)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// The mashup from `Mashup/`, or one generated from the model's M
/// expressions when the folder holds no query sections.
fn read_mashup(folder: &ProjectFolder<'_>, schema: Option<&Value>) -> Result<MashupPackage> {
    let sections = folder.folder(MASHUP_PACKAGE_FOLDER)?;
    if !sections.exists() {
        let document = generate_section_document(schema.unwrap_or(&Value::Null));
        tracing::debug!("no query sections on disk, generating them from the model");
        return Ok(MashupPackage::from_section_document(&document));
    }

    let metadata = folder
        .read_json::<PackageMetadata>(METADATA_FILE)?
        .unwrap_or_default();
    let query_groups = metadata.query_groups()?;
    Ok(MashupPackage {
        query_sections: read_archive(&sections)?,
        permissions: folder
            .read_json::<Permissions>(PERMISSIONS_FILE)?
            .unwrap_or_default(),
        metadata,
        embedded_content: read_archive(&folder.folder(MASHUP_CONTENTS_FOLDER)?)?,
        query_groups,
        // Credential bindings never leave the original package
        permission_bindings: Vec::new(),
    })
}

fn read_archive(folder: &ProjectFolder<'_>) -> Result<Archive> {
    let mut archive = Archive::new();
    for path in folder.files("**/*")? {
        if let Some(bytes) = folder.read_bytes(&path)? {
            archive.insert(path, bytes);
        }
    }
    Ok(archive)
}
