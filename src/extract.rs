//! Package to project folder.
//!
//! One extraction is one [`SyncPass`]: every part is decoded and written
//! through the pass, and files from an earlier extraction that were not
//! written again are deleted at the end. A part that fails to decode keeps
//! its previous output; anything else aborts before cleanup.

use crate::common::encoding::TextEncoding;
use crate::common::Result;
use crate::model::{MODEL_FOLDER, ModelSerializer};
use crate::package::engine::{AnalyticEngine, SchemaClient};
use crate::package::{PbixPackage, PbixPart};
use crate::project::{
    KnownFiles, PassSummary, ProjectFolder, ProjectRootFolder, ProjectSettings, SETTINGS_FILE, SyncPass,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

pub const VERSION_FILE: &str = "Version.txt";
pub const CONNECTIONS_FILE: &str = "Connections.json";
pub const DIAGRAM_LAYOUT_FILE: &str = "DiagramLayout.json";
pub const MASHUP_FOLDER: &str = "Mashup";
pub const MASHUP_PACKAGE_FOLDER: &str = "Mashup/Package";
pub const MASHUP_CONTENTS_FOLDER: &str = "Mashup/Contents";
pub const PERMISSIONS_FILE: &str = "Mashup/Permissions.json";
pub const METADATA_FILE: &str = "Mashup/Metadata/metadata.json";
pub const QUERY_GROUPS_FILE: &str = "Mashup/Metadata/queryGroups.json";
pub const REPORT_FILE: &str = "Report/report.json";
pub const REPORT_METADATA_FILE: &str = "Report/metadata.json";
pub const REPORT_SETTINGS_FILE: &str = "Report/settings.json";
pub const LINGUISTIC_SCHEMA_FILE: &str = "Report/linguisticSchema.xml";
pub const STATIC_RESOURCES_FOLDER: &str = "Resources/StaticResources";
pub const CUSTOM_VISUALS_FOLDER: &str = "Resources/CustomVisuals";

/// Options for [`Extractor`].
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Model properties stripped in addition to the built-in volatile set
    pub volatile_properties: Vec<String>,
    /// Files present before the pass; `None` scans the folder
    pub known_files: Option<BTreeSet<PathBuf>>,
    /// Whether `.pbixproj.json` is refreshed
    pub write_settings: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            volatile_properties: Vec::new(),
            known_files: None,
            write_settings: true,
        }
    }
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volatile_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.volatile_properties.extend(names.into_iter().map(Into::into));
        self
    }

    /// Use `files` as the set present before the pass instead of scanning.
    pub fn with_known_files(mut self, files: BTreeSet<PathBuf>) -> Self {
        self.known_files = Some(files);
        self
    }

    pub fn with_settings_file(mut self, write: bool) -> Self {
        self.write_settings = write;
        self
    }
}

/// A part that could not be extracted. Its previous output was kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartFailure {
    pub part: String,
    pub message: String,
}

/// Outcome of an extraction.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub version: String,
    pub summary: PassSummary,
    pub failures: Vec<PartFailure>,
}

impl ExtractionReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Writes a package into the canonical folder layout.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    options: ExtractOptions,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    /// Extract `package` below `root`.
    ///
    /// A package holding only a binary data model reports the model as a
    /// failed part; see [`extract_with_engine`](Self::extract_with_engine).
    pub fn extract<R, P>(&self, package: &PbixPackage<R>, root: P) -> Result<ExtractionReport>
    where
        R: Read + Seek,
        P: AsRef<Path>,
    {
        self.run(package, root.as_ref(), || package.read_data_model_schema())
    }

    /// Extract `package`, materializing a binary data model through `engine`
    /// when no schema is embedded.
    pub fn extract_with_engine<R, P, E, C>(
        &self,
        package: &PbixPackage<R>,
        root: P,
        engine: &mut E,
        client: &mut C,
    ) -> Result<ExtractionReport>
    where
        R: Read + Seek,
        P: AsRef<Path>,
        E: AnalyticEngine + ?Sized,
        C: SchemaClient + ?Sized,
    {
        self.run(package, root.as_ref(), || {
            package.read_data_model_schema_with(engine, client)
        })
    }

    fn run<R, F>(&self, package: &PbixPackage<R>, root: &Path, schema_source: F) -> Result<ExtractionReport>
    where
        R: Read + Seek,
        F: FnOnce() -> Result<Option<Value>>,
    {
        let root = ProjectRootFolder::new(root);
        let mut settings = ProjectSettings::load(&root.folder())?;

        // A bad version marker means a bad package: stop before touching the tree
        let version = package.read_version()?;

        let pass = root
            .begin_pass()
            .with_retain_patterns(&settings.settings.retain)?;
        let top = pass.root();

        if self.options.write_settings {
            settings.touch();
            settings.save(&top)?;
        } else {
            pass.retain(SETTINGS_FILE)?;
        }
        top.write_text(VERSION_FILE, &version)?;

        let mut failures = Vec::new();

        let connections = write_json_part(&top, CONNECTIONS_FILE, package.read_connections());
        isolate(&pass, &mut failures, PbixPart::Connections, &[CONNECTIONS_FILE], connections)?;

        let diagram = write_json_part(&top, DIAGRAM_LAYOUT_FILE, package.read_diagram_layout());
        isolate(&pass, &mut failures, PbixPart::DiagramLayout, &[DIAGRAM_LAYOUT_FILE], diagram)?;

        let model = self.write_model(&pass, &settings, schema_source);
        isolate(&pass, &mut failures, PbixPart::DataModelSchema, &[MODEL_FOLDER], model)?;

        let mashup = write_mashup(package, &pass);
        isolate(&pass, &mut failures, PbixPart::DataMashup, &[MASHUP_FOLDER], mashup)?;

        let report = write_json_part(&top, REPORT_FILE, package.read_report());
        isolate(&pass, &mut failures, PbixPart::Report, &[REPORT_FILE], report)?;

        let metadata = write_json_part(&top, REPORT_METADATA_FILE, package.read_report_metadata());
        isolate(&pass, &mut failures, PbixPart::ReportMetadata, &[REPORT_METADATA_FILE], metadata)?;

        let report_settings = write_json_part(&top, REPORT_SETTINGS_FILE, package.read_report_settings());
        isolate(&pass, &mut failures, PbixPart::ReportSettings, &[REPORT_SETTINGS_FILE], report_settings)?;

        // Stored as UTF-16 in the package, as UTF-8 on disk
        let linguistic = package.read_linguistic_schema().and_then(|schema| match schema {
            Some(schema) => top
                .write_text(LINGUISTIC_SCHEMA_FILE, &schema.to_string_declaring(TextEncoding::Utf8))
                .map(drop),
            None => Ok(()),
        });
        isolate(&pass, &mut failures, PbixPart::LinguisticSchema, &[LINGUISTIC_SCHEMA_FILE], linguistic)?;

        let statics = write_resources(&pass, STATIC_RESOURCES_FOLDER, package.read_static_resources());
        isolate(&pass, &mut failures, PbixPart::StaticResources, &[STATIC_RESOURCES_FOLDER], statics)?;

        let visuals = write_resources(&pass, CUSTOM_VISUALS_FOLDER, package.read_custom_visuals());
        isolate(&pass, &mut failures, PbixPart::CustomVisuals, &[CUSTOM_VISUALS_FOLDER], visuals)?;

        let known = match &self.options.known_files {
            Some(files) => KnownFiles::Listed(files.clone()),
            None => KnownFiles::Scan,
        };
        let summary = pass.end(known)?;

        tracing::info!(
            root = %root.base_path().display(),
            version = %version,
            written = summary.written.len(),
            deleted = summary.deleted.len(),
            failed_parts = failures.len(),
            "extracted package"
        );
        Ok(ExtractionReport {
            version,
            summary,
            failures,
        })
    }

    fn write_model<F>(&self, pass: &SyncPass<'_>, settings: &ProjectSettings, schema_source: F) -> Result<()>
    where
        F: FnOnce() -> Result<Option<Value>>,
    {
        let Some(schema) = schema_source()? else {
            return Ok(());
        };
        let serializer = ModelSerializer::new()
            .with_volatile_properties(settings.settings.model.volatile_properties.iter().cloned())
            .with_volatile_properties(self.options.volatile_properties.iter().cloned());
        // Schema defects are local to the model; collisions are not
        serializer
            .to_folder(&schema, &pass.folder(MODEL_FOLDER)?)
            .map_err(|e| e.in_part(PbixPart::DataModelSchema.name()))?;
        Ok(())
    }
}

/// Keep the outcome of one part. Part-local failures are logged, recorded
/// and their previous outputs retained; other failures abort the pass.
fn isolate(
    pass: &SyncPass<'_>,
    failures: &mut Vec<PartFailure>,
    part: PbixPart,
    outputs: &[&str],
    result: Result<()>,
) -> Result<()> {
    let err = match result {
        Ok(()) => return Ok(()),
        Err(err) if err.is_part_local() => err,
        Err(err) => return Err(err),
    };

    tracing::warn!(part = part.name(), error = %err, "skipping part, keeping previous output");
    for output in outputs {
        pass.retain(output)?;
    }
    failures.push(PartFailure {
        part: part.name().to_string(),
        message: err.to_string(),
    });
    Ok(())
}

fn write_json_part(folder: &ProjectFolder<'_>, rel: &str, value: Result<Option<Value>>) -> Result<()> {
    if let Some(value) = value? {
        folder.write_json(rel, &value)?;
    }
    Ok(())
}

fn write_resources(pass: &SyncPass<'_>, rel: &str, resources: Result<BTreeMap<String, Vec<u8>>>) -> Result<()> {
    let resources = resources?;
    let folder = pass.folder(rel)?;
    for (id, bytes) in &resources {
        folder.write_bytes(id, bytes)?;
    }
    Ok(())
}

fn write_mashup<R: Read + Seek>(package: &PbixPackage<R>, pass: &SyncPass<'_>) -> Result<()> {
    let mashup = package.read_mashup()?;
    let top = pass.root();

    let sections = pass.folder(MASHUP_PACKAGE_FOLDER)?;
    for (path, bytes) in mashup.query_sections.iter() {
        sections.write_bytes(path, bytes)?;
    }
    top.write_json(PERMISSIONS_FILE, &mashup.permissions)?;
    top.write_json(METADATA_FILE, &mashup.metadata)?;
    if let Some(groups) = &mashup.query_groups {
        top.write_json(QUERY_GROUPS_FILE, groups)?;
    }

    let contents = pass.folder(MASHUP_CONTENTS_FOLDER)?;
    for (path, bytes) in mashup.embedded_content.iter() {
        contents.write_bytes(path, bytes)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::common::Error;
    use crate::common::xml::XmlDocument;
    use crate::mashup::{MashupPackage, MetadataEntry, MetadataItem, QUERY_GROUPS_ENTRY};
    use crate::package::PbixWriter;
    use crate::package::engine::tests::fakes;
    use serde_json::json;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    pub(crate) fn schema() -> Value {
        json!({
            "name": "Sales",
            "compatibilityLevel": 1567,
            "model": {
                "culture": "en-US",
                "tables": [
                    {"name": "Orders", "columns": [{"name": "Id", "dataType": "int64"}],
                     "partitions": [{"name": "Orders", "source": {"type": "m", "expression": "Sql.Database(\"db\", \"sales\")"}}]},
                    {"name": "Date Table", "refreshedTime": "2024-01-01T00:00:00"}
                ],
                "relationships": [{"name": "r1", "fromTable": "Orders", "toTable": "Date Table"}]
            }
        })
    }

    pub(crate) fn sample_package() -> Vec<u8> {
        let mut mashup = MashupPackage::from_section_document(
            "section Section1;\n\nshared Orders = Sql.Database(\"db\", \"sales\");",
        );
        mashup.metadata.items.push(MetadataItem {
            item_type: "AllFormulas".into(),
            item_path: String::new(),
            stable_entries: vec![MetadataEntry {
                kind: QUERY_GROUPS_ENTRY.into(),
                value: r#"s[{"Id":"g1","Name":"Staging","Description":null,"Order":0,"ParentId":null}]"#.into(),
            }],
            entries: Vec::new(),
        });
        mashup.embedded_content.insert("Content/readme.txt", b"notes".to_vec());

        let mut writer = PbixWriter::new();
        writer.set_version("1.28");
        writer.set_mashup(&mashup).unwrap();
        writer.set_connections(&json!({"Version": 1, "Connections": []})).unwrap();
        writer.set_data_model_schema(&schema()).unwrap();
        writer.set_report(&json!({"id": 0, "sections": [{"name": "ReportSection"}]})).unwrap();
        writer
            .set_report_metadata(&json!({"version": 5, "createdFrom": "Cloud"}))
            .unwrap();
        writer.set_linguistic_schema(
            &XmlDocument::parse(r#"<?xml version="1.0" encoding="utf-16"?><LinguisticSchema Language="en-US"/>"#).unwrap(),
        );
        writer
            .add_static_resource("SharedResources/BaseThemes/CY24SU02.json", b"{\"name\":\"theme\"}".to_vec())
            .unwrap();
        writer.to_bytes().unwrap()
    }

    fn repack(bytes: &[u8], replace: &[(&str, Vec<u8>)]) -> Vec<u8> {
        repack_with(bytes, replace, SimpleFileOptions::default())
    }

    fn repack_with(bytes: &[u8], replace: &[(&str, Vec<u8>)], options: SimpleFileOptions) -> Vec<u8> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            let name = file.name().to_string();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            if let Some((_, new)) = replace.iter().find(|(n, _)| *n == name) {
                data = new.clone();
            }
            zip.start_file(name, options).unwrap();
            zip.write_all(&data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    /// `bytes` with every member stored and one byte of the report layout
    /// flipped, so its checksum no longer matches.
    pub(crate) fn with_damaged_report(bytes: &[u8]) -> Vec<u8> {
        let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        let mut bytes = repack_with(bytes, &[], stored);
        let needle = TextEncoding::Utf16Le.encode("sections");
        let at = bytes
            .windows(needle.len())
            .position(|w| w == needle.as_slice())
            .unwrap();
        bytes[at] ^= 0x20;
        bytes
    }

    /// A package carrying only the binary model, no embedded schema.
    pub(crate) fn binary_model_package() -> Vec<u8> {
        let mut writer = PbixWriter::new();
        writer.set_version("1.28");
        writer.set_mashup(&MashupPackage::default()).unwrap();
        writer.set_data_model(vec![0x11; 32]);
        writer.to_bytes().unwrap()
    }

    #[test]
    fn test_canonical_layout() {
        let dir = tempfile::tempdir().unwrap();
        let package = PbixPackage::from_bytes(sample_package()).unwrap();
        let report = Extractor::default().extract(&package, dir.path()).unwrap();

        assert!(report.is_complete());
        assert_eq!(report.version, "1.28");
        let files = ProjectFolder::new(dir.path()).files("**/*").unwrap();
        for expected in [
            ".pbixproj.json",
            "Connections.json",
            "Mashup/Contents/Content/readme.txt",
            "Mashup/Metadata/metadata.json",
            "Mashup/Metadata/queryGroups.json",
            "Mashup/Package/Config/Package.xml",
            "Mashup/Package/Formulas/Section1.m",
            "Mashup/Package/[Content_Types].xml",
            "Mashup/Permissions.json",
            "Model/database.json",
            "Model/relationships/r1.json",
            "Model/tables/Date%20Table.json",
            "Model/tables/Orders.json",
            "Report/linguisticSchema.xml",
            "Report/metadata.json",
            "Report/report.json",
            "Resources/StaticResources/SharedResources/BaseThemes/CY24SU02.json",
            "Version.txt",
        ] {
            assert!(files.iter().any(|f| f == expected), "missing {expected}: {files:?}");
        }

        let folder = ProjectFolder::new(dir.path());
        let xml = folder.read_text(LINGUISTIC_SCHEMA_FILE).unwrap().unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
        let table: Value = folder.read_json("Model/tables/Date%20Table.json").unwrap().unwrap();
        assert!(table.get("refreshedTime").is_none());
        let groups: Value = folder.read_json(QUERY_GROUPS_FILE).unwrap().unwrap();
        assert_eq!(groups[0]["Name"], "Staging");
    }

    #[test]
    fn test_rerun_removes_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let package = PbixPackage::from_bytes(sample_package()).unwrap();
        let folder = ProjectFolder::new(dir.path());
        folder.write_text("Model/tables/Dropped.json", "{}").unwrap();
        folder.write_text("README.md", "# Sales").unwrap();

        let report = Extractor::default().extract(&package, dir.path()).unwrap();
        assert!(report.summary.deleted.contains(&dir.path().join("Model/tables/Dropped.json")));
        assert!(folder.file("README.md").unwrap().exists());

        // A second run over its own output deletes nothing
        let again = Extractor::default().extract(&package, dir.path()).unwrap();
        assert!(again.summary.deleted.is_empty());
    }

    #[test]
    fn test_corrupt_part_keeps_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let good = sample_package();
        Extractor::default()
            .extract(&PbixPackage::from_bytes(good.clone()).unwrap(), dir.path())
            .unwrap();
        let before = std::fs::read_to_string(dir.path().join(REPORT_FILE)).unwrap();

        let bad = repack(&good, &[("Report/Layout", TextEncoding::Utf16Le.encode("{broken"))]);
        let report = Extractor::default()
            .extract(&PbixPackage::from_bytes(bad).unwrap(), dir.path())
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].part, "Report");
        assert_eq!(std::fs::read_to_string(dir.path().join(REPORT_FILE)).unwrap(), before);
        assert!(dir.path().join("Model/tables/Orders.json").exists());
    }

    #[test]
    fn test_collision_aborts_before_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let folder = ProjectFolder::new(dir.path());
        folder.write_text("Model/tables/Old.json", "{}").unwrap();

        let mut writer = PbixWriter::new();
        writer.set_version("1.28");
        writer.set_mashup(&MashupPackage::default()).unwrap();
        writer
            .set_data_model_schema(&json!({"model": {"tables": [{"name": "A"}, {"name": "a"}]}}))
            .unwrap();
        let package = PbixPackage::from_bytes(writer.to_bytes().unwrap()).unwrap();

        let err = Extractor::default().extract(&package, dir.path()).unwrap_err();
        assert!(matches!(err, Error::NameCollision { .. }));
        assert!(folder.file("Model/tables/Old.json").unwrap().exists());
    }

    #[test]
    fn test_binary_model_without_engine() {
        let dir = tempfile::tempdir().unwrap();
        let package = PbixPackage::from_bytes(binary_model_package()).unwrap();

        let report = Extractor::default().extract(&package, dir.path()).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].part, "DataModelSchema");
        assert!(report.failures[0].message.contains("engine"));
    }

    #[test]
    fn test_without_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let package = PbixPackage::from_bytes(sample_package()).unwrap();
        let options = ExtractOptions::new()
            .with_settings_file(false)
            .with_volatile_properties(["dataType"]);
        Extractor::new(options).extract(&package, dir.path()).unwrap();

        let folder = ProjectFolder::new(dir.path());
        assert!(!folder.file(SETTINGS_FILE).unwrap().exists());
        let orders: Value = folder.read_json("Model/tables/Orders.json").unwrap().unwrap();
        assert!(orders["columns"][0].get("dataType").is_none());
    }

    #[test]
    fn test_damaged_member_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let good = sample_package();
        Extractor::default()
            .extract(&PbixPackage::from_bytes(good.clone()).unwrap(), dir.path())
            .unwrap();
        let before = std::fs::read_to_string(dir.path().join(REPORT_FILE)).unwrap();

        let damaged = PbixPackage::from_bytes(with_damaged_report(&good)).unwrap();
        let report = Extractor::default().extract(&damaged, dir.path()).unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].part, "Report");
        assert_eq!(std::fs::read_to_string(dir.path().join(REPORT_FILE)).unwrap(), before);
        assert!(dir.path().join(CONNECTIONS_FILE).exists());
    }

    #[test]
    fn test_engine_materializes_model() {
        let dir = tempfile::tempdir().unwrap();
        let package = PbixPackage::from_bytes(binary_model_package()).unwrap();
        let (log, mut engine, mut client) = fakes(false, Ok(schema().to_string()));

        let report = Extractor::default()
            .extract_with_engine(&package, dir.path(), &mut engine, &mut client)
            .unwrap();

        assert!(report.is_complete(), "{:?}", report.failures);
        let folder = ProjectFolder::new(dir.path());
        assert!(folder.file("Model/database.json").unwrap().exists());
        assert!(folder.file("Model/tables/Orders.json").unwrap().exists());
        assert!(folder.file("Model/relationships/r1.json").unwrap().exists());
        assert_eq!(log.borrow().last().map(String::as_str), Some("stop"));
    }

    #[test]
    fn test_engine_failure_keeps_model() {
        let dir = tempfile::tempdir().unwrap();
        Extractor::default()
            .extract(&PbixPackage::from_bytes(sample_package()).unwrap(), dir.path())
            .unwrap();
        let orders = dir.path().join("Model/tables/Orders.json");
        let before = std::fs::read_to_string(&orders).unwrap();

        let package = PbixPackage::from_bytes(binary_model_package()).unwrap();
        let (_log, mut engine, mut client) = fakes(true, Ok("{}".into()));
        let report = Extractor::default()
            .extract_with_engine(&package, dir.path(), &mut engine, &mut client)
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].part, "DataModelSchema");
        assert!(report.failures[0].message.contains("model is locked"));
        assert_eq!(std::fs::read_to_string(&orders).unwrap(), before);
        assert!(dir.path().join("Model/database.json").exists());
        // Parts the new package no longer has are cleaned up as usual
        assert!(!dir.path().join(REPORT_FILE).exists());
    }
}
