//! Read-only access to the parts of a package.

use crate::common::encoding::TextEncoding;
use crate::common::xml::XmlDocument;
use crate::common::{Error, Memo, Result};
use crate::mashup::MashupPackage;
use crate::package::engine::{self, AnalyticEngine, SchemaClient};
use crate::package::packuri::PackURI;
use crate::package::parts::{PartKind, PbixPart};
use crate::package::phys_pkg::PhysPkgReader;
use crate::package::records::{self, RecordSchema};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;
use std::rc::Rc;

/// An opened package.
///
/// The package owns its stream until dropped. Every accessor decodes its
/// part from the stream on each call, except [`PbixPackage::read_mashup`],
/// which decodes once and shares the result. Optional parts that are absent
/// come back as `None` or as an empty map.
///
/// # Example
///
/// ```no_run
/// use pbixproj::PbixPackage;
///
/// let package = PbixPackage::open("Sales.pbix")?;
/// if package.read_linguistic_schema()?.is_none() {
///     println!("no Q&A schema");
/// }
/// # Ok::<(), pbixproj::Error>(())
/// ```
pub struct PbixPackage<R: Read + Seek = BufReader<File>> {
    phys: PhysPkgReader<R>,
    mashup: Memo<MashupPackage>,
    #[cfg(test)]
    mashup_decodes: std::cell::Cell<usize>,
}

impl PbixPackage<BufReader<File>> {
    /// Open a package file.
    ///
    /// # Errors
    /// [`Error::NotFound`] when the file is missing, [`Error::CorruptContainer`]
    /// when it is not a zip or lacks a required part.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "opening package");
        Self::with_reader(PhysPkgReader::open(path)?)
    }
}

impl PbixPackage<Cursor<Vec<u8>>> {
    /// Open a package held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::with_reader(PhysPkgReader::from_bytes(bytes)?)
    }
}

impl<R: Read + Seek> PbixPackage<R> {
    /// Open a package from an already-open stream.
    pub fn from_reader(reader: R) -> Result<Self> {
        Self::with_reader(PhysPkgReader::new(reader)?)
    }

    fn with_reader(phys: PhysPkgReader<R>) -> Result<Self> {
        for part in PbixPart::ALL.iter().filter(|p| p.is_required()) {
            if !phys.contains(&part_uri(*part)) {
                return Err(Error::CorruptContainer(format!(
                    "required part '{}' is missing",
                    part.member()
                )));
            }
        }
        Ok(Self {
            phys,
            mashup: Memo::new(),
            #[cfg(test)]
            mashup_decodes: std::cell::Cell::new(0),
        })
    }

    /// Sorted zip member names of the package.
    pub fn part_names(&self) -> Vec<String> {
        self.phys.member_names()
    }

    /// Whether a part is present. Resource trees count as present when they
    /// hold at least one member.
    pub fn has_part(&self, part: PbixPart) -> bool {
        match part.kind() {
            PartKind::ResourceTree => {
                !self.phys.members_under(part.member()).is_empty()
            },
            _ => self.phys.contains(&part_uri(part)),
        }
    }

    /// Raw bytes of a single-member part.
    pub fn read_raw(&self, part: PbixPart) -> Result<Option<Vec<u8>>> {
        let blob = self
            .phys
            .blob_for(&part_uri(part))
            .map_err(|e| e.in_part(part.name()))?;
        if let Some(bytes) = &blob {
            tracing::debug!(part = part.name(), bytes = bytes.len(), "read part");
        }
        Ok(blob)
    }

    fn read_text(&self, part: PbixPart) -> Result<Option<String>> {
        let Some(bytes) = self.read_raw(part)? else {
            return Ok(None);
        };
        let encoding = part.encoding().unwrap_or(TextEncoding::Utf8);
        encoding
            .decode(&bytes)
            .map(Some)
            .map_err(|cause| Error::part_corrupt(part.name(), cause))
    }

    fn read_json(&self, part: PbixPart) -> Result<Option<Value>> {
        match self.read_text(part)? {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| Error::from(e).in_part(part.name())),
            None => Ok(None),
        }
    }

    fn read_records(&self, part: PbixPart, schema: &RecordSchema) -> Result<Option<Value>> {
        match self.read_raw(part)? {
            Some(bytes) => records::decode(&bytes, schema)
                .map(Some)
                .map_err(|e| e.in_part(part.name())),
            None => Ok(None),
        }
    }

    /// The version marker. Required.
    pub fn read_version(&self) -> Result<String> {
        self.read_text(PbixPart::Version)?
            .ok_or_else(|| Error::CorruptContainer("required part 'Version' is missing".into()))
    }

    pub fn read_connections(&self) -> Result<Option<Value>> {
        self.read_json(PbixPart::Connections)
    }

    /// The tabular schema stored in the package.
    ///
    /// # Errors
    /// [`Error::EngineUnavailable`] when the package only holds a binary
    /// `DataModel`; use [`PbixPackage::read_data_model_schema_with`] to
    /// materialize it through an engine.
    pub fn read_data_model_schema(&self) -> Result<Option<Value>> {
        if let Some(schema) = self.read_json(PbixPart::DataModelSchema)? {
            return Ok(Some(schema));
        }
        if self.has_part(PbixPart::DataModel) {
            return Err(Error::EngineUnavailable(
                "the package holds a binary data model and no analytic engine is bound".into(),
            ));
        }
        Ok(None)
    }

    /// The tabular schema, materializing a binary `DataModel` through the
    /// given engine when no schema is stored.
    pub fn read_data_model_schema_with<E, C>(
        &self,
        engine: &mut E,
        client: &mut C,
    ) -> Result<Option<Value>>
    where
        E: AnalyticEngine + ?Sized,
        C: SchemaClient + ?Sized,
    {
        if let Some(schema) = self.read_json(PbixPart::DataModelSchema)? {
            return Ok(Some(schema));
        }
        let Some(model) = self.read_data_model()? else {
            return Ok(None);
        };
        engine::materialize_schema(engine, client, &model)
            .map(Some)
            .map_err(|e| e.in_part(PbixPart::DataModelSchema.name()))
    }

    /// The proprietary binary model, untouched.
    pub fn read_data_model(&self) -> Result<Option<Vec<u8>>> {
        self.read_raw(PbixPart::DataModel)
    }

    /// The report layout document.
    pub fn read_report(&self) -> Result<Option<Value>> {
        self.read_json(PbixPart::Report)
    }

    pub fn read_report_metadata(&self) -> Result<Option<Value>> {
        self.read_records(PbixPart::ReportMetadata, &records::REPORT_METADATA)
    }

    pub fn read_report_settings(&self) -> Result<Option<Value>> {
        self.read_records(PbixPart::ReportSettings, &records::REPORT_SETTINGS)
    }

    pub fn read_linguistic_schema(&self) -> Result<Option<XmlDocument>> {
        match self.read_text(PbixPart::LinguisticSchema)? {
            Some(text) => XmlDocument::parse(text)
                .map(Some)
                .map_err(|e| e.in_part(PbixPart::LinguisticSchema.name())),
            None => Ok(None),
        }
    }

    pub fn read_diagram_layout(&self) -> Result<Option<Value>> {
        self.read_json(PbixPart::DiagramLayout)
    }

    /// Static resources keyed by their identifier below
    /// `Report/StaticResources`. Empty when there are none.
    pub fn read_static_resources(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        self.read_resources(PbixPart::StaticResources)
    }

    /// Custom visuals keyed by their identifier below `Report/CustomVisuals`.
    pub fn read_custom_visuals(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        self.read_resources(PbixPart::CustomVisuals)
    }

    fn read_resources(&self, part: PbixPart) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut resources = BTreeMap::new();
        for uri in self.phys.members_under(part.member()) {
            if !uri.is_safe() {
                return Err(Error::part_corrupt(
                    part.name(),
                    format!("resource '{}' is not a relative path", uri.membername()),
                ));
            }
            let Some(id) = uri.relative_to(part.member()) else {
                continue;
            };
            let blob = self.phys.blob_for(&uri).map_err(|e| e.in_part(part.name()))?;
            if let Some(blob) = blob {
                resources.insert(id.to_string(), blob);
            }
        }
        tracing::debug!(part = part.name(), count = resources.len(), "read resources");
        Ok(resources)
    }

    /// The decoded mashup sub-container.
    ///
    /// Decoding runs on the first call only. Later calls return the same
    /// `Rc`, or the same error if the first decode failed.
    pub fn read_mashup(&self) -> Result<Rc<MashupPackage>> {
        self.mashup.get_or_decode(|| {
            #[cfg(test)]
            self.mashup_decodes.set(self.mashup_decodes.get() + 1);

            let part = PbixPart::DataMashup;
            let bytes = self.read_raw(part)?.ok_or_else(|| {
                Error::CorruptContainer("required part 'DataMashup' is missing".into())
            })?;
            MashupPackage::decode(&bytes).map_err(|e| e.in_part(part.name()))
        })
    }
}

#[inline]
fn part_uri(part: PbixPart) -> PackURI {
    PackURI::from_membername(part.member())
}
