//! Tabular schema to and from the `Model/` folder.

use super::names::file_name;
use super::normalize::strip_volatile;
use crate::common::{Error, Result};
use crate::project::ProjectFolder;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

/// Project folder holding the model.
pub const MODEL_FOLDER: &str = "Model";

/// The schema minus its split-out collections.
pub const DATABASE_FILE: &str = "database.json";

/// Collections of `model` written one file per element, in write order.
pub const COLLECTIONS: [&str; 7] = [
    "tables",
    "relationships",
    "expressions",
    "roles",
    "cultures",
    "dataSources",
    "perspectives",
];

/// Writes a tabular schema as one file per named element and reads it back.
///
/// The round trip is exact up to [`canonicalize`](Self::canonicalize):
/// `from_folder(to_folder(s)) == canonicalize(s)`.
#[derive(Debug, Clone, Default)]
pub struct ModelSerializer {
    volatile_properties: Vec<String>,
}

struct PlannedFile {
    rel: String,
    value: Value,
}

impl ModelSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip these properties too, in addition to the built-in volatile set.
    pub fn with_volatile_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.volatile_properties.extend(names.into_iter().map(Into::into));
        self
    }

    /// Write `schema` below `folder`.
    ///
    /// Every element is validated and every file name checked for collisions
    /// before the first file is written. Returns the paths written.
    pub fn to_folder(&self, schema: &Value, folder: &ProjectFolder<'_>) -> Result<BTreeSet<PathBuf>> {
        let mut database = schema.clone();
        strip_volatile(&mut database, &self.volatile_properties);
        let planned = split_collections(&mut database)?;

        let mut written = BTreeSet::new();
        written.insert(folder.write_json(DATABASE_FILE, &database)?);
        for file in &planned {
            written.insert(folder.write_json(&file.rel, &file.value)?);
        }
        tracing::debug!(
            folder = %folder.base_path().display(),
            elements = planned.len(),
            "wrote model"
        );
        Ok(written)
    }

    /// Reassemble the schema, or `None` when there is no `database.json`.
    ///
    /// Elements of each collection are inserted in file-name order.
    pub fn from_folder(&self, folder: &ProjectFolder<'_>) -> Result<Option<Value>> {
        let Some(mut database) = folder.read_json::<Value>(DATABASE_FILE)? else {
            return Ok(None);
        };
        let root = database
            .as_object_mut()
            .ok_or_else(|| Error::InvalidSchema(format!("{} is not an object", DATABASE_FILE)))?;

        for collection in COLLECTIONS {
            let sub = folder.folder(collection)?;
            let mut elements = Vec::new();
            for file in sub.files("*.json")? {
                match sub.read_json::<Value>(&file)? {
                    Some(element) => elements.push(element),
                    None => tracing::warn!(collection, file = %file, "element file vanished while reading"),
                }
            }
            if elements.is_empty() {
                continue;
            }
            model_object(root)?.insert(collection.to_string(), Value::Array(elements));
        }
        Ok(Some(database))
    }

    /// The form `from_folder` returns for a schema written by `to_folder`:
    /// volatile properties removed, collections sorted by file name and moved
    /// after the other model properties, empty collections dropped.
    pub fn canonicalize(&self, schema: &Value) -> Result<Value> {
        let mut database = schema.clone();
        strip_volatile(&mut database, &self.volatile_properties);
        let planned = split_collections(&mut database)?;

        let mut by_collection: Vec<(&str, Vec<(String, Value)>)> =
            COLLECTIONS.iter().map(|c| (*c, Vec::new())).collect();
        for file in planned {
            let Some((collection, name)) = file.rel.split_once('/') else {
                continue;
            };
            if let Some((_, elements)) = by_collection.iter_mut().find(|(c, _)| *c == collection) {
                elements.push((name.to_string(), file.value));
            }
        }

        if let Some(root) = database.as_object_mut() {
            for (collection, mut elements) in by_collection {
                if elements.is_empty() {
                    continue;
                }
                elements.sort_by(|a, b| a.0.cmp(&b.0));
                let values = elements.into_iter().map(|(_, v)| v).collect();
                model_object(root)?.insert(collection.to_string(), Value::Array(values));
            }
        }
        Ok(database)
    }
}

fn model_object(root: &mut Map<String, Value>) -> Result<&mut Map<String, Value>> {
    root.entry("model")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| Error::InvalidSchema("'model' is not an object".into()))
}

/// Remove the collections from `database` and plan one file per element.
fn split_collections(database: &mut Value) -> Result<Vec<PlannedFile>> {
    let root = database
        .as_object_mut()
        .ok_or_else(|| Error::InvalidSchema("schema is not an object".into()))?;
    let Some(model) = root.get_mut("model") else {
        return Ok(Vec::new());
    };
    let model = model
        .as_object_mut()
        .ok_or_else(|| Error::InvalidSchema("'model' is not an object".into()))?;

    let mut planned = Vec::new();
    for collection in COLLECTIONS {
        let Some(elements) = model.shift_remove(collection) else {
            continue;
        };
        let Value::Array(elements) = elements else {
            return Err(Error::InvalidSchema(format!("'{}' is not an array", collection)));
        };

        // Lower-cased file name -> element name, for case-insensitive file systems
        let mut seen: HashMap<String, String> = HashMap::with_capacity(elements.len());
        for (index, element) in elements.into_iter().enumerate() {
            let name = element
                .get("name")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    Error::InvalidSchema(format!("{}[{}] has no name", collection, index))
                })?
                .to_string();

            let file = file_name(&name);
            if let Some(first) = seen.insert(file.to_lowercase(), name.clone()) {
                return Err(Error::NameCollision {
                    collection: collection.to_string(),
                    first,
                    second: name,
                    file_name: file,
                });
            }
            planned.push(PlannedFile {
                rel: format!("{}/{}", collection, file),
                value: element,
            });
        }
    }
    Ok(planned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "name": "Sales",
            "compatibilityLevel": 1550,
            "model": {
                "culture": "en-US",
                "tables": [
                    {"name": "Orders", "modifiedTime": "2024-01-01", "columns": [{"name": "Id", "dataType": "int64"}]},
                    {"name": "Date Table", "columns": []},
                    {"name": "Customers/Regions", "columns": []}
                ],
                "relationships": [
                    {"name": "rel-1", "fromTable": "Orders", "toTable": "Date Table"}
                ],
                "expressions": [],
                "annotations": [{"name": "PBI_QueryOrder", "value": "[]"}]
            }
        })
    }

    #[test]
    fn test_layout() {
        let dir = tempfile::tempdir().unwrap();
        let folder = ProjectFolder::new(dir.path());
        let written = ModelSerializer::new().to_folder(&schema(), &folder).unwrap();

        assert_eq!(written.len(), 5);
        assert_eq!(
            folder.files("**/*").unwrap(),
            vec![
                "database.json",
                "relationships/rel-1.json",
                "tables/Customers%2FRegions.json",
                "tables/Date%20Table.json",
                "tables/Orders.json",
            ]
        );

        let database: Value = folder.read_json(DATABASE_FILE).unwrap().unwrap();
        assert!(database["model"].get("tables").is_none());
        assert_eq!(database["model"]["annotations"][0]["name"], "PBI_QueryOrder");
        let orders: Value = folder.read_json("tables/Orders.json").unwrap().unwrap();
        assert!(orders.get("modifiedTime").is_none());
    }

    #[test]
    fn test_round_trip_is_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let folder = ProjectFolder::new(dir.path());
        let serializer = ModelSerializer::new();
        serializer.to_folder(&schema(), &folder).unwrap();

        let read = serializer.from_folder(&folder).unwrap().unwrap();
        let canonical = serializer.canonicalize(&schema()).unwrap();
        assert_eq!(read, canonical);
        assert_eq!(
            serde_json::to_string(&read).unwrap(),
            serde_json::to_string(&canonical).unwrap()
        );

        let names: Vec<&str> = read["model"]["tables"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Customers/Regions", "Date Table", "Orders"]);
        assert!(read["model"].get("expressions").is_none());

        // A second pass over its own output is stable
        let dir2 = tempfile::tempdir().unwrap();
        let folder2 = ProjectFolder::new(dir2.path());
        serializer.to_folder(&read, &folder2).unwrap();
        assert_eq!(serializer.from_folder(&folder2).unwrap().unwrap(), read);
    }

    #[test]
    fn test_collision_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let folder = ProjectFolder::new(dir.path());
        let schema = json!({"model": {"tables": [{"name": "Sales"}, {"name": "sales"}]}});

        match ModelSerializer::new().to_folder(&schema, &folder) {
            Err(Error::NameCollision { collection, first, second, .. }) => {
                assert_eq!(collection, "tables");
                assert_eq!(first, "Sales");
                assert_eq!(second, "sales");
            },
            other => panic!("expected a collision, got {other:?}"),
        }
        assert!(folder.files("**/*").unwrap().is_empty());
    }

    #[test]
    fn test_same_name_in_different_collections() {
        let dir = tempfile::tempdir().unwrap();
        let folder = ProjectFolder::new(dir.path());
        let schema = json!({"model": {"tables": [{"name": "Sales"}], "roles": [{"name": "Sales"}]}});
        ModelSerializer::new().to_folder(&schema, &folder).unwrap();
        assert!(folder.file("tables/Sales.json").unwrap().exists());
        assert!(folder.file("roles/Sales.json").unwrap().exists());
    }

    #[test]
    fn test_missing_name() {
        let dir = tempfile::tempdir().unwrap();
        let schema = json!({"model": {"roles": [{"modelPermission": "read"}]}});
        assert!(matches!(
            ModelSerializer::new().to_folder(&schema, &ProjectFolder::new(dir.path())),
            Err(Error::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_user_volatile_properties() {
        let dir = tempfile::tempdir().unwrap();
        let folder = ProjectFolder::new(dir.path());
        let serializer = ModelSerializer::new().with_volatile_properties(["lineageTag"]);
        let schema = json!({"model": {"tables": [{"name": "T", "lineageTag": "6f1c"}]}});
        serializer.to_folder(&schema, &folder).unwrap();

        let table: Value = folder.read_json("tables/T.json").unwrap().unwrap();
        assert_eq!(table, json!({"name": "T"}));
    }

    #[test]
    fn test_absent_database() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ModelSerializer::new()
            .from_folder(&ProjectFolder::new(dir.path()))
            .unwrap()
            .is_none());
    }
}
