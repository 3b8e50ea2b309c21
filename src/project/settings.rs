//! The `.pbixproj.json` file at the project root.

use super::ProjectFolder;
use crate::common::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File name of the settings file, relative to the project root.
pub const SETTINGS_FILE: &str = ".pbixproj.json";

const SETTINGS_VERSION: &str = "1.0";

/// Project-level settings, written at the start of every extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    pub version: String,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub model: ModelSettings,
    /// Root-relative globs never deleted by a pass
    #[serde(default = "default_retain")]
    pub retain: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSettings {
    /// Extra property names stripped from the model besides the built-in set
    #[serde(default)]
    pub volatile_properties: Vec<String>,
}

fn default_retain() -> Vec<String> {
    vec![".git/**".into(), ".gitignore".into(), "README.md".into()]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: ModelSettings::default(),
            retain: default_retain(),
        }
    }
}

impl Default for ProjectSettings {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            version: SETTINGS_VERSION.to_string(),
            created: now,
            last_modified: now,
            settings: Settings::default(),
        }
    }
}

impl ProjectSettings {
    /// Load from `folder`, or start fresh when there is no settings file.
    pub fn load(folder: &ProjectFolder<'_>) -> Result<Self> {
        match folder.read_json::<Self>(SETTINGS_FILE)? {
            Some(settings) => Ok(settings),
            None => {
                tracing::debug!(folder = %folder.base_path().display(), "no settings file, using defaults");
                Ok(Self::default())
            },
        }
    }

    /// Refresh `lastModified`. `created` is kept.
    pub fn touch(&mut self) {
        self.last_modified = Utc::now();
    }

    pub fn save(&self, folder: &ProjectFolder<'_>) -> Result<()> {
        folder.write_json(SETTINGS_FILE, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ProjectSettings::load(&ProjectFolder::new(dir.path())).unwrap();
        assert_eq!(settings.version, "1.0");
        assert_eq!(settings.settings.retain, vec![".git/**", ".gitignore", "README.md"]);
        assert!(settings.settings.model.volatile_properties.is_empty());
    }

    #[test]
    fn test_touch_keeps_created() {
        let dir = tempfile::tempdir().unwrap();
        let folder = ProjectFolder::new(dir.path());
        let created = Utc.with_ymd_and_hms(2023, 5, 1, 8, 0, 0).unwrap();
        let mut settings = ProjectSettings {
            created,
            last_modified: created,
            ..ProjectSettings::default()
        };
        settings.settings.model.volatile_properties.push("lineageTag".into());
        settings.save(&folder).unwrap();

        let mut loaded = ProjectSettings::load(&folder).unwrap();
        assert_eq!(loaded, settings);
        loaded.touch();
        assert_eq!(loaded.created, created);
        assert!(loaded.last_modified > created);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let folder = ProjectFolder::new(dir.path());
        folder
            .write_text(
                SETTINGS_FILE,
                r#"{"version":"1.0","created":"2024-01-01T00:00:00Z","lastModified":"2024-01-02T00:00:00Z"}"#,
            )
            .unwrap();
        let settings = ProjectSettings::load(&folder).unwrap();
        assert_eq!(settings.settings.retain.len(), 3);

        let json: serde_json::Value = folder.read_json(SETTINGS_FILE).unwrap().unwrap();
        assert!(json.get("lastModified").is_some());
    }
}
