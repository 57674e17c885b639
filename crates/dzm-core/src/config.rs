//! Merge configuration stored as JSON
//!
//! Every field has a default, so a partial file (or none at all) still yields
//! a usable configuration.

use crate::error::{Error, Result};
use crate::schema::SchemaKind;
use crate::template::{default_type_values, EventDefaults, TypeDefaults};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "merge_config.json";

/// Destination paths for one mission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawnabletypes: Option<PathBuf>,
}

impl MissionPaths {
    /// Conventional layout of a mission folder under `mpmissions_dir`
    pub fn standard<P: AsRef<Path>>(mpmissions_dir: P, mission: &str) -> Self {
        let root = mpmissions_dir.as_ref().join(mission);
        Self {
            types: Some(root.join("db").join("types.xml")),
            events: Some(root.join("cfgeventspawns.xml")),
            spawnabletypes: Some(root.join("db").join("spawnabletypes.xml")),
        }
    }

    /// Configured path for `kind`
    pub fn path(&self, kind: SchemaKind) -> Option<&Path> {
        match kind {
            SchemaKind::Types => self.types.as_deref(),
            SchemaKind::Events => self.events.as_deref(),
            SchemaKind::SpawnableTypes => self.spawnabletypes.as_deref(),
        }
    }

    /// Set or clear the path for `kind`
    pub fn set_path(&mut self, kind: SchemaKind, path: Option<PathBuf>) {
        match kind {
            SchemaKind::Types => self.types = path,
            SchemaKind::Events => self.events = path,
            SchemaKind::SpawnableTypes => self.spawnabletypes = path,
        }
    }
}

/// Conflict policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRules {
    #[serde(default)]
    pub overwrite_existing: bool,
}

/// Generated vehicle event settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleEvents {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub default_event: EventDefaults,
}

impl Default for VehicleEvents {
    fn default() -> Self {
        Self {
            enabled: true,
            default_event: EventDefaults::default(),
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Directory that receives backups and the commit history
    #[serde(default = "default_backup_folder")]
    pub backup_folder: PathBuf,
    /// Mission merged when none is named explicitly
    #[serde(default = "default_active_mission")]
    pub active_mission: String,
    #[serde(default = "default_missions")]
    pub missions: BTreeMap<String, MissionPaths>,
    /// Ordered search patterns; earlier patterns win ties
    #[serde(default = "default_mod_search_paths")]
    pub mod_search_paths: Vec<String>,
    #[serde(default)]
    pub merge_rules: MergeRules,
    /// Per-category defaults for generated `<type>` entries
    #[serde(default = "default_type_values")]
    pub default_values: BTreeMap<String, TypeDefaults>,
    #[serde(default)]
    pub vehicle_events: VehicleEvents,
}

const DEFAULT_MISSIONS: [&str; 3] = [
    "dayzOffline.chernarusplus",
    "dayzOffline.enoch",
    "dayzOffline.sakhal",
];

fn default_true() -> bool {
    true
}

fn default_backup_folder() -> PathBuf {
    PathBuf::from("./backups")
}

fn default_active_mission() -> String {
    DEFAULT_MISSIONS[0].to_string()
}

fn default_missions() -> BTreeMap<String, MissionPaths> {
    DEFAULT_MISSIONS
        .iter()
        .map(|m| (m.to_string(), MissionPaths::standard("./mpmissions", m)))
        .collect()
}

fn default_mod_search_paths() -> Vec<String> {
    vec![
        "./mods/*".to_string(),
        "./@*".to_string(),
        "./workshop/content/221100/*".to_string(),
    ]
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            backup_folder: default_backup_folder(),
            active_mission: default_active_mission(),
            missions: default_missions(),
            mod_search_paths: default_mod_search_paths(),
            merge_rules: MergeRules::default(),
            default_values: default_type_values(),
            vehicle_events: VehicleEvents::default(),
        }
    }
}

impl MergeConfig {
    /// Load a config file from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(Error::Json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, or fall back to defaults if it does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Save the config file to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.missions.is_empty() {
            return Err(Error::InvalidConfig("no missions configured".to_string()));
        }
        if !self.missions.contains_key(&self.active_mission) {
            return Err(Error::InvalidConfig(format!(
                "active mission '{}' is not configured",
                self.active_mission
            )));
        }
        Ok(())
    }

    /// Paths of a configured mission
    pub fn mission(&self, id: &str) -> Result<&MissionPaths> {
        self.missions
            .get(id)
            .ok_or_else(|| Error::MissionNotFound(id.to_string()))
    }

    /// Add or replace a mission
    pub fn add_mission(&mut self, id: impl Into<String>, paths: MissionPaths) {
        self.missions.insert(id.into(), paths);
    }

    /// Remove a mission; if it was active, the first remaining mission becomes active
    pub fn remove_mission(&mut self, id: &str) -> Result<MissionPaths> {
        let removed = self
            .missions
            .remove(id)
            .ok_or_else(|| Error::MissionNotFound(id.to_string()))?;
        if self.active_mission == id {
            match self.missions.keys().next() {
                Some(next) => self.active_mission = next.clone(),
                None => {
                    self.missions.insert(id.to_string(), removed);
                    return Err(Error::InvalidConfig(
                        "cannot remove the last mission".to_string(),
                    ));
                }
            }
        }
        Ok(removed)
    }

    /// Make a configured mission the active one
    pub fn set_active_mission(&mut self, id: &str) -> Result<()> {
        if !self.missions.contains_key(id) {
            return Err(Error::MissionNotFound(id.to_string()));
        }
        self.active_mission = id.to_string();
        Ok(())
    }

    /// Location of the commit history
    pub fn history_path(&self) -> PathBuf {
        self.backup_folder.join(crate::history::HISTORY_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = MergeConfig::default();
        assert_eq!(config.active_mission, "dayzOffline.chernarusplus");
        assert_eq!(config.missions.len(), 3);
        assert!(!config.merge_rules.overwrite_existing);
        assert!(config.default_values.contains_key("weapons"));
        assert!(config.validate().is_ok());

        let enoch = config.mission("dayzOffline.enoch").unwrap();
        assert_eq!(
            enoch.path(SchemaKind::Events),
            Some(Path::new("./mpmissions/dayzOffline.enoch/cfgeventspawns.xml"))
        );
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("merge_config.json");
        fs::write(
            &path,
            r#"{ "merge_rules": { "overwrite_existing": true }, "mod_search_paths": ["./extra/*"] }"#,
        )
        .unwrap();

        let config = MergeConfig::load(&path).unwrap();
        assert!(config.merge_rules.overwrite_existing);
        assert_eq!(config.mod_search_paths, vec!["./extra/*"]);
        assert_eq!(config.backup_folder, PathBuf::from("./backups"));
        assert!(config.vehicle_events.enabled);
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("merge_config.json");

        let mut config = MergeConfig::default();
        config.add_mission(
            "custom",
            MissionPaths {
                types: Some(PathBuf::from("custom/db/types.xml")),
                ..Default::default()
            },
        );
        config.set_active_mission("custom").unwrap();
        config.save(&path).unwrap();

        let loaded = MergeConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.mission("custom").unwrap().events.is_none());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let tmp = TempDir::new().unwrap();
        let config = MergeConfig::load_or_default(tmp.path().join("absent.json")).unwrap();
        assert_eq!(config, MergeConfig::default());
    }

    #[test]
    fn test_unknown_active_mission_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("merge_config.json");
        fs::write(&path, r#"{ "active_mission": "nowhere" }"#).unwrap();

        assert!(matches!(
            MergeConfig::load(&path),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_remove_active_mission() {
        let mut config = MergeConfig::default();
        config.remove_mission("dayzOffline.chernarusplus").unwrap();

        assert_eq!(config.active_mission, "dayzOffline.enoch");
        assert!(matches!(
            config.remove_mission("dayzOffline.chernarusplus"),
            Err(Error::MissionNotFound(_))
        ));
    }

    #[test]
    fn test_cannot_remove_last_mission() {
        let mut config = MergeConfig::default();
        config.remove_mission("dayzOffline.enoch").unwrap();
        config.remove_mission("dayzOffline.sakhal").unwrap();

        assert!(config.remove_mission("dayzOffline.chernarusplus").is_err());
        assert_eq!(config.missions.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_set_unknown_active_mission() {
        let mut config = MergeConfig::default();
        assert!(matches!(
            config.set_active_mission("nope"),
            Err(Error::MissionNotFound(_))
        ));
        assert_eq!(config.active_mission, "dayzOffline.chernarusplus");
    }
}
