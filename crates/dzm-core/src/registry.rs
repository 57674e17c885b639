//! Destination registry: the named groups ("missions") a merge can target
//!
//! Nothing here tracks which group is current across calls; callers resolve a
//! group and pass it to the pipeline explicitly.

use crate::config::{MergeConfig, MissionPaths};
use crate::error::{Error, Result};
use crate::schema::SchemaKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One set of destination files, at most one per kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationGroup {
    pub id: String,
    pub types: Option<PathBuf>,
    pub events: Option<PathBuf>,
    pub spawnabletypes: Option<PathBuf>,
}

impl DestinationGroup {
    pub fn new(id: impl Into<String>, paths: &MissionPaths) -> Self {
        Self {
            id: id.into(),
            types: paths.types.clone(),
            events: paths.events.clone(),
            spawnabletypes: paths.spawnabletypes.clone(),
        }
    }

    /// Destination path for `kind`, if configured
    pub fn path_for(&self, kind: SchemaKind) -> Option<&Path> {
        match kind {
            SchemaKind::Types => self.types.as_deref(),
            SchemaKind::Events => self.events.as_deref(),
            SchemaKind::SpawnableTypes => self.spawnabletypes.as_deref(),
        }
    }

    /// All configured destination paths
    pub fn paths(&self) -> Vec<(SchemaKind, &Path)> {
        SchemaKind::ALL
            .iter()
            .filter_map(|&kind| self.path_for(kind).map(|p| (kind, p)))
            .collect()
    }
}

/// Lookup of destination groups
pub trait DestinationRegistry {
    /// The default group
    fn active(&self) -> Result<DestinationGroup>;

    /// Every group, in a stable order
    fn list_all(&self) -> Vec<DestinationGroup>;

    /// A group by id
    fn resolve(&self, id: &str) -> Result<DestinationGroup>;
}

impl DestinationRegistry for MergeConfig {
    fn active(&self) -> Result<DestinationGroup> {
        self.resolve(&self.active_mission)
    }

    fn list_all(&self) -> Vec<DestinationGroup> {
        self.missions
            .iter()
            .map(|(id, paths)| DestinationGroup::new(id.clone(), paths))
            .collect()
    }

    fn resolve(&self, id: &str) -> Result<DestinationGroup> {
        self.missions
            .get(id)
            .map(|paths| DestinationGroup::new(id, paths))
            .ok_or_else(|| Error::MissionNotFound(id.to_string()))
    }
}
