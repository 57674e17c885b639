//! The three record families a mission's spawn configuration is made of

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which record family a file or record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    /// `types.xml`: `<types>` of `<type name=..>`
    Types,
    /// `cfgeventspawns.xml` / `events.xml`: `<eventposdef>` of `<event name=..>`
    Events,
    /// `spawnabletypes.xml`: `<spawnabletypes>` of `<type name=..>`
    SpawnableTypes,
}

impl SchemaKind {
    /// All kinds, in the order missions list their paths
    pub const ALL: [SchemaKind; 3] = [
        SchemaKind::Types,
        SchemaKind::Events,
        SchemaKind::SpawnableTypes,
    ];

    /// Root element name of a canonical file of this kind
    pub fn root_tag(self) -> &'static str {
        match self {
            SchemaKind::Types => "types",
            SchemaKind::Events => "eventposdef",
            SchemaKind::SpawnableTypes => "spawnabletypes",
        }
    }

    /// Element name of one record
    pub fn record_tag(self) -> &'static str {
        match self {
            SchemaKind::Types | SchemaKind::SpawnableTypes => "type",
            SchemaKind::Events => "event",
        }
    }

    /// Key used for this kind in configuration files
    pub fn config_key(self) -> &'static str {
        match self {
            SchemaKind::Types => "types",
            SchemaKind::Events => "events",
            SchemaKind::SpawnableTypes => "spawnabletypes",
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.config_key())
    }
}

impl FromStr for SchemaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "types" | "type" => Ok(SchemaKind::Types),
            "events" | "event" | "eventposdef" => Ok(SchemaKind::Events),
            "spawnabletypes" | "spawnable" => Ok(SchemaKind::SpawnableTypes),
            other => Err(format!("unknown schema kind '{}'", other)),
        }
    }
}
