//! dzm-core: Core library for discovering and merging DayZ mod XML files
//!
//! This library provides functionality to:
//! - Classify XML files as `types`, `events` or `spawnabletypes` by content
//! - Discover mod directories and the XML files hidden anywhere inside them
//! - Extract keyed records while preserving the original bytes
//! - Merge mod records into a mission's files under an overwrite policy
//! - Back up destinations before writing and roll merges back from history

pub mod backup;
pub mod classifier;
pub mod config;
pub mod discovery;
pub mod document;
pub mod error;
pub mod history;
pub mod merger;
mod outline;
pub mod pipeline;
pub mod registry;
pub mod schema;
pub mod template;

pub use backup::{commit_merge, restore_backup, BackupHandle};
pub use classifier::{classify, classify_path, Classification, UnclassifiedReason};
pub use config::{MergeConfig, MissionPaths};
pub use discovery::{discover, discover_dirs, discover_with, DiscoveryOptions, DiscoveryReport, ModCandidate};
pub use document::{extract, extract_file, Document, Record};
pub use error::{Error, Result};
pub use history::{HistoryEntry, HistoryFile};
pub use merger::{merge, MergeReport, Outcome};
pub use pipeline::{run_batch, run_discovered, GroupStatus, PipelineOptions, RunReport, SourceSet};
pub use registry::{DestinationGroup, DestinationRegistry};
pub use schema::SchemaKind;
