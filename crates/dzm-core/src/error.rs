//! Error types for dzm-core

use crate::schema::SchemaKind;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dzm-core
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be extracted as a document of the claimed kind
    #[error("malformed document '{path}': {message}")]
    MalformedDocument { path: PathBuf, message: String },

    /// Merge called with a source whose kind differs from the destination
    #[error("schema mismatch: destination is {expected}, source is {found}")]
    SchemaMismatch {
        expected: SchemaKind,
        found: SchemaKind,
    },

    /// Backup of the destination could not be written; destination untouched
    #[error("failed to back up '{path}': {source}")]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Merged document could not be written; the backup is left in place
    #[error("failed to write '{path}' (backup kept at {}): {source}", display_backup(.backup))]
    WriteFailed {
        path: PathBuf,
        backup: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    /// Unknown destination group
    #[error("mission '{0}' not found")]
    MissionNotFound(String),

    /// Destination group has no path for a kind that has sources
    #[error("mission '{mission}' has no {kind} path configured")]
    MissingDestination { mission: String, kind: SchemaKind },

    /// Search pattern could not be compiled
    #[error("invalid search pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Configuration is unusable
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No history entry to restore
    #[error("no history for mission '{mission}' ({kind})")]
    NoHistory { mission: String, kind: SchemaKind },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML generation error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

fn display_backup(backup: &Option<PathBuf>) -> String {
    match backup {
        Some(path) => path.display().to_string(),
        None => "none".to_string(),
    }
}
