//! Backup-then-write commit of merged documents
//!
//! The destination's current bytes are copied into the backup directory
//! before anything is written. Backups are created with create-new semantics
//! and are never overwritten; the merged document replaces the destination
//! through a synced temporary file in the same directory.

use crate::document::Document;
use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Timestamp format embedded in backup names
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Give up looking for a free backup name after this many suffixes
const MAX_COLLISIONS: u32 = 1000;

/// What a successful commit left behind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupHandle {
    /// File that was written
    pub destination: PathBuf,
    /// Copy of the previous contents; `None` when the destination was new
    pub backup: Option<PathBuf>,
    /// Bytes written to the destination
    pub bytes_written: usize,
}

/// Back up `destination` into `backup_dir`, then write `document` over it
pub fn commit_merge<P: AsRef<Path>, B: AsRef<Path>>(
    destination: P,
    document: &Document,
    backup_dir: B,
) -> Result<BackupHandle> {
    commit_merge_at(destination, document, backup_dir, Local::now())
}

/// [`commit_merge`] with an explicit capture time
pub fn commit_merge_at<P: AsRef<Path>, B: AsRef<Path>>(
    destination: P,
    document: &Document,
    backup_dir: B,
    now: DateTime<Local>,
) -> Result<BackupHandle> {
    let destination = destination.as_ref();
    let backup_dir = backup_dir.as_ref();

    let previous = match fs::read(destination) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            return Err(Error::BackupFailed {
                path: destination.to_path_buf(),
                source: e,
            })
        }
    };

    let backup = match previous {
        Some(bytes) => {
            let path = write_backup(destination, &bytes, backup_dir, now).map_err(|e| {
                Error::BackupFailed {
                    path: destination.to_path_buf(),
                    source: e,
                }
            })?;
            tracing::info!(backup = %path.display(), "backup written");
            Some(path)
        }
        None => {
            tracing::info!(destination = %destination.display(), "destination is new, nothing to back up");
            None
        }
    };

    let rendered = document.render();
    write_atomic(destination, rendered.as_bytes()).map_err(|e| Error::WriteFailed {
        path: destination.to_path_buf(),
        backup: backup.clone(),
        source: e,
    })?;
    tracing::info!(
        destination = %destination.display(),
        records = document.len(),
        "merged document written"
    );

    Ok(BackupHandle {
        destination: destination.to_path_buf(),
        backup,
        bytes_written: rendered.len(),
    })
}

/// `<basename>.<timestamp>.bak`, or `<basename>.<timestamp>.<n>.bak` when taken
pub fn backup_file_name(destination: &Path, now: DateTime<Local>, collision: u32) -> String {
    let base = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "destination".to_string());
    let stamp = now.format(BACKUP_TIMESTAMP_FORMAT);
    if collision == 0 {
        format!("{}.{}.bak", base, stamp)
    } else {
        format!("{}.{}.{}.bak", base, stamp, collision)
    }
}

fn write_backup(
    destination: &Path,
    bytes: &[u8],
    backup_dir: &Path,
    now: DateTime<Local>,
) -> io::Result<PathBuf> {
    fs::create_dir_all(backup_dir)?;

    for collision in 0..MAX_COLLISIONS {
        let path = backup_dir.join(backup_file_name(destination, now, collision));
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        };
        file.write_all(bytes)?;
        file.sync_all()?;
        return Ok(path);
    }

    Err(io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free backup name in {}", backup_dir.display()),
    ))
}

fn write_atomic(destination: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(destination).map_err(|e| e.error)?;
    Ok(())
}

/// Copy a backup back over its destination
pub fn restore_backup<B: AsRef<Path>, P: AsRef<Path>>(backup: B, destination: P) -> Result<()> {
    let backup = backup.as_ref();
    let destination = destination.as_ref();

    let bytes = fs::read(backup).map_err(|e| Error::FileRead {
        path: backup.to_path_buf(),
        source: e,
    })?;
    write_atomic(destination, &bytes).map_err(|e| Error::WriteFailed {
        path: destination.to_path_buf(),
        backup: Some(backup.to_path_buf()),
        source: e,
    })?;
    tracing::info!(
        backup = %backup.display(),
        destination = %destination.display(),
        "backup restored"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::extract;
    use crate::merger::merge;
    use crate::schema::SchemaKind;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const DEST: &str = "<types>\n    <type name=\"Apple\"/>\n</types>\n";

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 17, 12, 30, 45).unwrap()
    }

    fn merged_doc() -> Document {
        let dest = extract(DEST.as_bytes(), SchemaKind::Types).unwrap();
        let src = extract(b"<types><type name=\"Cherry\"/></types>", SchemaKind::Types).unwrap();
        merge(dest, &[src], false).unwrap().0
    }

    #[test]
    fn test_backup_before_write() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("db/types.xml");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, DEST).unwrap();
        let backups = tmp.path().join("backups");

        let handle = commit_merge_at(&dest, &merged_doc(), &backups, fixed_time()).unwrap();

        let backup = handle.backup.unwrap();
        assert_eq!(backup, backups.join("types.xml.20240517_123045.bak"));
        assert_eq!(fs::read_to_string(&backup).unwrap(), DEST);

        let written = fs::read_to_string(&dest).unwrap();
        assert!(written.contains("Cherry"));
        assert_eq!(handle.bytes_written, written.len());
    }

    #[test]
    fn test_backup_names_never_collide() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("types.xml");
        fs::write(&dest, DEST).unwrap();
        let backups = tmp.path().join("backups");

        let first = commit_merge_at(&dest, &merged_doc(), &backups, fixed_time()).unwrap();
        let second = commit_merge_at(&dest, &merged_doc(), &backups, fixed_time()).unwrap();

        assert_eq!(
            second.backup.unwrap(),
            backups.join("types.xml.20240517_123045.1.bak")
        );
        // The first backup still holds the original bytes
        assert_eq!(fs::read_to_string(first.backup.unwrap()).unwrap(), DEST);
    }

    #[test]
    fn test_new_destination_has_no_backup() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("mission/db/types.xml");

        let handle = commit_merge(&dest, &merged_doc(), tmp.path().join("backups")).unwrap();

        assert!(handle.backup.is_none());
        assert!(dest.exists());
    }

    #[test]
    fn test_backup_failure_leaves_destination_untouched() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("types.xml");
        fs::write(&dest, DEST).unwrap();
        // A file where the backup directory should be
        let blocker = tmp.path().join("backups");
        fs::write(&blocker, "not a directory").unwrap();

        let err = commit_merge(&dest, &merged_doc(), &blocker).unwrap_err();

        assert!(matches!(err, Error::BackupFailed { .. }));
        assert_eq!(fs::read_to_string(&dest).unwrap(), DEST);
    }

    #[test]
    fn test_write_failure_names_backup() {
        let err = Error::WriteFailed {
            path: PathBuf::from("db/types.xml"),
            backup: Some(PathBuf::from("backups/types.xml.20240517_123045.bak")),
            source: io::Error::new(ErrorKind::PermissionDenied, "read-only"),
        };
        let message = err.to_string();
        assert!(message.contains("backups/types.xml.20240517_123045.bak"));
        assert!(message.contains("read-only"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_failure_after_backup_keeps_backup() {
        // Readable, but nothing can be created next to it.
        let dest = Path::new("/proc/self/status");
        let tmp = TempDir::new().unwrap();
        let backups = tmp.path().join("backups");

        let err = commit_merge_at(dest, &merged_doc(), &backups, fixed_time()).unwrap_err();

        let backup = match &err {
            Error::WriteFailed {
                path,
                backup: Some(backup),
                ..
            } => {
                assert_eq!(path, dest);
                backup.clone()
            }
            other => panic!("expected write failure with a backup, got {:?}", other),
        };
        assert_eq!(backup, backups.join("status.20240517_123045.bak"));
        assert!(fs::read_to_string(&backup).unwrap().starts_with("Name:"));
        assert!(err.to_string().contains(&backup.display().to_string()));
    }

    #[test]
    fn test_unreadable_destination_is_backup_failure() {
        let tmp = TempDir::new().unwrap();
        // The destination's parent is a plain file, so reading it fails with
        // something other than "not found".
        let parent_file = tmp.path().join("mission");
        fs::write(&parent_file, "plain file").unwrap();
        let dest = parent_file.join("types.xml");

        let err = commit_merge(&dest, &merged_doc(), tmp.path().join("backups")).unwrap_err();
        assert!(matches!(err, Error::BackupFailed { .. }));
        assert!(!tmp.path().join("backups").exists());
    }

    #[test]
    fn test_restore_backup() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("types.xml");
        fs::write(&dest, DEST).unwrap();
        let backups = tmp.path().join("backups");

        let handle = commit_merge_at(&dest, &merged_doc(), &backups, fixed_time()).unwrap();
        assert_ne!(fs::read_to_string(&dest).unwrap(), DEST);

        restore_backup(handle.backup.unwrap(), &dest).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), DEST);
    }

    #[test]
    fn test_backup_file_name() {
        let name = backup_file_name(Path::new("/srv/db/cfgeventspawns.xml"), fixed_time(), 0);
        assert_eq!(name, "cfgeventspawns.xml.20240517_123045.bak");
    }
}
