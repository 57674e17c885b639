//! Run orchestration: sources in, committed destination groups out
//!
//! Groups are processed strictly one after another. Each destination file is
//! its own commit, and a failure is recorded in the [`RunReport`] without
//! stopping the remaining kinds or groups.

use crate::backup::{commit_merge, BackupHandle};
use crate::classifier::{classify, Classification};
use crate::config::MergeConfig;
use crate::discovery::{discover_dirs, discover_with, DiscoveryOptions, DiscoveryReport, DiscoveryWarning, UnclassifiedFile};
use crate::document::{extract_file, extract_from, Document};
use crate::error::{Error, Result};
use crate::history::{HistoryEntry, HistoryFile};
use crate::merger::{merge, MergeReport};
use crate::registry::DestinationGroup;
use crate::schema::SchemaKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A file that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedFile {
    pub path: PathBuf,
    pub message: String,
}

/// Extracted source documents, per kind, in discovery order
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    documents: BTreeMap<SchemaKind, Vec<Document>>,
    /// Classified files that failed extraction
    pub malformed: Vec<MalformedFile>,
}

impl SourceSet {
    /// Extract every classified file of a discovery run
    pub fn load(report: &DiscoveryReport) -> Self {
        let mut set = Self::default();
        for candidate in &report.candidates {
            for file in &candidate.files {
                match extract_file(&file.path, file.kind) {
                    Ok(doc) => set.push(doc),
                    Err(e) => {
                        tracing::warn!(path = %file.path.display(), error = %e, "skipping source");
                        set.malformed.push(MalformedFile {
                            path: file.path.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
        set
    }

    /// Wrap documents built in memory
    pub fn from_documents<I: IntoIterator<Item = Document>>(documents: I) -> Self {
        let mut set = Self::default();
        for doc in documents {
            set.push(doc);
        }
        set
    }

    pub fn push(&mut self, document: Document) {
        self.documents.entry(document.kind).or_default().push(document);
    }

    /// Source documents of one kind
    pub fn sources(&self, kind: SchemaKind) -> &[Document] {
        self.documents.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Kinds with at least one source
    pub fn kinds(&self) -> Vec<SchemaKind> {
        self.documents
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }
}

/// Run settings
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub overwrite_existing: bool,
    /// Backups go to `<backup_folder>/<mission>/`
    pub backup_folder: PathBuf,
    /// Where to record commits; `None` disables history
    pub history_path: Option<PathBuf>,
}

impl PipelineOptions {
    pub fn from_config(config: &MergeConfig) -> Self {
        Self {
            overwrite_existing: config.merge_rules.overwrite_existing,
            backup_folder: config.backup_folder.clone(),
            history_path: Some(config.history_path()),
        }
    }

    fn backup_dir(&self, mission: &str) -> PathBuf {
        self.backup_folder.join(mission)
    }
}

/// Overall result of one destination group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// At least one destination was written and none failed
    Succeeded,
    /// At least one destination failed
    Failed,
    /// Nothing to write
    Unchanged,
}

/// Result of merging one kind into a group's destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindOutcome {
    pub kind: SchemaKind,
    pub destination: Option<PathBuf>,
    pub sources: Vec<PathBuf>,
    pub report: MergeReport,
    /// Present when the destination was written
    pub backup: Option<BackupHandle>,
    pub error: Option<String>,
}

impl KindOutcome {
    fn new(kind: SchemaKind, destination: Option<&Path>, sources: &[Document]) -> Self {
        Self {
            kind,
            destination: destination.map(Path::to_path_buf),
            sources: sources.iter().filter_map(|d| d.source_path.clone()).collect(),
            report: MergeReport::default(),
            backup: None,
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_committed(&self) -> bool {
        self.backup.is_some()
    }
}

/// Result of one destination group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupOutcome {
    pub mission: String,
    pub status: GroupStatus,
    pub kinds: Vec<KindOutcome>,
}

/// Everything a run did, ready to print or serialize
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub classified_files: usize,
    /// Files without recognizable markers or with conflicting markers
    pub unclassified: Vec<UnclassifiedFile>,
    pub malformed: Vec<MalformedFile>,
    pub warnings: Vec<DiscoveryWarning>,
    pub groups: Vec<GroupOutcome>,
    /// Commits went through but the history could not be saved
    pub history_error: Option<String>,
}

impl RunReport {
    fn count(&self, status: GroupStatus) -> usize {
        self.groups.iter().filter(|g| g.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(GroupStatus::Succeeded)
    }

    pub fn unchanged(&self) -> usize {
        self.count(GroupStatus::Unchanged)
    }

    pub fn failed(&self) -> usize {
        self.count(GroupStatus::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0 || self.history_error.is_some()
    }

    pub fn group(&self, mission: &str) -> Option<&GroupOutcome> {
        self.groups.iter().find(|g| g.mission == mission)
    }
}

/// Destination files of `groups`, which must never be read as sources
pub fn destination_paths(groups: &[DestinationGroup]) -> Vec<PathBuf> {
    groups
        .iter()
        .flat_map(|g| g.paths().into_iter().map(|(_, p)| p.to_path_buf()))
        .collect()
}

/// Discover sources for `groups`: the config's search patterns, or
/// `mod_dirs` taken literally when any are given
pub fn discover_sources(
    config: &MergeConfig,
    groups: &[DestinationGroup],
    mod_dirs: &[PathBuf],
) -> Result<DiscoveryReport> {
    let options = DiscoveryOptions {
        exclude: destination_paths(groups),
        ..Default::default()
    };
    if mod_dirs.is_empty() {
        discover_with(config.mod_search_paths.as_slice(), &options)
    } else {
        Ok(discover_dirs(mod_dirs, &options))
    }
}

/// Read a destination for merging.
///
/// A missing or blank file is an empty document. An existing file must not
/// classify as a different kind.
pub fn load_destination(path: &Path, kind: SchemaKind) -> Result<Document> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "destination does not exist yet");
            return Ok(Document::empty(kind));
        }
        Err(e) => {
            return Err(Error::FileRead {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Document::empty(kind));
    }
    if let Classification::Classified { kind: found } = classify(&bytes) {
        if found != kind {
            return Err(Error::SchemaMismatch {
                expected: kind,
                found,
            });
        }
    }
    extract_from(&bytes, kind, Some(path))
}

/// Merge every kind of `sources` into one group and commit the results
pub fn merge_group(
    group: &DestinationGroup,
    sources: &SourceSet,
    options: &PipelineOptions,
    history: &mut HistoryFile,
) -> GroupOutcome {
    let mut kinds = Vec::new();

    for kind in sources.kinds() {
        let docs = sources.sources(kind);
        let destination = group.path_for(kind);
        let mut outcome = KindOutcome::new(kind, destination, docs);

        let result = match destination {
            Some(path) => merge_kind(group, path, docs, options, &mut outcome, history),
            None => Err(Error::MissingDestination {
                mission: group.id.clone(),
                kind,
            }),
        };
        if let Err(e) = result {
            tracing::warn!(mission = %group.id, %kind, error = %e, "merge failed");
            outcome.error = Some(e.to_string());
        }
        kinds.push(outcome);
    }

    let status = if kinds.iter().any(KindOutcome::is_failed) {
        GroupStatus::Failed
    } else if kinds.iter().any(KindOutcome::is_committed) {
        GroupStatus::Succeeded
    } else {
        GroupStatus::Unchanged
    };
    tracing::info!(mission = %group.id, ?status, "group processed");

    GroupOutcome {
        mission: group.id.clone(),
        status,
        kinds,
    }
}

fn merge_kind(
    group: &DestinationGroup,
    path: &Path,
    docs: &[Document],
    options: &PipelineOptions,
    outcome: &mut KindOutcome,
    history: &mut HistoryFile,
) -> Result<()> {
    let destination = load_destination(path, outcome.kind)?;
    let (merged, report) = merge(destination, docs, options.overwrite_existing)?;
    outcome.report = report;

    if outcome.report.is_noop() {
        tracing::info!(destination = %path.display(), "nothing new, destination left untouched");
        return Ok(());
    }

    let handle = commit_merge(path, &merged, options.backup_dir(&group.id))?;
    history.add_entry(HistoryEntry::from_commit(
        &group.id,
        outcome.kind,
        &handle,
        &outcome.report,
    ));
    outcome.backup = Some(handle);
    Ok(())
}

/// Merge `sources` into each group in turn
pub fn run_batch(
    groups: &[DestinationGroup],
    sources: &SourceSet,
    options: &PipelineOptions,
) -> Result<RunReport> {
    let mut history = match &options.history_path {
        Some(path) => HistoryFile::load(path)?,
        None => HistoryFile::new(),
    };

    let mut report = RunReport {
        malformed: sources.malformed.clone(),
        ..Default::default()
    };
    for group in groups {
        report.groups.push(merge_group(group, sources, options, &mut history));
    }

    if let Some(path) = &options.history_path {
        if report.groups.iter().any(|g| g.status == GroupStatus::Succeeded) {
            if let Err(e) = history.save(path) {
                tracing::error!(path = %path.display(), error = %e, "failed to save history");
                report.history_error = Some(e.to_string());
            }
        }
    }
    Ok(report)
}

/// Extract the sources of a discovery run and merge them into `groups`
pub fn run_discovered(
    discovery: DiscoveryReport,
    groups: &[DestinationGroup],
    options: &PipelineOptions,
) -> Result<RunReport> {
    let sources = SourceSet::load(&discovery);
    let mut report = run_batch(groups, &sources, options)?;

    report.classified_files = discovery.classified_count();
    let (malformed, unclassified): (Vec<_>, Vec<_>) = discovery
        .unclassified
        .into_iter()
        .partition(|u| u.reason.is_malformed());
    report.unclassified = unclassified;
    let mut all_malformed: Vec<MalformedFile> = malformed
        .into_iter()
        .map(|u| MalformedFile {
            message: u.reason.to_string(),
            path: u.path,
        })
        .collect();
    all_malformed.append(&mut report.malformed);
    report.malformed = all_malformed;
    report.warnings = discovery.warnings;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissionPaths;
    use crate::discovery::discover;
    use crate::document::extract;
    use crate::history::HISTORY_FILE;
    use tempfile::TempDir;

    const DEST: &str = "<?xml version=\"1.0\"?>\n<types>\n    <type name=\"Apple\"><nominal>1</nominal></type>\n    <type name=\"Banana\"><nominal>2</nominal></type>\n</types>\n";
    const SRC: &str = "<types>\n    <type name=\"Banana\"><nominal>99</nominal></type>\n    <type name=\"Cherry\"><nominal>3</nominal></type>\n</types>\n";

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn options(tmp: &Path, overwrite: bool) -> PipelineOptions {
        PipelineOptions {
            overwrite_existing: overwrite,
            backup_folder: tmp.join("backups"),
            history_path: Some(tmp.join("backups").join(HISTORY_FILE)),
        }
    }

    fn group(id: &str, types: PathBuf) -> DestinationGroup {
        DestinationGroup::new(
            id,
            &MissionPaths {
                types: Some(types),
                ..Default::default()
            },
        )
    }

    fn types_source() -> SourceSet {
        let mut doc = extract(SRC.as_bytes(), SchemaKind::Types).unwrap();
        doc.source_path = Some(PathBuf::from("@Fruit/types.xml"));
        SourceSet::from_documents([doc])
    }

    #[test]
    fn test_merge_group_commits_with_backup() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("mission/db/types.xml");
        write(&dest, DEST);
        let opts = options(tmp.path(), false);

        let report = run_batch(&[group("chernarus", dest.clone())], &types_source(), &opts).unwrap();

        let outcome = report.group("chernarus").unwrap();
        assert_eq!(outcome.status, GroupStatus::Succeeded);
        let kind = &outcome.kinds[0];
        assert_eq!(kind.report.added(), vec!["Cherry"]);
        assert_eq!(kind.report.skipped(), vec!["Banana"]);
        assert_eq!(kind.sources, vec![PathBuf::from("@Fruit/types.xml")]);

        let backup = kind.backup.as_ref().unwrap().backup.clone().unwrap();
        assert!(backup.starts_with(tmp.path().join("backups/chernarus")));
        assert_eq!(fs::read_to_string(backup).unwrap(), DEST);

        let merged = extract_file(&dest, SchemaKind::Types).unwrap();
        assert_eq!(merged.keys(), vec!["Apple", "Banana", "Cherry"]);

        let history = HistoryFile::load(opts.history_path.unwrap()).unwrap();
        let entry = history.last_entry_for("chernarus", SchemaKind::Types).unwrap();
        assert_eq!(entry.added, vec!["Cherry"]);
    }

    #[test]
    fn test_rerun_is_unchanged() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("types.xml");
        write(&dest, DEST);
        let opts = options(tmp.path(), false);
        let groups = [group("chernarus", dest.clone())];

        run_batch(&groups, &types_source(), &opts).unwrap();
        let after_first = fs::read_to_string(&dest).unwrap();
        let second = run_batch(&groups, &types_source(), &opts).unwrap();

        assert_eq!(second.unchanged(), 1);
        assert_eq!(fs::read_to_string(&dest).unwrap(), after_first);
        assert_eq!(fs::read_dir(tmp.path().join("backups/chernarus")).unwrap().count(), 1);
    }

    #[test]
    fn test_batch_isolation() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("a/types.xml");
        write(&good, DEST);
        // B's destination sits below a plain file and can never be read or written
        let blocker = tmp.path().join("b");
        write(&blocker, "not a directory");
        let bad = blocker.join("types.xml");
        let third = tmp.path().join("c/types.xml");
        write(&third, DEST);

        let groups = [
            group("a", good.clone()),
            group("b", bad),
            group("c", third.clone()),
        ];
        let report = run_batch(&groups, &types_source(), &options(tmp.path(), false)).unwrap();

        assert_eq!(report.group("a").unwrap().status, GroupStatus::Succeeded);
        assert_eq!(report.group("b").unwrap().status, GroupStatus::Failed);
        assert_eq!(report.group("c").unwrap().status, GroupStatus::Succeeded);
        assert_eq!((report.succeeded(), report.failed()), (2, 1));
        assert!(report.group("b").unwrap().kinds[0].error.is_some());
        assert!(fs::read_to_string(&good).unwrap().contains("Cherry"));
        assert!(fs::read_to_string(&third).unwrap().contains("Cherry"));
    }

    #[test]
    fn test_missing_destination_path() {
        let tmp = TempDir::new().unwrap();
        let events_only = DestinationGroup::new(
            "events-only",
            &MissionPaths {
                events: Some(tmp.path().join("cfgeventspawns.xml")),
                ..Default::default()
            },
        );

        let report = run_batch(&[events_only], &types_source(), &options(tmp.path(), false)).unwrap();
        let outcome = report.group("events-only").unwrap();
        assert_eq!(outcome.status, GroupStatus::Failed);
        assert!(outcome.kinds[0].error.as_ref().unwrap().contains("no types path"));
    }

    #[test]
    fn test_destination_of_wrong_kind() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("types.xml");
        write(&dest, "<eventposdef><event name=\"E\"/></eventposdef>");

        let err = load_destination(&dest, SchemaKind::Types).unwrap_err();
        assert!(matches!(
            err,
            Error::SchemaMismatch {
                expected: SchemaKind::Types,
                found: SchemaKind::Events
            }
        ));
    }

    #[test]
    fn test_blank_or_missing_destination() {
        let tmp = TempDir::new().unwrap();
        let blank = tmp.path().join("blank.xml");
        write(&blank, "  \n");

        assert!(load_destination(&blank, SchemaKind::Types).unwrap().is_empty());
        let missing = load_destination(&tmp.path().join("none.xml"), SchemaKind::Events).unwrap();
        assert_eq!(missing.root_name, "eventposdef");
    }

    #[test]
    fn test_new_destination_is_created() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("mission/db/types.xml");

        let report = run_batch(&[group("fresh", dest.clone())], &types_source(), &options(tmp.path(), false))
            .unwrap();

        let kind = &report.group("fresh").unwrap().kinds[0];
        assert!(kind.backup.as_ref().unwrap().backup.is_none());
        let created = extract_file(&dest, SchemaKind::Types).unwrap();
        assert_eq!(created.keys(), vec!["Banana", "Cherry"]);
    }

    #[test]
    fn test_discovered_run_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(&root.join("mods/@Fruit/docs/readme.xml"), "<readme><line>hello</line></readme>");
        write(&root.join("mods/@Fruit/a/b/weird/types_extra.xml"), SRC);
        write(&root.join("mods/@Fruit/broken.xml"), "<types><type name=\"X\"></types>");
        let dest = root.join("mpmissions/chernarus/db/types.xml");
        write(&dest, DEST);

        let pattern = format!("{}/mods/*", root.display());
        let groups = [group("chernarus", dest.clone())];
        let discovery = discover_with(
            &[pattern],
            &DiscoveryOptions {
                exclude: destination_paths(&groups),
                ..Default::default()
            },
        )
        .unwrap();
        let report = run_discovered(discovery, &groups, &options(root, true)).unwrap();

        assert_eq!(report.classified_files, 1);
        assert_eq!(report.unclassified.len(), 1);
        assert!(report.unclassified[0].path.ends_with("docs/readme.xml"));
        assert_eq!(report.malformed.len(), 1);
        assert!(report.malformed[0].path.ends_with("broken.xml"));

        let kind = &report.group("chernarus").unwrap().kinds[0];
        assert_eq!(kind.report.added(), vec!["Cherry"]);
        assert_eq!(kind.report.updated(), vec!["Banana"]);

        let merged = extract_file(&dest, SchemaKind::Types).unwrap();
        assert_eq!(
            merged.get("Banana").unwrap().field("nominal").unwrap().raw,
            "<nominal>99</nominal>"
        );
        assert!(!report.has_failures());
    }

    #[test]
    fn test_malformed_source_does_not_stop_others() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(&root.join("@Good/types.xml"), SRC);
        let discovery = discover(&[format!("{}/@*", root.display())]).unwrap();
        // Break the file after classification so extraction fails
        write(&root.join("@Good/types.xml"), "<types><type name=\"Broken\">");
        write(&root.join("@Other/types.xml"), SRC);
        let mut other = discover(&[format!("{}/@Other", root.display())]).unwrap();
        let mut combined = discovery;
        combined.candidates.append(&mut other.candidates);

        let sources = SourceSet::load(&combined);
        assert_eq!(sources.malformed.len(), 1);
        assert_eq!(sources.sources(SchemaKind::Types).len(), 1);
    }
}
