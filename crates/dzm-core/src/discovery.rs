//! Discovery of mod directories and the XML files inside them
//!
//! Search patterns are expanded into root directories, each root is walked
//! recursively and every `.xml` file is classified by content. Classification
//! runs in parallel; results are sorted before they are returned so the merge
//! order only depends on the patterns and the filesystem.

use crate::classifier::{classify, has_xml_extension, Classification, UnclassifiedReason};
use crate::error::{Error, Result};
use crate::schema::SchemaKind;
use globset::Glob;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// A classified source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedFile {
    pub path: PathBuf,
    pub kind: SchemaKind,
}

/// A root directory that holds at least one classified file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModCandidate {
    /// The resolved root directory
    pub root: PathBuf,
    /// Pattern the root was expanded from
    pub pattern: String,
    /// Classified files beneath the root, in path order
    pub files: Vec<ClassifiedFile>,
}

impl ModCandidate {
    /// Directory name of the root (e.g. "@CF")
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string())
    }

    /// Files of one kind
    pub fn files_of(&self, kind: SchemaKind) -> impl Iterator<Item = &ClassifiedFile> {
        self.files.iter().filter(move |f| f.kind == kind)
    }
}

/// An `.xml` file that could not be classified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnclassifiedFile {
    pub path: PathBuf,
    pub reason: UnclassifiedReason,
}

/// Non-fatal problem met during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum DiscoveryWarning {
    /// A literal root does not exist or is not a directory
    MissingRoot { pattern: String, path: PathBuf },
    /// A wildcard pattern matched no directory
    NoMatch { pattern: String },
    /// A file could not be read
    Unreadable { path: PathBuf, message: String },
    /// Directory traversal failed below a root
    Walk { path: PathBuf, message: String },
}

impl fmt::Display for DiscoveryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryWarning::MissingRoot { pattern, path } => {
                write!(f, "search path '{}' not found ({})", pattern, path.display())
            }
            DiscoveryWarning::NoMatch { pattern } => {
                write!(f, "search path '{}' matched no directories", pattern)
            }
            DiscoveryWarning::Unreadable { path, message } => {
                write!(f, "could not read {}: {}", path.display(), message)
            }
            DiscoveryWarning::Walk { path, message } => {
                write!(f, "could not traverse {}: {}", path.display(), message)
            }
        }
    }
}

/// Discovery tuning
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Files never treated as sources (the destination files themselves)
    pub exclude: Vec<PathBuf>,
    /// Follow symbolic links while walking
    pub follow_links: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            follow_links: true,
        }
    }
}

/// Result of a discovery run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Candidates in pattern order
    pub candidates: Vec<ModCandidate>,
    /// Files that were not classified, including malformed ones
    pub unclassified: Vec<UnclassifiedFile>,
    pub warnings: Vec<DiscoveryWarning>,
}

impl DiscoveryReport {
    /// Total classified files
    pub fn classified_count(&self) -> usize {
        self.candidates.iter().map(|c| c.files.len()).sum()
    }

    /// Classified files of one kind, in merge order
    pub fn files_of(&self, kind: SchemaKind) -> Vec<&ClassifiedFile> {
        self.candidates
            .iter()
            .flat_map(|c| c.files_of(kind))
            .collect()
    }

    /// Kinds that have at least one source file
    pub fn kinds(&self) -> Vec<SchemaKind> {
        SchemaKind::ALL
            .into_iter()
            .filter(|k| self.candidates.iter().any(|c| c.files_of(*k).next().is_some()))
            .collect()
    }

    /// Unclassified files that failed to parse
    pub fn malformed(&self) -> impl Iterator<Item = &UnclassifiedFile> {
        self.unclassified.iter().filter(|u| u.reason.is_malformed())
    }
}

/// Expand search patterns and classify every XML file beneath them
pub fn discover<S: AsRef<str>>(patterns: &[S]) -> Result<DiscoveryReport> {
    discover_with(patterns, &DiscoveryOptions::default())
}

/// [`discover`] with explicit options
pub fn discover_with<S: AsRef<str>>(
    patterns: &[S],
    options: &DiscoveryOptions,
) -> Result<DiscoveryReport> {
    let mut report = DiscoveryReport::default();
    let mut roots: Vec<(PathBuf, String)> = Vec::new();

    for pattern in patterns {
        let pattern = pattern.as_ref();
        let (expanded, warnings) = expand_pattern(pattern)?;
        for warning in warnings {
            tracing::warn!("{}", warning);
            report.warnings.push(warning);
        }
        roots.extend(expanded.into_iter().map(|root| (root, pattern.to_string())));
    }

    scan_roots(roots, options, &mut report);
    Ok(report)
}

/// Classify every XML file beneath the given directories, taken literally
pub fn discover_dirs<P: AsRef<Path>>(
    dirs: &[P],
    options: &DiscoveryOptions,
) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();
    let mut roots = Vec::new();

    for dir in dirs {
        let dir = dir.as_ref();
        let pattern = dir.display().to_string();
        if dir.is_dir() {
            roots.push((dir.to_path_buf(), pattern));
        } else {
            let warning = DiscoveryWarning::MissingRoot {
                pattern,
                path: dir.to_path_buf(),
            };
            tracing::warn!("{}", warning);
            report.warnings.push(warning);
        }
    }

    scan_roots(roots, options, &mut report);
    report
}

fn scan_roots(roots: Vec<(PathBuf, String)>, options: &DiscoveryOptions, report: &mut DiscoveryReport) {
    let exclude: HashSet<PathBuf> = options.exclude.iter().map(|p| canonical(p)).collect();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for (root, pattern) in roots {
        if !seen.insert(canonical(&root)) {
            tracing::debug!(root = %root.display(), "root already scanned");
            continue;
        }

        let scan = scan_root(&root, &exclude, options.follow_links);
        tracing::debug!(
            root = %root.display(),
            classified = scan.classified.len(),
            unclassified = scan.unclassified.len(),
            "scanned root"
        );
        report.warnings.extend(scan.warnings);
        report.unclassified.extend(scan.unclassified);
        if !scan.classified.is_empty() {
            report.candidates.push(ModCandidate {
                root,
                pattern,
                files: scan.classified,
            });
        }
    }
}

/// Expand one pattern into existing directories.
///
/// Components holding glob metacharacters match immediate subdirectories by
/// name; everything else is joined literally.
pub fn expand_pattern(pattern: &str) -> Result<(Vec<PathBuf>, Vec<DiscoveryWarning>)> {
    let mut current: Vec<PathBuf> = vec![PathBuf::new()];
    let mut wildcard = false;

    for component in Path::new(pattern).components() {
        match component {
            Component::Normal(part) if is_glob(&part.to_string_lossy()) => {
                wildcard = true;
                let glob = Glob::new(&part.to_string_lossy()).map_err(|e| Error::InvalidPattern {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })?;
                let matcher = glob.compile_matcher();

                let mut next = Vec::new();
                for dir in &current {
                    let read_from = if dir.as_os_str().is_empty() {
                        Path::new(".")
                    } else {
                        dir.as_path()
                    };
                    let Ok(entries) = fs::read_dir(read_from) else {
                        continue;
                    };
                    let mut matched: Vec<PathBuf> = entries
                        .filter_map(|e| e.ok())
                        .filter(|e| matcher.is_match(e.file_name()))
                        .map(|e| dir.join(e.file_name()))
                        .filter(|p| p.is_dir())
                        .collect();
                    matched.sort();
                    next.extend(matched);
                }
                current = next;
            }
            other => {
                for dir in current.iter_mut() {
                    dir.push(other.as_os_str());
                }
            }
        }
    }

    let mut warnings = Vec::new();
    if wildcard {
        if current.is_empty() {
            warnings.push(DiscoveryWarning::NoMatch {
                pattern: pattern.to_string(),
            });
        }
    } else {
        current.retain(|dir| {
            let exists = dir.is_dir();
            if !exists {
                warnings.push(DiscoveryWarning::MissingRoot {
                    pattern: pattern.to_string(),
                    path: dir.clone(),
                });
            }
            exists
        });
    }

    Ok((current, warnings))
}

fn is_glob(part: &str) -> bool {
    part.contains(|c| matches!(c, '*' | '?' | '[' | '{'))
}

struct RootScan {
    classified: Vec<ClassifiedFile>,
    unclassified: Vec<UnclassifiedFile>,
    warnings: Vec<DiscoveryWarning>,
}

fn scan_root(root: &Path, exclude: &HashSet<PathBuf>, follow_links: bool) -> RootScan {
    let mut warnings = Vec::new();
    let mut paths = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(follow_links)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file()
                    && has_xml_extension(entry.path())
                    && !exclude.contains(&canonical(entry.path()))
                {
                    paths.push(entry.into_path());
                }
            }
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                warnings.push(DiscoveryWarning::Walk {
                    path,
                    message: e.to_string(),
                });
            }
        }
    }

    let mut results: Vec<(PathBuf, std::io::Result<Classification>)> = paths
        .into_par_iter()
        .map(|path| {
            let classification = fs::read(&path).map(|bytes| classify(&bytes));
            (path, classification)
        })
        .collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));

    let mut classified = Vec::new();
    let mut unclassified = Vec::new();
    for (path, result) in results {
        match result {
            Ok(Classification::Classified { kind }) => {
                tracing::debug!(path = %path.display(), %kind, "classified");
                classified.push(ClassifiedFile { path, kind });
            }
            Ok(Classification::Unclassified { reason }) => {
                tracing::info!(path = %path.display(), %reason, "not classified");
                unclassified.push(UnclassifiedFile { path, reason });
            }
            Err(e) => {
                let warning = DiscoveryWarning::Unreadable {
                    path,
                    message: e.to_string(),
                };
                tracing::warn!("{}", warning);
                warnings.push(warning);
            }
        }
    }

    RootScan {
        classified,
        unclassified,
        warnings,
    }
}

pub(crate) fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
