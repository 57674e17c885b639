//! Merge engine: reconcile source record sets against a destination document

use crate::document::Document;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// What happened to one source record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Key was new; record appended
    Added,
    /// Key existed and overwrite was on; payload replaced in place
    Updated,
    /// Key existed and overwrite was off
    Skipped,
}

impl Outcome {
    /// Reason annotation for the report
    pub fn reason(self) -> &'static str {
        match self {
            Outcome::Added => "new-key",
            Outcome::Updated => "overwrite-applied",
            Outcome::Skipped => "already-exists",
        }
    }
}

/// One per-record entry of a merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeEntry {
    pub key: String,
    pub outcome: Outcome,
    /// Source document the record came from
    pub source: Option<PathBuf>,
}

/// Result of one merge call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Every record processed, in processing order
    pub entries: Vec<MergeEntry>,
}

impl MergeReport {
    /// Keys appended by this call
    pub fn added(&self) -> Vec<&str> {
        self.keys_with(Outcome::Added)
    }

    /// Keys whose payload was replaced and that were not added in this call
    pub fn updated(&self) -> Vec<&str> {
        self.keys_with(Outcome::Updated)
    }

    /// Keys only ever skipped in this call
    pub fn skipped(&self) -> Vec<&str> {
        self.keys_with(Outcome::Skipped)
    }

    /// Whether the destination was left unchanged
    pub fn is_noop(&self) -> bool {
        self.entries.iter().all(|e| e.outcome == Outcome::Skipped)
    }

    /// Each key's strongest outcome (added, then updated, then skipped), in
    /// first-seen order. The three key sets are therefore disjoint.
    fn keys_with(&self, wanted: Outcome) -> Vec<&str> {
        let mut order: Vec<&str> = Vec::new();
        let mut strongest: HashMap<&str, Outcome> = HashMap::new();
        for entry in &self.entries {
            match strongest.get(entry.key.as_str()) {
                None => {
                    order.push(entry.key.as_str());
                    strongest.insert(entry.key.as_str(), entry.outcome);
                }
                Some(&current) => {
                    if rank(entry.outcome) > rank(current) {
                        strongest.insert(entry.key.as_str(), entry.outcome);
                    }
                }
            }
        }
        order
            .into_iter()
            .filter(|key| strongest.get(key) == Some(&wanted))
            .collect()
    }

    /// Fold another report into this one
    pub fn extend(&mut self, other: MergeReport) {
        self.entries.extend(other.entries);
    }
}

fn rank(outcome: Outcome) -> u8 {
    match outcome {
        Outcome::Skipped => 0,
        Outcome::Updated => 1,
        Outcome::Added => 2,
    }
}

/// Merge `sources`, in order, into `destination`.
///
/// Records are visited in document order within each source. A key that is
/// absent is appended; a present key is skipped, or with `overwrite_existing`
/// replaced in place. The key set grows as records are appended, so a later
/// source sees an earlier source's additions and, with overwrite on, wins.
pub fn merge(
    destination: Document,
    sources: &[Document],
    overwrite_existing: bool,
) -> Result<(Document, MergeReport)> {
    if let Some(bad) = sources.iter().find(|s| s.kind != destination.kind) {
        return Err(Error::SchemaMismatch {
            expected: destination.kind,
            found: bad.kind,
        });
    }

    let mut merged = destination;
    let mut report = MergeReport::default();

    for source in sources {
        for record in source.records() {
            let outcome = if !merged.contains_key(&record.key) {
                merged.append(record.clone());
                Outcome::Added
            } else if overwrite_existing {
                merged.replace(record.clone());
                Outcome::Updated
            } else {
                Outcome::Skipped
            };

            tracing::trace!(key = %record.key, outcome = outcome.reason(), "merge");
            report.entries.push(MergeEntry {
                key: record.key.clone(),
                outcome,
                source: source.source_path.clone(),
            });
        }
    }

    Ok((merged, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::extract;
    use crate::schema::SchemaKind;

    fn types(xml: &str) -> Document {
        extract(xml.as_bytes(), SchemaKind::Types).unwrap()
    }

    fn dest() -> Document {
        types(
            "<types>\n    <type name=\"Apple\"><nominal>1</nominal></type>\n    <type name=\"Banana\"><nominal>2</nominal></type>\n</types>\n",
        )
    }

    fn src() -> Document {
        types(
            "<types>\n  <type name=\"Banana\"><nominal>99</nominal></type>\n  <type name=\"Cherry\"><nominal>3</nominal></type>\n</types>",
        )
    }

    #[test]
    fn test_merge_without_overwrite() {
        let (merged, report) = merge(dest(), &[src()], false).unwrap();

        assert_eq!(merged.keys(), vec!["Apple", "Banana", "Cherry"]);
        assert_eq!(report.added(), vec!["Cherry"]);
        assert_eq!(report.skipped(), vec!["Banana"]);
        assert!(report.updated().is_empty());
        assert_eq!(
            merged.get("Banana").unwrap().field("nominal").unwrap().raw,
            "<nominal>2</nominal>"
        );
    }

    #[test]
    fn test_merge_with_overwrite() {
        let (merged, report) = merge(dest(), &[src()], true).unwrap();

        assert_eq!(merged.keys(), vec!["Apple", "Banana", "Cherry"]);
        assert_eq!(report.added(), vec!["Cherry"]);
        assert_eq!(report.updated(), vec!["Banana"]);
        assert!(report.skipped().is_empty());
        assert_eq!(merged.get("Banana").unwrap(), src().get("Banana").unwrap());
    }

    #[test]
    fn test_overwrite_keeps_position_and_untouched_records() {
        let (merged, _) = merge(dest(), &[src()], true).unwrap();
        let out = merged.render();

        let apple = out.find("Apple").unwrap();
        let banana = out.find("Banana").unwrap();
        let cherry = out.find("Cherry").unwrap();
        assert!(apple < banana && banana < cherry);
        assert_eq!(merged.get("Apple"), dest().get("Apple"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let (once, first) = merge(dest(), &[src()], false).unwrap();
        let rendered = once.render();
        let (twice, second) = merge(once, &[src()], false).unwrap();

        assert!(!first.is_noop());
        assert_eq!(twice.render(), rendered);
        assert!(second.is_noop());
        assert_eq!(second.skipped(), vec!["Banana", "Cherry"]);
        assert!(second.added().is_empty());
    }

    #[test]
    fn test_no_data_loss() {
        let d = dest();
        let s = src();
        let (merged, report) = merge(d.clone(), &[s.clone()], false).unwrap();

        for key in report.added() {
            assert!(s.contains_key(key));
            assert!(!d.contains_key(key));
        }
        for record in d.records() {
            assert_eq!(merged.get(&record.key), Some(record));
        }
    }

    #[test]
    fn test_later_source_wins_with_overwrite() {
        let first = types("<types><type name=\"Cherry\">first</type></types>");
        let second = types("<types><type name=\"Cherry\">second</type></types>");

        let (merged, report) = merge(dest(), &[first, second], true).unwrap();

        assert_eq!(merged.get("Cherry").unwrap().raw, "<type name=\"Cherry\">second</type>");
        // Added by the first source, overwritten by the second: reported once, as added
        assert_eq!(report.added(), vec!["Cherry"]);
        assert!(report.updated().is_empty());
        assert_eq!(report.entries.len(), 2);
    }

    #[test]
    fn test_later_source_sees_earlier_additions() {
        let first = types("<types><type name=\"Cherry\">first</type></types>");
        let second = types("<types><type name=\"Cherry\">second</type></types>");

        let (merged, report) = merge(dest(), &[first, second], false).unwrap();

        assert_eq!(merged.get("Cherry").unwrap().raw, "<type name=\"Cherry\">first</type>");
        assert_eq!(report.added(), vec!["Cherry"]);
        assert!(report.skipped().is_empty());
        assert_eq!(report.entries[1].outcome, Outcome::Skipped);
    }

    #[test]
    fn test_schema_mismatch() {
        let events = extract(
            b"<eventposdef><event name=\"E\"/></eventposdef>",
            SchemaKind::Events,
        )
        .unwrap();

        let err = merge(dest(), &[src(), events], false).unwrap_err();
        assert!(matches!(
            err,
            Error::SchemaMismatch {
                expected: SchemaKind::Types,
                found: SchemaKind::Events
            }
        ));
    }

    #[test]
    fn test_wrapper_is_preserved() {
        let d = types("<?xml version=\"1.0\"?>\n<!-- server -->\n<types>\n</types>\n<!-- end -->\n");
        let (merged, _) = merge(d, &[src()], false).unwrap();
        let out = merged.render();

        assert!(out.starts_with("<?xml version=\"1.0\"?>\n<!-- server -->\n<types>"));
        assert!(out.ends_with("\n</types>\n<!-- end -->\n"));
    }

    #[test]
    fn test_provenance() {
        let mut s = src();
        s.source_path = Some(PathBuf::from("mods/@Fruit/types.xml"));

        let (_, report) = merge(dest(), &[s], false).unwrap();
        assert!(report
            .entries
            .iter()
            .all(|e| e.source == Some(PathBuf::from("mods/@Fruit/types.xml"))));
    }
}
