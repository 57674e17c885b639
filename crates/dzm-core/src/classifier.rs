//! Content-based classification of XML files
//!
//! A file's kind is decided only by what it contains. File names and
//! directory layout inside mods are arbitrary, so `types.xml` holding
//! something unrelated is unclassified and `zzz123.xml` holding a `<types>`
//! root is a types file.

use crate::outline::{self, Outline};
use crate::schema::SchemaKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Outcome of classifying one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Classification {
    Classified { kind: SchemaKind },
    Unclassified { reason: UnclassifiedReason },
}

impl Classification {
    /// The kind, if classified
    pub fn kind(&self) -> Option<SchemaKind> {
        match self {
            Classification::Classified { kind } => Some(*kind),
            Classification::Unclassified { .. } => None,
        }
    }
}

/// Why a file was not classified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum UnclassifiedReason {
    /// Path does not have a `.xml` extension
    NotXml,
    /// Bytes are not UTF-8 text
    NotText(String),
    /// Not well-formed markup
    Malformed(String),
    /// Well-formed, but none of the markers are present
    NoMarkers,
    /// Loose markers for more than one kind and no deciding root tag
    Ambiguous(Vec<SchemaKind>),
}

impl UnclassifiedReason {
    pub fn is_malformed(&self) -> bool {
        matches!(self, UnclassifiedReason::Malformed(_))
    }
}

impl fmt::Display for UnclassifiedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnclassifiedReason::NotXml => write!(f, "not an .xml file"),
            UnclassifiedReason::NotText(msg) => write!(f, "not UTF-8 text: {}", msg),
            UnclassifiedReason::Malformed(msg) => write!(f, "malformed: {}", msg),
            UnclassifiedReason::NoMarkers => write!(f, "no recognizable markers"),
            UnclassifiedReason::Ambiguous(kinds) => {
                let names: Vec<String> = kinds.iter().map(|k| k.to_string()).collect();
                write!(f, "ambiguous: matches {}", names.join(", "))
            }
        }
    }
}

/// How strongly a marker identifies a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Specificity {
    RootTag,
    Element,
}

/// What a rule looks for
#[derive(Debug, Clone, Copy)]
enum Marker {
    /// Root element has this name
    Root(&'static str),
    /// Some element with this name carries a `name` attribute
    NamedElement(&'static str),
}

impl Marker {
    fn matches(self, outline: &Outline) -> bool {
        match self {
            Marker::Root(tag) => outline.root.name == tag,
            Marker::NamedElement(tag) => outline.has_named(tag),
        }
    }

    fn specificity(self) -> Specificity {
        match self {
            Marker::Root(_) => Specificity::RootTag,
            Marker::NamedElement(_) => Specificity::Element,
        }
    }
}

/// Rules in specificity order; the first specificity level with any match decides.
const RULES: &[(Marker, SchemaKind)] = &[
    (Marker::Root("types"), SchemaKind::Types),
    (Marker::Root("eventposdef"), SchemaKind::Events),
    (Marker::Root("spawnabletypes"), SchemaKind::SpawnableTypes),
    (Marker::NamedElement("type"), SchemaKind::Types),
    (Marker::NamedElement("event"), SchemaKind::Events),
];

/// Classify raw file contents
pub fn classify(bytes: &[u8]) -> Classification {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            return Classification::Unclassified {
                reason: UnclassifiedReason::NotText(e.to_string()),
            }
        }
    };

    match outline::scan(text) {
        Ok(outline) => classify_outline(&outline),
        Err(message) => Classification::Unclassified {
            reason: UnclassifiedReason::Malformed(message),
        },
    }
}

pub(crate) fn classify_outline(outline: &Outline) -> Classification {
    for level in [Specificity::RootTag, Specificity::Element] {
        let mut kinds: Vec<SchemaKind> = RULES
            .iter()
            .filter(|(marker, _)| marker.specificity() == level && marker.matches(outline))
            .map(|(_, kind)| *kind)
            .collect();
        kinds.dedup();

        match kinds.len() {
            0 => continue,
            1 => return Classification::Classified { kind: kinds[0] },
            _ => {
                return Classification::Unclassified {
                    reason: UnclassifiedReason::Ambiguous(kinds),
                }
            }
        }
    }

    Classification::Unclassified {
        reason: UnclassifiedReason::NoMarkers,
    }
}

/// Whether a path has a `.xml` extension (any case)
pub fn has_xml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
}

/// Classify a file on disk. Non-`.xml` paths are never classified.
pub fn classify_path(path: &Path, bytes: &[u8]) -> Classification {
    if !has_xml_extension(path) {
        return Classification::Unclassified {
            reason: UnclassifiedReason::NotXml,
        };
    }
    classify(bytes)
}
