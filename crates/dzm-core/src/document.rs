//! Record extraction and byte-preserving re-serialization
//!
//! A [`Document`] is the file's text cut into a head (everything up to the end
//! of the root start tag), a run of records each preceded by the text that sat
//! before it, and a tail. Rendering concatenates the pieces, so a document that
//! was only appended to still has every original byte in place.

use crate::error::{Error, Result};
use crate::outline::{self, ChildSpan};
use crate::schema::SchemaKind;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Separator put before appended records when the document offers no example
const DEFAULT_SEPARATOR: &str = "\n    ";

/// One direct child of a record element, kept as raw text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordField {
    /// Element name (e.g. "nominal", "flags", "usage")
    pub name: String,
    /// Exact serialized element
    pub raw: String,
}

/// One named record (`<type name=..>` or `<event name=..>`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Value of the `name` attribute
    pub key: String,
    pub kind: SchemaKind,
    /// Child elements in document order
    pub fields: Vec<RecordField>,
    /// Exact serialized record element
    pub raw: String,
}

impl Record {
    /// First field with the given element name
    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn from_span(text: &str, child: &ChildSpan, key: String, kind: SchemaKind) -> Self {
        Record {
            key,
            kind,
            fields: child
                .fields
                .iter()
                .map(|(name, span)| RecordField {
                    name: name.clone(),
                    raw: text[span.clone()].to_string(),
                })
                .collect(),
            raw: text[child.span.clone()].to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    /// Text between the previous record (or the root start tag) and this one
    leading: String,
    record: Record,
}

/// An ordered, key-unique set of records plus the wrapper text around them
#[derive(Debug, Clone)]
pub struct Document {
    pub kind: SchemaKind,
    /// Root element name as written in the file
    pub root_name: String,
    /// File this document was read from, if any
    pub source_path: Option<PathBuf>,
    /// Keys that appeared again after their first record; kept as plain text
    pub duplicate_keys: Vec<String>,
    head: String,
    entries: Vec<Entry>,
    tail: String,
    index: HashMap<String, usize>,
}

impl Document {
    /// A new document with a declaration and an empty canonical root
    pub fn empty(kind: SchemaKind) -> Self {
        let root = kind.root_tag();
        Document {
            kind,
            root_name: root.to_string(),
            source_path: None,
            duplicate_keys: Vec::new(),
            head: format!("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<{}>", root),
            entries: Vec::new(),
            tail: format!("\n</{}>\n", root),
            index: HashMap::new(),
        }
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in document order
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.entries.iter().map(|e| &e.record)
    }

    /// Keys in document order
    pub fn keys(&self) -> Vec<&str> {
        self.records().map(|r| r.key.as_str()).collect()
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.index.get(key).map(|&i| &self.entries[i].record)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Serialize back to text
    pub fn render(&self) -> String {
        let body: usize = self
            .entries
            .iter()
            .map(|e| e.leading.len() + e.record.raw.len())
            .sum();
        let mut out = String::with_capacity(self.head.len() + body + self.tail.len());
        out.push_str(&self.head);
        for entry in &self.entries {
            out.push_str(&entry.leading);
            out.push_str(&entry.record.raw);
        }
        out.push_str(&self.tail);
        out
    }

    /// Append a record after the last one, indented like its neighbours.
    /// Returns false (and changes nothing) if the key is already present.
    pub(crate) fn append(&mut self, record: Record) -> bool {
        if self.index.contains_key(&record.key) {
            return false;
        }
        let leading = self.separator();
        self.index.insert(record.key.clone(), self.entries.len());
        self.entries.push(Entry { leading, record });
        true
    }

    /// Swap the payload of an existing record in place.
    /// Returns false (and changes nothing) if the key is absent.
    pub(crate) fn replace(&mut self, record: Record) -> bool {
        match self.index.get(&record.key) {
            Some(&i) => {
                self.entries[i].record = record;
                true
            }
            None => false,
        }
    }

    fn separator(&self) -> String {
        let Some(last) = self.entries.last() else {
            return DEFAULT_SEPARATOR.to_string();
        };
        let leading = last.leading.as_str();
        let from = match leading.rfind('\n') {
            Some(i) if leading[..i].ends_with('\r') => i - 1,
            Some(i) => i,
            None => 0,
        };
        let indent = &leading[from..];
        if !indent.is_empty() && indent.chars().all(char::is_whitespace) {
            indent.to_string()
        } else {
            DEFAULT_SEPARATOR.to_string()
        }
    }
}

/// Extract a document of the given kind from raw bytes
pub fn extract(bytes: &[u8], kind: SchemaKind) -> Result<Document> {
    extract_from(bytes, kind, None)
}

/// Read and extract a document from a file
pub fn extract_file<P: AsRef<Path>>(path: P, kind: SchemaKind) -> Result<Document> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    extract_from(&bytes, kind, Some(path))
}

pub(crate) fn extract_from(bytes: &[u8], kind: SchemaKind, path: Option<&Path>) -> Result<Document> {
    let malformed = |message: String| Error::MalformedDocument {
        path: path.map(Path::to_path_buf).unwrap_or_default(),
        message,
    };

    let text = std::str::from_utf8(bytes).map_err(|e| malformed(format!("not UTF-8: {}", e)))?;
    let outline = outline::scan(text).map_err(malformed)?;
    let root = &outline.root;
    let record_tag = kind.record_tag();

    let mut entries: Vec<Entry> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut duplicate_keys = Vec::new();

    let (head, tail) = if root.self_closing {
        // `<types/>` becomes `<types></types>` so records can be appended
        let tag = &text[root.start..root.start_tag_end];
        let open = tag.trim_end_matches("/>").trim_end();
        (
            format!("{}{}>", &text[..root.start], open),
            format!("</{}>{}", root.name, &text[root.start_tag_end..]),
        )
    } else {
        let mut cursor = root.start_tag_end;
        for child in &outline.children {
            if child.name != record_tag {
                continue;
            }
            let Some(key) = child.key.clone() else {
                continue;
            };
            if index.contains_key(&key) {
                tracing::debug!(key = %key, "duplicate record kept as text");
                duplicate_keys.push(key);
                continue;
            }
            index.insert(key.clone(), entries.len());
            entries.push(Entry {
                leading: text[cursor..child.span.start].to_string(),
                record: Record::from_span(text, child, key, kind),
            });
            cursor = child.span.end;
        }
        (
            text[..root.start_tag_end].to_string(),
            text[cursor..].to_string(),
        )
    };

    if entries.is_empty() && root.name != kind.root_tag() {
        return Err(malformed(format!(
            "root <{}> holds no <{} name=\"..\"> records for {}",
            root.name, record_tag, kind
        )));
    }

    Ok(Document {
        kind,
        root_name: root.name.clone(),
        source_path: path.map(Path::to_path_buf),
        duplicate_keys,
        head,
        entries,
        tail,
        index,
    })
}
