//! Single-pass structural scan of an XML document
//!
//! Produces byte spans for the root element, its direct children and their
//! direct children, plus the set of element names seen anywhere carrying a
//! `name` attribute. Both the classifier and the extractor work from this.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::BTreeSet;
use std::ops::Range;

/// The root element
#[derive(Debug, Clone)]
pub(crate) struct RootSpan {
    pub name: String,
    /// `<` of the start tag
    pub start: usize,
    /// One past `>` of the start tag
    pub start_tag_end: usize,
    /// `<` of the end tag (equals `start_tag_end` for a self-closing root)
    pub end_tag_start: usize,
    pub self_closing: bool,
}

/// A direct child of the root
#[derive(Debug, Clone)]
pub(crate) struct ChildSpan {
    pub name: String,
    /// Value of the `name` attribute, if present and non-empty
    pub key: Option<String>,
    pub span: Range<usize>,
    /// Direct children of this element: (element name, span)
    pub fields: Vec<(String, Range<usize>)>,
}

#[derive(Debug, Clone)]
pub(crate) struct Outline {
    pub root: RootSpan,
    pub children: Vec<ChildSpan>,
    /// Element names seen at any depth with a non-empty `name` attribute
    pub named_elements: BTreeSet<String>,
}

impl Outline {
    pub fn has_named(&self, element: &str) -> bool {
        self.named_elements.contains(element)
    }
}

/// Scan `text`, returning a human-readable message if it is not well-formed.
///
/// Offsets are relative to `text`, which may start with a byte order mark.
pub(crate) fn scan(text: &str) -> Result<Outline, String> {
    let body = text.strip_prefix('\u{feff}').unwrap_or(text);
    let base = text.len() - body.len();

    let mut reader = Reader::from_str(body);
    reader.config_mut().check_end_names = true;

    let mut root: Option<RootSpan> = None;
    let mut root_closed = false;
    let mut children: Vec<ChildSpan> = Vec::new();
    let mut named_elements = BTreeSet::new();
    let mut open: Vec<String> = Vec::new();
    let mut field_start: Option<(String, usize)> = None;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|e| format!("{} (near byte {})", e, base + reader.buffer_position() as usize))?;
        let end = reader.buffer_position() as usize;
        let after = base + end;
        let pos = base + markup_start(body, before, end);

        match event {
            Event::Start(e) => {
                check_attributes(&e, pos)?;
                let name = element_name(&e);
                note_named(&e, &name, &mut named_elements)?;
                match open.len() {
                    0 => {
                        if root_closed {
                            return Err(format!("multiple root elements (second is <{}>)", name));
                        }
                        root = Some(RootSpan {
                            name: name.clone(),
                            start: pos,
                            start_tag_end: after,
                            end_tag_start: after,
                            self_closing: false,
                        });
                    }
                    1 => children.push(ChildSpan {
                        name: name.clone(),
                        key: key_of(&e)?,
                        span: pos..pos,
                        fields: Vec::new(),
                    }),
                    2 => field_start = Some((name.clone(), pos)),
                    _ => {}
                }
                open.push(name);
            }
            Event::Empty(e) => {
                check_attributes(&e, pos)?;
                let name = element_name(&e);
                note_named(&e, &name, &mut named_elements)?;
                match open.len() {
                    0 => {
                        if root_closed {
                            return Err(format!("multiple root elements (second is <{}>)", name));
                        }
                        root = Some(RootSpan {
                            name,
                            start: pos,
                            start_tag_end: after,
                            end_tag_start: after,
                            self_closing: true,
                        });
                        root_closed = true;
                    }
                    1 => children.push(ChildSpan {
                        name,
                        key: key_of(&e)?,
                        span: pos..after,
                        fields: Vec::new(),
                    }),
                    2 => {
                        if let Some(child) = children.last_mut() {
                            child.fields.push((name, pos..after));
                        }
                    }
                    _ => {}
                }
            }
            Event::End(_) => {
                open.pop();
                match open.len() {
                    0 => {
                        if let Some(root) = root.as_mut() {
                            root.end_tag_start = pos;
                        }
                        root_closed = true;
                    }
                    1 => {
                        if let Some(child) = children.last_mut() {
                            child.span.end = after;
                        }
                    }
                    2 => {
                        if let (Some((name, start)), Some(child)) =
                            (field_start.take(), children.last_mut())
                        {
                            child.fields.push((name, start..after));
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| format!("bad character data: {} (near byte {})", e, base + before))?;
                if open.is_empty() && !text.trim().is_empty() {
                    return Err(format!("text outside the root element near byte {}", base + before));
                }
            }
            Event::CData(_) if open.is_empty() => {
                return Err(format!("CDATA outside the root element near byte {}", pos));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(unclosed) = open.last() {
        return Err(format!("unexpected end of file: <{}> is not closed", unclosed));
    }

    let root = root.ok_or_else(|| "no root element".to_string())?;
    Ok(Outline {
        root,
        children,
        named_elements,
    })
}

/// Offset of the `<` opening the markup that ends at `end`.
///
/// `before` is the reader position before the event was read. Depending on
/// the reader state it sits on the `<` itself or just past it.
fn markup_start(body: &str, before: usize, end: usize) -> usize {
    let ahead = body
        .get(before..end)
        .and_then(|markup| markup.find('<'))
        .map(|i| before + i);
    match ahead {
        Some(start) => start,
        None => body
            .get(..before)
            .and_then(|head| head.rfind('<'))
            .unwrap_or(before),
    }
}

/// Reject duplicate attributes, a literal `<` in a value and undecodable
/// entity references.
fn check_attributes(e: &BytesStart<'_>, pos: usize) -> Result<(), String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| format!("bad attribute: {} (near byte {})", err, pos))?;
        let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if attr.value.contains(&b'<') {
            return Err(format!("'<' in value of attribute '{}' (near byte {})", name, pos));
        }
        attr.unescape_value()
            .map_err(|err| format!("bad value of attribute '{}': {} (near byte {})", name, err, pos))?;
    }
    Ok(())
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn key_of(e: &BytesStart<'_>) -> Result<Option<String>, String> {
    let attr = e
        .try_get_attribute("name")
        .map_err(|err| format!("bad attribute: {}", err))?;
    let Some(attr) = attr else {
        return Ok(None);
    };
    let value = attr
        .unescape_value()
        .map_err(|err| format!("bad name attribute: {}", err))?
        .into_owned();
    if value.is_empty() {
        Ok(None)
    } else {
        Ok(Some(value))
    }
}

fn note_named(
    e: &BytesStart<'_>,
    name: &str,
    named: &mut BTreeSet<String>,
) -> Result<(), String> {
    if key_of(e)?.is_some() && !named.contains(name) {
        named.insert(name.to_string());
    }
    Ok(())
}
