//! Default entries for class names that ship without XML
//!
//! Mods sometimes add item or vehicle classes but no `types.xml` or event
//! entries for them. These builders produce conventional entries from
//! per-category defaults; the result is an ordinary source [`Document`] that
//! goes through the merge engine like anything discovered on disk.

use crate::document::{extract, Document};
use crate::error::Result;
use crate::schema::SchemaKind;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flags that map onto `count_in_*` attributes of `<flags>`
pub const COUNT_FLAGS: [&str; 4] = [
    "count_in_cargo",
    "count_in_hoarder",
    "count_in_map",
    "count_in_player",
];

/// Category used when a requested one is not configured
pub const FALLBACK_CATEGORY: &str = "items";

/// Defaults for one `<type>` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefaults {
    pub nominal: i64,
    pub min: i64,
    pub quantmin: i64,
    pub quantmax: i64,
    pub cost: i64,
    pub lifetime: i64,
    pub restock: i64,
    /// Which of [`COUNT_FLAGS`] are set
    pub flags: Vec<String>,
    pub category: String,
    pub usage: Vec<String>,
}

impl TypeDefaults {
    fn new(
        nominal: i64,
        min: i64,
        lifetime: i64,
        restock: i64,
        flags: &[&str],
        category: &str,
        usage: &[&str],
    ) -> Self {
        Self {
            nominal,
            min,
            quantmin: -1,
            quantmax: -1,
            cost: 100,
            lifetime,
            restock,
            flags: flags.iter().map(|s| s.to_string()).collect(),
            category: category.to_string(),
            usage: usage.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Built-in per-category defaults
pub fn default_type_values() -> BTreeMap<String, TypeDefaults> {
    let all_counts = &COUNT_FLAGS;
    let mut values = BTreeMap::new();
    values.insert(
        "weapons".to_string(),
        TypeDefaults::new(10, 5, 3600, 1800, all_counts, "weapons", &["Military", "Police"]),
    );
    values.insert(
        "vehicles".to_string(),
        TypeDefaults::new(
            3,
            1,
            3_888_000,
            0,
            &["count_in_map", "count_in_player"],
            "vehicles",
            &["Industrial", "Farm"],
        ),
    );
    values.insert(
        "items".to_string(),
        TypeDefaults::new(20, 10, 3600, 1800, all_counts, "tools", &["Town", "Village"]),
    );
    values
}

/// Pick the defaults for `category`, falling back to `items`
pub fn defaults_for<'a>(
    values: &'a BTreeMap<String, TypeDefaults>,
    category: &str,
) -> Option<&'a TypeDefaults> {
    values
        .get(category)
        .or_else(|| values.get(FALLBACK_CATEGORY))
}

/// Defaults for one vehicle `<event>` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDefaults {
    pub nominal: i64,
    pub min: i64,
    pub max: i64,
    pub lifetime: i64,
    pub restock: i64,
    pub saferadius: i64,
    pub distanceradius: i64,
    pub cleanupradius: i64,
}

impl Default for EventDefaults {
    fn default() -> Self {
        Self {
            nominal: 2,
            min: 1,
            max: 3,
            lifetime: 3_888_000,
            restock: 0,
            saferadius: 500,
            distanceradius: 500,
            cleanupradius: 200,
        }
    }
}

/// Event name generated for a vehicle class
pub fn event_name(vehicle: &str) -> String {
    format!("{}_Event", vehicle)
}

/// Serialized `<type>` entry for one class name
pub fn type_entry_xml(classname: &str, defaults: &TypeDefaults) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    write_type_entry(&mut writer, classname, defaults)?;
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

/// Serialized `<event>` entry for one vehicle class
pub fn event_entry_xml(vehicle: &str, defaults: &EventDefaults) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    write_event_entry(&mut writer, vehicle, defaults)?;
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

/// A `<types>` document with one entry per class name
pub fn types_document(entries: &[(&str, &TypeDefaults)]) -> Result<Document> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    writer.write_event(Event::Start(BytesStart::new("types")))?;
    for (classname, defaults) in entries {
        write_type_entry(&mut writer, classname, defaults)?;
    }
    writer.write_event(Event::End(BytesEnd::new("types")))?;
    extract(&writer.into_inner(), SchemaKind::Types)
}

/// An `<eventposdef>` document with one event per vehicle class
pub fn events_document(vehicles: &[&str], defaults: &EventDefaults) -> Result<Document> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    writer.write_event(Event::Start(BytesStart::new("eventposdef")))?;
    for vehicle in vehicles {
        write_event_entry(&mut writer, vehicle, defaults)?;
    }
    writer.write_event(Event::End(BytesEnd::new("eventposdef")))?;
    extract(&writer.into_inner(), SchemaKind::Events)
}

fn write_type_entry(
    writer: &mut Writer<Vec<u8>>,
    classname: &str,
    d: &TypeDefaults,
) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(
        BytesStart::new("type").with_attributes([("name", classname)]),
    ))?;
    for (tag, value) in [
        ("nominal", d.nominal),
        ("lifetime", d.lifetime),
        ("restock", d.restock),
        ("min", d.min),
        ("quantmin", d.quantmin),
        ("quantmax", d.quantmax),
        ("cost", d.cost),
    ] {
        write_value(writer, tag, value)?;
    }

    let mut flags: Vec<(&str, &str)> = COUNT_FLAGS
        .iter()
        .map(|flag| {
            let on = d.flags.iter().any(|f| f == flag);
            (*flag, if on { "1" } else { "0" })
        })
        .collect();
    flags.push(("crafted", "0"));
    flags.push(("deloot", "0"));
    writer.write_event(Event::Empty(BytesStart::new("flags").with_attributes(flags)))?;

    writer.write_event(Event::Empty(
        BytesStart::new("category").with_attributes([("name", d.category.as_str())]),
    ))?;
    for usage in &d.usage {
        writer.write_event(Event::Empty(
            BytesStart::new("usage").with_attributes([("name", usage.as_str())]),
        ))?;
    }
    writer.write_event(Event::End(BytesEnd::new("type")))?;
    Ok(())
}

fn write_event_entry(
    writer: &mut Writer<Vec<u8>>,
    vehicle: &str,
    d: &EventDefaults,
) -> quick_xml::Result<()> {
    let name = event_name(vehicle);
    writer.write_event(Event::Start(
        BytesStart::new("event").with_attributes([("name", name.as_str())]),
    ))?;
    for (tag, value) in [
        ("nominal", d.nominal),
        ("min", d.min),
        ("max", d.max),
        ("lifetime", d.lifetime),
        ("restock", d.restock),
        ("saferadius", d.saferadius),
        ("distanceradius", d.distanceradius),
        ("cleanupradius", d.cleanupradius),
    ] {
        write_value(writer, tag, value)?;
    }
    writer.write_event(Event::Empty(
        BytesStart::new("flags").with_attributes([("deletable", "1")]),
    ))?;
    write_text(writer, "position", "fixed")?;
    write_text(writer, "limit", "child")?;
    write_text(writer, "active", "1")?;

    writer.write_event(Event::Start(BytesStart::new("children")))?;
    writer.write_event(Event::Empty(BytesStart::new("child").with_attributes([
        ("lootmax", "0"),
        ("lootmin", "0"),
        ("max", "3"),
        ("min", "1"),
        ("type", vehicle),
    ])))?;
    writer.write_event(Event::End(BytesEnd::new("children")))?;
    writer.write_event(Event::End(BytesEnd::new("event")))?;
    Ok(())
}

fn write_value(writer: &mut Writer<Vec<u8>>, tag: &str, value: i64) -> quick_xml::Result<()> {
    write_text(writer, tag, &value.to_string())
}

fn write_text(writer: &mut Writer<Vec<u8>>, tag: &str, text: &str) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}
