//! Property schema slimming.
//!
//! Catalog property trees carry UI hints, styling and internal flags next
//! to the fields a reader actually needs. Slimming keeps only `name`,
//! `type`, `default`, `required`, `description`, `options` and
//! `displayOptions` (plus `value` and `values` on options), recursively.
//! `displayOptions` is copied verbatim.

use crate::model::{PropertyRecord, RawNodeRecord, SlimOption, SlimProperty};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// Deepest nesting of properties and options accepted.
pub const MAX_DEPTH: usize = 32;

/// Why a property tree could not be slimmed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlimError {
    #[error("property tree nested deeper than {} levels", MAX_DEPTH)]
    TooDeep,

    #[error("expected an object at {0}")]
    NotAnObject(String),
}

/// Slimmed property records plus the number of malformed trees skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyLog {
    pub records: Vec<PropertyRecord>,
    pub malformed: usize,
}

/// Slim a node's raw `properties` array.
///
/// Entries missing a key (including `name`) keep the keys they have.
///
/// # Errors
/// Fails closed on a tree nested deeper than [`MAX_DEPTH`] or an entry that
/// is not an object; the whole tree is rejected.
pub fn slim_properties(raw: &[Value]) -> Result<Vec<SlimProperty>, SlimError> {
    slim_property_list(raw, 0, "properties")
}

fn slim_property_list(raw: &[Value], depth: usize, path: &str) -> Result<Vec<SlimProperty>, SlimError> {
    raw.iter()
        .enumerate()
        .map(|(i, value)| slim_property(value, depth, &format!("{path}[{i}]")))
        .collect()
}

fn slim_option_list(raw: &[Value], depth: usize, path: &str) -> Result<Vec<SlimOption>, SlimError> {
    raw.iter()
        .enumerate()
        .map(|(i, value)| slim_option(value, depth, &format!("{path}[{i}]")))
        .collect()
}

fn slim_property(value: &Value, depth: usize, path: &str) -> Result<SlimProperty, SlimError> {
    let obj = object_at(value, depth, path)?;
    Ok(SlimProperty {
        name: string_field(obj, "name"),
        kind: string_field(obj, "type"),
        default: obj.get("default").cloned(),
        required: obj.get("required").and_then(Value::as_bool),
        description: string_field(obj, "description"),
        options: nested(obj, "options", |items, p| slim_option_list(items, depth + 1, p), path)?,
        display_options: obj.get("displayOptions").filter(|v| !v.is_null()).cloned(),
    })
}

/// Slim one entry of an `options` array: a choice (`name`/`value`), a
/// collection member (a full property) or a fixed-collection group
/// (`values`).
///
/// # Errors
/// Returns an error if the entry or anything below it is malformed.
fn slim_option(value: &Value, depth: usize, path: &str) -> Result<SlimOption, SlimError> {
    let obj = object_at(value, depth, path)?;
    Ok(SlimOption {
        name: string_field(obj, "name"),
        value: obj.get("value").cloned(),
        kind: string_field(obj, "type"),
        default: obj.get("default").cloned(),
        required: obj.get("required").and_then(Value::as_bool),
        description: string_field(obj, "description"),
        display_options: obj.get("displayOptions").filter(|v| !v.is_null()).cloned(),
        values: nested(obj, "values", |items, p| slim_property_list(items, depth + 1, p), path)?,
        options: nested(obj, "options", |items, p| slim_option_list(items, depth + 1, p), path)?,
    })
}

fn object_at<'a>(value: &'a Value, depth: usize, path: &str) -> Result<&'a Map<String, Value>, SlimError> {
    if depth >= MAX_DEPTH {
        return Err(SlimError::TooDeep);
    }
    value
        .as_object()
        .ok_or_else(|| SlimError::NotAnObject(path.to_string()))
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(String::from)
}

/// Apply `slim` to `obj[key]` when it is an array. Anything else (absent,
/// null, a string expression) is dropped.
fn nested<T>(
    obj: &Map<String, Value>,
    key: &str,
    slim: impl FnOnce(&[Value], &str) -> Result<Vec<T>, SlimError>,
    path: &str,
) -> Result<Option<Vec<T>>, SlimError> {
    match obj.get(key) {
        Some(Value::Array(items)) => slim(items, &format!("{path}.{key}")).map(Some),
        _ => Ok(None),
    }
}

/// Build the properties log from both catalogs.
///
/// Only nodes with a non-empty raw tree produce a record. When a node
/// appears more than once, the first record with properties wins, official
/// before community. Malformed trees are skipped with a warning.
#[must_use]
pub fn build_property_records(official: &[RawNodeRecord], community: &[RawNodeRecord]) -> PropertyLog {
    let mut by_node: BTreeMap<&str, Vec<SlimProperty>> = BTreeMap::new();
    let mut malformed = 0;

    for record in official.iter().chain(community) {
        let Some(node) = record.name.as_deref() else {
            continue;
        };
        if record.properties.is_empty() || by_node.contains_key(node) {
            continue;
        }
        match slim_properties(&record.properties) {
            Ok(properties) => {
                by_node.insert(node, properties);
            }
            Err(e) => {
                warn!(node, error = %e, "Skipping malformed property schema");
                malformed += 1;
            }
        }
    }

    PropertyLog {
        records: by_node
            .into_iter()
            .map(|(node, properties)| PropertyRecord {
                node: node.to_string(),
                properties,
            })
            .collect(),
        malformed,
    }
}
