//! Records flowing through a refresh: raw catalog records in, index entries
//! and slim property records out.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::fmt;

/// A node version as declared by a catalog or by installed source.
///
/// Versions are fractional (`2.2`, `4.4`) and keep the numeric literal they
/// were read from, so a catalog `2` is written back as `2`, not `2.0`.
/// Only finite, non-negative values can be constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeVersion(Number);

impl NodeVersion {
    /// Accept a JSON number if it is a finite, non-negative value.
    #[must_use]
    pub fn from_number(number: Number) -> Option<Self> {
        let value = number.as_f64()?;
        (value.is_finite() && value >= 0.0).then_some(Self(number))
    }

    /// Parse a numeric literal such as `3`, `2.2` or `1.0`.
    #[must_use]
    pub fn parse(literal: &str) -> Option<Self> {
        serde_json::from_str::<Number>(literal.trim())
            .ok()
            .and_then(Self::from_number)
    }

    /// Interpret a JSON value: a number, a numeric string, or an array of
    /// either (the highest element wins).
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Self::from_number(n.clone()),
            Value::String(s) => Self::parse(s),
            Value::Array(items) => Self::max_of(items.iter().filter_map(Self::from_value)),
            _ => None,
        }
    }

    /// Highest version in `versions`, or `None` if empty.
    pub fn max_of(versions: impl IntoIterator<Item = Self>) -> Option<Self> {
        versions
            .into_iter()
            .reduce(|best, v| if v.cmp_value(&best).is_gt() { v } else { best })
    }

    #[must_use]
    pub fn as_f64(&self) -> f64 {
        // Construction guarantees a finite value.
        self.0.as_f64().unwrap_or_default()
    }

    /// Numeric comparison, ignoring how the literal was spelled.
    #[must_use]
    pub fn cmp_value(&self, other: &Self) -> Ordering {
        self.as_f64().total_cmp(&other.as_f64())
    }
}

impl fmt::Display for NodeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node record as returned by a catalog, before normalization.
///
/// Lives only for the duration of one refresh; the heavy parts of the
/// original payload (icons, UI hints) are never copied in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawNodeRecord {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub version: Option<NodeVersion>,
    pub description: Option<String>,
    pub group: Option<Value>,
    pub alias: Vec<String>,
    pub categories: Vec<String>,
    pub properties: Vec<Value>,
    /// Community only: npm package that ships the node.
    pub package_name: Option<String>,
    /// Community only: vendor-verified flag.
    pub is_official_node: bool,
}

impl RawNodeRecord {
    /// Project a catalog JSON record.
    ///
    /// Accepts flat records and Strapi-style `{ "attributes": { ... } }`
    /// wrappers. Community records carry most of their schema under
    /// `nodeDescription`, which fills in anything missing at the top level.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let empty = Map::new();
        let record = value
            .get("attributes")
            .and_then(Value::as_object)
            .or_else(|| value.as_object())
            .unwrap_or(&empty);
        let nested = record
            .get("nodeDescription")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let codex = record
            .get("codex")
            .or_else(|| nested.get("codex"))
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let field = |key: &str| {
            record
                .get(key)
                .filter(|v| !v.is_null())
                .or_else(|| nested.get(key).filter(|v| !v.is_null()))
        };

        let alias = field("alias")
            .or_else(|| codex.get("alias"))
            .map(string_list)
            .unwrap_or_default();
        let categories = field("categories")
            .or_else(|| field("nodeCategories"))
            .or_else(|| codex.get("categories"))
            .map(string_list)
            .unwrap_or_default();

        Self {
            name: field("name").and_then(non_empty_str),
            display_name: field("displayName").and_then(non_empty_str),
            version: field("version").and_then(NodeVersion::from_value),
            description: field("description")
                .and_then(Value::as_str)
                .map(String::from),
            group: field("group").cloned(),
            alias,
            categories,
            properties: field("properties")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            package_name: field("packageName").and_then(non_empty_str),
            is_official_node: field("isOfficialNode")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Strings from an array of strings or of `{ name }` objects (possibly
/// Strapi-wrapped). Relation payloads like `{ "data": [...] }` are unwrapped.
fn string_list(value: &Value) -> Vec<String> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => match obj.get("data") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => return Vec::new(),
        },
        Value::String(s) => return vec![s.clone()],
        _ => return Vec::new(),
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => obj
                .get("attributes")
                .and_then(|a| a.get("name"))
                .or_else(|| obj.get("name"))
                .and_then(Value::as_str)
                .map(String::from),
            _ => None,
        })
        .collect()
}

/// Persisted entry of the official index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficialIndexEntry {
    pub name: String,
    pub display_name: String,
    /// `null` means the version is unknown.
    pub version: Option<NodeVersion>,
    pub description: Option<String>,
    pub group: Option<Value>,
    pub alias: Vec<String>,
    pub categories: Vec<String>,
}

/// Persisted entry of the community index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityIndexEntry {
    pub name: String,
    pub display_name: String,
    pub version: Option<NodeVersion>,
    pub description: Option<String>,
    pub alias: Vec<String>,
    pub package_name: Option<String>,
    pub is_official_node: bool,
}

/// Provenance header of an index document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub source: String,
    pub total: usize,
    pub description: String,
}

/// An index document: `{ "_meta": ..., "nodes": [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument<T> {
    #[serde(rename = "_meta")]
    pub meta: IndexMeta,
    pub nodes: Vec<T>,
}

impl<T> IndexDocument<T> {
    pub fn new(source: impl Into<String>, description: impl Into<String>, nodes: Vec<T>) -> Self {
        Self {
            meta: IndexMeta {
                source: source.into(),
                total: nodes.len(),
                description: description.into(),
            },
            nodes,
        }
    }
}

/// One line of the properties log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub node: String,
    pub properties: Vec<SlimProperty>,
}

/// A node parameter reduced to what lookup and configuration need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlimProperty {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SlimOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_options: Option<Value>,
}

/// A choice, collection member or fixed-collection group inside `options`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlimOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<SlimProperty>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SlimOption>>,
}
