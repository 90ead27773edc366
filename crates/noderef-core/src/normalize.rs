//! Projection of raw catalog records into index entries.

use crate::model::{CommunityIndexEntry, OfficialIndexEntry, RawNodeRecord};
use crate::resolve::VersionOverrides;
use std::cmp::Ordering;
use tracing::warn;

/// Entries of one index plus how many raw records were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub entries: Vec<T>,
    pub dropped: usize,
}

/// Build the official index. An override for a node's identifier replaces
/// the catalog version; otherwise the catalog version passes through
/// unchanged, including `null`.
#[must_use]
pub fn normalize_official(
    records: &[RawNodeRecord],
    overrides: &VersionOverrides,
) -> Normalized<OfficialIndexEntry> {
    let mut dropped = 0;
    let mut entries: Vec<OfficialIndexEntry> = records
        .iter()
        .filter_map(|record| {
            let Some(name) = record.name.clone() else {
                dropped += 1;
                return None;
            };
            let version = overrides
                .get(&name)
                .cloned()
                .or_else(|| record.version.clone());
            Some(OfficialIndexEntry {
                display_name: record.display_name.clone().unwrap_or_else(|| name.clone()),
                name,
                version,
                description: record.description.clone(),
                group: record.group.clone(),
                alias: record.alias.clone(),
                categories: record.categories.clone(),
            })
        })
        .collect();

    entries.sort_by(|a, b| by_display_name(&a.display_name, &a.name, &b.display_name, &b.name));
    if dropped > 0 {
        warn!(dropped, "Dropped official records without a name");
    }
    Normalized { entries, dropped }
}

/// Build the community index. Community packages are never installed, so
/// catalog versions are used as-is.
#[must_use]
pub fn normalize_community(records: &[RawNodeRecord]) -> Normalized<CommunityIndexEntry> {
    let mut dropped = 0;
    let mut entries: Vec<CommunityIndexEntry> = records
        .iter()
        .filter_map(|record| {
            let Some(name) = record.name.clone() else {
                dropped += 1;
                return None;
            };
            Some(CommunityIndexEntry {
                display_name: record.display_name.clone().unwrap_or_else(|| name.clone()),
                name,
                version: record.version.clone(),
                description: record.description.clone(),
                alias: record.alias.clone(),
                package_name: record.package_name.clone(),
                is_official_node: record.is_official_node,
            })
        })
        .collect();

    entries.sort_by(|a, b| by_display_name(&a.display_name, &a.name, &b.display_name, &b.name));
    if dropped > 0 {
        warn!(dropped, "Dropped community records without a name");
    }
    Normalized { entries, dropped }
}

// Case-insensitive display name, then exact display name and identifier so
// the order is total.
fn by_display_name(a_display: &str, a_name: &str, b_display: &str, b_name: &str) -> Ordering {
    a_display
        .to_lowercase()
        .cmp(&b_display.to_lowercase())
        .then_with(|| a_display.cmp(b_display))
        .then_with(|| a_name.cmp(b_name))
}
