//! Version resolution against installed plugin packages.
//!
//! The catalog reports coarse versions (`2`); the installed code declares
//! the real one (`2.2`). For every node file a package lists, the resolver
//! first asks a `node` probe, then falls back to reading the source text.
//! Results are collected per package into a [`VersionOverrides`]
//! accumulator and merged by [`Resolver::resolve`] in configured order.

pub mod dynamic;
pub mod source;

pub use dynamic::{parse_probe_output, NodeProbe, ProbeHit};
pub use source::{extract_static, DescriptionAnchor, StaticMatch, VersionShape};

use crate::config::{PluginPackage, RefreshConfig};
use crate::model::NodeVersion;
use crate::pkg::{read_manifest, InstalledPackages};
use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::btree_map::{self, BTreeMap};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a single node file produced no version.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read source: {0}")]
    Read(#[from] io::Error),

    #[error("no description block found")]
    NoDescription,

    #[error("description has no name")]
    NoName,

    #[error("description declares no version")]
    NoVersion,

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

/// How a version was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Dynamic,
    Static,
}

/// A resolved version and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub version: NodeVersion,
    pub strategy: Strategy,
}

/// Resolved versions keyed by `<package>.<node name>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionOverrides {
    entries: BTreeMap<String, Override>,
}

impl VersionOverrides {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<&NodeVersion> {
        self.entries.get(identifier).map(|o| &o.version)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Override)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries resolved with `strategy`.
    #[must_use]
    pub fn count_by(&self, strategy: Strategy) -> usize {
        self.entries
            .values()
            .filter(|o| o.strategy == strategy)
            .count()
    }

    /// Insert unless `identifier` is already present. Returns whether it was
    /// inserted.
    pub fn insert_first(&mut self, identifier: String, version: NodeVersion, strategy: Strategy) -> bool {
        match self.entries.entry(identifier) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(Override { version, strategy });
                true
            }
            btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Merge a later package's results.
    ///
    /// New identifiers are added. An existing identifier is replaced only by
    /// an equal or higher version; downgrades are refused and counted.
    pub fn merge(&mut self, later: VersionOverrides) -> usize {
        let mut refused = 0;
        for (identifier, incoming) in later.entries {
            match self.entries.entry(identifier) {
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(incoming);
                }
                btree_map::Entry::Occupied(mut slot) => {
                    if incoming.version.cmp_value(&slot.get().version).is_lt() {
                        warn!(
                            node = %slot.key(),
                            kept = %slot.get().version,
                            refused = %incoming.version,
                            "Ignoring version downgrade"
                        );
                        refused += 1;
                    } else {
                        slot.insert(incoming);
                    }
                }
            }
        }
        refused
    }
}

/// Per-package outcome, reported in the run summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageStats {
    pub package: String,
    pub files: usize,
    pub dynamic: usize,
    #[serde(rename = "static")]
    pub static_count: usize,
    pub failed: usize,
    pub duplicates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PackageStats {
    fn new(package: &str) -> Self {
        Self {
            package: package.to_string(),
            ..Self::default()
        }
    }
}

/// Result of scanning one package.
#[derive(Debug, Clone, Default)]
pub struct PackageScan {
    pub overrides: VersionOverrides,
    pub stats: PackageStats,
}

/// Result of scanning every configured package.
#[derive(Debug, Clone, Default)]
pub struct ResolveReport {
    pub overrides: VersionOverrides,
    pub packages: Vec<PackageStats>,
    pub downgrades_refused: usize,
}

/// Resolves versions from installed node files.
#[derive(Debug, Clone)]
pub struct Resolver {
    probe: Option<NodeProbe>,
    concurrency: usize,
}

impl Resolver {
    /// Build a resolver from refresh settings. Without a `node` binary every
    /// file is read statically.
    #[must_use]
    pub fn new(config: &RefreshConfig) -> Self {
        let probe = if config.dynamic {
            let probe = NodeProbe::locate(config.node_binary.as_deref(), config.probe_timeout);
            match &probe {
                Some(p) => debug!(node = %p.node().display(), "Dynamic probe enabled"),
                None => warn!("No node binary found; resolving versions from source text only"),
            }
            probe
        } else {
            None
        };
        Self {
            probe,
            concurrency: config.probe_concurrency.max(1),
        }
    }

    /// A resolver that never loads code.
    #[must_use]
    pub fn static_only() -> Self {
        Self {
            probe: None,
            concurrency: 1,
        }
    }

    /// Scan every configured package in order and merge the results.
    pub async fn resolve(&self, installed: &InstalledPackages, packages: &[PluginPackage]) -> ResolveReport {
        let mut report = ResolveReport::default();

        for pkg in packages {
            if let Some(err) = installed.failure(&pkg.name) {
                let mut stats = PackageStats::new(&pkg.name);
                stats.error = Some(err.to_string());
                report.packages.push(stats);
                continue;
            }

            let scan = self
                .scan_package(&pkg.name, &installed.package_dir(&pkg.name))
                .await;
            report.downgrades_refused += report.overrides.merge(scan.overrides);
            report.packages.push(scan.stats);
        }

        info!(
            overrides = report.overrides.len(),
            dynamic = report.overrides.count_by(Strategy::Dynamic),
            static_count = report.overrides.count_by(Strategy::Static),
            "Resolved installed versions"
        );
        report
    }

    /// Resolve every node file listed by the package at `dir`.
    ///
    /// Never fails: a missing manifest is recorded in the stats and yields an
    /// empty scan.
    pub async fn scan_package(&self, name: &str, dir: &Path) -> PackageScan {
        let mut scan = PackageScan {
            overrides: VersionOverrides::new(),
            stats: PackageStats::new(name),
        };

        let manifest = match read_manifest(dir, name) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(package = %name, error = %e, "Cannot read package manifest");
                scan.stats.error = Some(e.to_string());
                return scan;
            }
        };
        scan.stats.files = manifest.node_files.len();

        let mut outcomes: Vec<Option<Result<(String, NodeVersion, Strategy), ExtractError>>> =
            manifest.node_files.iter().map(|_| None).collect();

        if let Some(probe) = &self.probe {
            let probed: Vec<_> = stream::iter(manifest.node_files.iter().map(|f| probe.probe(f)))
                .buffered(self.concurrency)
                .collect()
                .await;
            for ((slot, file), result) in outcomes.iter_mut().zip(&manifest.node_files).zip(probed) {
                match result {
                    Ok(hit) => *slot = Some(Ok((hit.name, hit.version, Strategy::Dynamic))),
                    Err(e) => debug!(file = %file.display(), error = %e, "Dynamic probe failed"),
                }
            }
        }

        let pending: Vec<(usize, PathBuf)> = outcomes
            .iter()
            .zip(&manifest.node_files)
            .enumerate()
            .filter(|(_, (slot, _))| slot.is_none())
            .map(|(i, (_, file))| (i, file.clone()))
            .collect();
        for (i, result) in extract_files(pending).await {
            outcomes[i] = Some(result.map(|m| (m.name, m.version, Strategy::Static)));
        }

        for (file, outcome) in manifest.node_files.iter().zip(outcomes) {
            match outcome {
                Some(Ok((node, version, strategy))) => {
                    let identifier = format!("{}.{node}", manifest.name);
                    if scan.overrides.insert_first(identifier, version, strategy) {
                        match strategy {
                            Strategy::Dynamic => scan.stats.dynamic += 1,
                            Strategy::Static => scan.stats.static_count += 1,
                        }
                    } else {
                        scan.stats.duplicates += 1;
                    }
                }
                Some(Err(e)) => {
                    debug!(file = %file.display(), error = %e, "No version resolved");
                    scan.stats.failed += 1;
                }
                None => scan.stats.failed += 1,
            }
        }

        info!(
            package = %manifest.name,
            version = manifest.version.as_deref().unwrap_or("unknown"),
            files = scan.stats.files,
            dynamic = scan.stats.dynamic,
            static_count = scan.stats.static_count,
            failed = scan.stats.failed,
            duplicates = scan.stats.duplicates,
            "Scanned package"
        );
        scan
    }
}

/// Read and statically extract `files` on the rayon pool, keeping indices.
async fn extract_files(
    files: Vec<(usize, PathBuf)>,
) -> Vec<(usize, Result<StaticMatch, ExtractError>)> {
    if files.is_empty() {
        return Vec::new();
    }
    let indices: Vec<usize> = files.iter().map(|(i, _)| *i).collect();

    let joined = tokio::task::spawn_blocking(move || {
        files
            .into_par_iter()
            .map(|(i, path)| (i, extract_file(&path)))
            .collect::<Vec<_>>()
    })
    .await;

    match joined {
        Ok(results) => results,
        Err(e) => indices
            .into_iter()
            .map(|i| (i, Err(ExtractError::Read(io::Error::other(e.to_string())))))
            .collect(),
    }
}

fn extract_file(path: &Path) -> Result<StaticMatch, ExtractError> {
    let source = noderef_util::fs::read_to_string_lossy(path)?;
    extract_static(&source)
}
