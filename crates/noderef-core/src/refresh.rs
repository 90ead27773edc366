//! The refresh pipeline.
//!
//! Catalog fetching and the install/resolve branch run concurrently. A
//! fetch failure aborts the run before anything is written; the resolve
//! branch never fails, it only contributes fewer overrides.

use crate::config::RefreshConfig;
use crate::error::Error;
use crate::fetch::{CatalogClient, FetchedCatalog};
use crate::model::IndexDocument;
use crate::normalize::{normalize_community, normalize_official};
use crate::pkg::install_packages;
use crate::resolve::{PackageStats, ResolveReport, Resolver, Strategy};
use crate::slim::build_property_records;
use crate::writer::{write_cache, ArtifactReport, CacheContents};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

const OFFICIAL_DESCRIPTION: &str =
    "n8n official nodes; versions resolved from installed packages where available";
const COMMUNITY_DESCRIPTION: &str = "n8n community nodes; versions as reported by the catalog";

/// Per-catalog counts.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSummary {
    pub source: String,
    pub pages: u32,
    pub fetched: usize,
    pub written: usize,
    pub dropped: usize,
}

/// Version overrides by strategy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideSummary {
    pub total: usize,
    pub dynamic: usize,
    #[serde(rename = "static")]
    pub static_count: usize,
    pub downgrades_refused: usize,
}

/// Outcome of a refresh run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub out_dir: PathBuf,
    pub official: CatalogSummary,
    pub community: CatalogSummary,
    pub overrides: OverrideSummary,
    pub packages: Vec<PackageStats>,
    pub property_records: usize,
    pub malformed_schemas: usize,
    pub artifacts: Vec<ArtifactReport>,
}

/// Fetch, resolve, normalize, slim and write.
///
/// # Errors
/// Returns an error for invalid configuration, any catalog transport
/// failure, or a failure to write the artifacts. In each case the previous
/// cache is left untouched.
pub async fn run(config: &RefreshConfig) -> Result<RefreshSummary, Error> {
    config.validate()?;
    let client = CatalogClient::new()?;

    let fetch = async {
        tokio::try_join!(
            client.fetch_official(&config.official_url, config.page_size),
            client.fetch_community(&config.community_url),
        )
    };
    let resolve = async { Ok::<_, Error>(resolve_installed(config).await) };
    let ((official, community), report) = tokio::try_join!(fetch, resolve)?;

    let official_index = normalize_official(&official.records, &report.overrides);
    let community_index = normalize_community(&community.records);
    let log = build_property_records(&official.records, &community.records);

    let official_doc = IndexDocument::new(&official.source, OFFICIAL_DESCRIPTION, official_index.entries);
    let community_doc = IndexDocument::new(&community.source, COMMUNITY_DESCRIPTION, community_index.entries);
    let artifacts = write_cache(
        &config.out_dir,
        CacheContents {
            official: &official_doc,
            community: &community_doc,
            properties: &log.records,
        },
    )?;

    let summary = RefreshSummary {
        out_dir: config.out_dir.clone(),
        official: catalog_summary(&official, official_doc.nodes.len(), official_index.dropped),
        community: catalog_summary(&community, community_doc.nodes.len(), community_index.dropped),
        overrides: OverrideSummary {
            total: report.overrides.len(),
            dynamic: report.overrides.count_by(Strategy::Dynamic),
            static_count: report.overrides.count_by(Strategy::Static),
            downgrades_refused: report.downgrades_refused,
        },
        packages: report.packages,
        property_records: log.records.len(),
        malformed_schemas: log.malformed,
        artifacts,
    };

    info!(
        official = summary.official.written,
        community = summary.community.written,
        overrides = summary.overrides.total,
        properties = summary.property_records,
        "Refresh complete"
    );
    Ok(summary)
}

/// Install the plugin packages, scan them, and drop the install.
async fn resolve_installed(config: &RefreshConfig) -> ResolveReport {
    let installed =
        match install_packages(&config.install, &config.packages, &config.npm_registry).await {
            Ok(installed) => installed,
            Err(e) => {
                warn!(code = e.code(), error = %e.message(), "Cannot prepare plugin packages");
                return ResolveReport {
                    packages: config
                        .packages
                        .iter()
                        .map(|p| PackageStats {
                            package: p.name.clone(),
                            error: Some(e.to_string()),
                            ..PackageStats::default()
                        })
                        .collect(),
                    ..ResolveReport::default()
                };
            }
        };

    Resolver::new(config).resolve(&installed, &config.packages).await
}

fn catalog_summary(catalog: &FetchedCatalog, written: usize, dropped: usize) -> CatalogSummary {
    CatalogSummary {
        source: catalog.source.clone(),
        pages: catalog.pages,
        fetched: catalog.records.len(),
        written,
        dropped,
    }
}
