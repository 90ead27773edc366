//! Reading the node file list from an installed plugin package.
//!
//! n8n plugin packages declare their node implementations in `package.json`:
//!
//! ```json
//! { "name": "n8n-nodes-base", "n8n": { "nodes": ["dist/nodes/Slack/Slack.node.js"] } }
//! ```

use super::error::PkgError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct PackageJson {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    n8n: Option<PluginSection>,
}

#[derive(Debug, Deserialize)]
struct PluginSection {
    #[serde(default)]
    nodes: Vec<String>,
}

/// What a plugin package says about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
    pub name: String,
    pub version: Option<String>,
    /// Node implementation files, absolute, in manifest order.
    pub node_files: Vec<PathBuf>,
}

/// Read `<package_root>/package.json` and list its node files.
///
/// A manifest without an `n8n.nodes` list yields an empty file list, not an
/// error. `fallback_name` is used when the manifest has no `name`.
///
/// # Errors
/// Returns an error if `package.json` is missing or not valid JSON.
pub fn read_manifest(package_root: &Path, fallback_name: &str) -> Result<PackageManifest, PkgError> {
    let path = package_root.join("package.json");
    let content = fs::read_to_string(&path).map_err(|e| {
        PkgError::manifest_invalid(format!("Failed to read {}: {e}", path.display()))
    })?;
    let parsed: PackageJson = serde_json::from_str(&content).map_err(|e| {
        PkgError::manifest_invalid(format!("Failed to parse {}: {e}", path.display()))
    })?;

    let node_files = parsed
        .n8n
        .map(|section| section.nodes)
        .unwrap_or_default()
        .into_iter()
        .map(|rel| package_root.join(rel))
        .collect();

    Ok(PackageManifest {
        name: parsed.name.unwrap_or_else(|| fallback_name.to_string()),
        version: parsed.version,
        node_files,
    })
}
