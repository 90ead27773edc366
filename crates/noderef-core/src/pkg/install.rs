//! Scoped installation of the plugin packages a refresh inspects.
//!
//! Temporary installs live in a [`TempDir`] owned by [`InstalledPackages`];
//! dropping the value removes the directory on every exit path, including
//! early returns and cancellation of the refresh future.

use super::error::PkgError;
use super::registry::{get_tarball_url, RegistryClient};
use super::tarball::{download_tarball, extract_package, MAX_TARBALL_SIZE};
use super::version::resolve_version;
use crate::config::{InstallSource, PluginPackage};
use crate::paths;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Plugin packages available on disk for the duration of a refresh.
#[derive(Debug)]
pub struct InstalledPackages {
    node_modules: PathBuf,
    failures: BTreeMap<String, PkgError>,
    // Held for its Drop: removes the temp install.
    temp_dir: Option<TempDir>,
}

impl InstalledPackages {
    /// The `node_modules` directory packages were placed in.
    #[must_use]
    pub fn node_modules(&self) -> &Path {
        &self.node_modules
    }

    /// Directory of an installed package.
    #[must_use]
    pub fn package_dir(&self, name: &str) -> PathBuf {
        paths::package_dir(&self.node_modules, name)
    }

    /// Why a package could not be installed, if it failed.
    #[must_use]
    pub fn failure(&self, name: &str) -> Option<&PkgError> {
        self.failures.get(name)
    }

    /// Whether this install is removed when dropped.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.temp_dir.is_some()
    }
}

/// Make `packages` available according to `source`.
///
/// Individual package failures are recorded, not returned; the caller
/// degrades those packages to zero overrides.
///
/// # Errors
/// Returns an error only if the temp directory cannot be created.
pub async fn install_packages(
    source: &InstallSource,
    packages: &[PluginPackage],
    registry_url: &str,
) -> Result<InstalledPackages, PkgError> {
    let (node_modules, temp) = match source {
        InstallSource::Existing(dir) => (dir.clone(), None),
        InstallSource::Tarball | InstallSource::Npm => {
            let temp = tempfile::Builder::new().prefix("noderef-install-").tempdir()?;
            (temp.path().join("node_modules"), Some(temp))
        }
    };

    let mut failures = match source {
        InstallSource::Existing(_) => BTreeMap::new(),
        InstallSource::Tarball => install_tarballs(&node_modules, packages, registry_url).await,
        InstallSource::Npm => {
            let project = temp.as_ref().map_or(node_modules.as_path(), TempDir::path);
            install_with_npm(project, packages, registry_url).await
        }
    };

    for pkg in packages {
        if failures.contains_key(&pkg.name) {
            continue;
        }
        let dir = paths::package_dir(&node_modules, &pkg.name);
        if !dir.join("package.json").is_file() {
            failures.insert(pkg.name.clone(), PkgError::not_found(&pkg.name));
        }
    }

    for (name, err) in &failures {
        warn!(package = %name, code = err.code(), error = %err.message(), "Package unavailable");
    }
    info!(
        node_modules = %node_modules.display(),
        installed = packages.len() - failures.len(),
        failed = failures.len(),
        temporary = temp.is_some(),
        "Plugin packages ready"
    );

    Ok(InstalledPackages {
        node_modules,
        failures,
        temp_dir: temp,
    })
}

async fn install_tarballs(
    node_modules: &Path,
    packages: &[PluginPackage],
    registry_url: &str,
) -> BTreeMap<String, PkgError> {
    let registry = match RegistryClient::new(registry_url) {
        Ok(registry) => registry,
        Err(e) => {
            return packages
                .iter()
                .map(|p| (p.name.clone(), e.clone()))
                .collect();
        }
    };

    let results = futures::future::join_all(
        packages
            .iter()
            .map(|pkg| install_tarball(&registry, node_modules, pkg)),
    )
    .await;

    packages
        .iter()
        .zip(results)
        .filter_map(|(pkg, result)| result.err().map(|e| (pkg.name.clone(), e)))
        .collect()
}

async fn install_tarball(
    registry: &RegistryClient,
    node_modules: &Path,
    pkg: &PluginPackage,
) -> Result<(), PkgError> {
    let packument = registry.fetch_packument(&pkg.name).await?;
    let version = resolve_version(&packument, pkg.range.as_deref())?;
    let tarball_url = get_tarball_url(&packument, &version).ok_or_else(|| {
        PkgError::registry(format!("No tarball URL for {}@{version}", pkg.name))
    })?;

    debug!(package = %pkg.name, version = %version, url = %tarball_url, "Downloading tarball");
    let bytes = download_tarball(registry.http(), tarball_url, MAX_TARBALL_SIZE).await?;
    debug!(package = %pkg.name, size = bytes.len(), "Downloaded tarball");

    let dest = paths::package_dir(node_modules, &pkg.name);
    tokio::task::spawn_blocking(move || extract_package(&bytes, &dest))
        .await
        .map_err(|e| PkgError::extract_failed(format!("Extraction task failed: {e}")))??;

    debug!(package = %pkg.name, version = %version, "Extracted package");
    Ok(())
}

/// Run `npm install` in `project` so packages arrive with their dependencies.
async fn install_with_npm(
    project: &Path,
    packages: &[PluginPackage],
    registry_url: &str,
) -> BTreeMap<String, PkgError> {
    let fail_all = |err: PkgError| -> BTreeMap<String, PkgError> {
        packages
            .iter()
            .map(|p| (p.name.clone(), err.clone()))
            .collect()
    };

    let npm = match which::which("npm") {
        Ok(path) => path,
        Err(e) => return fail_all(PkgError::install_failed(format!("npm not found: {e}"))),
    };

    // Without a package.json npm walks up looking for a project root.
    if let Err(e) = std::fs::write(project.join("package.json"), "{\"private\":true}\n") {
        return fail_all(e.into());
    }

    let specs: Vec<String> = packages
        .iter()
        .map(|p| match &p.range {
            Some(range) => format!("{}@{range}", p.name),
            None => p.name.clone(),
        })
        .collect();

    debug!(npm = %npm.display(), specs = ?specs, "Running npm install");
    let output = Command::new(&npm)
        .args([
            "install",
            "--no-save",
            "--no-package-lock",
            "--ignore-scripts",
            "--no-audit",
            "--no-fund",
            "--registry",
            registry_url,
        ])
        .args(&specs)
        .current_dir(project)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => BTreeMap::new(),
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty());
            fail_all(PkgError::install_failed(format!(
                "npm install exited with {}: {}",
                output.status,
                last_line.unwrap_or("no output")
            )))
        }
        Err(e) => fail_all(PkgError::install_failed(format!(
            "Failed to run npm: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_existing_dir_reports_missing_packages() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("n8n-nodes-base");
        fs::create_dir_all(&base).unwrap();
        fs::write(base.join("package.json"), "{}").unwrap();

        let packages = vec![
            PluginPackage::new("n8n-nodes-base"),
            PluginPackage::new("@n8n/n8n-nodes-langchain"),
        ];
        let installed = install_packages(
            &InstallSource::Existing(dir.path().to_path_buf()),
            &packages,
            "http://127.0.0.1:9/",
        )
        .await
        .unwrap();

        assert!(!installed.is_temporary());
        assert!(installed.failure("n8n-nodes-base").is_none());
        assert_eq!(
            installed.failure("@n8n/n8n-nodes-langchain").map(PkgError::code),
            Some(super::super::error::codes::PKG_NOT_FOUND)
        );
        assert_eq!(
            installed.package_dir("@n8n/n8n-nodes-langchain"),
            dir.path().join("@n8n").join("n8n-nodes-langchain")
        );
    }

    #[tokio::test]
    async fn test_temp_install_removed_on_drop() {
        // Unreachable registry: every package fails, the temp dir still exists
        // until the value is dropped.
        let packages = vec![PluginPackage::new("n8n-nodes-base")];
        let installed = install_packages(&InstallSource::Tarball, &packages, "http://127.0.0.1:1/")
            .await
            .unwrap();

        assert!(installed.is_temporary());
        assert!(installed.failure("n8n-nodes-base").is_some());
        let root = installed.node_modules().parent().unwrap().to_path_buf();
        assert!(root.exists());

        drop(installed);
        assert!(!root.exists());
    }
}
