//! Tarball download and extraction into a `node_modules` tree.

use super::error::PkgError;
use bytes::Bytes;
use flate2::read::GzDecoder;
use reqwest::Client;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tar::Archive;

/// Maximum tarball size (200 MB). `n8n-nodes-base` is well under half that.
pub const MAX_TARBALL_SIZE: u64 = 200 * 1024 * 1024;

/// Download timeout in seconds.
const DOWNLOAD_TIMEOUT_SECS: u64 = 120;

/// Download a tarball from a URL.
///
/// # Errors
/// Returns an error if the download fails or exceeds the size limit.
pub async fn download_tarball(client: &Client, url: &str, max_bytes: u64) -> Result<Bytes, PkgError> {
    let response = client
        .get(url)
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .send()
        .await
        .map_err(|e| PkgError::download_failed(format!("Failed to download '{url}': {e}")))?;

    if !response.status().is_success() {
        return Err(PkgError::download_failed(format!(
            "Download failed with status {} for '{url}'",
            response.status()
        )));
    }

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(PkgError::download_failed(format!(
                "Tarball too large: {len} bytes (max: {max_bytes})"
            )));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PkgError::download_failed(format!("Failed to read response body: {e}")))?;

    if bytes.len() as u64 > max_bytes {
        return Err(PkgError::download_failed(format!(
            "Tarball too large: {} bytes (max: {max_bytes})",
            bytes.len()
        )));
    }

    Ok(bytes)
}

/// Extract a package tarball so its contents land directly in `dest`.
///
/// npm tarballs wrap everything in one top-level directory (usually
/// `package/`). Extraction goes to a sibling staging directory first and the
/// wrapper directory is renamed onto `dest`, so a failed extraction never
/// leaves a half-populated package behind.
///
/// # Errors
/// Returns an error if the archive is invalid, contains unsafe paths, or
/// `dest` already exists.
pub fn extract_package(bytes: &[u8], dest: &Path) -> Result<(), PkgError> {
    let parent = dest
        .parent()
        .ok_or_else(|| PkgError::extract_failed("Destination has no parent"))?;
    fs::create_dir_all(parent)?;

    if dest.exists() {
        return Err(PkgError::extract_failed(format!(
            "Destination already exists: {}",
            dest.display()
        )));
    }

    let staging = parent.join(format!(
        ".staging-{}-{}",
        dest.file_name().and_then(|n| n.to_str()).unwrap_or("pkg"),
        std::process::id()
    ));
    if staging.exists() {
        let _ = fs::remove_dir_all(&staging);
    }
    fs::create_dir_all(&staging)?;

    let result = unpack_into(bytes, &staging)
        .and_then(|()| find_extracted_root(&staging))
        .and_then(|root| {
            fs::rename(&root, dest).map_err(|e| {
                PkgError::extract_failed(format!(
                    "Failed to move package into {}: {e}",
                    dest.display()
                ))
            })
        });

    let _ = fs::remove_dir_all(&staging);
    result
}

/// The single top-level directory of an unpacked tarball.
///
/// Most npm packages use `package/`, some (e.g. `@types/*`) use the bare name.
fn find_extracted_root(staging: &Path) -> Result<PathBuf, PkgError> {
    let package_dir = staging.join("package");
    if package_dir.is_dir() {
        return Ok(package_dir);
    }

    let dirs: Vec<PathBuf> = fs::read_dir(staging)
        .map_err(|e| PkgError::extract_failed(format!("Failed to read extracted dir: {e}")))?
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();

    match dirs.as_slice() {
        [only] => Ok(only.clone()),
        [] => Err(PkgError::extract_failed(
            "Tarball does not contain any top-level directory",
        )),
        more => Err(PkgError::extract_failed(format!(
            "Tarball contains {} top-level directories, expected 1",
            more.len()
        ))),
    }
}

fn unpack_into(bytes: &[u8], dest: &Path) -> Result<(), PkgError> {
    let mut archive = Archive::new(GzDecoder::new(bytes));

    let entries = archive
        .entries()
        .map_err(|e| PkgError::extract_failed(format!("Failed to read tarball entries: {e}")))?;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| PkgError::extract_failed(format!("Failed to read tarball entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| PkgError::extract_failed(format!("Failed to read entry path: {e}")))?
            .into_owned();

        if path.is_absolute()
            || path
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(PkgError::extract_failed(format!(
                "Tarball entry escapes destination: {}",
                path.display()
            )));
        }

        let dest_path = dest.join(&path);
        let entry_type = entry.header().entry_type();

        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry_type.is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&dest_path)?;
            io::copy(&mut entry, &mut file)?;
        }
        // Symlinks and special entries are skipped: nothing here needs them.
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tar::Builder;
    use tempfile::tempdir;

    /// Build a gzipped tarball from `(path, contents)` pairs.
    pub(crate) fn tgz(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = Builder::new(&mut tar_bytes);
            for (path, data) in files {
                let mut header = tar::Header::new_gnu();
                header.set_path(path).unwrap();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append(&header, *data).unwrap();
            }
            builder.finish().unwrap();
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_extract_strips_package_prefix() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("node_modules").join("n8n-nodes-base");

        let bytes = tgz(&[
            ("package/package.json", br#"{"name":"n8n-nodes-base"}"#),
            ("package/dist/nodes/Slack/Slack.node.js", b"module.exports = {};"),
        ]);
        extract_package(&bytes, &dest).unwrap();

        assert!(dest.join("package.json").is_file());
        assert!(dest.join("dist/nodes/Slack/Slack.node.js").is_file());
        // Staging directory is gone.
        let leftovers: Vec<_> = fs::read_dir(dest.parent().unwrap()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_extract_non_package_prefix() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("types-node");

        let bytes = tgz(&[("node/index.d.ts", b"export {};")]);
        extract_package(&bytes, &dest).unwrap();
        assert!(dest.join("index.d.ts").exists());
    }

    #[test]
    fn test_reject_empty_tarball() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("empty");

        let err = extract_package(&tgz(&[]), &dest).unwrap_err();
        assert_eq!(err.code(), super::super::error::codes::PKG_EXTRACT_FAILED);
        assert!(!dest.exists());
    }

    #[test]
    fn test_reject_existing_destination() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("pkg");
        fs::create_dir_all(&dest).unwrap();

        let bytes = tgz(&[("package/index.js", b"")]);
        assert!(extract_package(&bytes, &dest).is_err());
    }
}
