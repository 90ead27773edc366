//! Cache writer.
//!
//! All three payloads are serialized up front; only then is anything
//! written, each file atomically. A failure part way leaves every artifact
//! either old or new, never truncated.

use crate::error::Error;
use crate::model::{CommunityIndexEntry, IndexDocument, OfficialIndexEntry, PropertyRecord};
use noderef_util::fs::atomic_write;
use noderef_util::hash::{blake3_bytes, blake3_file};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const OFFICIAL_INDEX_FILE: &str = "official-nodes.json";
pub const COMMUNITY_INDEX_FILE: &str = "community-nodes.json";
pub const PROPERTIES_LOG_FILE: &str = "node-properties.jsonl";

/// What the writer did to one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactReport {
    pub path: PathBuf,
    pub bytes: usize,
    pub digest: String,
    pub changed: bool,
}

/// Everything the writer persists in one run.
#[derive(Debug, Clone, Copy)]
pub struct CacheContents<'a> {
    pub official: &'a IndexDocument<OfficialIndexEntry>,
    pub community: &'a IndexDocument<CommunityIndexEntry>,
    pub properties: &'a [PropertyRecord],
}

/// Serialize and write all artifacts into `out_dir`.
///
/// # Errors
/// Returns `Error::Serialize` before touching the disk if any payload cannot
/// be encoded, and `Error::Write` if a file cannot be replaced.
pub fn write_cache(out_dir: &Path, contents: CacheContents<'_>) -> Result<Vec<ArtifactReport>, Error> {
    let payloads = [
        (OFFICIAL_INDEX_FILE, pretty_json(OFFICIAL_INDEX_FILE, contents.official)?),
        (COMMUNITY_INDEX_FILE, pretty_json(COMMUNITY_INDEX_FILE, contents.community)?),
        (PROPERTIES_LOG_FILE, json_lines(contents.properties)?),
    ];

    fs::create_dir_all(out_dir).map_err(|source| Error::Write {
        path: out_dir.to_path_buf(),
        source,
    })?;

    payloads
        .into_iter()
        .map(|(file, bytes)| write_artifact(&out_dir.join(file), &bytes))
        .collect()
}

fn write_artifact(path: &Path, bytes: &[u8]) -> Result<ArtifactReport, Error> {
    let digest = blake3_bytes(bytes);
    let previous = blake3_file(path).ok();
    let changed = previous.as_deref() != Some(digest.as_str());

    if changed {
        atomic_write(path, bytes).map_err(|source| Error::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), bytes = bytes.len(), "Wrote artifact");
    } else {
        debug!(path = %path.display(), "Artifact unchanged");
    }

    Ok(ArtifactReport {
        path: path.to_path_buf(),
        bytes: bytes.len(),
        digest,
        changed,
    })
}

/// Pretty-printed JSON with a trailing newline.
fn pretty_json<T: Serialize>(artifact: &'static str, value: &T) -> Result<Vec<u8>, Error> {
    let mut bytes =
        serde_json::to_vec_pretty(value).map_err(|source| Error::Serialize { artifact, source })?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// One compact JSON object per line.
fn json_lines(records: &[PropertyRecord]) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::new();
    for record in records {
        serde_json::to_writer(&mut bytes, record).map_err(|source| Error::Serialize {
            artifact: PROPERTIES_LOG_FILE,
            source,
        })?;
        bytes.push(b'\n');
    }
    Ok(bytes)
}
