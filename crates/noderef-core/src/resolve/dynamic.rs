//! Dynamic version probe.
//!
//! Each node file is loaded by a fresh `node` process running a fixed probe
//! script. The installed code is arbitrary, so nothing it does can leak into
//! this process: console output is silenced inside the child, stdin is
//! closed, stderr is discarded, and the child is killed if the probe times
//! out or the refresh is cancelled.

use super::ExtractError;
use crate::model::NodeVersion;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Prefix of the single line the probe script reports on.
pub const PROBE_MARKER: &str = "@@noderef-probe@@";

const PROBE_SCRIPT: &str = r#"
for (const m of ['log', 'info', 'warn', 'error', 'debug', 'trace', 'dir']) console[m] = () => {};
let found = null;
try {
  const mod = require(process.argv[1]);
  const exported = typeof mod === 'function' ? [mod] : Object.values(mod || {});
  for (const Ctor of exported) {
    if (typeof Ctor !== 'function') continue;
    let instance;
    try { instance = new Ctor(); } catch (e) { continue; }
    const d = instance && instance.description;
    if (!d || typeof d.name !== 'string' || d.name === '') continue;
    let version = d.defaultVersion;
    if (typeof version !== 'number') {
      const all = (Array.isArray(d.version) ? d.version : [d.version]).filter((v) => typeof v === 'number');
      version = all.length ? Math.max(...all) : null;
    }
    if (typeof version === 'number') { found = { name: d.name, version }; break; }
  }
} catch (e) {}
process.stdout.write('\n@@noderef-probe@@' + JSON.stringify(found) + '\n', () => process.exit(0));
"#;

/// A node description read from a loaded module.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeHit {
    pub name: String,
    pub version: NodeVersion,
}

/// Runs the probe script with a specific `node` binary.
#[derive(Debug, Clone)]
pub struct NodeProbe {
    node: PathBuf,
    timeout: Duration,
}

impl NodeProbe {
    #[must_use]
    pub fn new(node: PathBuf, timeout: Duration) -> Self {
        Self { node, timeout }
    }

    /// Find a usable `node`: the explicit path if it exists, else `node` on PATH.
    #[must_use]
    pub fn locate(explicit: Option<&Path>, timeout: Duration) -> Option<Self> {
        let node = match explicit {
            Some(path) => path.is_file().then(|| path.to_path_buf()),
            None => which::which("node").ok(),
        }?;
        Some(Self::new(node, timeout))
    }

    #[must_use]
    pub fn node(&self) -> &Path {
        &self.node
    }

    /// Load `file` in a child process and read its description.
    ///
    /// # Errors
    /// Returns `Timeout` if the child outlives the probe timeout and `Probe`
    /// if it reports no usable description.
    pub async fn probe(&self, file: &Path) -> Result<ProbeHit, ExtractError> {
        let file = dunce::canonicalize(file)?;
        let dir = file.parent().unwrap_or_else(|| Path::new("."));

        let mut cmd = Command::new(&self.node);
        cmd.arg("-e")
            .arg(PROBE_SCRIPT)
            .arg(&file)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ExtractError::Timeout(self.timeout))?
            .map_err(|e| ExtractError::Probe(format!("failed to run node: {e}")))?;

        debug!(file = %file.display(), status = %output.status, "Probe finished");
        parse_probe_output(&output.stdout)
    }
}

/// Read the last marker line from probe stdout.
///
/// # Errors
/// Returns `Probe` if there is no marker line, the payload is not JSON, or
/// the module exposed no description with a name and numeric version.
pub fn parse_probe_output(stdout: &[u8]) -> Result<ProbeHit, ExtractError> {
    let text = String::from_utf8_lossy(stdout);
    let payload = text
        .lines()
        .rev()
        .find_map(|line| line.trim_end().strip_prefix(PROBE_MARKER))
        .ok_or_else(|| ExtractError::Probe("module produced no probe result".to_string()))?;

    let value: Value = serde_json::from_str(payload)
        .map_err(|e| ExtractError::Probe(format!("invalid probe result: {e}")))?;
    if value.is_null() {
        return Err(ExtractError::Probe(
            "no exported class exposes a named description".to_string(),
        ));
    }

    let name = value
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or(ExtractError::NoName)?;
    let version = value
        .get("version")
        .and_then(NodeVersion::from_value)
        .ok_or(ExtractError::NoVersion)?;

    Ok(ProbeHit {
        name: name.to_string(),
        version,
    })
}
