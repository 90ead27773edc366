//! Package version selection using semver.

use super::error::PkgError;
use super::registry::{get_latest_version, get_versions};
use semver::{Version, VersionReq};

/// Pick the package version to install from a packument.
///
/// # Rules
/// - `None`, `"latest"` or `"*"` selects `dist-tags.latest`
/// - an exact version is returned if published
/// - otherwise the highest published version satisfying the range wins;
///   `||` alternatives, hyphen ranges, x-ranges and space-separated
///   comparators follow npm's syntax
///
/// # Errors
/// Returns an error if the range is invalid or nothing satisfies it.
pub fn resolve_version(
    packument: &serde_json::Value,
    range: Option<&str>,
) -> Result<String, PkgError> {
    let name = packument
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    let range = match range.map(str::trim) {
        None | Some("" | "latest" | "*") => {
            return get_latest_version(packument)
                .map(String::from)
                .ok_or_else(|| PkgError::version_not_found(name, "latest"));
        }
        Some(range) => range,
    };

    let published = get_versions(packument);
    if published.contains(&range) {
        return Ok(range.to_string());
    }

    let reqs = range
        .split("||")
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .map(parse_range)
        .collect::<Result<Vec<_>, _>>()?;
    if reqs.is_empty() {
        return Err(PkgError::spec_invalid(format!(
            "Invalid version range '{range}'"
        )));
    }

    let mut candidates: Vec<Version> = published
        .iter()
        .filter_map(|v| Version::parse(v).ok())
        .collect();
    candidates.sort_by(|a, b| b.cmp(a));

    candidates
        .into_iter()
        .find(|v| reqs.iter().any(|req| req.matches(v)))
        .map(|v| v.to_string())
        .ok_or_else(|| PkgError::version_not_found(name, range))
}

/// Parse one `||` alternative into a semver requirement.
fn parse_range(range: &str) -> Result<VersionReq, PkgError> {
    let converted = if let Some((start, end)) = range.split_once(" - ") {
        format!(">={}, <={}", start.trim(), end.trim())
    } else if range.contains(['x', 'X']) {
        convert_x_range(range)
    } else {
        join_comparators(range)
    };

    VersionReq::parse(&converted)
        .map_err(|e| PkgError::spec_invalid(format!("Invalid version range '{range}': {e}")))
}

/// `1.x` → `>=1.0.0, <2.0.0`, `1.2.x` → `>=1.2.0, <1.3.0`.
fn convert_x_range(range: &str) -> String {
    let parts: Vec<&str> = range.trim().split('.').collect();
    let is_wild = |p: &str| matches!(p, "x" | "X" | "*");
    match parts.as_slice() {
        [major, minor, ..] if !is_wild(major) && !is_wild(minor) => {
            let minor_num: u64 = minor.parse().unwrap_or(0);
            format!(">={major}.{minor}.0, <{major}.{}.0", minor_num + 1)
        }
        [major, ..] if !is_wild(major) => {
            let major_num: u64 = major.parse().unwrap_or(0);
            format!(">={major}.0.0, <{}.0.0", major_num + 1)
        }
        _ => "*".to_string(),
    }
}

/// npm reads `>= 2.1.2 < 3.0.0` as an AND; semver wants `>=2.1.2, <3.0.0`.
fn join_comparators(range: &str) -> String {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op = String::new();

    for token in range.split_whitespace() {
        if token.chars().any(|c| c.is_ascii_digit()) {
            comparators.push(format!("{pending_op}{token}"));
            pending_op.clear();
        } else {
            pending_op.push_str(token);
        }
    }

    comparators.join(", ")
}
