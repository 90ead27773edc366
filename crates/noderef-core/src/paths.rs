use crate::version::SCHEMA_VERSION;
use std::path::{Path, PathBuf};

/// Find the project root by walking up from `cwd` looking for `package.json` or `.git`.
///
/// Returns the first directory containing either marker, or `None` if neither is found.
#[must_use]
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join("package.json").exists() || current.join(".git").exists() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Get the data directory for noderef.
///
/// Uses platform-appropriate locations with versioning:
/// - Linux: `$XDG_DATA_HOME/noderef/v{N}` or `~/.local/share/noderef/v{N}`
/// - macOS: `~/Library/Application Support/noderef/v{N}`
/// - Windows: `%APPDATA%\noderef\v{N}`
#[must_use]
pub fn data_dir() -> PathBuf {
    let base = dirs_next::data_dir().map_or_else(
        || {
            dirs_next::home_dir().map_or_else(
                || PathBuf::from(".noderef-data"),
                |p| p.join(".local").join("share").join("noderef"),
            )
        },
        |p| p.join("noderef"),
    );

    base.join(format!("v{SCHEMA_VERSION}"))
}

/// Default directory the three cache artifacts are written to.
#[must_use]
pub fn default_out_dir() -> PathBuf {
    data_dir().join("nodes")
}

/// Location of a package inside a `node_modules` tree.
///
/// Scoped names keep their scope directory: `@n8n/n8n-nodes-langchain`
/// lives at `node_modules/@n8n/n8n-nodes-langchain`.
#[must_use]
pub fn package_dir(node_modules: &Path, name: &str) -> PathBuf {
    name.split('/')
        .fold(node_modules.to_path_buf(), |dir, part| dir.join(part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_project_root_finds_package_json() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(project_root(&nested), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_default_out_dir_is_versioned() {
        let out = default_out_dir();
        assert!(out.ends_with("nodes"));
        assert!(out
            .to_string_lossy()
            .contains(&format!("v{SCHEMA_VERSION}")));
    }

    #[test]
    fn test_package_dir_scoped() {
        let root = Path::new("/tmp/nm");
        assert_eq!(
            package_dir(root, "@n8n/n8n-nodes-langchain"),
            Path::new("/tmp/nm/@n8n/n8n-nodes-langchain")
        );
        assert_eq!(
            package_dir(root, "n8n-nodes-base"),
            Path::new("/tmp/nm/n8n-nodes-base")
        );
    }
}
