use crate::error::Error;
use crate::paths;
use crate::pkg::registry::{DEFAULT_REGISTRY, REGISTRY_ENV};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Name of the optional project-level config file.
pub const CONFIG_FILE_NAME: &str = "noderef.json";

/// Official (vendor-maintained) node catalog.
pub const DEFAULT_OFFICIAL_URL: &str = "https://api.n8n.io/api/nodes";

/// Community (third-party) node catalog.
pub const DEFAULT_COMMUNITY_URL: &str = "https://api.n8n.io/api/community-nodes";

/// Records requested per official catalog page.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PROBE_CONCURRENCY: usize = 8;

/// Environment variable overrides.
pub const OFFICIAL_URL_ENV: &str = "NODEREF_OFFICIAL_URL";
pub const COMMUNITY_URL_ENV: &str = "NODEREF_COMMUNITY_URL";
pub const OUT_DIR_ENV: &str = "NODEREF_OUT_DIR";

/// Runtime configuration for the noderef CLI process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }
}

/// An installed plugin package whose node files are scanned for versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginPackage {
    /// npm package name, also the prefix of every node type identifier it ships.
    pub name: String,

    /// Semver range to install; `None` means `dist-tags.latest`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
}

impl PluginPackage {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            range: None,
        }
    }

    #[must_use]
    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }
}

/// The fixed package-iteration order: core nodes first, then the AI nodes.
#[must_use]
pub fn default_packages() -> Vec<PluginPackage> {
    vec![
        PluginPackage::new("n8n-nodes-base"),
        PluginPackage::new("@n8n/n8n-nodes-langchain"),
    ]
}

/// Where the plugin packages come from for the duration of a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InstallSource {
    /// Download registry tarballs into a temp `node_modules`. No dependencies.
    #[default]
    Tarball,
    /// Run `npm install` in a temp directory, dependencies included.
    Npm,
    /// Use an already populated `node_modules` directory as-is.
    Existing(PathBuf),
}

/// Pipeline configuration for one refresh run.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub official_url: String,
    pub community_url: String,
    pub page_size: u32,
    pub out_dir: PathBuf,
    pub packages: Vec<PluginPackage>,
    pub install: InstallSource,
    pub npm_registry: String,
    /// Try loading node files with `node` before falling back to text scanning.
    pub dynamic: bool,
    pub node_binary: Option<PathBuf>,
    pub probe_timeout: Duration,
    pub probe_concurrency: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            official_url: DEFAULT_OFFICIAL_URL.to_string(),
            community_url: DEFAULT_COMMUNITY_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            out_dir: paths::default_out_dir(),
            packages: default_packages(),
            install: InstallSource::default(),
            npm_registry: DEFAULT_REGISTRY.to_string(),
            dynamic: true,
            node_binary: None,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
        }
    }
}

/// Contents of `noderef.json`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
    pub official_url: Option<String>,
    pub community_url: Option<String>,
    pub page_size: Option<u32>,
    pub out_dir: Option<PathBuf>,
    pub packages: Option<Vec<PluginPackage>>,
    pub packages_dir: Option<PathBuf>,
    pub npm_install: Option<bool>,
    pub npm_registry: Option<String>,
    pub dynamic: Option<bool>,
    pub node_binary: Option<PathBuf>,
    pub probe_timeout_secs: Option<u64>,
    pub probe_concurrency: Option<usize>,
}

impl ConfigFile {
    /// Read and parse a config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid config JSON.
    pub fn read(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl RefreshConfig {
    /// Build the config for a run started in `cwd`: defaults, then
    /// `noderef.json` at the project root, then environment variables.
    ///
    /// # Errors
    /// Returns an error if a config file exists but cannot be read or parsed.
    pub fn load(cwd: &Path) -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(root) = paths::project_root(cwd) {
            let file_path = root.join(CONFIG_FILE_NAME);
            if file_path.is_file() {
                let file = ConfigFile::read(&file_path)?;
                config.apply_file(file, &root);
            }
        }

        config.apply_env_with(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay values from a config file. Relative paths resolve against `base`.
    pub fn apply_file(&mut self, file: ConfigFile, base: &Path) {
        if let Some(url) = file.official_url {
            self.official_url = url;
        }
        if let Some(url) = file.community_url {
            self.community_url = url;
        }
        if let Some(size) = file.page_size {
            self.page_size = size;
        }
        if let Some(dir) = file.out_dir {
            self.out_dir = base.join(dir);
        }
        if let Some(packages) = file.packages {
            self.packages = packages;
        }
        if let Some(dir) = file.packages_dir {
            self.install = InstallSource::Existing(base.join(dir));
        } else if file.npm_install == Some(true) {
            self.install = InstallSource::Npm;
        }
        if let Some(registry) = file.npm_registry {
            self.npm_registry = registry;
        }
        if let Some(dynamic) = file.dynamic {
            self.dynamic = dynamic;
        }
        if let Some(node) = file.node_binary {
            self.node_binary = Some(base.join(node));
        }
        if let Some(secs) = file.probe_timeout_secs {
            self.probe_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = file.probe_concurrency {
            self.probe_concurrency = n;
        }
    }

    /// Overlay environment variables, read through `lookup`.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(OFFICIAL_URL_ENV) {
            self.official_url = url;
        }
        if let Some(url) = lookup(COMMUNITY_URL_ENV) {
            self.community_url = url;
        }
        if let Some(registry) = lookup(REGISTRY_ENV) {
            self.npm_registry = registry;
        }
        if let Some(dir) = lookup(OUT_DIR_ENV) {
            self.out_dir = PathBuf::from(dir);
        }
    }

    /// Check values that would otherwise fail deep inside the pipeline.
    ///
    /// # Errors
    /// Returns `Error::ConfigInvalid` describing the first bad value.
    pub fn validate(&self) -> Result<(), Error> {
        for (label, value) in [
            ("official catalog URL", &self.official_url),
            ("community catalog URL", &self.community_url),
            ("npm registry URL", &self.npm_registry),
        ] {
            Url::parse(value)
                .map_err(|e| Error::ConfigInvalid(format!("{label} '{value}': {e}")))?;
        }
        if self.page_size == 0 {
            return Err(Error::ConfigInvalid("page size must be at least 1".into()));
        }
        if self.probe_concurrency == 0 {
            return Err(Error::ConfigInvalid(
                "probe concurrency must be at least 1".into(),
            ));
        }
        if let Some(pkg) = self.packages.iter().find(|p| p.name.trim().is_empty()) {
            return Err(Error::ConfigInvalid(format!(
                "package name must not be empty (range: {:?})",
                pkg.range
            )));
        }
        Ok(())
    }
}
