//! npm registry client, used to materialize plugin packages from tarballs.

use super::error::PkgError;
use crate::version::user_agent;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Environment variable to override registry URL.
pub const REGISTRY_ENV: &str = "NODEREF_NPM_REGISTRY";

/// Registry client for fetching package metadata.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: Client,
}

impl RegistryClient {
    /// Create a new registry client with the given base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn new(base_url: &str) -> Result<Self, PkgError> {
        // `Url::join` drops the last path segment unless the base ends with '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| PkgError::registry(format!("Invalid registry URL '{base_url}': {e}")))?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent())
            .build()
            .map_err(|e| PkgError::registry(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the HTTP client (for reuse in tarball downloads).
    #[must_use]
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Fetch the packument (package metadata) for a package.
    ///
    /// # Errors
    /// Returns an error if the request fails or the package is not found.
    pub async fn fetch_packument(&self, name: &str) -> Result<serde_json::Value, PkgError> {
        let url = self
            .base_url
            .join(&encode_package_name(name))
            .map_err(|e| PkgError::registry(format!("Failed to build URL for '{name}': {e}")))?;

        let response = self.http.get(url.as_str()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PkgError::not_found(name));
        }

        if !response.status().is_success() {
            return Err(PkgError::registry(format!(
                "Registry returned status {} for '{name}'",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

/// Scoped names travel as a single path segment: `@n8n%2Fn8n-nodes-langchain`.
fn encode_package_name(name: &str) -> String {
    if name.starts_with('@') {
        name.replace('/', "%2F")
    } else {
        name.to_string()
    }
}

/// Extract the latest version from a packument.
#[must_use]
pub fn get_latest_version(packument: &serde_json::Value) -> Option<&str> {
    packument.get("dist-tags")?.get("latest")?.as_str()
}

/// Extract the tarball URL for a specific version.
#[must_use]
pub fn get_tarball_url<'a>(packument: &'a serde_json::Value, version: &str) -> Option<&'a str> {
    packument
        .get("versions")?
        .get(version)?
        .get("dist")?
        .get("tarball")?
        .as_str()
}

/// Get all available version strings from a packument.
#[must_use]
pub fn get_versions(packument: &serde_json::Value) -> Vec<&str> {
    packument
        .get("versions")
        .and_then(|v| v.as_object())
        .map(|obj| obj.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scoped_name() {
        assert_eq!(
            encode_package_name("@n8n/n8n-nodes-langchain"),
            "@n8n%2Fn8n-nodes-langchain"
        );
        assert_eq!(encode_package_name("n8n-nodes-base"), "n8n-nodes-base");
    }

    #[test]
    fn test_get_latest_and_tarball() {
        let packument = serde_json::json!({
            "name": "n8n-nodes-base",
            "dist-tags": {"latest": "1.80.1"},
            "versions": {
                "1.80.1": {"dist": {"tarball": "https://registry.npmjs.org/n8n-nodes-base/-/n8n-nodes-base-1.80.1.tgz"}},
                "1.79.0": {}
            }
        });

        assert_eq!(get_latest_version(&packument), Some("1.80.1"));
        assert_eq!(
            get_tarball_url(&packument, "1.80.1"),
            Some("https://registry.npmjs.org/n8n-nodes-base/-/n8n-nodes-base-1.80.1.tgz")
        );
        assert_eq!(get_tarball_url(&packument, "1.79.0"), None);
        assert_eq!(get_versions(&packument).len(), 2);
    }

    #[test]
    fn test_client_base_gets_trailing_slash() {
        let client = RegistryClient::new("http://127.0.0.1:4873/npm").unwrap();
        assert_eq!(client.base_url().as_str(), "http://127.0.0.1:4873/npm/");
    }

    #[test]
    fn test_client_invalid_url() {
        assert!(RegistryClient::new("not-a-url").is_err());
    }
}
