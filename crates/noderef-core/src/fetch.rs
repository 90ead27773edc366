//! Paginated catalog fetcher.
//!
//! The official catalog is paginated Strapi-style:
//! `GET <base>?pagination[pageSize]=500&pagination[page]=N` returns
//! `{ data: [...], meta: { pagination: { pageCount } } }`. The community
//! catalog is a single unpaginated `{ data: [...] }` document.
//!
//! Any transport or decoding failure is fatal for the run: a truncated
//! catalog must never replace a complete cache.

use crate::error::Error;
use crate::model::RawNodeRecord;
use crate::version::user_agent;
use futures::future::try_join_all;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Upper bound on `pageCount` accepted from a catalog.
pub const MAX_PAGES: u32 = 1000;

/// All records of one catalog plus where they came from.
#[derive(Debug, Clone)]
pub struct FetchedCatalog {
    pub source: String,
    pub pages: u32,
    pub records: Vec<RawNodeRecord>,
}

/// HTTP client for the node catalogs.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: Client,
}

impl CatalogClient {
    /// Create a catalog client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, Error> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .user_agent(user_agent())
            .build()
            .map_err(|e| Error::other(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Fetch every page of the official catalog.
    ///
    /// Page 1 is fetched alone to learn the page count; the remaining pages
    /// are fetched concurrently and concatenated in page order.
    ///
    /// # Errors
    /// Returns `Error::Transport` if any page fails.
    pub async fn fetch_official(
        &self,
        base_url: &str,
        page_size: u32,
    ) -> Result<FetchedCatalog, Error> {
        let base = parse_base(base_url)?;

        let first_url = page_url(&base, page_size, 1);
        let first = self.get_json(&first_url).await?;
        let pages = page_count(&first);
        if pages > MAX_PAGES {
            return Err(Error::transport(
                first_url.as_str(),
                format!("catalog reports {pages} pages (max {MAX_PAGES})"),
            ));
        }
        let mut records = records_of(&first, &first_url)?;
        debug!(url = %first_url, page = 1, pages, records = records.len(), "Fetched page");

        let rest = try_join_all((2..=pages).map(|page| {
            let url = page_url(&base, page_size, page);
            async move {
                let doc = self.get_json(&url).await?;
                let page_records = records_of(&doc, &url)?;
                debug!(url = %url, page, records = page_records.len(), "Fetched page");
                Ok::<_, Error>(page_records)
            }
        }))
        .await?;
        records.extend(rest.into_iter().flatten());

        info!(source = %base_url, pages, records = records.len(), "Fetched official catalog");
        Ok(FetchedCatalog {
            source: base_url.to_string(),
            pages,
            records,
        })
    }

    /// Fetch the (unpaginated) community catalog.
    ///
    /// # Errors
    /// Returns `Error::Transport` if the request or decoding fails.
    pub async fn fetch_community(&self, url: &str) -> Result<FetchedCatalog, Error> {
        let parsed = parse_base(url)?;
        let doc = self.get_json(&parsed).await?;
        let records = records_of(&doc, &parsed)?;

        info!(source = %url, records = records.len(), "Fetched community catalog");
        Ok(FetchedCatalog {
            source: url.to_string(),
            pages: 1,
            records,
        })
    }

    async fn get_json(&self, url: &Url) -> Result<Value, Error> {
        let response = self
            .http
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| Error::transport(url.as_str(), describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(url.as_str(), format!("status {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::transport(url.as_str(), format!("invalid JSON: {e}")))
    }
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}

fn parse_base(url: &str) -> Result<Url, Error> {
    Url::parse(url).map_err(|e| Error::transport(url, format!("invalid URL: {e}")))
}

/// `base` with the Strapi pagination parameters appended.
#[must_use]
pub fn page_url(base: &Url, page_size: u32, page: u32) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("pagination[pageSize]", &page_size.to_string())
        .append_pair("pagination[page]", &page.to_string());
    url
}

/// `meta.pagination.pageCount`, defaulting to a single page.
#[must_use]
pub fn page_count(doc: &Value) -> u32 {
    doc.pointer("/meta/pagination/pageCount")
        .and_then(Value::as_u64)
        .map_or(1, |n| u32::try_from(n).unwrap_or(u32::MAX))
        .max(1)
}

fn records_of(doc: &Value, url: &Url) -> Result<Vec<RawNodeRecord>, Error> {
    doc.get("data")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(RawNodeRecord::from_value).collect())
        .ok_or_else(|| Error::transport(url.as_str(), "response has no `data` array"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_url_appends_pagination() {
        let base = Url::parse("https://api.n8n.io/api/nodes").unwrap();
        let url = page_url(&base, 500, 2);
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("pagination[pageSize]".to_string(), "500".to_string()),
                ("pagination[page]".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(&json!({"meta": {"pagination": {"pageCount": 3}}})), 3);
        assert_eq!(page_count(&json!({"meta": {"pagination": {"pageCount": 0}}})), 1);
        assert_eq!(page_count(&json!({"data": []})), 1);
    }

    #[test]
    fn test_records_require_data_array() {
        let url = Url::parse("http://localhost/api/nodes").unwrap();
        let err = records_of(&json!({"error": "nope"}), &url).unwrap_err();
        assert!(err.is_transport());

        let records = records_of(&json!({"data": [{"name": "a"}, {"name": "b"}]}), &url).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_transport_error() {
        let client = CatalogClient::new().unwrap();
        let err = client
            .fetch_official("http://127.0.0.1:1/api/nodes", 500)
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("127.0.0.1:1"));
    }
}
