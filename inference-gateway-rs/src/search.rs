// inference-gateway-rs/src/search.rs
//
// Web search through a SearXNG-compatible JSON endpoint.

use std::time::Duration;

use async_trait::async_trait;
use resilience::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A single `{title, url}` source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns results in ranking order; `timeout` bounds the whole request.
    async fn search(&self, query: &str, timeout: Duration) -> Result<Vec<SearchResult>>;
}

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxResult>,
}

#[derive(Debug, Deserialize)]
struct SearxResult {
    title: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearxSearch {
    client: reqwest::Client,
    endpoint_template: String,
}

impl SearxSearch {
    /// `endpoint_template` must contain a `{query}` placeholder
    pub fn new(endpoint_template: impl Into<String>) -> Result<Self> {
        let endpoint_template = endpoint_template.into();
        if !endpoint_template.contains("{query}") {
            return Err(Error::new(
                ErrorKind::Initialization,
                format!("Search endpoint template has no {{query}} placeholder: {}", endpoint_template),
            ));
        }

        let client = reqwest::Client::builder().build().map_err(|e| {
            Error::new(ErrorKind::Initialization, format!("Failed to build search HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            endpoint_template,
        })
    }

    pub fn request_url(&self, query: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        self.endpoint_template.replace("{query}", &encoded)
    }
}

#[async_trait]
impl SearchProvider for SearxSearch {
    async fn search(&self, query: &str, timeout: Duration) -> Result<Vec<SearchResult>> {
        let url = self.request_url(query);
        debug!(timeout_secs = timeout.as_secs(), "Querying search endpoint");

        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::from(e).service("search"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::new(ErrorKind::External, format!("Search endpoint returned {}", status))
                .service("search")
                .context("status", status.as_u16()));
        }

        let body: SearxResponse = response.json().await.map_err(|e| Error::from(e).service("search"))?;

        Ok(body
            .results
            .into_iter()
            .map(|r| SearchResult {
                title: r.title.unwrap_or_default(),
                url: r.url.unwrap_or_default(),
            })
            .collect())
    }
}
