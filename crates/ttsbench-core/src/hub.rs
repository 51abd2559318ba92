//! Remote model repository client.
//!
//! Two endpoints are consumed:
//! - listing: `<endpoint>/api/models/<repo>/revision/<revision>` returning
//!   `{"siblings": [{"rfilename": "..."}]}`
//! - file resolve: `<endpoint>/<repo>/resolve/<revision>/<path>`, with
//!   `Range: bytes=<k>-` for resumed transfers

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, RANGE};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{BenchError, BenchResult};

/// Public Hugging Face endpoint
pub const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";

/// User agent sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!("ttsbench/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of a repository's full file listing
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepoListing: Send + Sync {
    /// Every file path in `repo` at `revision`, sorted and unique
    async fn list_files(&self, repo: &str, revision: &str) -> BenchResult<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    #[serde(default)]
    siblings: Vec<Sibling>,
}

#[derive(Debug, Deserialize)]
struct Sibling {
    rfilename: String,
}

/// HTTP client for the model hub, constructed once and owned by the caller
#[derive(Debug, Clone)]
pub struct HubClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HubClient {
    /// Create a client for `endpoint`
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, user_agent: &str) -> BenchResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BenchError::network(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, endpoint))
    }

    /// Wrap an existing `reqwest` client
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self { client, endpoint }
    }

    /// Base URL requests are made against
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Deterministic download URL of one file
    #[must_use]
    pub fn resolve_url(&self, repo: &str, revision: &str, relative: &str) -> String {
        format!("{}/{repo}/resolve/{revision}/{relative}", self.endpoint)
    }

    /// Listing URL of a repository at a revision
    #[must_use]
    pub fn listing_url(&self, repo: &str, revision: &str) -> String {
        format!("{}/api/models/{repo}/revision/{revision}", self.endpoint)
    }

    /// Start a GET for `url`, asking for bytes from `resume_from` onwards when non-zero
    ///
    /// # Errors
    ///
    /// Returns a network error when the request cannot be sent. Status codes
    /// are left for the caller to interpret.
    pub async fn fetch(&self, url: &str, resume_from: u64) -> BenchResult<reqwest::Response> {
        let mut request = self.client.get(url);
        if resume_from > 0 {
            let range = HeaderValue::from_str(&format!("bytes={resume_from}-"))
                .map_err(|e| BenchError::download(url, e.to_string()))?;
            request = request.header(RANGE, range);
            info!("Resuming {} from byte {}", url, resume_from);
        }
        request
            .send()
            .await
            .map_err(|e| BenchError::network(format!("Request to {url} failed: {e}")))
    }
}

#[async_trait]
impl RepoListing for HubClient {
    async fn list_files(&self, repo: &str, revision: &str) -> BenchResult<Vec<String>> {
        let url = self.listing_url(repo, revision);
        debug!("Listing {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BenchError::resolve(repo, format!("listing request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BenchError::resolve(repo, format!("listing returned HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| BenchError::resolve(repo, format!("failed to read listing: {e}")))?;
        if body.is_empty() {
            return Err(BenchError::resolve(repo, "listing returned an empty body"));
        }

        let info: RepoInfo = serde_json::from_slice(&body)
            .map_err(|e| BenchError::resolve(repo, format!("invalid listing JSON: {e}")))?;

        let files: BTreeSet<String> = info
            .siblings
            .into_iter()
            .map(|s| s.rfilename)
            .filter(|name| !name.is_empty())
            .collect();
        info!("Listed {} files in {}@{}", files.len(), repo, revision);
        Ok(files.into_iter().collect())
    }
}
