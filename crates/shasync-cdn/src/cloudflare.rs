//! Cloudflare cache purge client
//!
//! Purges files by URL through the v4 API:
//!
//! ```text
//! POST {api_base}/zones/{zone_id}/purge_cache
//! X-Auth-Email: ...
//! X-Auth-Key: ...
//!
//! {"files": ["https://example.com/a.html", ...]}
//! ```
//!
//! The API accepts a bounded number of files per call, so paths are split
//! into batches that are sent concurrently.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use shasync_cdn::{CloudflareCdn, CloudflareCredentials};
//! use shasync_core::ports::ICdnService;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let credentials = CloudflareCredentials::new("ops@example.com", "api-key");
//! let cdn = CloudflareCdn::new("zone-id", "https://example.com", credentials);
//! cdn.invalidate(&["/index.html".to_string()]).await?;
//! # Ok(())
//! # }
//! ```

use futures_util::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shasync_core::config::{DEFAULT_CLOUDFLARE_API_BASE, DEFAULT_PURGE_BATCH_SIZE};
use shasync_core::ports::ICdnService;
use tracing::{debug, error, info, instrument};

use crate::CdnError;

// ============================================================================
// API types
// ============================================================================

#[derive(Debug, Serialize)]
struct PurgeRequest<'a> {
    files: &'a [String],
}

#[derive(Debug, Default, Deserialize)]
struct PurgeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    #[serde(default)]
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

impl std::fmt::Display for ApiMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "Error {code}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

// ============================================================================
// CloudflareCdn
// ============================================================================

/// Global API key credentials
#[derive(Clone)]
pub struct CloudflareCredentials {
    email: String,
    api_key: String,
}

impl CloudflareCredentials {
    pub fn new(email: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            api_key: api_key.into(),
        }
    }
}

impl std::fmt::Debug for CloudflareCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareCredentials")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Cloudflare implementation of [`ICdnService`]
#[derive(Debug)]
pub struct CloudflareCdn {
    client: Client,
    base_url: String,
    zone_id: String,
    /// Scheme and host prepended to every path, e.g. `https://example.com`
    site: String,
    credentials: CloudflareCredentials,
    batch_size: usize,
}

impl CloudflareCdn {
    /// Creates a client for the public Cloudflare API
    pub fn new(
        zone_id: impl Into<String>,
        site: impl Into<String>,
        credentials: CloudflareCredentials,
    ) -> Self {
        Self::with_base_url(zone_id, site, credentials, DEFAULT_CLOUDFLARE_API_BASE)
    }

    /// Creates a client against a custom API base (useful for testing)
    pub fn with_base_url(
        zone_id: impl Into<String>,
        site: impl Into<String>,
        credentials: CloudflareCredentials,
        base_url: impl Into<String>,
    ) -> Self {
        let site: String = site.into();
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            zone_id: zone_id.into(),
            site: site.trim_end_matches('/').to_string(),
            credentials,
            batch_size: DEFAULT_PURGE_BATCH_SIZE,
        }
    }

    /// Overrides the number of files per purge call. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn purge_url(&self) -> String {
        format!("{}/zones/{}/purge_cache", self.base_url, self.zone_id)
    }

    /// Sends one purge call for `paths`
    async fn purge_batch(&self, paths: &[String]) -> Result<(), CdnError> {
        let files: Vec<String> = paths.iter().map(|p| format!("{}{}", self.site, p)).collect();

        let response = self
            .client
            .post(self.purge_url())
            .header("X-Auth-Email", &self.credentials.email)
            .header("X-Auth-Key", &self.credentials.api_key)
            .json(&PurgeRequest { files: &files })
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let body: PurgeResponse = serde_json::from_str(&text).unwrap_or_default();

        for err in &body.errors {
            error!(zone = %self.zone_id, "{err}");
        }
        for msg in &body.messages {
            info!(zone = %self.zone_id, "{msg}");
        }

        if !status.is_success() {
            return Err(CdnError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }
        if !body.success {
            let reason = body
                .errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CdnError::Rejected(if reason.is_empty() {
                "Cloudflare API call not successful".to_string()
            } else {
                reason
            }));
        }

        for path in paths {
            debug!(path = %path, "Invalidated");
        }
        Ok(())
    }

    /// Validates, batches and purges `paths`
    async fn purge(&self, paths: &[String]) -> Result<(), CdnError> {
        if let Some(bad) = paths.iter().find(|p| !p.starts_with('/')) {
            return Err(CdnError::InvalidPath(bad.clone()));
        }
        if paths.is_empty() {
            return Ok(());
        }

        let batches: Vec<&[String]> = paths.chunks(self.batch_size).collect();
        let total = batches.len();
        let results = join_all(batches.into_iter().map(|b| self.purge_batch(b))).await;

        let failures: Vec<CdnError> = results.into_iter().filter_map(Result::err).collect();
        match failures.first() {
            None => Ok(()),
            Some(first) => Err(CdnError::BatchesFailed {
                failed: failures.len(),
                total,
                first: first.to_string(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl ICdnService for CloudflareCdn {
    #[instrument(skip(self, paths), fields(cdn = "cloudflare", count = paths.len()))]
    async fn invalidate(&self, paths: &[String]) -> anyhow::Result<()> {
        self.purge(paths).await?;
        info!(count = paths.len(), "CDN invalidation complete");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cloudflare"
    }
}
