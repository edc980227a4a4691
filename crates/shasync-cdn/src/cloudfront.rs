//! CloudFront invalidation client
//!
//! Every call to [`ICdnService::invalidate`] becomes one `CreateInvalidation`
//! request for the configured distribution. The caller reference must be
//! unique per request, so it combines the distribution, a timestamp and a
//! random suffix.

use aws_config::BehaviorVersion;
use aws_sdk_cloudfront::config::{Credentials, Region};
use aws_sdk_cloudfront::error::DisplayErrorContext;
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use aws_sdk_cloudfront::Client;
use chrono::{SecondsFormat, Utc};
use shasync_core::ports::ICdnService;
use tracing::{debug, info, instrument};

use crate::CdnError;

/// CloudFront is a global service signed in us-east-1.
const CLOUDFRONT_REGION: &str = "us-east-1";

/// Connection settings for [`CloudFrontCdn`].
#[derive(Clone, Default)]
pub struct CloudFrontOptions {
    pub distribution_id: String,
    /// Custom endpoint, for tests and API-compatible services.
    pub endpoint: Option<String>,
    /// Explicit credentials. When absent the ambient AWS chain is used.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl std::fmt::Debug for CloudFrontOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudFrontOptions")
            .field("distribution_id", &self.distribution_id)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "<set>"))
            .finish_non_exhaustive()
    }
}

/// CloudFront implementation of [`ICdnService`]
pub struct CloudFrontCdn {
    client: Client,
    distribution_id: String,
}

impl std::fmt::Debug for CloudFrontCdn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudFrontCdn")
            .field("distribution_id", &self.distribution_id)
            .finish_non_exhaustive()
    }
}

impl CloudFrontCdn {
    /// Builds a client for `options.distribution_id`.
    pub async fn new(options: CloudFrontOptions) -> Result<Self, CdnError> {
        if options.distribution_id.is_empty() {
            return Err(CdnError::Config("distribution id is required".to_string()));
        }
        let region = Region::new(CLOUDFRONT_REGION);

        let mut builder = match (options.access_key_id, options.secret_access_key) {
            (Some(key_id), Some(secret)) => {
                let credentials = Credentials::new(key_id, secret, None, None, "shasync-env");
                aws_sdk_cloudfront::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(region)
                    .credentials_provider(credentials)
            }
            (None, None) => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_cloudfront::config::Builder::from(&shared)
            }
            _ => {
                return Err(CdnError::Config(
                    "access key id and secret access key must be set together".to_string(),
                ))
            }
        };
        if let Some(endpoint) = &options.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            distribution_id: options.distribution_id,
        })
    }

    pub fn distribution_id(&self) -> &str {
        &self.distribution_id
    }

    fn caller_reference(&self) -> String {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "shasync_cf_{}_invalidation_{}_{}",
            self.distribution_id,
            timestamp,
            &suffix[..6]
        )
    }

    async fn create_invalidation(&self, paths: &[String]) -> Result<(), CdnError> {
        if let Some(bad) = paths.iter().find(|p| !p.starts_with('/')) {
            return Err(CdnError::InvalidPath(bad.clone()));
        }
        if paths.is_empty() {
            return Ok(());
        }

        let items = Paths::builder()
            .quantity(paths.len() as i32)
            .set_items(Some(paths.to_vec()))
            .build()
            .map_err(|e| CdnError::CloudFront(e.to_string()))?;
        let batch = InvalidationBatch::builder()
            .paths(items)
            .caller_reference(self.caller_reference())
            .build()
            .map_err(|e| CdnError::CloudFront(e.to_string()))?;

        let output = self
            .client
            .create_invalidation()
            .distribution_id(&self.distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| CdnError::CloudFront(DisplayErrorContext(&e).to_string()))?;

        if let Some(invalidation) = output.invalidation() {
            debug!(id = invalidation.id(), status = invalidation.status(), "Invalidation created");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ICdnService for CloudFrontCdn {
    #[instrument(skip(self, paths), fields(cdn = "cloudfront", distribution = %self.distribution_id, count = paths.len()))]
    async fn invalidate(&self, paths: &[String]) -> anyhow::Result<()> {
        self.create_invalidation(paths).await?;
        info!(count = paths.len(), "CDN invalidation complete");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cloudfront"
    }
}
