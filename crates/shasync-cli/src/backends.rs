//! Backend selection
//!
//! Storage and CDN implementations are chosen once, from the resolved
//! config, and handed to the engine as trait objects. Credentials come from
//! the environment only.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use shasync_cdn::{CloudFrontCdn, CloudFrontOptions, CloudflareCdn, CloudflareCredentials, NoopCdn};
use shasync_core::config::{CdnBackend, Config, StorageBackend};
use shasync_core::ports::{ICdnService, IStorageService};
use shasync_storage::{FsStorage, S3Options, S3Storage};

/// Looks up an environment variable, treating empty values as unset
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Returns both values of a credential pair, or neither
fn credential_pair<F>(lookup: &F, id: &str, secret: &str) -> Result<Option<(String, String)>>
where
    F: Fn(&str) -> Option<String>,
{
    match (lookup(id), lookup(secret)) {
        (Some(a), Some(b)) => Ok(Some((a, b))),
        (None, None) => Ok(None),
        (Some(_), None) => bail!("{id} is set but {secret} is not"),
        (None, Some(_)) => bail!("{secret} is set but {id} is not"),
    }
}

/// Builds the configured object store
pub async fn storage<F>(config: &Config, lookup: F) -> Result<Arc<dyn IStorageService>>
where
    F: Fn(&str) -> Option<String>,
{
    let storage = &config.storage;
    match storage.backend {
        StorageBackend::S3 => {
            let credentials = credential_pair(&lookup, "AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY")?;
            let (access_key_id, secret_access_key) = credentials.unzip();
            let options = S3Options {
                bucket: storage.bucket.clone().unwrap_or_default(),
                region: storage.region.clone().or_else(|| lookup("AWS_REGION")),
                endpoint: storage.endpoint.clone(),
                force_path_style: storage.force_path_style,
                access_key_id,
                secret_access_key,
            };
            let s3 = S3Storage::new(options)
                .await
                .context("Failed to configure S3 storage")?;
            Ok(Arc::new(s3))
        }
        StorageBackend::Fs => {
            let Some(root) = &storage.root else {
                bail!("storage.root is required for the fs backend");
            };
            let fs = FsStorage::new(root)
                .await
                .with_context(|| format!("Failed to open storage root {}", root.display()))?;
            Ok(Arc::new(fs))
        }
    }
}

/// Builds the configured CDN purger
pub async fn cdn<F>(config: &Config, lookup: F) -> Result<Arc<dyn ICdnService>>
where
    F: Fn(&str) -> Option<String>,
{
    let cdn = &config.cdn;
    match cdn.backend {
        CdnBackend::None => Ok(Arc::new(NoopCdn)),
        CdnBackend::Cloudflare => {
            let Some((email, api_key)) = credential_pair(&lookup, "CF_EMAIL", "CF_API_KEY")? else {
                bail!("CF_EMAIL and CF_API_KEY must be set for the cloudflare backend");
            };
            let zone_id = cdn.zone_id.clone().unwrap_or_default();
            let site = cdn.site.clone().unwrap_or_default();
            let client = CloudflareCdn::with_base_url(
                zone_id,
                site,
                CloudflareCredentials::new(email, api_key),
                cdn.api_base.clone(),
            )
            .with_batch_size(cdn.batch_size);
            Ok(Arc::new(client))
        }
        CdnBackend::Cloudfront => {
            let credentials = credential_pair(&lookup, "AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY")?;
            let (access_key_id, secret_access_key) = credentials.unzip();
            let options = CloudFrontOptions {
                distribution_id: cdn.distribution_id.clone().unwrap_or_default(),
                endpoint: None,
                access_key_id,
                secret_access_key,
            };
            let client = CloudFrontCdn::new(options)
                .await
                .context("Failed to configure CloudFront")?;
            Ok(Arc::new(client))
        }
    }
}
