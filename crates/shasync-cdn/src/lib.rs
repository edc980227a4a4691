//! shasync-cdn - CDN cache purge adapters
//!
//! Implements [`shasync_core::ports::ICdnService`] for:
//! - [`CloudflareCdn`]: the Cloudflare v4 `purge_cache` endpoint
//! - [`CloudFrontCdn`]: `CreateInvalidation` on a CloudFront distribution
//! - [`NoopCdn`]: accepts every request and purges nothing

pub mod cloudflare;
pub mod cloudfront;
pub mod noop;

pub use cloudflare::{CloudflareCdn, CloudflareCredentials};
pub use cloudfront::{CloudFrontCdn, CloudFrontOptions};
pub use noop::NoopCdn;

use thiserror::Error;

/// Errors that can occur while purging CDN paths
#[derive(Debug, Error)]
pub enum CdnError {
    /// A path did not start with `/`
    #[error("CDN paths must start with a forward slash (got \"{0}\")")]
    InvalidPath(String),

    /// The HTTP request could not be sent or its body could not be read
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// The API answered but reported `success: false`
    #[error("Purge not successful: {0}")]
    Rejected(String),

    /// The CloudFront API call failed
    #[error("CloudFront error: {0}")]
    CloudFront(String),

    /// The adapter could not be configured
    #[error("Configuration error: {0}")]
    Config(String),

    /// One or more batches failed
    #[error("{failed} of {total} purge batch(es) failed: {first}")]
    BatchesFailed {
        failed: usize,
        total: usize,
        /// First failure, for the summary line
        first: String,
    },
}
