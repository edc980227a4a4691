//! CDN port (driven/secondary port)
//!
//! Purges logical URL paths from an edge cache. Implementations live in
//! `shasync-cdn`.

/// Port for a CDN cache purge backend
#[async_trait::async_trait]
pub trait ICdnService: Send + Sync {
    /// Purges every path in `paths`
    ///
    /// Paths are absolute (they start with `/`). Backends with a per-call
    /// limit split the list into batches; the call fails if any batch fails.
    async fn invalidate(&self, paths: &[String]) -> anyhow::Result<()>;

    /// Short backend name used in logs
    fn name(&self) -> &'static str;
}
