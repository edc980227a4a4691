//! CDN backend for deployments without an edge cache

use shasync_core::ports::ICdnService;
use tracing::debug;

/// Accepts every invalidation and does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCdn;

#[async_trait::async_trait]
impl ICdnService for NoopCdn {
    async fn invalidate(&self, paths: &[String]) -> anyhow::Result<()> {
        debug!(count = paths.len(), "No CDN configured, skipping invalidation");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}
