//! Integration tests for shasync-cdn
//!
//! Uses wiremock to stand in for the Cloudflare and CloudFront APIs and
//! checks request shape, batching and failure propagation of the adapters.

mod common;

mod test_cloudfront;
