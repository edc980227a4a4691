//! Integration tests for shasync-storage
//!
//! Uses wiremock to stand in for an S3-compatible endpoint and checks how
//! `S3Storage` splits uploads into requests.

mod common;
