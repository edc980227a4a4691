//! Streaming content digests
//!
//! Digests are SHA-512 over the raw bytes, rendered as lowercase hex. The
//! stream is consumed chunk by chunk, so memory use does not grow with the
//! object size.

use std::io;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use sha2::{Digest, Sha512};
use shasync_core::domain::ContentDigest;

/// Computes [`ContentDigest`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher;

impl ContentHasher {
    /// Consumes `stream` to completion and returns its digest
    ///
    /// # Errors
    /// Returns the first error the stream yields; no digest is produced in
    /// that case.
    pub async fn digest_stream<S>(stream: S) -> io::Result<ContentDigest>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let mut hasher = Sha512::new();
        let mut stream = std::pin::pin!(stream);

        while let Some(chunk) = stream.next().await {
            hasher.update(&chunk?);
        }

        Ok(Self::finish(hasher))
    }

    /// Digest of an in-memory buffer
    pub fn digest_bytes(data: &[u8]) -> ContentDigest {
        let mut hasher = Sha512::new();
        hasher.update(data);
        Self::finish(hasher)
    }

    fn finish(hasher: Sha512) -> ContentDigest {
        let mut output = [0u8; 64];
        output.copy_from_slice(&hasher.finalize());
        ContentDigest::from_sha512(output)
    }
}
