//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. The reconciliation engine depends on these
//! interfaces; their implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IStorageService`] - Remote object store (list, metadata, upload, delete)
//! - [`ICdnService`] - CDN cache purge
//! - [`IConfirmationPrompt`] - The yes/no gate before destructive actions

pub mod cdn_service;
pub mod confirmation;
pub mod storage_service;

pub use cdn_service::ICdnService;
pub use confirmation::{is_affirmative, IConfirmationPrompt};
pub use storage_service::{
    cached_digest, with_digest, ByteStream, CopyRequest, DeleteFailure, DeleteReport,
    IStorageService, ObjectMetadata, ObjectSummary, RemoteObjectRecord, UploadRequest,
    CONTENT_DIGEST_METADATA_KEY,
};
