//! shasync-storage - Object storage adapters
//!
//! Implements [`shasync_core::ports::IStorageService`] for:
//! - [`S3Storage`]: AWS S3 and S3-compatible services
//! - [`FsStorage`]: a local directory, with metadata kept in JSON sidecars

pub mod error;
pub mod fs;
pub mod s3;

pub use error::{StorageError, StorageResult};
pub use fs::FsStorage;
pub use s3::{S3Options, S3Storage};
