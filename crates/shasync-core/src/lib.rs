//! shasync Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `RelativePath`, `Prefix`, `ObjectKey`, `ContentDigest`,
//!   `HashIndex`, `SyncPlan`, `SyncRun`
//! - **Port definitions** - Traits for adapters: `IStorageService`,
//!   `ICdnService`, `IConfirmationPrompt`
//! - **Configuration** - The YAML config file and its validation
//!
//! # Architecture
//!
//! The domain module contains pure data types with no I/O. Ports define trait
//! interfaces that adapter crates (`shasync-storage`, `shasync-cdn`) implement.
//! The reconciliation algorithms that drive the ports live in `shasync-sync`.

pub mod config;
pub mod domain;
pub mod ports;
