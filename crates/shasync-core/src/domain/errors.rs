//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures of prefixes, keys and digests, and
//! invalid state transitions of a sync run.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid relative path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid remote prefix
    #[error("Invalid prefix \"{0}\"")]
    InvalidPrefix(String),

    /// Invalid remote object key
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Invalid content digest (expected 128 lowercase hex characters)
    #[error("Invalid content digest: {0}")]
    InvalidDigest(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
