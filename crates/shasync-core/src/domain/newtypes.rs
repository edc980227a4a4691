//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for paths, prefixes, object
//! keys and content digests. Each newtype ensures data validity at
//! construction time, so the reconciliation code never has to re-check them.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// Path normalization
// ============================================================================

/// Canonicalizes path separators.
///
/// Every run of `/` and `\` characters (mixed or not) collapses into a single
/// `/`. A path built on Windows therefore compares equal to the same path
/// stored remotely.
///
/// ```
/// use shasync_core::domain::newtypes::normalize_path;
///
/// assert_eq!(normalize_path("a\\b/c"), "a/b/c");
/// assert_eq!(normalize_path("a//b\\\\c"), "a/b/c");
/// ```
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len());
    let mut previous_was_separator = false;

    for c in path.chars() {
        if c == '/' || c == '\\' {
            if !previous_was_separator {
                normalized.push('/');
            }
            previous_was_separator = true;
        } else {
            normalized.push(c);
            previous_was_separator = false;
        }
    }

    normalized
}

// ============================================================================
// RelativePath
// ============================================================================

/// A path relative to the local root or to the remote prefix.
///
/// Always normalized with [`normalize_path`], so two paths naming the same
/// logical file on different operating systems are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Create a new RelativePath, normalizing its separators
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` if the path is empty
    pub fn new(path: impl AsRef<str>) -> Result<Self, DomainError> {
        let normalized = normalize_path(path.as_ref());
        if normalized.is_empty() {
            return Err(DomainError::InvalidPath(
                "Relative path cannot be empty".to_string(),
            ));
        }
        Ok(Self(normalized))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the file extension, if any
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        let file_name = self.0.rsplit('/').next()?;
        match file_name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&file_name[idx + 1..]),
        }
    }
}

impl Display for RelativePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RelativePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RelativePath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        path.0
    }
}

// ============================================================================
// ObjectKey
// ============================================================================

/// A full remote object key (prefix + relative path)
///
/// Keys are non-empty and never begin with a path separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a new ObjectKey
    ///
    /// # Errors
    /// Returns `DomainError::InvalidKey` if the key is empty or starts with `/`
    pub fn new(key: impl Into<String>) -> Result<Self, DomainError> {
        let key = key.into();
        if key.is_empty() {
            return Err(DomainError::InvalidKey(
                "Object key cannot be empty".to_string(),
            ));
        }
        if key.starts_with('/') {
            return Err(DomainError::InvalidKey(format!(
                "Object keys cannot start with a forward slash (got \"{key}\")"
            )));
        }
        Ok(Self(key))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.0
    }
}

// ============================================================================
// Prefix
// ============================================================================

/// The remote key namespace under which all synced objects live
///
/// A prefix may be empty and may contain interior `/` separators, but it
/// must not begin or end with one, must not contain empty segments and must
/// not contain a backslash. Examples: `""`, `"site"`, `"a/b"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Prefix(String);

impl Prefix {
    /// Create a new Prefix
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrefix` if the format is not accepted
    pub fn new(prefix: impl Into<String>) -> Result<Self, DomainError> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Ok(Self(prefix));
        }

        let valid = !prefix.contains('\\') && prefix.split('/').all(|segment| !segment.is_empty());
        if !valid {
            return Err(DomainError::InvalidPrefix(prefix));
        }

        Ok(Self(prefix))
    }

    /// The empty prefix (bucket root)
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the empty prefix
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The string handed to the storage listing call.
    ///
    /// A trailing `/` is added to non-empty prefixes so that `a` does not
    /// also match keys under `ab/`.
    #[must_use]
    pub fn listing_prefix(&self) -> String {
        if self.0.is_empty() {
            String::new()
        } else {
            format!("{}/", self.0)
        }
    }

    /// Full object key for a path relative to this prefix
    ///
    /// # Errors
    /// Returns `DomainError::InvalidKey` if the joined key is not a valid key
    pub fn key_for(&self, path: &RelativePath) -> Result<ObjectKey, DomainError> {
        if self.0.is_empty() {
            ObjectKey::new(path.as_str())
        } else {
            ObjectKey::new(format!("{}/{}", self.0, path.as_str()))
        }
    }

    /// Whether `key` is the folder marker of the prefix itself, e.g. `site/`
    #[must_use]
    pub fn is_folder_marker(&self, key: &str) -> bool {
        !self.0.is_empty() && key == self.listing_prefix()
    }

    /// Path of a listed key relative to this prefix
    ///
    /// Returns `None` when the key is not under the prefix, or when nothing
    /// remains after stripping it (see [`Prefix::is_folder_marker`]).
    #[must_use]
    pub fn relative_path_of(&self, key: &str) -> Option<RelativePath> {
        let listing_prefix = self.listing_prefix();
        let relative = key.strip_prefix(listing_prefix.as_str())?;
        RelativePath::new(relative).ok()
    }

    /// The logical URL path served for `path`, i.e. `/{prefix}/{path}`
    ///
    /// Separators are normalized, so an empty prefix yields `/{path}`.
    #[must_use]
    pub fn logical_path(&self, path: &RelativePath) -> String {
        normalize_path(&format!("/{}/{}", self.0, path.as_str()))
    }
}

impl Display for Prefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Prefix {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Prefix {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Prefix> for String {
    fn from(prefix: Prefix) -> Self {
        prefix.0
    }
}

// ============================================================================
// ContentDigest
// ============================================================================

/// SHA-512 digest of a file's byte content, as lowercase hex
///
/// The algorithm is fixed for the whole lifetime of the system: digests are
/// persisted in remote object metadata and compared across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Name of the hash algorithm behind every digest
    pub const ALGORITHM: &'static str = "sha512";

    /// Length of the hex representation (64 bytes)
    pub const HEX_LEN: usize = 128;

    /// Create a ContentDigest from its hex representation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidDigest` unless the value is exactly
    /// 128 lowercase hex characters
    pub fn new(digest: impl Into<String>) -> Result<Self, DomainError> {
        let digest = digest.into();
        if digest.len() != Self::HEX_LEN {
            return Err(DomainError::InvalidDigest(format!(
                "expected {} hex characters, got {}",
                Self::HEX_LEN,
                digest.len()
            )));
        }
        if !digest
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(DomainError::InvalidDigest(format!(
                "not lowercase hex: {digest}"
            )));
        }
        Ok(Self(digest))
    }

    /// Create a ContentDigest from raw hash output bytes
    ///
    /// # Errors
    /// Returns `DomainError::InvalidDigest` if `bytes` is not 64 bytes long
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DomainError> {
        Self::new(hex::encode(bytes))
    }

    /// Create a ContentDigest from a finished SHA-512 output
    #[must_use]
    pub fn from_sha512(output: [u8; 64]) -> Self {
        Self(hex::encode(output))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContentDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentDigest {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ContentDigest> for String {
    fn from(digest: ContentDigest) -> Self {
        digest.0
    }
}
