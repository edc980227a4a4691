//! HashIndex - mapping from relative path to content digest
//!
//! Built once per run (one local, one remote), held in memory and never
//! persisted directly.

use std::collections::hash_map::{self, HashMap};

use super::newtypes::{ContentDigest, RelativePath};

/// Unordered mapping from normalized relative path to content digest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashIndex {
    entries: HashMap<RelativePath, ContentDigest>,
}

impl HashIndex {
    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty index with room for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Inserts a digest, returning the previous one for the same path
    pub fn insert(&mut self, path: RelativePath, digest: ContentDigest) -> Option<ContentDigest> {
        self.entries.insert(path, digest)
    }

    /// Returns the digest recorded for `path`
    pub fn get(&self, path: &RelativePath) -> Option<&ContentDigest> {
        self.entries.get(path)
    }

    /// Returns true if `path` has a digest
    pub fn contains(&self, path: &RelativePath) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all entries in unspecified order
    pub fn iter(&self) -> hash_map::Iter<'_, RelativePath, ContentDigest> {
        self.entries.iter()
    }

    /// Iterates over all paths in unspecified order
    pub fn paths(&self) -> hash_map::Keys<'_, RelativePath, ContentDigest> {
        self.entries.keys()
    }
}

impl FromIterator<(RelativePath, ContentDigest)> for HashIndex {
    fn from_iter<I: IntoIterator<Item = (RelativePath, ContentDigest)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<(RelativePath, ContentDigest)> for HashIndex {
    fn extend<I: IntoIterator<Item = (RelativePath, ContentDigest)>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl IntoIterator for HashIndex {
    type Item = (RelativePath, ContentDigest);
    type IntoIter = hash_map::IntoIter<RelativePath, ContentDigest>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a HashIndex {
    type Item = (&'a RelativePath, &'a ContentDigest);
    type IntoIter = hash_map::Iter<'a, RelativePath, ContentDigest>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
