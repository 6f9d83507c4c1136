//! Blob cache with line counting and binary detection
//!
//! Each processed commit loads the blobs referenced by its tree changes
//! into an in-memory cache keyed by object id; the appliers only ever look
//! blobs up here. Binary detection follows git's own heuristic (a NUL byte
//! within the first 8000 bytes), and line counting matches what the diff
//! producer sees: one line per newline, plus one for an unterminated tail.

use anyhow::Result;
use git2::{Oid, Repository};
use rustc_hash::FxHashMap;
use std::borrow::Cow;
use tracing::debug;

use super::tree_diff::TreeChange;

const BINARY_SNIFF_LEN: usize = 8000;

/// One loaded blob.
#[derive(Clone)]
pub struct CachedBlob {
    data: Vec<u8>,
}

impl CachedBlob {
    pub fn new(data: Vec<u8>) -> Self {
        CachedBlob { data }
    }

    pub fn is_binary(&self) -> bool {
        self.data[..self.data.len().min(BINARY_SNIFF_LEN)].contains(&0)
    }

    /// Line count, or `None` for binary content.
    pub fn count_lines(&self) -> Option<usize> {
        if self.is_binary() {
            return None;
        }
        if self.data.is_empty() {
            return Some(0);
        }
        let mut lines = self.data.iter().filter(|&&b| b == b'\n').count();
        if self.data[self.data.len() - 1] != b'\n' {
            lines += 1;
        }
        Some(lines)
    }

    /// Text view for diffing. Invalid UTF-8 is replaced, which never adds
    /// or removes newlines, so line counts stay consistent.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// Blobs of one commit's tree changes, keyed by object id.
#[derive(Default)]
pub struct BlobCache {
    blobs: FxHashMap<Oid, CachedBlob>,
}

impl BlobCache {
    /// Loads every blob the given changes reference. Entries that are not
    /// blobs (submodules already got filtered out of the changes, but a
    /// repository can still surprise) are skipped with a debug note.
    pub fn load(repo: &Repository, changes: &[TreeChange]) -> Result<BlobCache> {
        let mut cache = BlobCache::default();
        for change in changes {
            for entry in [&change.from, &change.to] {
                if entry.hash.is_zero() || cache.blobs.contains_key(&entry.hash) {
                    continue;
                }
                match repo.find_blob(entry.hash) {
                    Ok(blob) => {
                        cache
                            .blobs
                            .insert(entry.hash, CachedBlob::new(blob.content().to_vec()));
                    }
                    Err(err) => {
                        debug!(path = %entry.name, hash = %entry.hash, %err, "skipping unloadable blob");
                    }
                }
            }
        }
        Ok(cache)
    }

    pub fn get(&self, hash: Oid) -> Option<&CachedBlob> {
        self.blobs.get(&hash)
    }

    /// Direct insertion, for tests that build commits out of thin air.
    pub fn insert(&mut self, hash: Oid, blob: CachedBlob) {
        self.blobs.insert(hash, blob);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_lines_cases() {
        assert_eq!(CachedBlob::new(b"".to_vec()).count_lines(), Some(0));
        assert_eq!(CachedBlob::new(b"one\n".to_vec()).count_lines(), Some(1));
        assert_eq!(CachedBlob::new(b"one\ntwo\n".to_vec()).count_lines(), Some(2));
        // Unterminated tail still counts as a line.
        assert_eq!(CachedBlob::new(b"one\ntwo".to_vec()).count_lines(), Some(2));
        assert_eq!(CachedBlob::new(b"x".to_vec()).count_lines(), Some(1));
    }

    #[test]
    fn binary_is_detected_and_uncounted() {
        let blob = CachedBlob::new(vec![b'a', 0, b'b', b'\n']);
        assert!(blob.is_binary());
        assert_eq!(blob.count_lines(), None);
        // A NUL past the sniff window does not make the blob binary.
        let mut data = vec![b'a'; BINARY_SNIFF_LEN];
        data.push(0);
        assert!(!CachedBlob::new(data).is_binary());
    }
}
