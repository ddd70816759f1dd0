//! Session file cache: which files have been observed, and in what state.
//!
//! Every successful Read, Write or Edit records the SHA-256 of the file's
//! full content together with the turn it happened on. Before an Edit is
//! dispatched the orchestrator calls [`FileCache::verify_fresh`]: the edit is
//! only allowed if the file was observed in this session and its content on
//! disk still hashes to the recorded value.

use crate::error::ToolError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Hex-encoded SHA-256 of `content`.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// What the session last observed about one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCacheEntry {
    /// Hex SHA-256 of the full file content at the last observation.
    pub content_hash: String,
    /// Turn of the tool result that recorded the observation.
    pub turn_last_read: u64,
}

/// Map from absolute path to the last observed content hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileCache {
    entries: HashMap<PathBuf, FileCacheEntry>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation of `path`. Replaces any earlier entry.
    pub fn record(&mut self, path: impl Into<PathBuf>, content_hash: impl Into<String>, turn: u64) {
        self.entries.insert(
            path.into(),
            FileCacheEntry {
                content_hash: content_hash.into(),
                turn_last_read: turn,
            },
        );
    }

    pub fn get(&self, path: &Path) -> Option<&FileCacheEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compare a freshly computed hash against the recorded one.
    pub fn check_hash(&self, path: &Path, current_hash: &str) -> Result<(), ToolError> {
        match self.entries.get(path) {
            None => Err(ToolError::StaleRead {
                path: path.to_path_buf(),
                detail: "no read recorded".into(),
            }),
            Some(entry) if entry.content_hash != current_hash => Err(ToolError::StaleRead {
                path: path.to_path_buf(),
                detail: format!("content changed since turn {}", entry.turn_last_read),
            }),
            Some(_) => Ok(()),
        }
    }

    /// Hash the current on-disk content of `path` and compare it with the
    /// recorded observation.
    pub async fn verify_fresh(&self, path: &Path) -> Result<(), ToolError> {
        if !self.entries.contains_key(path) {
            return self.check_hash(path, "");
        }
        let bytes = tokio::fs::read(path).await.map_err(|e| ToolError::StaleRead {
            path: path.to_path_buf(),
            detail: format!("file can no longer be read: {e}"),
        })?;
        self.check_hash(path, &content_hash(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_hex_sha256() {
        let h = content_hash(b"hello");
        assert_eq!(h.len(), 64);
        assert_eq!(h, content_hash(b"hello"));
        assert_ne!(h, content_hash(b"hello!"));
    }

    #[test]
    fn unknown_path_is_stale() {
        let cache = FileCache::new();
        let err = cache.check_hash(Path::new("/w/a.rs"), "abc").unwrap_err();
        assert!(matches!(err, ToolError::StaleRead { .. }));
    }

    #[test]
    fn record_replaces_entry() {
        let mut cache = FileCache::new();
        cache.record("/w/a.rs", "h1", 3);
        cache.record("/w/a.rs", "h2", 9);
        let entry = cache.get(Path::new("/w/a.rs")).unwrap();
        assert_eq!(entry.content_hash, "h2");
        assert_eq!(entry.turn_last_read, 9);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn verify_fresh_detects_external_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "one").unwrap();

        let mut cache = FileCache::new();
        cache.record(&path, content_hash(b"one"), 1);
        assert!(cache.verify_fresh(&path).await.is_ok());

        std::fs::write(&path, "two").unwrap();
        let err = cache.verify_fresh(&path).await.unwrap_err();
        assert!(err.to_string().contains("changed since turn 1"));
    }

    #[tokio::test]
    async fn rereading_unchanged_file_stays_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "same").unwrap();

        let mut cache = FileCache::new();
        cache.record(&path, content_hash(b"same"), 1);
        cache.record(&path, content_hash(b"same"), 5);
        assert!(cache.verify_fresh(&path).await.is_ok());
    }
}
