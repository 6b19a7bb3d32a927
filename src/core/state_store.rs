//! Episode state store with crash-safe file persistence.
//!
//! The store is a single snapshot mapping guid -> EpisodeRecord, read in
//! full and written in full on every mutation. `merge` is the only mutation
//! primitive; it is a full read-modify-write and is not safe against
//! concurrent writers. One run processes episodes sequentially, so a single
//! owner holds the store for the lifetime of the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::{EpisodePatch, EpisodeRecord};

/// Durable mapping from episode guid to record.
///
/// The pipeline and discovery logic only ever talk to this trait, so tests
/// substitute `MemoryStore` for the file-backed implementation.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// All records in the last durably written snapshot.
    async fn list(&self) -> Result<BTreeMap<String, EpisodeRecord>>;

    /// A single record, if present.
    async fn get(&self, guid: &str) -> Result<Option<EpisodeRecord>>;

    /// Shallow-merge a patch into the record for `guid`, creating the
    /// record if absent, then persist the full snapshot.
    async fn merge(&self, guid: &str, patch: EpisodePatch) -> Result<()>;
}

/// On-disk snapshot layout: one document with a top-level episode mapping.
///
/// Unknown top-level fields are tolerated on read; unknown record fields are
/// preserved (see `EpisodeRecord::extra`).
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    episodes: BTreeMap<String, EpisodeRecord>,
}

/// File-backed store. Writes are atomic: the snapshot goes to a temporary
/// sibling file, is forced to stable storage, then renamed over the target,
/// so a crash mid-write never leaves a partially written snapshot behind.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Temporary sibling used for atomic replacement. A fixed name keeps a
    /// leftover from a failed attempt from accumulating: the next write
    /// truncates it.
    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Read the last snapshot. Missing or unreadable files yield an empty
    /// mapping: availability is deliberately preferred over surfacing
    /// storage errors, but corruption is logged rather than silently eaten.
    async fn read_snapshot(&self) -> StateFile {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return StateFile::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file unreadable, starting from empty state");
                return StateFile::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file corrupt, starting from empty state");
                StateFile::default()
            }
        }
    }

    /// Persist the full snapshot atomically.
    async fn write_snapshot(&self, state: &StateFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create state directory: {}", parent.display()))?;
        }

        let json = serde_json::to_vec_pretty(state).context("Failed to serialize state")?;
        let tmp = self.tmp_path();

        let result = async {
            let mut file = tokio::fs::File::create(&tmp)
                .await
                .with_context(|| format!("Failed to create temp state file: {}", tmp.display()))?;
            file.write_all(&json)
                .await
                .context("Failed to write temp state file")?;
            file.sync_all()
                .await
                .context("Failed to sync temp state file")?;
            drop(file);

            tokio::fs::rename(&tmp, &self.path)
                .await
                .with_context(|| format!("Failed to replace state file: {}", self.path.display()))
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }

        result
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn list(&self) -> Result<BTreeMap<String, EpisodeRecord>> {
        Ok(self.read_snapshot().await.episodes)
    }

    async fn get(&self, guid: &str) -> Result<Option<EpisodeRecord>> {
        Ok(self.read_snapshot().await.episodes.remove(guid))
    }

    async fn merge(&self, guid: &str, patch: EpisodePatch) -> Result<()> {
        let mut state = self.read_snapshot().await;
        state
            .episodes
            .entry(guid.to_string())
            .or_default()
            .apply(patch);
        self.write_snapshot(&state).await
    }
}

/// In-memory store for tests and dry validation.
#[derive(Default)]
pub struct MemoryStore {
    episodes: Mutex<BTreeMap<String, EpisodeRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a record (test setup helper).
    pub async fn insert(&self, guid: &str, record: EpisodeRecord) {
        self.episodes
            .lock()
            .await
            .insert(guid.to_string(), record);
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn list(&self) -> Result<BTreeMap<String, EpisodeRecord>> {
        Ok(self.episodes.lock().await.clone())
    }

    async fn get(&self, guid: &str) -> Result<Option<EpisodeRecord>> {
        Ok(self.episodes.lock().await.get(guid).cloned())
    }

    async fn merge(&self, guid: &str, patch: EpisodePatch) -> Result<()> {
        self.episodes
            .lock()
            .await
            .entry(guid.to_string())
            .or_default()
            .apply(patch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> JsonStateStore {
        JsonStateStore::new(dir.path().join("state.json"))
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merge_creates_and_updates() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        store
            .merge(
                "ep-1",
                EpisodePatch {
                    title: Some("first".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        store
            .merge("ep-1", EpisodePatch::transcript("hello world"))
            .await
            .unwrap();

        let record = store.get("ep-1").await.unwrap().unwrap();
        assert_eq!(record.title.as_deref(), Some("first"));
        assert_eq!(record.transcript.as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_empty() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        tokio::fs::write(store.path(), b"{ not json").await.unwrap();

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leftover_tmp_does_not_shadow_state() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        store
            .merge("ep-1", EpisodePatch::summary("durable"))
            .await
            .unwrap();

        // A crash after writing the temp file but before the rename leaves
        // the original snapshot untouched.
        tokio::fs::write(store.tmp_path(), b"garbage from interrupted write")
            .await
            .unwrap();

        let record = store.get("ep-1").await.unwrap().unwrap();
        assert_eq!(record.summary.as_deref(), Some("durable"));

        // The next successful write replaces the leftover on the same path.
        store
            .merge("ep-2", EpisodePatch::summary("second"))
            .await
            .unwrap();
        let episodes = store.list().await.unwrap();
        assert_eq!(episodes.len(), 2);
    }
}
