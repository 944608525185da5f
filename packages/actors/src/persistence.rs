//! JSON snapshots of actor state on the local filesystem.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tokio::fs;

/// Snapshot directory shared by the actors of one runtime.
///
/// A snapshot named `queue` lives at `<dir>/queue.json`. Writes go to a
/// sibling `.tmp` file which is synced and renamed over the old snapshot, so
/// a reader sees either the previous or the new state, never a torn file.
#[derive(Debug, Clone)]
pub struct StatePersistence {
    dir: PathBuf,
}

impl StatePersistence {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Create the snapshot directory if needed.
    pub async fn init(&self) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Replace the snapshot `name` with `state`.
    pub async fn save<T: Serialize>(&self, name: &str, state: &T) -> Result<(), PersistenceError> {
        let path = self.snapshot_path(name);
        let staging = path.with_extension("json.tmp");

        fs::write(&staging, serde_json::to_vec(state)?).await?;
        fs::File::open(&staging).await?.sync_all().await?;
        fs::rename(&staging, &path).await?;

        tracing::trace!(snapshot = %path.display(), "Snapshot written");
        Ok(())
    }

    /// Read the snapshot `name`, or `None` if it was never written.
    pub async fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, PersistenceError> {
        let path = self.snapshot_path(name);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state = serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Corrupt {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(snapshot = %path.display(), "Snapshot loaded");
        Ok(Some(state))
    }
}

/// Snapshot read/write errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("snapshot {path} is unreadable: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}
