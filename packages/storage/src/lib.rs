//! Image store for generated artifacts.
//!
//! Goal:
//! - On-disk storage under a configured root directory
//! - In-memory storage for tests
//!
//! Implementation note:
//! This is a small wrapper around `object_store`, whose local filesystem
//! backend already writes to a temporary file and renames it into place.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use image::ImageFormat;
use object_store::ObjectStore;
use object_store::ObjectStoreExt;
use object_store::path::Path;
use uuid::Uuid;

/// Extensions an artifact name may carry.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp"];

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("invalid artifact name: {0}")]
    InvalidName(String),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

impl StorageError {
    /// Whether the caller should see this as a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_) | StorageError::InvalidName(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Filesystem,
    Memory,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::Filesystem => "filesystem",
            StorageKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    Filesystem { root: PathBuf },
    Memory,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self::Filesystem { root: root.into() }
    }

    /// Build a config from environment variables.
    ///
    /// - `STORAGE_BACKEND`: `filesystem` (default) or `memory`
    /// - `STORAGE_FS_ROOT`: root directory (default: `./generated_images`)
    pub fn from_env() -> Result<Self, StorageError> {
        let backend = std::env::var("STORAGE_BACKEND").ok().and_then(non_empty);

        match backend.as_deref() {
            None | Some("filesystem") | Some("fs") => {
                let root = std::env::var("STORAGE_FS_ROOT")
                    .ok()
                    .and_then(non_empty)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./generated_images"));
                Ok(Self::filesystem(root))
            }
            Some("memory") | Some("mem") => Ok(Self::memory()),
            Some(other) => Err(StorageError::InvalidConfig(format!(
                "unsupported STORAGE_BACKEND={other} (expected filesystem|memory)"
            ))),
        }
    }
}

/// Stores generated images under unique, server-generated names.
#[derive(Clone)]
pub struct ImageStore {
    kind: StorageKind,
    store: Arc<dyn ObjectStore>,
}

impl ImageStore {
    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn new(cfg: StorageConfig) -> Result<Self, StorageError> {
        let (kind, store) = match cfg {
            StorageConfig::Filesystem { root } => {
                ensure_dir(&root)?;
                let fs = object_store::local::LocalFileSystem::new_with_prefix(&root)?;
                (StorageKind::Filesystem, Arc::new(fs) as _)
            }
            StorageConfig::Memory => {
                let mem = object_store::memory::InMemory::new();
                (StorageKind::Memory, Arc::new(mem) as _)
            }
        };

        tracing::info!("Image store ready ({})", kind.as_str());
        Ok(Self { kind, store })
    }

    pub fn from_env() -> Result<Self, StorageError> {
        Self::new(StorageConfig::from_env()?)
    }

    /// Persist image bytes and return the assigned name (`<uuid>.<extension>`).
    pub async fn put(&self, bytes: Bytes, extension: &str) -> Result<String, StorageError> {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(StorageError::InvalidName(format!(
                "unsupported extension: {extension}"
            )));
        }

        let name = format!("{}.{}", Uuid::new_v4(), extension);
        let path = Path::from(name.as_str());
        self.store
            .put(&path, object_store::PutPayload::from(bytes))
            .await?;

        tracing::debug!("Stored image {}", name);
        Ok(name)
    }

    /// Read an artifact by name.
    ///
    /// The name is validated before anything is read, so only names of the
    /// form `put` hands out can reach the backing store.
    pub async fn get(&self, name: &str) -> Result<Bytes, StorageError> {
        let path = artifact_path(name)?;
        match self.store.get(&path).await {
            Ok(res) => Ok(res.bytes().await?),
            Err(object_store::Error::NotFound { .. }) => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// MIME type for an artifact name, based on its extension.
pub fn content_type_for(name: &str) -> &'static str {
    name.rsplit_once('.')
        .and_then(|(_, ext)| ImageFormat::from_extension(ext))
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

/// Validate an artifact name and map it to its object path.
fn artifact_path(name: &str) -> Result<Path, StorageError> {
    let invalid = || StorageError::InvalidName(name.to_string());

    let (stem, extension) = name.rsplit_once('.').ok_or_else(invalid)?;
    if !ALLOWED_EXTENSIONS.contains(&extension) {
        return Err(invalid());
    }
    // Only the canonical hyphenated form: no separators, no dots, no encodings.
    let id = Uuid::try_parse(stem).map_err(|_| invalid())?;
    if id.hyphenated().to_string() != stem {
        return Err(invalid());
    }

    Path::parse(name).map_err(|_| invalid())
}

fn ensure_dir(root: &FsPath) -> Result<(), StorageError> {
    std::fs::create_dir_all(root)?;
    Ok(())
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
