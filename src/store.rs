//! Filesystem-backed artifact store.
//!
//! Each artifact is one file directly under the store root, named by its id.
//! Writes go to a dot-prefixed temp file in the same directory, are fsynced,
//! and are then renamed into place without clobbering, so a reader either
//! sees the complete blob or nothing. Dot-prefixed names never pass
//! [`ArtifactId::parse`], which keeps in-flight writes out of `resolve` and
//! `list`.
//!
//! The store never decides *when* to delete. The sweeper and the deferred
//! deletion scheduler both call [`ArtifactStore::delete`], which treats a
//! missing file as success so the two triggers can race freely.
//!
//! Removal goes through the [`BlobRemover`] seam. [`FsBlobRemover`] unlinks
//! the file; callers may inject another implementation via
//! [`ArtifactStore::open_with_remover`].

use crate::artifact::{Artifact, ArtifactId, ContentKind};
use crate::clock::{age_between, TimeSource};
use crate::error::DocForgeError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tracing::{debug, info, warn};

/// Name prefix of in-flight writes.
const PARTIAL_PREFIX: &str = ".partial-";

/// An artifact together with its age at listing time.
#[derive(Debug, Clone, Serialize)]
pub struct StoredArtifact {
    #[serde(flatten)]
    pub artifact: Artifact,
    pub age: Duration,
}

/// Removes one blob file from disk.
///
/// Implementations are synchronous; the store runs them on a blocking thread.
/// A missing file must be reported as [`ErrorKind::NotFound`].
pub trait BlobRemover: Send + Sync {
    fn remove(&self, path: &Path) -> std::io::Result<()>;
}

/// [`BlobRemover`] that unlinks through the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsBlobRemover;

impl BlobRemover for FsBlobRemover {
    fn remove(&self, path: &Path) -> std::io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// Artifact blobs rooted at one directory.
pub struct ArtifactStore {
    root: PathBuf,
    clock: Arc<dyn TimeSource>,
    remover: Arc<dyn BlobRemover>,
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("root", &self.root)
            .finish()
    }
}

impl ArtifactStore {
    /// Open (and create if needed) a store at `root`.
    ///
    /// Leftover partial writes from a previous process are removed; they can
    /// never be completed and are invisible to every other operation.
    pub async fn open(
        root: impl Into<PathBuf>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, DocForgeError> {
        Self::open_with_remover(root, clock, Arc::new(FsBlobRemover)).await
    }

    /// Like [`open`](Self::open), deleting blobs through `remover`.
    pub async fn open_with_remover(
        root: impl Into<PathBuf>,
        clock: Arc<dyn TimeSource>,
        remover: Arc<dyn BlobRemover>,
    ) -> Result<Self, DocForgeError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| DocForgeError::StoreUnavailable {
                path: root.clone(),
                source,
            })?;

        let store = Self {
            root,
            clock,
            remover,
        };
        let purged = store.purge_partials().await?;
        if purged > 0 {
            info!("Removed {} orphaned partial writes", purged);
        }
        debug!("Artifact store ready at {}", store.root.display());
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Persist `bytes` as a new artifact and return its descriptor.
    ///
    /// # Errors
    /// [`DocForgeError::ArtifactWriteFailed`] if any step of the write fails.
    /// The partial file is removed on failure and nothing becomes visible.
    pub async fn create(
        &self,
        kind: ContentKind,
        bytes: Vec<u8>,
    ) -> Result<Artifact, DocForgeError> {
        let id = ArtifactId::generate(kind, self.clock.now());
        let root = self.root.clone();
        let target = self.root.join(id.as_str());
        let write_target = target.clone();

        tokio::task::spawn_blocking(move || write_atomically(&root, &write_target, &bytes))
            .await
            .map_err(|e| DocForgeError::Internal(format!("Write task panicked: {}", e)))?
            .map_err(|source| DocForgeError::ArtifactWriteFailed {
                id: id.to_string(),
                source,
            })?;

        let metadata = tokio::fs::metadata(&target).await.map_err(|source| {
            DocForgeError::ArtifactWriteFailed {
                id: id.to_string(),
                source,
            }
        })?;

        let artifact = self.describe(id, target, &metadata).ok_or_else(|| {
            DocForgeError::Internal("freshly written artifact has no content kind".into())
        })?;

        info!(
            "Created artifact {} ({}, {} bytes)",
            artifact.id,
            artifact.content_kind.mime_type(),
            artifact.size_bytes
        );
        Ok(artifact)
    }

    /// Look up a client-supplied id.
    ///
    /// Returns `Ok(None)` when the id is rejected by the allow-list, was never
    /// created, or has already been deleted.
    pub async fn resolve(&self, requested: &str) -> Result<Option<Artifact>, DocForgeError> {
        let id = match ArtifactId::parse(requested) {
            Ok(id) => id,
            Err(reason) => {
                debug!("Rejected artifact id {:?}: {}", requested, reason);
                return Ok(None);
            }
        };
        self.lookup(id).await
    }

    async fn lookup(&self, id: ArtifactId) -> Result<Option<Artifact>, DocForgeError> {
        let path = self.root.join(id.as_str());
        // symlink_metadata: a symlink planted under the root is not followed.
        let metadata = match tokio::fs::symlink_metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Artifact {} not found", id);
                return Ok(None);
            }
            Err(source) => {
                return Err(DocForgeError::StoreUnavailable { path, source });
            }
        };
        if !metadata.is_file() {
            return Ok(None);
        }
        Ok(self.describe(id, path, &metadata))
    }

    /// Open an artifact's blob for reading.
    ///
    /// The returned handle stays readable even if the name is unlinked while
    /// the caller is still streaming. `Ok(None)` means the artifact vanished
    /// between `resolve` and this call.
    pub async fn open_blob(&self, artifact: &Artifact) -> Result<Option<File>, DocForgeError> {
        match File::open(&artifact.physical_key).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(DocForgeError::TransferFailed {
                id: artifact.id.to_string(),
                source,
            }),
        }
    }

    /// Delete an artifact. Returns whether a blob was actually removed;
    /// deleting a missing artifact is not an error.
    pub async fn delete(&self, id: &ArtifactId) -> Result<bool, DocForgeError> {
        match self.remove(self.root.join(id.as_str())).await {
            Ok(()) => {
                debug!("Deleted artifact {}", id);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(DocForgeError::ArtifactDeleteFailed {
                id: id.to_string(),
                source,
            }),
        }
    }

    /// Every current artifact with its age.
    pub async fn list(&self) -> Result<Vec<StoredArtifact>, DocForgeError> {
        let unavailable = |source| DocForgeError::StoreUnavailable {
            path: self.root.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(unavailable)?;
        let now = self.clock.now();
        let mut listed = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|n| ArtifactId::parse(n).ok()) else {
                continue;
            };
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                // Deleted between read_dir and stat.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("Cannot stat artifact {}: {}", id, e);
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            if let Some(artifact) = self.describe(id, entry.path(), &metadata) {
                let age = age_between(artifact.created_at, now);
                listed.push(StoredArtifact { artifact, age });
            }
        }

        listed.sort_by(|a, b| a.artifact.created_at.cmp(&b.artifact.created_at));
        Ok(listed)
    }

    async fn purge_partials(&self) -> Result<usize, DocForgeError> {
        let unavailable = |source| DocForgeError::StoreUnavailable {
            path: self.root.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(unavailable)?;
        let mut purged = 0;
        while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
            let is_partial = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(PARTIAL_PREFIX));
            if !is_partial {
                continue;
            }
            match self.remove(entry.path()).await {
                Ok(()) => purged += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Cannot remove partial write {}: {}", entry.path().display(), e),
            }
        }
        Ok(purged)
    }

    async fn remove(&self, path: PathBuf) -> std::io::Result<()> {
        let remover = Arc::clone(&self.remover);
        tokio::task::spawn_blocking(move || remover.remove(&path))
            .await
            .map_err(|e| std::io::Error::other(format!("Remove task panicked: {}", e)))?
    }

    fn describe(
        &self,
        id: ArtifactId,
        path: PathBuf,
        metadata: &std::fs::Metadata,
    ) -> Option<Artifact> {
        let content_kind = id.content_kind()?;
        let created_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| self.clock.now());
        Some(Artifact {
            id,
            physical_key: path,
            created_at,
            size_bytes: metadata.len(),
            content_kind,
        })
    }
}

/// Temp file in the same directory, fsync, then rename without clobbering.
fn write_atomically(root: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .tempfile_in(root)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(target).map_err(|e| e.error)?;
    Ok(())
}
