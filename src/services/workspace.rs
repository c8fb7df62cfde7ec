use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
#[error("Failed to create workspace directory {path}: {source}")]
pub struct StorageError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Opaque per-request identifier. Random 128-bit, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkspaceId(Uuid);

impl WorkspaceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for WorkspaceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub root: PathBuf,
}

impl Workspace {
    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }
}

/// Hands out one isolated directory per request under a shared storage root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    storage_root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub async fn allocate(&self) -> Result<Workspace, StorageError> {
        let id = WorkspaceId::generate();
        let root = self.storage_root.join(id.to_string());

        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| StorageError {
                path: root.clone(),
                source,
            })?;

        tracing::debug!("Allocated workspace {} at {}", id, root.display());
        Ok(Workspace { id, root })
    }

    /// Directory of an existing workspace. Does not touch the filesystem.
    pub fn workspace_dir(&self, id: &WorkspaceId) -> PathBuf {
        self.storage_root.join(id.to_string())
    }

    /// Best-effort removal of a workspace whose upload never completed.
    pub async fn discard(&self, workspace: &Workspace) {
        if let Err(e) = tokio::fs::remove_dir_all(&workspace.root).await {
            tracing::warn!("Failed to discard workspace {}: {}", workspace.id, e);
        }
    }
}
