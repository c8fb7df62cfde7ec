use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::services::stems::Stem;
use crate::services::workspace::{WorkspaceId, WorkspaceManager};
use crate::utils::validation::is_safe_path_segment;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("File not found")]
    NotFound,

    #[error("Invalid path segment: {0}")]
    InvalidPath(String),

    #[error("Storage error: {0}")]
    Storage(#[from] io::Error),
}

/// An open, regular file inside a workspace.
#[derive(Debug)]
pub struct StoredFile {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub file: tokio::fs::File,
}

/// Resolves `(workspace id, filename)` pairs to files under the storage root.
/// Both values are treated as single opaque path segments.
#[derive(Debug, Clone)]
pub struct RetrievalService {
    workspaces: WorkspaceManager,
}

impl RetrievalService {
    pub fn new(workspaces: WorkspaceManager) -> Self {
        Self { workspaces }
    }

    /// Any regular file in the workspace, including the original upload.
    pub async fn fetch(
        &self,
        workspace_id: &str,
        filename: &str,
    ) -> Result<StoredFile, RetrievalError> {
        for segment in [workspace_id, filename] {
            if !is_safe_path_segment(segment) {
                tracing::warn!("Rejected retrieval path segment: {:?}", segment);
                return Err(RetrievalError::InvalidPath(segment.to_string()));
            }
        }

        // Only generated ids can name a workspace
        let id: WorkspaceId = workspace_id
            .parse()
            .map_err(|_| RetrievalError::NotFound)?;

        let workspace_dir = self.workspaces.workspace_dir(&id);
        let path = workspace_dir.join(filename);

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(RetrievalError::NotFound),
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(RetrievalError::NotFound);
        }

        // A symlink planted in a workspace must not lead outside of it
        let resolved = tokio::fs::canonicalize(&path).await?;
        let root = tokio::fs::canonicalize(&workspace_dir).await?;
        if !resolved.starts_with(&root) {
            tracing::warn!("Refusing to serve {} outside its workspace", path.display());
            return Err(RetrievalError::InvalidPath(filename.to_string()));
        }

        let file = match tokio::fs::File::open(&resolved).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(RetrievalError::NotFound),
            Err(e) => return Err(e.into()),
        };

        Ok(StoredFile {
            filename: filename.to_string(),
            path: resolved,
            size: metadata.len(),
            file,
        })
    }

    /// Like [`fetch`](Self::fetch) but limited to canonical stem names, so the
    /// original upload is not exposed through public stem URLs.
    pub async fn fetch_stem(
        &self,
        workspace_id: &str,
        filename: &str,
    ) -> Result<StoredFile, RetrievalError> {
        if Stem::from_canonical_name(filename).is_none() {
            return Err(RetrievalError::NotFound);
        }
        self.fetch(workspace_id, filename).await
    }
}
