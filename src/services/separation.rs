use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::services::engine::{EngineError, EngineGate, GateError};
use crate::services::stems::{OutputMapper, Stem, base_name};
use crate::services::workspace::{StorageError, Workspace, WorkspaceId, WorkspaceManager};
use crate::utils::fs::move_file;

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Upload stream failed: {0}")]
    UploadRead(#[source] io::Error),

    #[error("Failed to write upload to {path}: {source}")]
    UploadWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Uploaded file is empty")]
    EmptyUpload,

    #[error("Upload exceeds the {limit} byte limit")]
    UploadTooLarge { limit: u64 },

    #[error("Upload name '{0}' is reserved for a generated stem")]
    ReservedName(String),

    #[error(transparent)]
    Engine(EngineError),

    #[error("Separation did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Separation job aborted: {0}")]
    Aborted(String),
}

impl From<GateError> for JobError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::Engine(e) => JobError::Engine(e),
            GateError::Timeout(limit) => JobError::Timeout(limit),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeparationOutcome {
    pub workspace_id: WorkspaceId,
    /// Stems placed in the workspace, in the order the engine reported them
    pub stems: Vec<Stem>,
}

impl SeparationOutcome {
    pub fn urls(&self) -> Vec<String> {
        self.stems
            .iter()
            .map(|stem| public_url(&self.workspace_id, stem.canonical_name()))
            .collect()
    }
}

pub fn public_url(workspace_id: &WorkspaceId, filename: &str) -> String {
    format!("/static/{}/{}", workspace_id, filename)
}

struct PersistedUpload {
    filename: String,
    path: PathBuf,
    size: u64,
}

/// Runs one separation job per upload: workspace, upload copy, engine, stem renaming.
#[derive(Clone)]
pub struct SeparationService {
    workspaces: WorkspaceManager,
    gate: EngineGate,
    max_upload_size: u64,
}

impl SeparationService {
    pub fn new(workspaces: WorkspaceManager, gate: EngineGate, max_upload_size: u64) -> Self {
        Self {
            workspaces,
            gate,
            max_upload_size,
        }
    }

    pub fn gate(&self) -> &EngineGate {
        &self.gate
    }

    /// `filename` must already be sanitized to a single path segment.
    pub async fn run<R>(&self, filename: &str, reader: R) -> Result<SeparationOutcome, JobError>
    where
        R: AsyncRead + Unpin + Send,
    {
        // The upload must survive the stem renames untouched
        if Stem::ALL
            .iter()
            .any(|stem| stem.canonical_name().eq_ignore_ascii_case(filename))
        {
            return Err(JobError::ReservedName(filename.to_string()));
        }

        let workspace = self.workspaces.allocate().await?;

        let upload = match persist_upload(&workspace, filename, reader, self.max_upload_size).await
        {
            Ok(upload) => upload,
            Err(e) => {
                self.workspaces.discard(&workspace).await;
                return Err(e);
            }
        };

        tracing::info!(
            "Workspace {} received '{}' ({} bytes)",
            workspace.id,
            upload.filename,
            upload.size
        );

        // Detached so a client disconnect does not abort an engine run midway
        let service = self.clone();
        tokio::spawn(async move { service.separate_upload(workspace, upload).await })
            .await
            .map_err(|e| JobError::Aborted(e.to_string()))?
    }

    async fn separate_upload(
        &self,
        workspace: Workspace,
        upload: PersistedUpload,
    ) -> Result<SeparationOutcome, JobError> {
        let started = Instant::now();
        let outputs = self.gate.separate(&upload.path).await.inspect_err(|e| {
            tracing::error!("Separation failed for workspace {}: {}", workspace.id, e);
        })?;
        tracing::info!(
            "Engine finished workspace {} in {:?} with {} output(s)",
            workspace.id,
            started.elapsed(),
            outputs.len()
        );

        let engine = self.gate.engine();
        let mapper = OutputMapper::new(engine.model_tag(), engine.output_extension());
        let mapping = mapper.build_mapping(&base_name(&upload.filename));

        let mut stems = Vec::with_capacity(mapping.len());
        for output in &outputs {
            let Some(stem) = raw_file_name(output).and_then(|name| mapping.get(name)) else {
                tracing::warn!(
                    "Ignoring unrecognized engine output {} for workspace {}",
                    output.display(),
                    workspace.id
                );
                continue;
            };

            let destination = workspace.path_of(stem.canonical_name());
            match move_file(output, &destination).await {
                Ok(()) => stems.push(*stem),
                Err(e) => tracing::warn!(
                    "Failed to move {} to {}: {}",
                    output.display(),
                    destination.display(),
                    e
                ),
            }
        }

        if stems.len() < mapping.len() {
            tracing::warn!(
                "Workspace {} produced {}/{} expected stems",
                workspace.id,
                stems.len(),
                mapping.len()
            );
        } else {
            tracing::info!(
                "Workspace {} produced all {} stems",
                workspace.id,
                stems.len()
            );
        }

        Ok(SeparationOutcome {
            workspace_id: workspace.id,
            stems,
        })
    }
}

fn raw_file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

async fn persist_upload<R>(
    workspace: &Workspace,
    filename: &str,
    mut reader: R,
    limit: u64,
) -> Result<PersistedUpload, JobError>
where
    R: AsyncRead + Unpin + Send,
{
    let path = workspace.path_of(filename);
    let write_error = |source: io::Error| JobError::UploadWrite {
        path: path.clone(),
        source,
    };

    let mut file = tokio::fs::File::create(&path).await.map_err(write_error)?;
    let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];
    let mut size = 0u64;

    loop {
        let n = reader.read(&mut buffer).await.map_err(JobError::UploadRead)?;
        if n == 0 {
            break;
        }
        size += n as u64;
        if size > limit {
            return Err(JobError::UploadTooLarge { limit });
        }
        file.write_all(&buffer[..n]).await.map_err(write_error)?;
    }
    file.flush().await.map_err(write_error)?;

    if size == 0 {
        return Err(JobError::EmptyUpload);
    }

    Ok(PersistedUpload {
        filename: filename.to_string(),
        path,
        size,
    })
}
