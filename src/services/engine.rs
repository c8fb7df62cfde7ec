use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use crate::config::ServiceConfig;

const STDERR_TAIL_BYTES: usize = 2048;

/// How long a health probe result is reused before the engine is asked again.
const HEALTH_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to launch separation engine '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Separation engine exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("Model '{model}' could not be loaded: {reason}")]
    ModelLoad { model: String, reason: String },

    #[error("Engine I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Trait for audio separation backends
#[async_trait]
pub trait SeparationEngine: Send + Sync {
    /// Model identifier embedded in raw output names
    fn model_tag(&self) -> &str;

    /// Container format of the files the engine writes
    fn output_extension(&self) -> &str;

    /// Separates `input` and returns absolute paths of every file written.
    /// Outputs are placed wherever the engine chooses.
    async fn separate(&self, input: &Path) -> Result<Vec<PathBuf>, EngineError>;

    /// Check if the engine is available/healthy
    async fn health_check(&self) -> bool;
}

/// Drives the `audio-separator` command-line tool.
///
/// Every invocation gets a fresh directory under the output root so that
/// concurrent jobs never see each other's artifacts.
pub struct CommandEngine {
    command: String,
    extra_args: Vec<String>,
    model_config: String,
    model_tag: String,
    output_root: PathBuf,
    output_format: String,
}

impl CommandEngine {
    /// Prepares the output root and makes the tool fetch/verify the model
    /// before any request is accepted.
    pub async fn load(config: &ServiceConfig) -> Result<Self, EngineError> {
        tokio::fs::create_dir_all(&config.engine_output_dir).await?;
        let output_root = tokio::fs::canonicalize(&config.engine_output_dir).await?;

        let engine = Self {
            command: config.engine_command.clone(),
            extra_args: config.engine_extra_args.clone(),
            model_config: config.model_config.clone(),
            model_tag: config.model_tag(),
            output_root,
            output_format: config.output_format.clone(),
        };

        let output = engine
            .run(|cmd| {
                cmd.arg("--download_model_only")
                    .arg("--model_filename")
                    .arg(&engine.model_config);
            })
            .await?;

        if !output.status.success() {
            return Err(EngineError::ModelLoad {
                model: engine.model_config.clone(),
                reason: stderr_tail(&output),
            });
        }

        tracing::info!(
            "Model '{}' ready (outputs under {})",
            engine.model_config,
            engine.output_root.display()
        );
        Ok(engine)
    }

    async fn run(&self, configure: impl FnOnce(&mut Command)) -> Result<Output, EngineError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.extra_args).kill_on_drop(true);
        configure(&mut cmd);

        cmd.output().await.map_err(|source| EngineError::Spawn {
            command: self.command.clone(),
            source,
        })
    }
}

#[async_trait]
impl SeparationEngine for CommandEngine {
    fn model_tag(&self) -> &str {
        &self.model_tag
    }

    fn output_extension(&self) -> &str {
        &self.output_format
    }

    async fn separate(&self, input: &Path) -> Result<Vec<PathBuf>, EngineError> {
        let output_dir = self.output_root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&output_dir).await?;

        let output = self
            .run(|cmd| {
                cmd.arg(input)
                    .arg("--model_filename")
                    .arg(&self.model_config)
                    .arg("--output_dir")
                    .arg(&output_dir)
                    .arg("--output_format")
                    .arg(self.output_format.to_uppercase());
            })
            .await?;

        if !output.status.success() {
            return Err(EngineError::Failed {
                status: output.status,
                stderr: stderr_tail(&output),
            });
        }

        list_files(&output_dir).await
    }

    async fn health_check(&self) -> bool {
        match self.run(|cmd| {
            cmd.arg("--version");
        })
        .await
        {
            Ok(output) => output.status.success(),
            Err(e) => {
                tracing::debug!("Engine health check failed: {}", e);
                false
            }
        }
    }
}

async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    let mut start = trimmed.len().saturating_sub(STDERR_TAIL_BYTES);
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}

#[derive(Error, Debug)]
pub enum GateError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Separation did not finish within {0:?}")]
    Timeout(Duration),
}

/// Process-wide owner of the loaded engine. Bounds how many separations run at
/// once and how long each may take.
#[derive(Clone)]
pub struct EngineGate {
    engine: Arc<dyn SeparationEngine>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    last_health: Arc<Mutex<Option<(Instant, bool)>>>,
}

impl EngineGate {
    pub fn new(engine: Arc<dyn SeparationEngine>, concurrency: usize, timeout: Duration) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            timeout,
            last_health: Arc::new(Mutex::new(None)),
        }
    }

    pub fn engine(&self) -> &dyn SeparationEngine {
        self.engine.as_ref()
    }

    /// Engine health, probed at most once per `HEALTH_CACHE_TTL`. Concurrent
    /// callers wait for the same probe instead of starting their own.
    pub async fn health_check(&self) -> bool {
        let mut last = self.last_health.lock().await;
        if let Some((checked_at, healthy)) = *last {
            if checked_at.elapsed() < HEALTH_CACHE_TTL {
                return healthy;
            }
        }

        let healthy = self.engine.health_check().await;
        *last = Some((Instant::now(), healthy));
        healthy
    }

    pub async fn separate(&self, input: &Path) -> Result<Vec<PathBuf>, GateError> {
        let waiting = Instant::now();
        // The semaphore is never closed
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| EngineError::Io(io::Error::other(e)))?;

        let queued = waiting.elapsed();
        if queued > Duration::from_secs(1) {
            tracing::info!("Engine slot acquired after {:?} in queue", queued);
        }

        tokio::time::timeout(self.timeout, self.engine.separate(input))
            .await
            .map_err(|_| GateError::Timeout(self.timeout))?
            .map_err(GateError::from)
    }
}
