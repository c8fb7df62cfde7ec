use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Service configuration for the separation API
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding one sub-directory per workspace (default: "user_data")
    pub storage_root: PathBuf,

    /// Model configuration handed to the engine at startup (default: "htdemucs_6s.yaml")
    pub model_config: String,

    /// Separation command-line tool (default: "audio-separator")
    pub engine_command: String,

    /// Extra arguments placed before every engine invocation
    pub engine_extra_args: Vec<String>,

    /// Directory the engine writes its raw outputs into (default: "separator_output")
    pub engine_output_dir: PathBuf,

    /// Container format of engine outputs (default: "wav")
    pub output_format: String,

    /// Concurrent engine invocations allowed; 1 serializes all jobs (default: 1)
    pub engine_concurrency: usize,

    /// Upper bound on a single engine invocation (default: 30 minutes)
    pub engine_timeout: Duration,

    /// Maximum upload size in bytes (default: 256 MB)
    pub max_upload_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("user_data"),
            model_config: "htdemucs_6s.yaml".to_string(),
            engine_command: "audio-separator".to_string(),
            engine_extra_args: Vec::new(),
            engine_output_dir: PathBuf::from("separator_output"),
            output_format: "wav".to_string(),
            engine_concurrency: 1,
            engine_timeout: Duration::from_secs(1800),
            max_upload_size: 256 * 1024 * 1024, // 256 MB
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            storage_root: env::var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.storage_root),

            model_config: env::var("SEPARATOR_MODEL").unwrap_or(default.model_config),

            engine_command: env::var("SEPARATOR_COMMAND").unwrap_or(default.engine_command),

            engine_extra_args: env::var("SEPARATOR_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or(default.engine_extra_args),

            engine_output_dir: env::var("SEPARATOR_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.engine_output_dir),

            output_format: env::var("SEPARATOR_OUTPUT_FORMAT")
                .map(|v| v.to_lowercase())
                .unwrap_or(default.output_format),

            engine_concurrency: env::var("ENGINE_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(|n: usize| n.max(1))
                .unwrap_or(default.engine_concurrency),

            engine_timeout: env::var("ENGINE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.engine_timeout),

            max_upload_size: env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_size),
        }
    }

    /// Config rooted in a scratch directory, used by tests and local runs
    pub fn local(root: &Path) -> Self {
        Self {
            storage_root: root.join("user_data"),
            engine_output_dir: root.join("separator_output"),
            ..Self::default()
        }
    }

    /// Tag the engine embeds in its raw output names: the model config without its extension.
    pub fn model_tag(&self) -> String {
        Path::new(&self.model_config)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.model_config)
            .to_string()
    }
}
