use crate::config::ServiceConfig;
use crate::services::engine::{CommandEngine, SeparationEngine};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

/// Loads the separation model once. Failure here means the process cannot serve.
pub async fn setup_engine(config: &ServiceConfig) -> anyhow::Result<Arc<dyn SeparationEngine>> {
    info!(
        "🎛️  Loading model '{}' via '{}'...",
        config.model_config, config.engine_command
    );

    let engine = CommandEngine::load(config)
        .await
        .with_context(|| format!("Failed to load separation model '{}'", config.model_config))?;

    if engine.health_check().await {
        info!("✅ Separation engine ready (tag: {})", engine.model_tag());
    } else {
        warn!("⚠️  Separation engine loaded but did not answer its health check");
    }

    Ok(Arc::new(engine))
}
