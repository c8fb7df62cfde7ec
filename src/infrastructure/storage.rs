use crate::config::ServiceConfig;
use anyhow::Context;
use tracing::info;

/// Ensures the storage root exists before the server accepts uploads.
pub async fn setup_storage(config: &ServiceConfig) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.storage_root)
        .await
        .with_context(|| {
            format!(
                "Failed to create storage root {}",
                config.storage_root.display()
            )
        })?;

    info!("🗄️  Storage root: {}", config.storage_root.display());
    Ok(())
}
