use std::io;
use std::path::Path;

/// Moves `from` to `to`, replacing `to` if present. Falls back to copy + remove
/// when the two paths live on different filesystems.
pub async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!(
                "Cross-device move {} -> {}, copying instead",
                from.display(),
                to.display()
            );
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
        Err(e) => Err(e),
    }
}
