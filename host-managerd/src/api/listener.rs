use std::fs::{self, Permissions};
use std::os::unix::fs::PermissionsExt;
use anyhow::{bail, Context, Result};
use nix::unistd::{chown, Gid};
use tokio::net::{UnixListener, UnixStream};
use crate::config::SocketConfig;

/// Bind the API socket, replacing a stale socket file left by a previous run,
/// then apply the configured group and file mode.
pub async fn bind(config: &SocketConfig) -> Result<UnixListener> {
    let path = &config.path;

    if tokio::fs::symlink_metadata(path).await.is_ok() {
        if UnixStream::connect(path).await.is_ok() {
            bail!("Socket {} is already in use", path.display());
        }
        tracing::info!("Removing stale socket {}", path.display());
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }

    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind to {}", path.display()))?;

    if let Some(gid) = config.group_id {
        chown(path, None, Some(Gid::from_raw(gid)))
            .with_context(|| format!("Failed to set group {} on {}", gid, path.display()))?;
    }
    fs::set_permissions(path, Permissions::from_mode(config.file_mode))
        .with_context(|| format!("Failed to set mode {:o} on {}", config.file_mode, path.display()))?;

    Ok(listener)
}
