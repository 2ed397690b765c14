//! File system helpers for lane steps.

use crate::error::{ErrorExt, ReleaseError, Result};
use std::io;
use std::path::Path;
use tokio::fs;

/// Whether `path` is a file with at least one execute bit set.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Make sure `path` can be executed, adding the execute bits once if needed.
///
/// Returns `true` when the file had to be remediated.
///
/// # Errors
///
/// [`ReleaseError::Permission`] when the file is missing or still not
/// executable after the chmod.
pub async fn ensure_executable(path: &Path) -> Result<bool> {
    if !path.is_file() {
        return Err(ReleaseError::Permission {
            path: path.to_path_buf(),
            reason: "file does not exist".to_string(),
        });
    }
    if is_executable(path) {
        return Ok(false);
    }

    log::warn!("{} is not executable, adding execute permission", path.display());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(path)
            .await
            .fs_context("reading permissions of", path)?
            .permissions()
            .mode();
        if let Err(e) = fs::set_permissions(path, std::fs::Permissions::from_mode(mode | 0o755)).await {
            return Err(ReleaseError::Permission {
                path: path.to_path_buf(),
                reason: format!("chmod failed: {e}"),
            });
        }
    }

    if is_executable(path) {
        Ok(true)
    } else {
        Err(ReleaseError::Permission {
            path: path.to_path_buf(),
            reason: "still not executable after adding execute permission".to_string(),
        })
    }
}

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()), // Idempotent
        Err(e) => Err(e).fs_context("removing", path),
    }
}
