//! Filesystem utilities for workfiles and log directories.

use std::io;
use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Outcome of [`remove_dir_if_empty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirRemoval {
    Removed,
    /// Directory still holds files (e.g. informational output left by a tool)
    NotEmpty,
    Missing,
}

/// Remove a file, treating a missing file as success.
///
/// Returns whether a file was actually removed.
pub async fn remove_file_if_exists(path: impl AsRef<Path>) -> MediaResult<bool> {
    match fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Remove a directory only if it is empty.
///
/// A non-empty directory is reported, not raised. Any other failure propagates.
pub async fn remove_dir_if_empty(path: impl AsRef<Path>) -> MediaResult<DirRemoval> {
    let path = path.as_ref();
    match fs::remove_dir(path).await {
        Ok(()) => Ok(DirRemoval::Removed),
        Err(e) if is_dir_not_empty_error(&e) => {
            tracing::debug!("Keeping non-empty directory {}", path.display());
            Ok(DirRemoval::NotEmpty)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DirRemoval::Missing),
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Check if an IO error means "directory not empty".
pub fn is_dir_not_empty_error(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::DirectoryNotEmpty
}

/// Create a directory and its parents if missing.
pub async fn ensure_dir(path: impl AsRef<Path>) -> MediaResult<()> {
    fs::create_dir_all(path.as_ref()).await?;
    Ok(())
}

/// Create a named pipe readable and writable by the owner.
#[cfg(unix)]
pub fn create_named_pipe(path: impl AsRef<Path>) -> MediaResult<()> {
    use nix::sys::stat::Mode;

    nix::unistd::mkfifo(path.as_ref(), Mode::S_IRUSR | Mode::S_IWUSR)
        .map_err(|errno| MediaError::Io(io::Error::from(errno)))
}

#[cfg(not(unix))]
pub fn create_named_pipe(path: impl AsRef<Path>) -> MediaResult<()> {
    Err(MediaError::Unsupported(format!(
        "named pipes are not available on this platform ({})",
        path.as_ref().display()
    )))
}

/// Unlink a named pipe, first waking any reader or writer blocked opening it.
///
/// A peer already waiting in `open` is paired with a short-lived read-write
/// handle and then sees end-of-file (or a broken pipe); later opens fail with
/// not-found. Returns whether the pipe existed.
#[cfg(unix)]
pub async fn release_named_pipe(path: impl AsRef<Path>) -> MediaResult<bool> {
    let path = path.as_ref();
    // Read-write open never blocks on a FIFO and counts as both ends
    let holder = match fs::OpenOptions::new().read(true).write(true).open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(MediaError::from(e)),
    };
    let removed = remove_file_if_exists(path).await?;
    drop(holder);
    Ok(removed)
}

#[cfg(not(unix))]
pub async fn release_named_pipe(path: impl AsRef<Path>) -> MediaResult<bool> {
    remove_file_if_exists(path).await
}

/// Check whether a path is a named pipe.
#[cfg(unix)]
pub fn is_named_pipe(path: impl AsRef<Path>) -> bool {
    use std::os::unix::fs::FileTypeExt;

    std::fs::symlink_metadata(path.as_ref())
        .map(|meta| meta.file_type().is_fifo())
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_named_pipe(_path: impl AsRef<Path>) -> bool {
    false
}
