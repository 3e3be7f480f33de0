//! Per-job log artifact.
//!
//! The log lives at `{workdir}/{executor_id}_{identity_hash}`. It is rewritten
//! from scratch before every computation, starts with the `{type}_{version}`
//! header line and a blank line, and receives the measurement tool's output.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use vqrun_media::{remove_dir_if_empty, remove_file_if_exists, DirRemoval};
use vqrun_models::{AssetDescriptor, ExecutorId};

use crate::error::{WorkerError, WorkerResult};

/// Attempts at creating the log when a concurrent teardown removes its directory.
const PREPARE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogArtifact {
    path: PathBuf,
}

impl LogArtifact {
    /// Log location for an asset measured by an executor.
    pub fn for_asset(asset: &AssetDescriptor, executor_id: &ExecutorId) -> Self {
        Self {
            path: asset
                .workdir()
                .join(format!("{}_{}", executor_id, asset.identity_hash())),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the parent directory and write a fresh log with `header`.
    ///
    /// Any previous content is truncated.
    pub async fn prepare(&self, header: &str) -> WorkerResult<()> {
        let parent = self.parent()?;
        let content = format!("{}\n\n", header);

        let mut last_err = None;
        for _ in 0..PREPARE_ATTEMPTS {
            fs::create_dir_all(parent).await?;
            match fs::write(&self.path, content.as_bytes()).await {
                Ok(()) => return Ok(()),
                // Another job's teardown removed the emptied directory in between
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %self.path.display(), "Log directory vanished, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_err
            .map(WorkerError::from)
            .unwrap_or_else(|| WorkerError::job_failed("could not create log artifact")))
    }

    /// Append raw tool output.
    pub async fn append(&self, bytes: &[u8]) -> WorkerResult<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn read_to_string(&self) -> WorkerResult<String> {
        Ok(fs::read_to_string(&self.path).await?)
    }

    /// Remove the log file only, leaving its directory.
    pub async fn remove(&self) -> WorkerResult<()> {
        remove_file_if_exists(&self.path).await?;
        Ok(())
    }

    /// Remove the log, then its directory if nothing else is left in it.
    ///
    /// A directory still holding other files (auxiliary tool output, other
    /// jobs' artifacts) is kept. Any other removal failure propagates.
    pub async fn teardown(&self) -> WorkerResult<DirRemoval> {
        remove_file_if_exists(&self.path).await?;
        let removal = remove_dir_if_empty(self.parent()?).await?;
        debug!(path = %self.path.display(), ?removal, "Log artifact removed");
        Ok(removal)
    }

    fn parent(&self) -> WorkerResult<&Path> {
        self.path.parent().ok_or_else(|| {
            WorkerError::config_error(format!(
                "log path {} has no parent directory",
                self.path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use vqrun_models::Dimensions;

    fn artifact(dir: &Path) -> (AssetDescriptor, LogArtifact) {
        let dims = Dimensions::new(352, 288);
        let asset = AssetDescriptor::new("ref.yuv", "dis.yuv", dir.join("work"), dims, dims);
        let executor = ExecutorId::new("PSNR", "1.0", &BTreeMap::new());
        let log = LogArtifact::for_asset(&asset, &executor);
        (asset, log)
    }

    #[test]
    fn test_log_path_layout() {
        let (asset, log) = artifact(Path::new("/data"));
        assert_eq!(
            log.path(),
            Path::new("/data/work").join(format!("PSNR_V1.0_{}", asset.identity_hash()))
        );
    }

    #[tokio::test]
    async fn test_prepare_truncates_previous_content() {
        let dir = TempDir::new().unwrap();
        let (_, log) = artifact(dir.path());

        tokio_test::assert_ok!(log.prepare("PSNR_1.0").await);
        log.append(b"psnr_y=40.0\n").await.unwrap();
        log.prepare("PSNR_1.0").await.unwrap();

        assert_eq!(log.read_to_string().await.unwrap(), "PSNR_1.0\n\n");
    }

    #[tokio::test]
    async fn test_teardown_removes_emptied_directory() {
        let dir = TempDir::new().unwrap();
        let (asset, log) = artifact(dir.path());

        log.prepare("PSNR_1.0").await.unwrap();
        assert_eq!(log.teardown().await.unwrap(), DirRemoval::Removed);
        assert!(!asset.workdir.exists());
    }

    #[tokio::test]
    async fn test_teardown_keeps_directory_with_auxiliary_file() {
        let dir = TempDir::new().unwrap();
        let (asset, log) = artifact(dir.path());

        log.prepare("PSNR_1.0").await.unwrap();
        std::fs::write(asset.workdir.join("tool_info.txt"), b"only first 15s used").unwrap();

        assert_eq!(log.teardown().await.unwrap(), DirRemoval::NotEmpty);
        assert!(!log.path().exists());
        assert!(asset.workdir.join("tool_info.txt").exists());
    }

    #[tokio::test]
    async fn test_remove_keeps_directory() {
        let dir = TempDir::new().unwrap();
        let (asset, log) = artifact(dir.path());

        log.prepare("PSNR_1.0").await.unwrap();
        log.remove().await.unwrap();
        assert!(!log.path().exists());
        assert!(asset.workdir.exists());
    }

    #[tokio::test]
    async fn test_teardown_without_log_is_fine() {
        let dir = TempDir::new().unwrap();
        let (_, log) = artifact(dir.path());

        assert_eq!(log.teardown().await.unwrap(), DirRemoval::Missing);
    }
}
