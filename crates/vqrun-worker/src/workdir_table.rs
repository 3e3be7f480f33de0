//! Working directories shared by concurrent jobs.
//!
//! Assets in a batch usually share one workdir. A job's log teardown removes
//! the workdir once it is empty, which must not happen while another job is
//! between creating the directory and writing its workfiles into it. Every
//! job holds a [`WorkdirLease`] for that span, and removal only happens when
//! the last lease leaves.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

type Users = Arc<Mutex<HashMap<PathBuf, usize>>>;

/// Counts the jobs currently using each working directory.
#[derive(Debug, Clone, Default)]
pub struct WorkdirTable {
    users: Users,
}

impl WorkdirTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job in `dir`.
    pub async fn enter(&self, dir: &Path) -> WorkdirLease {
        *self
            .users
            .lock()
            .await
            .entry(dir.to_path_buf())
            .or_insert(0) += 1;

        WorkdirLease {
            users: Arc::clone(&self.users),
            dir: dir.to_path_buf(),
            active: true,
        }
    }

    /// Jobs currently registered in `dir`.
    pub async fn users(&self, dir: &Path) -> usize {
        self.users.lock().await.get(dir).copied().unwrap_or(0)
    }
}

/// A job's claim on its working directory.
///
/// Dropping it without [`leave`](Self::leave) still unregisters the job.
#[derive(Debug)]
pub struct WorkdirLease {
    users: Users,
    dir: PathBuf,
    active: bool,
}

impl WorkdirLease {
    /// Unregister the job and run `cleanup`, telling it whether this was the
    /// last user of the directory.
    ///
    /// No job can enter the directory while `cleanup` runs.
    pub async fn leave<F, Fut, T>(mut self, cleanup: F) -> T
    where
        F: FnOnce(bool) -> Fut,
        Fut: Future<Output = T>,
    {
        self.active = false;
        let mut users = self.users.lock().await;
        let last = release(&mut users, &self.dir);
        debug!(dir = %self.dir.display(), last, "Leaving workdir");
        cleanup(last).await
    }
}

impl Drop for WorkdirLease {
    fn drop(&mut self) {
        if !self.active {
            return;
        }

        if let Ok(mut users) = self.users.try_lock() {
            release(&mut users, &self.dir);
            return;
        }

        // Table busy; unregister once it is free
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let users = Arc::clone(&self.users);
            let dir = std::mem::take(&mut self.dir);
            handle.spawn(async move {
                release(&mut *users.lock().await, &dir);
            });
        }
    }
}

/// Decrement the user count of `dir`; true when it drops to zero.
fn release(users: &mut HashMap<PathBuf, usize>, dir: &Path) -> bool {
    match users.get_mut(dir) {
        Some(count) if *count > 1 => {
            *count -= 1;
            false
        }
        Some(_) => {
            users.remove(dir);
            true
        }
        None => true,
    }
}
