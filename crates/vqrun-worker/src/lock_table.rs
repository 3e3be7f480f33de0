//! Per-identity lock table.
//!
//! One async mutex per asset identity, created lazily on first use and kept
//! for the table's lifetime. Jobs sharing an identity run one at a time; jobs
//! with different identities never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Lock registry keyed by asset identity.
///
/// The table only grows. Scope it to one batch so growth is bounded by the
/// batch's distinct identities.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Exclusive hold on one identity. Dropping it releases the lock.
#[derive(Debug)]
pub struct IdentityGuard {
    identity: String,
    _guard: OwnedMutexGuard<()>,
}

impl IdentityGuard {
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared mutex for an identity, created on first use.
    pub fn handle(&self, identity: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            locks
                .entry(identity.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Wait for exclusive access to an identity.
    pub async fn acquire(&self, identity: &str) -> IdentityGuard {
        let handle = self.handle(identity);
        let guard = handle.lock_owned().await;
        debug!(identity = %identity, "Acquired asset lock");

        IdentityGuard {
            identity: identity.to_string(),
            _guard: guard,
        }
    }

    /// Give up an identity lock.
    pub fn release(&self, guard: IdentityGuard) {
        debug!(identity = %guard.identity, "Released asset lock");
        drop(guard);
    }

    /// Number of identities seen so far.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
