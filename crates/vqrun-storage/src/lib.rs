//! Result cache for quality runs.
//!
//! This crate provides:
//! - The [`ResultCache`] contract used by the executor
//! - A JSON-per-result filesystem store
//! - An in-memory store for tests and one-shot runs

pub mod cache;
pub mod error;
pub mod filesystem;
pub mod memory;

pub use cache::{CacheKey, ResultCache};
pub use error::{StorageError, StorageResult};
pub use filesystem::FileSystemResultStore;
pub use memory::InMemoryResultStore;
