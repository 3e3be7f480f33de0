//! Shared data models for the vqrun quality executor.
//!
//! This crate provides Serde-serializable types for:
//! - Asset descriptors (source paths, dimensions, transform parameters)
//! - Executor identities used as cache keys
//! - Quality results produced by computation kinds

pub mod asset;
pub mod error;
pub mod executor_id;
pub mod result;

// Re-export common types
pub use asset::{AssetDescriptor, Dimensions, FrameRegion, PixelFormat, ResamplingType, SourceFormat};
pub use error::{AssetError, AssetResult};
pub use executor_id::ExecutorId;
pub use result::{QualityResult, Scores};
