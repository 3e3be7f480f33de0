//! Executor identity.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Identity of a computation kind plus its result-affecting options.
///
/// Rendered as `{type}_V{version}`, followed by `_{key}_{value}` for every
/// option in ascending key order. Half of every cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ExecutorId(String);

impl ExecutorId {
    /// Build the identity for a kind with the given options.
    pub fn new(kind_type: &str, version: &str, options: &BTreeMap<String, String>) -> Self {
        let mut id = format!("{}_V{}", kind_type, version);
        for (key, value) in options {
            id.push_str(&format!("_{}_{}", key, value));
        }
        Self(id)
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First line written to every log artifact: `{type}_{version}`.
    pub fn log_header(kind_type: &str, version: &str) -> String {
        format!("{}_{}", kind_type, version)
    }
}

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_without_options() {
        let id = ExecutorId::new("PSNR", "1.0", &BTreeMap::new());
        assert_eq!(id.as_str(), "PSNR_V1.0");
    }

    #[test]
    fn test_options_sorted_by_key() {
        let mut options = BTreeMap::new();
        options.insert("model".to_string(), "v2".to_string());
        options.insert("enable_transform".to_string(), "true".to_string());

        let id = ExecutorId::new("VMAF", "0.6.1", &options);
        assert_eq!(id.as_str(), "VMAF_V0.6.1_enable_transform_true_model_v2");
    }

    #[test]
    fn test_log_header() {
        assert_eq!(ExecutorId::log_header("PSNR", "1.0"), "PSNR_1.0");
    }
}
