//! Local data directory.
//!
//! Rows synced from the game API live as JSONL files, one entity per line:
//! - `wars.jsonl`
//! - `war_members.jsonl`
//! - `war_attacks.jsonl`
//! - `activity_events.jsonl`

pub mod jsonl;
mod source;

#[cfg(test)]
pub use jsonl::JsonlWriter;
pub use jsonl::{EntityType, FileReport, JsonlReader};
pub use source::{validate, JsonlSource, SourceCounts};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

/// Configuration for storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Path of the file holding one entity type.
    pub fn entity_path(&self, entity: EntityType) -> PathBuf {
        self.data_dir.join(entity.filename())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("./data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_paths() {
        let config = StorageConfig::new(PathBuf::from("/data"));

        assert_eq!(
            config.entity_path(EntityType::War),
            PathBuf::from("/data/wars.jsonl")
        );
        assert_eq!(
            config.entity_path(EntityType::Activity),
            PathBuf::from("/data/activity_events.jsonl")
        );
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
    }
}
