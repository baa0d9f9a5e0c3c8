//! Storage configuration types.

use serde::Deserialize;

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path, or `:memory:` for a throwaway database.
    pub path: String,
    /// Pool size for file-backed databases.
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "data/waybill.db".to_string(),
            max_connections: 5,
        }
    }
}
