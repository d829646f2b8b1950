use {
  std::path::Path,
  serde::{Deserialize, Serialize},
  crate::{
    datastore::cursor::AccessMode,
    errors::{Error, Result},
  },
};

/// Store-level settings, normally read from a JSON file.
///
/// ```json
/// { "access_mode": "batched", "update_timeout_ms": 30000, "cache_written_ids": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
  pub access_mode: AccessMode,
  /// Global update timeout, 0 for none.
  pub update_timeout_ms: u64,
  /// Publish IDs allocated while writing into the shared read cache once
  /// the write has succeeded.
  pub cache_written_ids: bool,
}

impl Default for StoreConfig {
  fn default() -> Self {
    StoreConfig {
      access_mode: AccessMode::Streaming,
      update_timeout_ms: 0,
      cache_written_ids: false,
    }
  }
}

impl StoreConfig {
  pub fn from_json_str(json: &str) -> Result<Self> {
    serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
  }
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
    let raw = std::fs::read_to_string(path)?;
    Self::from_json_str(&raw)
  }
}
