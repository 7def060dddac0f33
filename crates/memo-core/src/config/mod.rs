//! User configuration shared by Quick Memo front ends.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::DEFAULT_VOLUME_TOLERANCE;
use crate::util::normalize_text_option;
use crate::view::SortMode;

/// Keys accepted by [`MemoConfig::set_value`].
pub const CONFIG_KEYS: [&str; 4] = [
    "remote_path",
    "volume_tolerance",
    "default_sort",
    "hide_completed",
];

/// Persisted settings; every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MemoConfig {
    /// SQLite database standing in for the cloud backend
    #[serde(default)]
    pub remote_path: Option<PathBuf>,
    /// Allowed local surplus before a reconcile asks for a decision
    #[serde(default = "default_volume_tolerance")]
    pub volume_tolerance: usize,
    #[serde(default)]
    pub default_sort: SortMode,
    #[serde(default)]
    pub hide_completed: bool,
}

const fn default_volume_tolerance() -> usize {
    DEFAULT_VOLUME_TOLERANCE
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            remote_path: None,
            volume_tolerance: DEFAULT_VOLUME_TOLERANCE,
            default_sort: SortMode::default(),
            hide_completed: false,
        }
    }
}

impl MemoConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::InvalidInput(format!(
                "Failed to parse config at {}: {error}",
                path.display()
            ))
        })?;
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Update one setting from its textual form.
    ///
    /// An empty value resets `remote_path`.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "remote_path" => {
                self.remote_path = normalize_text_option(Some(value.to_string())).map(PathBuf::from);
            }
            "volume_tolerance" => {
                self.volume_tolerance = value.trim().parse().map_err(|_| {
                    Error::InvalidInput(format!("volume_tolerance must be a number, got '{value}'"))
                })?;
            }
            "default_sort" => {
                self.default_sort = value.parse().map_err(Error::InvalidInput)?;
            }
            "hide_completed" => {
                self.hide_completed = value.trim().parse().map_err(|_| {
                    Error::InvalidInput(format!("hide_completed must be true or false, got '{value}'"))
                })?;
            }
            other => {
                return Err(Error::InvalidInput(format!(
                    "unknown config key '{other}' (expected one of: {})",
                    CONFIG_KEYS.join(", ")
                )))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = MemoConfig::load_from_path(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, MemoConfig::default());
        assert_eq!(config.volume_tolerance, 10);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"default_sort":"newest"}"#).unwrap();

        let config = MemoConfig::load_from_path(&path).unwrap();
        assert_eq!(config.default_sort, SortMode::Newest);
        assert_eq!(config.volume_tolerance, DEFAULT_VOLUME_TOLERANCE);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"supabase_url":"https://x"}"#).unwrap();

        assert!(matches!(
            MemoConfig::load_from_path(&path),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn roundtrip_after_set_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = MemoConfig::default();
        config.set_value("remote_path", " /tmp/remote.db ").unwrap();
        config.set_value("volume_tolerance", "25").unwrap();
        config.set_value("default_sort", "category").unwrap();
        config.set_value("hide_completed", "true").unwrap();
        config.save_to_path(&path).unwrap();

        let loaded = MemoConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.remote_path, Some(PathBuf::from("/tmp/remote.db")));
    }

    #[test]
    fn set_value_rejects_bad_input() {
        let mut config = MemoConfig::default();
        assert!(config.set_value("volume_tolerance", "lots").is_err());
        assert!(config.set_value("default_sort", "random").is_err());
        assert!(config.set_value("colour", "blue").is_err());
        assert_eq!(config, MemoConfig::default());
    }
}
