//! Persisted configuration record and its file-backed store.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::StoreError;

/// On-disk configuration record, rewritten wholesale on every mutation.
///
/// ```json
/// {
///   "selectedChats": ["111@c.us"],
///   "slackWebhookUrl": "https://hooks.slack.com/services/...",
///   "serverPort": 3000,
///   "lastUpdated": "2024-05-01T12:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedConfig {
    #[serde(default)]
    pub selected_chats: Vec<String>,
    #[serde(default)]
    pub slack_webhook_url: String,
    /// Accepts a number or a numeric string; older files stored the raw
    /// `PORT` environment value.
    #[serde(default, deserialize_with = "deserialize_port")]
    pub server_port: Option<u16>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Persistence collaborator for the selection store.
pub trait ConfigStore: Send + Sync {
    /// Read the record. `Ok(None)` means nothing has been persisted yet.
    fn load(&self) -> Result<Option<PersistedConfig>, StoreError>;

    /// Replace the persisted record.
    fn save(&self, record: &PersistedConfig) -> Result<(), StoreError>;

    /// Human-readable location, for logs.
    fn location(&self) -> String;
}

/// Stores the record as pretty-printed JSON in a single file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<Option<PersistedConfig>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.display(),
                    source,
                });
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path: self.display(),
                reason: e.to_string(),
            })
    }

    fn save(&self, record: &PersistedConfig) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(record)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: self.display(),
                source,
            })?;
        }

        // Write to a sibling then rename so readers never see a torn file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| StoreError::Write {
            path: tmp.display().to_string(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| StoreError::Write {
            path: self.display(),
            source,
        })
    }

    fn location(&self) -> String {
        self.display()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> PersistedConfig {
        PersistedConfig {
            selected_chats: vec!["111@c.us".to_string(), "222@g.us".to_string()],
            slack_webhook_url: "https://hooks.slack.com/services/T/B/X".to_string(),
            server_port: Some(3000),
            last_updated: DateTime::from_timestamp(1_714_564_800, 0),
        }
    }

    #[test]
    fn test_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("config.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not valid json{{{").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_save_then_load_reproduces_record() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("config.json"));

        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));
    }

    #[test]
    fn test_resaving_loaded_record_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let store = JsonFileStore::new(&path);
        store.save(&sample()).unwrap();

        let loaded = store.load().unwrap().unwrap();
        store.save(&loaded).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();

        let reloaded = store.load().unwrap().unwrap();
        store.save(&reloaded).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = JsonFileStore::new(&path);

        store.save(&sample()).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_uses_camel_case_keys() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("selectedChats").is_some());
        assert!(json.get("slackWebhookUrl").is_some());
        assert!(json.get("serverPort").is_some());
        assert!(json.get("lastUpdated").is_some());
    }

    #[test]
    fn test_port_accepts_string_and_null() {
        let record: PersistedConfig =
            serde_json::from_str(r#"{"selectedChats":[],"serverPort":"8080"}"#).unwrap();
        assert_eq!(record.server_port, Some(8080));

        let record: PersistedConfig =
            serde_json::from_str(r#"{"serverPort":null,"lastUpdated":null}"#).unwrap();
        assert_eq!(record.server_port, None);
        assert_eq!(record.last_updated, None);
    }

    #[test]
    fn test_reads_javascript_iso_timestamps() {
        let record: PersistedConfig =
            serde_json::from_str(r#"{"lastUpdated":"2024-05-01T12:00:00.000Z"}"#).unwrap();
        assert_eq!(
            record.last_updated.map(|t| t.timestamp()),
            Some(1_714_564_800)
        );
    }
}
