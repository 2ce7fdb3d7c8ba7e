use crate::error::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use wikibots_domain::Value;

/// Persisted per-bot state: the changelog resume token plus any bot-specific
/// cursors the handler wants to carry across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotState {
    pub schema_version: u32,
    pub bot_id: String,
    pub rc_token: String,
    #[serde(default)]
    pub cursors: Value,
}

impl BotState {
    pub fn new(bot_id: impl Into<String>) -> Self {
        Self {
            schema_version: 1,
            bot_id: bot_id.into(),
            rc_token: String::new(),
            cursors: Value::map(),
        }
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save(&self, state: &BotState) -> Result<(), StorageError>;
    async fn load(&self, bot_id: &str) -> Result<BotState, StorageError>;
    async fn list_bots(&self) -> Result<Vec<String>, StorageError>;
    async fn delete(&self, bot_id: &str) -> Result<(), StorageError>;
}

/// JSON file implementation with crash-safe write (write-to-temp + rename).
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn validate_bot_id(id: &str) -> Result<(), StorageError> {
        if !id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(StorageError::InvalidStateId(format!(
                "bot id '{}' contains invalid characters. Only alphanumeric, hyphens, underscores, and periods are allowed.",
                id
            )));
        }
        if id.is_empty() || id.starts_with('.') {
            return Err(StorageError::InvalidStateId(format!(
                "bot id '{}' is invalid (empty or starts with '.')",
                id
            )));
        }
        Ok(())
    }

    fn state_path(&self, id: &str) -> Result<PathBuf, StorageError> {
        Self::validate_bot_id(id)?;
        Ok(self.dir.join(format!("{}.json", id)))
    }

    fn temp_path(&self, id: &str) -> Result<PathBuf, StorageError> {
        Self::validate_bot_id(id)?;
        Ok(self.dir.join(format!("{}.json.tmp", id)))
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn save(&self, state: &BotState) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StorageError::Serialize(e.to_string()))?;
        let temp = self.temp_path(&state.bot_id)?;
        let final_path = self.state_path(&state.bot_id)?;
        // Crash-safe: write to temp, then atomic rename.
        tokio::fs::write(&temp, &json).await?;
        tokio::fs::rename(&temp, &final_path).await?;
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<BotState, StorageError> {
        let path = self.state_path(id)?;
        if !path.exists() {
            // Try recovering from a temp file left by a crash mid-rename.
            let temp = self.temp_path(id)?;
            if temp.exists() {
                tokio::fs::rename(&temp, &path).await?;
            } else {
                return Err(StorageError::NotFound(id.to_string()));
            }
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let state: BotState = serde_json::from_str(&data)?;
        if state.schema_version != 1 {
            return Err(StorageError::SchemaMismatch {
                found: state.schema_version,
                expected: 1,
            });
        }
        Ok(state)
    }

    async fn list_bots(&self) -> Result<Vec<String>, StorageError> {
        let mut bots = Vec::new();
        if !self.dir.exists() {
            return Ok(bots);
        }
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    bots.push(stem.to_string());
                }
            }
        }
        Ok(bots)
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let path = self.state_path(id)?;
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        let temp = self.temp_path(id)?;
        if temp.exists() {
            tokio::fs::remove_file(&temp).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn round_trips_through_atomic_rename() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path());
        let mut state = BotState::new("archivebot");
        state.rc_token = "rc|4242".into();
        store.save(&state).await.unwrap();

        let loaded = store.load("archivebot").await.unwrap();
        assert_eq!(loaded.rc_token, "rc|4242");
        assert_eq!(loaded.bot_id, "archivebot");
    }

    #[tokio::test]
    async fn recovers_from_temp_file_left_by_a_crash() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path());
        let state = BotState::new("newsletterbot");
        let json = serde_json::to_string_pretty(&state).unwrap();
        tokio::fs::create_dir_all(dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join("newsletterbot.json.tmp"), json)
            .await
            .unwrap();

        let loaded = store.load("newsletterbot").await.unwrap();
        assert_eq!(loaded.bot_id, "newsletterbot");
    }

    #[tokio::test]
    async fn rejects_path_traversal_in_bot_id() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path());
        let result = store.load("../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidStateId(_))));
    }

    #[tokio::test]
    async fn list_bots_returns_every_saved_state_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path());
        store.save(&BotState::new("bot-a")).await.unwrap();
        store.save(&BotState::new("bot-b")).await.unwrap();

        let mut bots = store.list_bots().await.unwrap();
        bots.sort();
        assert_eq!(bots, vec!["bot-a".to_string(), "bot-b".to_string()]);
    }
}
