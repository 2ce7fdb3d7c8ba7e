use crate::error::StorageError;
use wikibots_domain::profile::Profile;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Process-wide bot preferences, layered under per-profile wiki connection
/// settings in the same TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    pub default_profile: String,
    pub log_level: String,
    /// `seconds_to_ignore` guard for `ChangeLog::update_from_source` (0 disables it).
    pub changelog_seconds_to_ignore: u32,
    /// Retention window for `changelog` rows, in days.
    pub changelog_retention_days: u32,
    /// Default batch size offered to `JobQueue::enumerate_ready` by the runner.
    pub job_batch_size: u32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            default_profile: "enwiki".to_string(),
            log_level: "info".to_string(),
            changelog_seconds_to_ignore: 0,
            changelog_retention_days: 35,
            job_batch_size: 50,
        }
    }
}

impl Preferences {
    pub fn validate(&self) -> Result<(), StorageError> {
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(StorageError::Deserialize(format!(
                    "invalid log_level '{}': expected trace|debug|info|warn|error",
                    other
                )));
            }
        }

        if self.changelog_retention_days < 1 {
            return Err(StorageError::Deserialize(format!(
                "changelog_retention_days {} must be >= 1",
                self.changelog_retention_days
            )));
        }

        if self.job_batch_size < 1 {
            return Err(StorageError::Deserialize(format!(
                "job_batch_size {} must be >= 1",
                self.job_batch_size
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    preferences: Preferences,
    #[serde(default)]
    profiles: std::collections::HashMap<String, Profile>,
}

pub struct TomlConfigStore {
    path: PathBuf,
}

impl TomlConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load_file(&self) -> Result<ConfigFile, StorageError> {
        if !self.path.exists() {
            return Ok(ConfigFile {
                preferences: Preferences::default(),
                profiles: std::collections::HashMap::new(),
            });
        }
        let data = std::fs::read_to_string(&self.path)?;
        let config: ConfigFile = toml::from_str(&data)?;
        Ok(config)
    }

    fn save_file(&self, config: &ConfigFile) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = toml::to_string_pretty(config)?;
        let tmp_path = self.path.with_extension("tmp");

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&tmp_path)?;
            file.write_all(data.as_bytes())?;
            file.sync_all()?;
            drop(file);
        }
        #[cfg(not(unix))]
        {
            std::fs::write(&tmp_path, &data)?;
        }

        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn load_preferences(&self) -> Result<Preferences, StorageError> {
        let prefs = self.load_file()?.preferences;
        prefs.validate()?;
        Ok(prefs)
    }

    pub fn save_preferences(&self, prefs: &Preferences) -> Result<(), StorageError> {
        prefs.validate()?;

        // Ensure parent directory exists before creating lock file
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let lock_path = self.path.with_extension("lock");
        let lock_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&lock_path)?;
        lock_file.lock_exclusive()?;

        let mut config = self.load_file()?;
        config.preferences = prefs.clone();
        self.save_file(&config)?;
        // lock released on drop
        Ok(())
    }

    pub fn load_profile(&self, id: &str) -> Result<Profile, StorageError> {
        let config = self.load_file()?;
        config
            .profiles
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    pub fn save_profile(&self, profile: &Profile) -> Result<(), StorageError> {
        // Ensure parent directory exists before creating lock file
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let lock_path = self.path.with_extension("lock");
        let lock_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&lock_path)?;
        lock_file.lock_exclusive()?;

        let mut config = self.load_file()?;
        config.profiles.insert(profile.id.clone(), profile.clone());
        self.save_file(&config)?;
        // lock released on drop
        Ok(())
    }

    pub fn list_profiles(&self) -> Result<Vec<Profile>, StorageError> {
        let config = self.load_file()?;
        Ok(config.profiles.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_preferences_default_values() {
        let prefs = Preferences::default();

        assert_eq!(prefs.default_profile, "enwiki");
        assert_eq!(prefs.log_level, "info");
        assert_eq!(prefs.changelog_retention_days, 35);
        assert_eq!(prefs.job_batch_size, 50);
    }

    #[test]
    fn test_toml_config_store_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let store = TomlConfigStore::new(&config_path);

        let prefs = Preferences {
            default_profile: "testwiki".to_string(),
            log_level: "debug".to_string(),
            changelog_seconds_to_ignore: 20,
            changelog_retention_days: 14,
            job_batch_size: 100,
        };

        // Save preferences
        let save_result = store.save_preferences(&prefs);
        assert!(save_result.is_ok(), "Should save preferences successfully");

        // Load preferences
        let loaded_prefs = store.load_preferences().unwrap();

        assert_eq!(loaded_prefs.default_profile, "testwiki");
        assert_eq!(loaded_prefs.log_level, "debug");
        assert_eq!(loaded_prefs.changelog_seconds_to_ignore, 20);
        assert_eq!(loaded_prefs.changelog_retention_days, 14);
        assert_eq!(loaded_prefs.job_batch_size, 100);
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir
            .path()
            .join("nested")
            .join("dir")
            .join("config.toml");
        let store = TomlConfigStore::new(&config_path);

        let prefs = Preferences::default();

        let result = store.save_preferences(&prefs);
        assert!(result.is_ok(), "Should create parent directories");
        assert!(
            config_path.parent().unwrap().exists(),
            "Parent directory should exist"
        );
        assert!(config_path.exists(), "Config file should exist");
    }

    #[test]
    fn test_load_from_nonexistent_file_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");
        let store = TomlConfigStore::new(&config_path);

        let result = store.load_preferences();
        assert!(
            result.is_ok(),
            "Should return default preferences for nonexistent file"
        );

        let prefs = result.unwrap();
        assert_eq!(prefs.default_profile, "enwiki");
    }

    #[test]
    fn test_profile_save_and_load() {
        use wikibots_domain::profile::{AuthMethod, Profile, ThrottlePolicy};
        use wikibots_domain::types::Namespace;
        use std::collections::HashSet;
        use std::time::Duration;

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let store = TomlConfigStore::new(&config_path);

        let mut default_namespaces = HashSet::new();
        default_namespaces.insert(Namespace::MAIN);

        let profile = Profile {
            id: "testwiki".to_string(),
            name: "Test Wiki".to_string(),
            api_url: url::Url::parse("https://test.wikipedia.org/w/api.php").unwrap(),
            auth_method: AuthMethod::BotPassword {
                username: "TestBot".to_string(),
            },
            default_namespaces,
            throttle_policy: ThrottlePolicy {
                min_edit_interval: Duration::from_secs(5),
                maxlag: 5,
                max_retries: 3,
                backoff_base: Duration::from_secs(2),
            },
        };

        // Save profile
        let save_result = store.save_profile(&profile);
        assert!(save_result.is_ok(), "Should save profile successfully");

        // Load profile
        let loaded_profile = store.load_profile("testwiki").unwrap();

        assert_eq!(loaded_profile.id, "testwiki");
        assert_eq!(loaded_profile.name, "Test Wiki");
        assert_eq!(
            loaded_profile.api_url.as_str(),
            "https://test.wikipedia.org/w/api.php"
        );
    }

    #[test]
    fn test_load_nonexistent_profile_returns_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let store = TomlConfigStore::new(&config_path);

        let result = store.load_profile("nonexistent");
        assert!(
            result.is_err(),
            "Should return error for nonexistent profile"
        );

        match result {
            Err(StorageError::NotFound(id)) => assert_eq!(id, "nonexistent"),
            _ => panic!("Expected NotFound error"),
        }
    }

    #[test]
    fn test_list_profiles() {
        use wikibots_domain::profile::{AuthMethod, Profile, ThrottlePolicy};
        use wikibots_domain::types::Namespace;
        use std::collections::HashSet;
        use std::time::Duration;

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let store = TomlConfigStore::new(&config_path);

        let mut default_namespaces = HashSet::new();
        default_namespaces.insert(Namespace::MAIN);

        // Save multiple profiles
        let profile1 = Profile {
            id: "wiki1".to_string(),
            name: "Wiki 1".to_string(),
            api_url: url::Url::parse("https://wiki1.org/w/api.php").unwrap(),
            auth_method: AuthMethod::BotPassword {
                username: "Bot1".to_string(),
            },
            default_namespaces: default_namespaces.clone(),
            throttle_policy: ThrottlePolicy {
                min_edit_interval: Duration::from_secs(5),
                maxlag: 5,
                max_retries: 3,
                backoff_base: Duration::from_secs(2),
            },
        };

        let profile2 = Profile {
            id: "wiki2".to_string(),
            name: "Wiki 2".to_string(),
            api_url: url::Url::parse("https://wiki2.org/w/api.php").unwrap(),
            auth_method: AuthMethod::BotPassword {
                username: "Bot2".to_string(),
            },
            default_namespaces: default_namespaces.clone(),
            throttle_policy: ThrottlePolicy {
                min_edit_interval: Duration::from_secs(5),
                maxlag: 5,
                max_retries: 3,
                backoff_base: Duration::from_secs(2),
            },
        };

        store.save_profile(&profile1).unwrap();
        store.save_profile(&profile2).unwrap();

        // List profiles
        let profiles = store.list_profiles().unwrap();

        assert_eq!(profiles.len(), 2);
        let ids: Vec<String> = profiles.iter().map(|p| p.id.clone()).collect();
        assert!(ids.contains(&"wiki1".to_string()));
        assert!(ids.contains(&"wiki2".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_permissions_are_restrictive() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let store = TomlConfigStore::new(&config_path);

        let prefs = Preferences::default();
        store.save_preferences(&prefs).unwrap();

        // Check file permissions
        let metadata = std::fs::metadata(&config_path).unwrap();
        let permissions = metadata.permissions();
        let mode = permissions.mode();

        // Should be 0600 (owner read/write only)
        assert_eq!(mode & 0o777, 0o600, "File permissions should be 0600");
    }

    #[test]
    fn test_validate_default_preferences() {
        let prefs = Preferences::default();
        assert!(prefs.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_invalid_log_level() {
        let mut prefs = Preferences::default();
        prefs.log_level = "verbose".to_string();
        assert!(prefs.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_retention_days() {
        let mut prefs = Preferences::default();
        prefs.changelog_retention_days = 0;
        assert!(prefs.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_job_batch_size() {
        let mut prefs = Preferences::default();
        prefs.job_batch_size = 0;
        assert!(prefs.validate().is_err());
    }
}
