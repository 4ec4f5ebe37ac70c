use crate::error::{Result, ShellError};
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_identifier")]
    pub identifier: String,
    /// Directory holding storage documents; the project data dir when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_ttl_secs() -> u64 {
    60 * 60
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3030
}

fn default_identifier() -> String {
    "cceditor".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            identifier: default_identifier(),
            dir: None,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

pub struct ConfigManager {
    config: ShellConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_path_internal()?;
        Self::from_path(config_path)
    }

    /// Load from an explicit file instead of the per-user config dir
    pub fn from_path(config_path: PathBuf) -> Result<Self> {
        let config = Self::load_or_default(&config_path)?;

        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn save(&self) -> Result<()> {
        let toml = toml::to_string_pretty(&self.config)
            .map_err(|e| ShellError::Configuration(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ShellError::Configuration(format!("Failed to create config dir: {}", e)))?;
        }

        fs::write(&self.config_path, toml)
            .map_err(|e| ShellError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> &ShellConfig {
        &self.config
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    /// Set a single dotted key (e.g. `server.port`) and save.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "cache.ttl_secs" => self.config.cache.ttl_secs = parse_value(key, value)?,
            "server.host" => self.config.server.host = value.to_string(),
            "server.port" => self.config.server.port = parse_value(key, value)?,
            "storage.identifier" => self.config.storage.identifier = value.to_string(),
            "storage.dir" => {
                self.config.storage.dir = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            _ => {
                return Err(ShellError::Configuration(format!(
                    "Unknown config key: {}",
                    key
                )));
            }
        }
        self.save()
    }

    /// Directory for LocalCache documents
    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.config.storage.dir {
            return Ok(dir.clone());
        }
        Ok(Self::project_dirs()?.data_dir().join("storage"))
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "cceditor", "cceditor").ok_or_else(|| {
            ShellError::Configuration("Could not determine config directory".to_string())
        })
    }

    fn get_config_path_internal() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    fn load_or_default(path: &Path) -> Result<ShellConfig> {
        let mut builder = Config::builder();
        if path.exists() {
            builder = builder.add_source(File::from(path.to_path_buf()));
        }

        let s = builder
            .add_source(Environment::with_prefix("CCEDITOR").separator("__"))
            .build()
            .map_err(|e| ShellError::Configuration(format!("Failed to build config: {}", e)))?;

        let config: ShellConfig = s.try_deserialize().map_err(|e| {
            ShellError::Configuration(format!("Failed to deserialize config: {}", e))
        })?;

        Ok(config)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ShellError::Configuration(format!("Invalid value for {}: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::from_path(dir.path().join("config.toml")).unwrap();
        let config = manager.get();

        assert_eq!(config.cache.ttl(), Duration::from_secs(3600));
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.storage.identifier, "cceditor");
        assert!(config.storage.dir.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[cache]\nttl_secs = 120\n").unwrap();

        let manager = ConfigManager::from_path(path).unwrap();
        assert_eq!(manager.get().cache.ttl_secs, 120);
        assert_eq!(manager.get().storage.identifier, "cceditor");
    }

    #[test]
    fn test_set_saves_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut manager = ConfigManager::from_path(path.clone()).unwrap();

        manager.set("storage.identifier", "workspace").unwrap();
        manager.set("storage.dir", "/tmp/cceditor-storage").unwrap();

        let reloaded = ConfigManager::from_path(path).unwrap();
        assert_eq!(reloaded.get().storage.identifier, "workspace");
        assert_eq!(
            reloaded.storage_dir().unwrap(),
            PathBuf::from("/tmp/cceditor-storage")
        );
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let dir = TempDir::new().unwrap();
        let mut manager = ConfigManager::from_path(dir.path().join("config.toml")).unwrap();

        assert!(manager.set("cache.ttl_secs", "soon").is_err());
        assert!(manager.set("no.such.key", "1").is_err());
    }
}
