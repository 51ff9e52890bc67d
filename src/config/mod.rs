//! Server configuration.
//!
//! Values come from an optional TOML file and are then overridden by
//! environment variables:
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `DATABASE_DIR` | `database_dir` | `<temp dir>/nanorss` |
//! | `REFRESH_INTERVAL_MINUTES` | `refresh_interval_minutes` | 15 |
//! | `ITEM_TTL_DAYS` | `item_ttl_days` | 14 |
//! | `LISTEN_ADDRESS` | `listen_address` | `0.0.0.0:8080` |
//! | `FETCH_WORKERS` | `fetch_workers` | 10 |

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::fetcher::DEFAULT_WORKERS;

/// Main configuration struct.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_dir: PathBuf,
    pub refresh_interval_minutes: u64,
    pub item_ttl_days: i64,
    pub listen_address: String,
    pub fetch_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_dir: std::env::temp_dir().join("nanorss"),
            refresh_interval_minutes: 15,
            item_ttl_days: 14,
            listen_address: "0.0.0.0:8080".to_string(),
            fetch_workers: DEFAULT_WORKERS,
        }
    }
}

impl Config {
    /// Loads `path` (if given) and applies environment overrides.
    ///
    /// Missing fields in the file use default values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Overrides fields from variables returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("DATABASE_DIR").filter(|v| !v.is_empty()) {
            self.database_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup("REFRESH_INTERVAL_MINUTES") {
            self.refresh_interval_minutes = parse_var("REFRESH_INTERVAL_MINUTES", &value)?;
        }
        if let Some(value) = lookup("ITEM_TTL_DAYS") {
            self.item_ttl_days = parse_var("ITEM_TTL_DAYS", &value)?;
        }
        if let Some(address) = lookup("LISTEN_ADDRESS").filter(|v| !v.is_empty()) {
            self.listen_address = address;
        }
        if let Some(value) = lookup("FETCH_WORKERS") {
            self.fetch_workers = parse_var("FETCH_WORKERS", &value)?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_minutes == 0 {
            return Err(ConfigError::Invalid("refresh_interval_minutes must be positive".into()));
        }
        if self.item_ttl_days <= 0 {
            return Err(ConfigError::Invalid("item_ttl_days must be positive".into()));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_minutes * 60)
    }
}

fn parse_var<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        name,
        value: value.to_string(),
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value {value:?} for {name}")]
    Env { name: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.database_dir.ends_with("nanorss"));
        assert_eq!(config.refresh_interval(), Duration::from_secs(15 * 60));
        assert_eq!(config.item_ttl_days, 14);
        assert_eq!(config.listen_address, "0.0.0.0:8080");
        assert_eq!(config.fetch_workers, 10);
    }

    #[test]
    fn test_partial_config() {
        let content = r#"
refresh_interval_minutes = 5
database_dir = "/var/lib/nanorss"
"#;
        let config: Config = toml::from_str(content).expect("Partial config should work");
        assert_eq!(config.refresh_interval_minutes, 5);
        assert_eq!(config.database_dir, PathBuf::from("/var/lib/nanorss"));
        assert_eq!(config.item_ttl_days, 14);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("DATABASE_DIR", "/data"),
                ("REFRESH_INTERVAL_MINUTES", "30"),
                ("ITEM_TTL_DAYS", " 7 "),
                ("LISTEN_ADDRESS", "127.0.0.1:9000"),
            ]))
            .unwrap();

        assert_eq!(config.database_dir, PathBuf::from("/data"));
        assert_eq!(config.refresh_interval_minutes, 30);
        assert_eq!(config.item_ttl_days, 7);
        assert_eq!(config.listen_address, "127.0.0.1:9000");
        assert_eq!(config.fetch_workers, 10);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("REFRESH_INTERVAL_MINUTES", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Env {
                name: "REFRESH_INTERVAL_MINUTES",
                ..
            }
        ));

        let err = config
            .apply_env(env(&[("REFRESH_INTERVAL_MINUTES", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nanorss.toml");
        fs::write(&path, "fetch_workers = 3\n").unwrap();
        assert_eq!(Config::from_file(&path).unwrap().fetch_workers, 3);

        fs::write(&path, "fetch_workers = \"many\"\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            Config::from_file(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
