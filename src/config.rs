//! Configuration loading and persistence.
//!
//! Handles reading and writing the pushreg configuration file
//! (`config.json` in the config directory) and applying `PUSHREG_*`
//! environment overrides on top of it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::location::TrackerConfig;

const CONFIG_FILE: &str = "config.json";

/// Configuration for the registration runtime.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the notification directory, including any path prefix.
    pub server_url: String,
    /// Tenant (application) id the device registers under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Transport timeout in seconds for every directory request.
    pub request_timeout_secs: u64,
    /// Location sampling interval in seconds.
    pub location_interval_secs: u64,
    /// Minimum spacing in seconds between two pushed location fixes.
    pub location_fastest_interval_secs: u64,
    /// Reset local registration state even when the remote unregister fails.
    pub force_local_reset: bool,
    /// Directory for the history mirror. Defaults to the platform cache dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000/api".to_string(),
            tenant_id: None,
            request_timeout_secs: crate::constants::HTTP_REQUEST_TIMEOUT.as_secs(),
            location_interval_secs: crate::constants::LOCATION_UPDATE_INTERVAL.as_secs(),
            location_fastest_interval_secs: crate::constants::LOCATION_FASTEST_INTERVAL.as_secs(),
            force_local_reset: true,
            cache_dir: None,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `PUSHREG_CONFIG_DIR` env var: explicit override
    /// 2. Default: platform config dir (Linux: ~/.config/pushreg)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("PUSHREG_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("pushreg")
        };
        fs::create_dir_all(&dir).context("Failed to create config directory")?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing or unreadable file falls back to defaults.
    pub fn load() -> Result<Self> {
        let dir = Self::config_dir()?;
        let mut config = Self::load_from(&dir).unwrap_or_else(|e| {
            log::debug!("Using default config: {e:#}");
            Self::default()
        });
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads `config.json` from `dir` without overrides.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            anyhow::bail!("Config file not found at {}", config_path.display());
        }
        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;
        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Applies `PUSHREG_*` overrides read through `lookup`.
    ///
    /// Unparseable numeric or boolean values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(server_url) = lookup("PUSHREG_SERVER_URL") {
            self.server_url = server_url;
        }

        if let Some(tenant_id) = lookup("PUSHREG_TENANT_ID") {
            self.tenant_id = Some(tenant_id);
        }

        if let Some(timeout) = lookup("PUSHREG_REQUEST_TIMEOUT") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.request_timeout_secs = secs;
            }
        }

        if let Some(interval) = lookup("PUSHREG_LOCATION_INTERVAL") {
            if let Ok(secs) = interval.parse::<u64>() {
                self.location_interval_secs = secs;
            }
        }

        if let Some(interval) = lookup("PUSHREG_LOCATION_FASTEST_INTERVAL") {
            if let Ok(secs) = interval.parse::<u64>() {
                self.location_fastest_interval_secs = secs;
            }
        }

        if let Some(reset) = lookup("PUSHREG_FORCE_LOCAL_RESET") {
            match reset.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.force_local_reset = true,
                "0" | "false" | "no" => self.force_local_reset = false,
                _ => log::warn!("Ignoring invalid PUSHREG_FORCE_LOCAL_RESET={reset}"),
            }
        }

        if let Some(cache_dir) = lookup("PUSHREG_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(cache_dir));
        }
    }

    /// Persists the current configuration to the config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_dir()?)
    }

    /// Persists the current configuration to `dir`.
    pub fn save_to(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).context("Failed to create config directory")?;
        let config_path = dir.join(CONFIG_FILE);
        fs::write(&config_path, serde_json::to_string_pretty(self)?)
            .context("Failed to write config file")?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Transport timeout for directory requests.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Sampling cadence for the location tracker.
    ///
    /// A zero interval is raised to one second.
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            interval: Duration::from_secs(self.location_interval_secs.max(1)),
            fastest_interval: Duration::from_secs(self.location_fastest_interval_secs),
        }
    }

    /// The history mirror directory, if one can be determined.
    pub fn resolved_cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("pushreg")))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_url, "http://localhost:8000/api");
        assert_eq!(config.tenant_id, None);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.tracker_config(), TrackerConfig::default());
        assert!(config.force_local_reset);
    }

    #[test]
    fn test_zero_location_interval_is_raised() {
        let config = Config {
            location_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.tracker_config().interval, Duration::from_secs(1));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PUSHREG_SERVER_URL", "https://push.example.com/api"),
            ("PUSHREG_TENANT_ID", "T1"),
            ("PUSHREG_REQUEST_TIMEOUT", "5"),
            ("PUSHREG_LOCATION_INTERVAL", "not-a-number"),
            ("PUSHREG_FORCE_LOCAL_RESET", "false"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.server_url, "https://push.example.com/api");
        assert_eq!(config.tenant_id.as_deref(), Some("T1"));
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.location_interval_secs, 300);
        assert!(!config.force_local_reset);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            tenant_id: Some("T1".into()),
            cache_dir: Some(dir.path().join("cache")),
            ..Config::default()
        };

        config.save_to(dir.path()).unwrap();
        assert_eq!(Config::load_from(dir.path()).unwrap(), config);

        #[cfg(unix)]
        {
            let mode = fs::metadata(dir.path().join(CONFIG_FILE))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), r#"{"tenant_id":"T9"}"#).unwrap();

        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(config.tenant_id.as_deref(), Some("T9"));
        assert_eq!(config.location_fastest_interval_secs, 120);
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from(dir.path()).is_err());
    }
}
