//! Host configuration for botmods
//!
//! Configuration lives in `config.json` under the botmods home directory
//! (`$BOTMODS_HOME`, or `~/.botmods` by default). Every field is optional.
//!
//! ```json
//! {
//!   "plugins": {
//!     "enabled": true,
//!     "plugin_dirs": ["~/.botmods/plugins", "/opt/bot/modules"],
//!     "allowed_plugins": [],
//!     "blocked_plugins": ["youtube_downloader"]
//!   },
//!   "modules_settings": {
//!     "weather": { "api_key": "abc123", "units": "imperial" }
//!   },
//!   "data_dir": "~/.botmods/data",
//!   "core_version": "1.4.0"
//! }
//! ```
//!
//! Environment overrides (applied after the file):
//! - `BOTMODS_PLUGIN_DIRS`: path list (`:`-separated on Unix) replacing `plugins.plugin_dirs`
//! - `BOTMODS_PLUGINS_ENABLED`: `true`/`false`

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{BotmodsError, Result};
use crate::plugins::types::expand_home;
use crate::plugins::PluginConfig;

/// Environment variable overriding the botmods home directory.
pub const HOME_ENV: &str = "BOTMODS_HOME";
const PLUGIN_DIRS_ENV: &str = "BOTMODS_PLUGIN_DIRS";
const PLUGINS_ENABLED_ENV: &str = "BOTMODS_PLUGINS_ENABLED";

const CONFIG_FILE: &str = "config.json";

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Plugin discovery and permission settings.
    pub plugins: PluginConfig,

    /// Per-plugin setting overrides: plugin name → setting key → value.
    pub modules_settings: HashMap<String, BTreeMap<String, Value>>,

    /// Where per-plugin data (settings files, caches) is kept.
    /// Defaults to `<home>/data`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Version of the bot core the plugins run in, checked against each
    /// manifest's `min_core_version`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_version: Option<Version>,
}

impl Config {
    /// The botmods home directory.
    pub fn dir() -> PathBuf {
        if let Some(home) = env::var_os(HOME_ENV) {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".botmods")
    }

    /// Path of the default config file.
    pub fn path() -> PathBuf {
        Self::dir().join(CONFIG_FILE)
    }

    /// Load the default config file, falling back to defaults when it does
    /// not exist, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load a config file from an explicit path. No environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            BotmodsError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            BotmodsError::Config(format!("Invalid config {}: {}", path.display(), e))
        })
    }

    /// Apply `BOTMODS_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Some(dirs) = env::var_os(PLUGIN_DIRS_ENV) {
            self.plugins.plugin_dirs = env::split_paths(&dirs)
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
        }

        if let Ok(raw) = env::var(PLUGINS_ENABLED_ENV) {
            match parse_bool(&raw) {
                Some(enabled) => self.plugins.enabled = enabled,
                None => warn!(
                    var = PLUGINS_ENABLED_ENV,
                    value = %raw,
                    "Ignoring non-boolean environment override"
                ),
            }
        }
    }

    /// Resolved per-plugin data root.
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => expand_home(dir),
            None => Self::dir().join("data"),
        }
    }

    /// Configured setting overrides for one plugin.
    pub fn settings_for(&self, plugin: &str) -> Option<&BTreeMap<String, Value>> {
        self.modules_settings.get(plugin)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert!(config.plugins.enabled);
        assert!(config.modules_settings.is_empty());
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_config_empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.plugins.plugin_dirs, vec!["~/.botmods/plugins"]);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(
            &path,
            json!({
                "plugins": {
                    "plugin_dirs": ["/opt/modules"],
                    "blocked_plugins": ["youtube_downloader"]
                },
                "modules_settings": {
                    "weather": { "api_key": "abc123", "forecast_days": 3 }
                },
                "data_dir": "/var/lib/botmods"
            })
            .to_string(),
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.plugins.plugin_dirs, vec!["/opt/modules"]);
        assert!(!config.plugins.is_plugin_permitted("youtube_downloader"));
        assert_eq!(
            config.settings_for("weather").unwrap()["forecast_days"],
            json!(3)
        );
        assert!(config.settings_for("news").is_none());
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/botmods"));
    }

    #[test]
    fn test_load_from_invalid_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, "{ nope").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, BotmodsError::Config(_)));

        let err = Config::load_from(&tmp.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_serialize_skips_unset_data_dir() {
        let value = serde_json::to_value(Config::default()).unwrap();
        assert!(value.get("data_dir").is_none());
        assert!(value["plugins"]["enabled"].as_bool().unwrap());
    }

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    /// Run `callback` with the given variables set (`Some`) or removed
    /// (`None`), restoring the previous values afterwards.
    fn with_temp_env(vars: &[(&str, Option<&str>)], callback: impl FnOnce()) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());

        let saved: Vec<(String, Option<std::ffi::OsString>)> = vars
            .iter()
            .map(|(key, _)| ((*key).to_string(), env::var_os(key)))
            .collect();
        for (key, value) in vars {
            match value {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback));

        for (key, value) in saved {
            match value {
                Some(value) => env::set_var(&key, value),
                None => env::remove_var(&key),
            }
        }
        if let Err(payload) = result {
            std::panic::resume_unwind(payload);
        }
    }

    #[test]
    fn test_env_overrides() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().to_string_lossy().into_owned();
        let dirs = env::join_paths(["/opt/modules", "/srv/bot/plugins"])
            .unwrap()
            .into_string()
            .unwrap();
        fs::write(
            tmp.path().join("config.json"),
            json!({ "plugins": { "enabled": false }, "core_version": "1.4.0" }).to_string(),
        )
        .unwrap();

        with_temp_env(
            &[
                (HOME_ENV, Some(home.as_str())),
                (PLUGIN_DIRS_ENV, Some(dirs.as_str())),
                (PLUGINS_ENABLED_ENV, Some("yes")),
            ],
            || {
                assert_eq!(Config::dir(), tmp.path());
                assert_eq!(Config::path(), tmp.path().join("config.json"));

                let config = Config::load().unwrap();
                assert_eq!(
                    config.plugins.plugin_dirs,
                    vec!["/opt/modules", "/srv/bot/plugins"]
                );
                assert!(config.plugins.enabled);
                assert_eq!(config.core_version, Some(Version::new(1, 4, 0)));
                assert_eq!(config.data_dir(), tmp.path().join("data"));
            },
        );

        with_temp_env(
            &[
                (HOME_ENV, Some(home.as_str())),
                (PLUGIN_DIRS_ENV, None),
                (PLUGINS_ENABLED_ENV, Some("maybe")),
            ],
            || {
                let config = Config::load().unwrap();
                // Non-boolean override is ignored, the file value stays
                assert!(!config.plugins.enabled);
                assert_eq!(config.plugins.plugin_dirs, vec!["~/.botmods/plugins"]);
            },
        );
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().to_string_lossy().into_owned();
        with_temp_env(
            &[
                (HOME_ENV, Some(home.as_str())),
                (PLUGIN_DIRS_ENV, None),
                (PLUGINS_ENABLED_ENV, None),
            ],
            || {
                let config = Config::load().unwrap();
                assert!(config.plugins.enabled);
                assert!(config.core_version.is_none());
            },
        );
    }
}
