//! Per-installation plugin settings
//!
//! A manifest only declares setting schemas and defaults. The host copies
//! those defaults into a [`SettingsStore`] when a plugin is installed and
//! layers configured overrides and user edits on top. The store is owned by
//! the host, never by the plugin, and is persisted as JSON:
//!
//! ```json
//! {
//!   "plugin": "weather",
//!   "values": { "api_key": "abc123", "forecast_days": 3 },
//!   "updated_at": "2026-01-01T08:00:00Z"
//! }
//! ```
//!
//! Values come from three layers, later ones winning: manifest defaults,
//! host-configured overrides (`modules_settings` in `config.json`), and
//! values the user set. Only user-supplied values are written, so a plugin
//! upgrade that changes a default, or an edit to the host config, takes
//! effect for settings the user never touched.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{BotmodsError, Result};

use super::types::{PluginManifest, SettingSpec, SettingValue};

/// On-disk form of a settings store.
#[derive(Debug, Serialize, Deserialize)]
struct SettingsFile {
    plugin: String,
    #[serde(default)]
    values: BTreeMap<String, Value>,
    updated_at: DateTime<Utc>,
}

/// Where the current value of a setting comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSource {
    /// The manifest default.
    Default,
    /// A host-configured override.
    Config,
    /// Set by the user.
    User,
}

impl SettingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Config => "config",
            Self::User => "set",
        }
    }
}

/// Mutable setting values for one installed plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsStore {
    plugin: String,
    specs: BTreeMap<String, SettingSpec>,
    values: BTreeMap<String, SettingValue>,
    configured: BTreeMap<String, SettingValue>,
    user_supplied: BTreeSet<String>,
}

impl SettingsStore {
    /// Seed a store with the manifest's defaults.
    pub fn from_manifest(manifest: &PluginManifest) -> Self {
        Self {
            plugin: manifest.name.clone(),
            specs: manifest.settings.clone(),
            values: manifest.default_values(),
            configured: BTreeMap::new(),
            user_supplied: BTreeSet::new(),
        }
    }

    /// Name of the plugin these settings belong to.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Current value of a setting.
    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key)
    }

    /// Schema of a setting.
    pub fn spec(&self, key: &str) -> Option<&SettingSpec> {
        self.specs.get(key)
    }

    /// Copy of every current value, as handed to a plugin on activation.
    pub fn snapshot(&self) -> HashMap<String, SettingValue> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Whether the current value was set by the user.
    pub fn is_user_supplied(&self, key: &str) -> bool {
        self.user_supplied.contains(key)
    }

    /// Which layer the current value of `key` comes from.
    pub fn source(&self, key: &str) -> SettingSource {
        if self.user_supplied.contains(key) {
            SettingSource::User
        } else if self.configured.contains_key(key) {
            SettingSource::Config
        } else {
            SettingSource::Default
        }
    }

    /// Set a value, checking it against the setting's schema.
    pub fn set(&mut self, key: &str, value: SettingValue) -> Result<()> {
        self.validate(key, &value)?;
        self.values.insert(key.to_string(), value);
        self.user_supplied.insert(key.to_string());
        Ok(())
    }

    /// Set a value from JSON (persisted stores, chat UIs sending JSON).
    pub fn set_json(&mut self, key: &str, raw: &Value) -> Result<()> {
        let value = self.coerce(key, raw)?;
        self.set(key, value)
    }

    /// Set a value from free text typed by a user, e.g. `"7"` or `"on"`.
    pub fn set_from_input(&mut self, key: &str, input: &str) -> Result<()> {
        let value = self
            .spec_for(key)?
            .parse_input(input)
            .map_err(|reason| self.invalid(key, reason))?;
        self.set(key, value)
    }

    /// Drop the user's value, falling back to the configured override or
    /// the manifest default.
    pub fn reset(&mut self, key: &str) -> Result<()> {
        let fallback = match self.configured.get(key) {
            Some(value) => value.clone(),
            None => self.spec_for(key)?.default.clone(),
        };
        self.values.insert(key.to_string(), fallback);
        self.user_supplied.remove(key);
        Ok(())
    }

    /// Apply host-configured overrides.
    ///
    /// Overrides are not user values: they are never saved, and a later
    /// user edit wins over them. Unknown keys and invalid values are logged
    /// and skipped; the setting keeps its previous value. Returns how many
    /// were applied.
    pub fn apply_overrides<'a, I>(&mut self, overrides: I) -> usize
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let mut applied = 0;
        for (key, raw) in overrides {
            let checked = self
                .coerce(key, raw)
                .and_then(|value| self.validate(key, &value).map(|()| value));
            match checked {
                Ok(value) => {
                    self.configured.insert(key.clone(), value.clone());
                    if !self.user_supplied.contains(key) {
                        self.values.insert(key.clone(), value);
                    }
                    applied += 1;
                }
                Err(e) => warn!(
                    plugin = %self.plugin,
                    setting = %key,
                    error = %e,
                    "Ignoring invalid setting override"
                ),
            }
        }
        applied
    }

    /// Check that every required setting holds a non-empty value.
    ///
    /// Called by the host right before activation.
    pub fn ensure_required(&self) -> Result<()> {
        for (key, spec) in &self.specs {
            if !spec.required {
                continue;
            }
            let empty = self.values.get(key).map_or(true, SettingValue::is_empty);
            if empty {
                return Err(BotmodsError::Settings(format!(
                    "Plugin '{}' requires setting '{}' to be set",
                    self.plugin, key
                )));
            }
        }
        Ok(())
    }

    /// Write user-supplied values to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut values = BTreeMap::new();
        for key in &self.user_supplied {
            if let Some(value) = self.values.get(key) {
                values.insert(key.clone(), serde_json::to_value(value)?);
            }
        }
        let file = SettingsFile {
            plugin: self.plugin.clone(),
            values,
            updated_at: Utc::now(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        debug!(plugin = %self.plugin, path = %path.display(), "Saved settings");
        Ok(())
    }

    /// Load a store for `manifest`, layering values saved at `path` over
    /// the defaults. A missing file yields the defaults.
    pub fn load(path: &Path, manifest: &PluginManifest) -> Result<Self> {
        let mut store = Self::from_manifest(manifest);
        store.apply_saved(path)?;
        Ok(store)
    }

    /// Layer values saved at `path` over the current ones. A missing file
    /// changes nothing. Returns how many values were applied.
    ///
    /// Saved values that no longer fit the schema (removed keys, changed
    /// types or options) are logged and dropped.
    pub fn apply_saved(&mut self, path: &Path) -> Result<usize> {
        if !path.exists() {
            return Ok(0);
        }

        let content = fs::read_to_string(path)?;
        let file: SettingsFile = serde_json::from_str(&content)?;
        if file.plugin != self.plugin {
            return Err(BotmodsError::Settings(format!(
                "{} holds settings for '{}', not '{}'",
                path.display(),
                file.plugin,
                self.plugin
            )));
        }

        let mut applied = 0;
        for (key, raw) in &file.values {
            match self.set_json(key, raw) {
                Ok(()) => applied += 1,
                Err(e) => warn!(
                    plugin = %self.plugin,
                    setting = %key,
                    error = %e,
                    "Dropping saved setting"
                ),
            }
        }
        Ok(applied)
    }

    fn coerce(&self, key: &str, raw: &Value) -> Result<SettingValue> {
        self.spec_for(key)?
            .coerce(raw)
            .map_err(|reason| self.invalid(key, reason))
    }

    fn validate(&self, key: &str, value: &SettingValue) -> Result<()> {
        let spec = self.spec_for(key)?;
        spec.check(value).map_err(|reason| self.invalid(key, reason))?;
        if spec.required && value.is_empty() {
            return Err(self.invalid(key, "a required setting cannot be empty".to_string()));
        }
        Ok(())
    }

    fn spec_for(&self, key: &str) -> Result<&SettingSpec> {
        self.specs.get(key).ok_or_else(|| {
            BotmodsError::NotFound(format!("setting '{}' in plugin '{}'", key, self.plugin))
        })
    }

    fn invalid(&self, key: &str, reason: String) -> BotmodsError {
        BotmodsError::Settings(format!(
            "Invalid value for '{}' in plugin '{}': {}",
            key, self.plugin, reason
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::manifest;
    use serde_json::json;
    use tempfile::TempDir;

    fn weather() -> PluginManifest {
        manifest::parse(&json!({
            "name": "weather",
            "version": "1.0.0",
            "commands": [{ "command": "weather" }],
            "settings": {
                "api_key": { "type": "string", "default": "", "required": true },
                "units": { "type": "choice", "options": ["metric", "imperial"], "default": "metric" },
                "forecast_days": { "type": "int", "default": 5, "min": 1, "max": 7 },
                "notifications_enabled": { "type": "bool", "default": false },
                "notification_time": { "type": "string", "default": "08:00" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_store_seeded_with_defaults() {
        let store = SettingsStore::from_manifest(&weather());
        assert_eq!(store.plugin(), "weather");
        assert_eq!(store.get("forecast_days"), Some(&SettingValue::Int(5)));
        assert_eq!(
            store.get("units"),
            Some(&SettingValue::Text("metric".to_string()))
        );
        assert!(!store.is_user_supplied("units"));
        assert_eq!(store.snapshot().len(), 5);
    }

    #[test]
    fn test_store_does_not_mutate_manifest() {
        let manifest = weather();
        let mut store = SettingsStore::from_manifest(&manifest);
        store.set("forecast_days", SettingValue::Int(2)).unwrap();
        assert_eq!(
            manifest.settings["forecast_days"].default,
            SettingValue::Int(5)
        );
    }

    #[test]
    fn test_set_validates() {
        let mut store = SettingsStore::from_manifest(&weather());
        store.set("forecast_days", SettingValue::Int(7)).unwrap();
        assert!(store.is_user_supplied("forecast_days"));

        let err = store.set("forecast_days", SettingValue::Int(8)).unwrap_err();
        assert!(matches!(err, BotmodsError::Settings(_)));
        assert_eq!(store.get("forecast_days"), Some(&SettingValue::Int(7)));

        assert!(store
            .set("units", SettingValue::Text("kelvin".to_string()))
            .is_err());
        assert!(matches!(
            store.set("missing", SettingValue::Bool(true)).unwrap_err(),
            BotmodsError::NotFound(_)
        ));
    }

    #[test]
    fn test_required_setting_rejects_empty_value() {
        let mut store = SettingsStore::from_manifest(&weather());
        let err = store
            .set("api_key", SettingValue::Text(" ".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_set_from_input() {
        let mut store = SettingsStore::from_manifest(&weather());
        store.set_from_input("notifications_enabled", "on").unwrap();
        store.set_from_input("forecast_days", " 3 ").unwrap();
        store.set_from_input("units", "imperial").unwrap();
        assert_eq!(
            store.get("notifications_enabled"),
            Some(&SettingValue::Bool(true))
        );
        assert_eq!(store.get("forecast_days"), Some(&SettingValue::Int(3)));
        assert!(store.set_from_input("forecast_days", "many").is_err());
    }

    #[test]
    fn test_reset_restores_default() {
        let mut store = SettingsStore::from_manifest(&weather());
        store.set_from_input("forecast_days", "2").unwrap();
        store.reset("forecast_days").unwrap();
        assert_eq!(store.get("forecast_days"), Some(&SettingValue::Int(5)));
        assert!(!store.is_user_supplied("forecast_days"));
    }

    #[test]
    fn test_apply_overrides_skips_invalid() {
        let mut store = SettingsStore::from_manifest(&weather());
        let overrides: BTreeMap<String, Value> = [
            ("api_key".to_string(), json!("secret")),
            ("forecast_days".to_string(), json!(42)),
            ("units".to_string(), json!("imperial")),
            ("unknown".to_string(), json!(true)),
        ]
        .into_iter()
        .collect();

        assert_eq!(store.apply_overrides(&overrides), 2);
        assert_eq!(
            store.get("api_key"),
            Some(&SettingValue::Text("secret".to_string()))
        );
        assert_eq!(store.get("forecast_days"), Some(&SettingValue::Int(5)));
        assert_eq!(store.source("api_key"), SettingSource::Config);
        assert_eq!(store.source("forecast_days"), SettingSource::Default);
        assert!(!store.is_user_supplied("api_key"));
    }

    #[test]
    fn test_overrides_are_not_saved() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        let mut store = SettingsStore::from_manifest(&weather());
        let overrides: BTreeMap<String, Value> =
            [("units".to_string(), json!("imperial"))].into_iter().collect();
        store.apply_overrides(&overrides);
        store.set_from_input("forecast_days", "3").unwrap();
        store.save(&path).unwrap();

        let saved: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["values"], json!({ "forecast_days": 3 }));
    }

    #[test]
    fn test_user_value_wins_over_override_and_reset_falls_back_to_it() {
        let mut store = SettingsStore::from_manifest(&weather());
        store.set_from_input("units", "metric").unwrap();
        let overrides: BTreeMap<String, Value> =
            [("units".to_string(), json!("imperial"))].into_iter().collect();
        store.apply_overrides(&overrides);
        assert_eq!(
            store.get("units"),
            Some(&SettingValue::Text("metric".to_string()))
        );
        assert_eq!(store.source("units"), SettingSource::User);

        store.reset("units").unwrap();
        assert_eq!(
            store.get("units"),
            Some(&SettingValue::Text("imperial".to_string()))
        );
        assert_eq!(store.source("units"), SettingSource::Config);
    }

    #[test]
    fn test_ensure_required() {
        let mut store = SettingsStore::from_manifest(&weather());
        let err = store.ensure_required().unwrap_err();
        assert!(err.to_string().contains("api_key"));

        store
            .set("api_key", SettingValue::Text("abc123".to_string()))
            .unwrap();
        assert!(store.ensure_required().is_ok());
    }

    #[test]
    fn test_save_and_load_user_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("weather").join("settings.json");
        let manifest = weather();

        let mut store = SettingsStore::from_manifest(&manifest);
        store.set_from_input("api_key", "abc123").unwrap();
        store.set_from_input("forecast_days", "3").unwrap();
        store.save(&path).unwrap();

        let saved: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["values"], json!({ "api_key": "abc123", "forecast_days": 3 }));

        let loaded = SettingsStore::load(&path, &manifest).unwrap();
        assert_eq!(loaded, store);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let manifest = weather();
        let store = SettingsStore::load(&tmp.path().join("none.json"), &manifest).unwrap();
        assert_eq!(store, SettingsStore::from_manifest(&manifest));
    }

    #[test]
    fn test_load_drops_values_that_no_longer_fit() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(
            &path,
            json!({
                "plugin": "weather",
                "values": { "units": "kelvin", "old_key": 1, "forecast_days": 6 },
                "updated_at": "2026-01-01T08:00:00Z"
            })
            .to_string(),
        )
        .unwrap();

        let store = SettingsStore::load(&path, &weather()).unwrap();
        assert_eq!(
            store.get("units"),
            Some(&SettingValue::Text("metric".to_string()))
        );
        assert_eq!(store.get("forecast_days"), Some(&SettingValue::Int(6)));
    }

    #[test]
    fn test_load_rejects_other_plugins_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(
            &path,
            json!({ "plugin": "news", "values": {}, "updated_at": "2026-01-01T08:00:00Z" })
                .to_string(),
        )
        .unwrap();

        assert!(matches!(
            SettingsStore::load(&path, &weather()).unwrap_err(),
            BotmodsError::Settings(_)
        ));
    }
}
