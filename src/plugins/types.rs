//! Plugin types for botmods
//!
//! This module defines the typed, validated form of a plugin's `plugin.json`
//! descriptor, the setting schema used to seed per-installation settings,
//! the runtime plugin representation, and the plugin section of the host
//! configuration.
//!
//! Values of these types are produced by [`crate::plugins::manifest::parse`];
//! they are never deserialized directly from untrusted input.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BotmodsError, Result};

/// Locale assumed when a manifest does not list any.
pub(crate) const DEFAULT_LANGUAGE: &str = "en";

/// A validated plugin manifest.
///
/// Built once when the host discovers the plugin directory and immutable
/// afterwards. Setting defaults are copied out into a
/// [`SettingsStore`](crate::plugins::SettingsStore); the manifest itself is
/// never mutated.
///
/// # Example
///
/// ```json
/// {
///   "name": "weather",
///   "display_name": "Weather forecast",
///   "version": "1.0.0",
///   "commands": [
///     { "command": "weather", "description": "Show the forecast", "icon": "🌤️", "category": "Utility" }
///   ],
///   "settings": {
///     "api_key": { "type": "string", "default": "", "required": true },
///     "units": { "type": "choice", "options": ["metric", "imperial"], "default": "metric" },
///     "forecast_days": { "type": "int", "default": 5, "min": 1, "max": 7 },
///     "notifications_enabled": { "type": "bool", "default": false }
///   },
///   "languages": ["ru", "en"],
///   "background_tasks": { "enabled": true, "description": "Daily forecast notifications" },
///   "metadata": { "license": "MIT", "min_core_version": "1.0.0" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginManifest {
    /// Unique plugin slug.
    pub name: String,

    /// Human-readable name shown in menus. Defaults to `name`.
    pub display_name: String,

    /// Plugin version.
    pub version: Version,

    /// What the plugin does.
    pub description: String,

    /// Author name or handle.
    pub author: String,

    /// External package requirements, in declaration order.
    pub dependencies: Vec<String>,

    /// User-invokable commands, in declaration order. Tokens are distinct.
    pub commands: Vec<CommandSpec>,

    /// Configurable options keyed by setting name.
    pub settings: BTreeMap<String, SettingSpec>,

    /// Locale codes the plugin renders text in. Never empty.
    pub languages: Vec<String>,

    /// Whether the plugin runs background work once activated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_tasks: Option<BackgroundTasks>,

    /// Whether a freshly installed plugin starts enabled.
    pub enabled_by_default: bool,

    /// Advisory metadata.
    pub metadata: ManifestMetadata,

    /// Top-level keys this crate does not interpret, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PluginManifest {
    /// Look up a command by token.
    pub fn command(&self, token: &str) -> Option<&CommandSpec> {
        self.commands.iter().find(|c| c.command == token)
    }

    /// Look up a setting schema by key.
    pub fn setting(&self, key: &str) -> Option<&SettingSpec> {
        self.settings.get(key)
    }

    /// Whether the plugin can render text in `locale`.
    pub fn supports_language(&self, locale: &str) -> bool {
        self.languages.iter().any(|l| l == locale)
    }

    /// Pick the locale to render text in for a user asking for `requested`.
    ///
    /// An exact match wins, then a match on the primary subtag (`en-US`
    /// falls back to `en`). Anything else gets the first declared language.
    pub fn resolve_language(&self, requested: &str) -> &str {
        let requested = requested.trim();
        if let Some(exact) = self.languages.iter().find(|l| l.eq_ignore_ascii_case(requested)) {
            return exact;
        }
        let primary = requested.split(['-', '_']).next().unwrap_or_default();
        if let Some(base) = self.languages.iter().find(|l| l.eq_ignore_ascii_case(primary)) {
            return base;
        }
        self.languages
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_LANGUAGE)
    }

    /// Default value of every setting, keyed by setting name.
    pub fn default_values(&self) -> BTreeMap<String, SettingValue> {
        self.settings
            .iter()
            .map(|(key, spec)| (key.clone(), spec.default.clone()))
            .collect()
    }

    /// Check the `min_core_version` constraint against a host version.
    ///
    /// An absent (or malformed, hence dropped) constraint is always satisfied.
    pub fn is_compatible_with(&self, core_version: &Version) -> bool {
        match &self.metadata.min_core_version {
            Some(min) => core_version >= min,
            None => true,
        }
    }

    /// Serialize the manifest back to pretty JSON.
    ///
    /// The output parses back into an equal manifest.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(BotmodsError::from)
    }
}

/// A user-invokable command declared by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    /// Slash-free token, `[a-z0-9_]+`.
    pub command: String,

    /// Shown in the bot's command menu.
    pub description: String,

    /// Optional display glyph.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Menu category. Defaults to "General".
    pub category: String,

    /// Only privileged users may see and run this command.
    pub admin: bool,
}

impl CommandSpec {
    /// Menu label, e.g. `🌤️ /weather`.
    pub fn label(&self) -> String {
        match &self.icon {
            Some(icon) => format!("{} /{}", icon, self.command),
            None => format!("/{}", self.command),
        }
    }
}

/// Recognised setting types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingKind {
    String,
    Choice,
    Int,
    Bool,
}

impl SettingKind {
    /// Parse the manifest spelling of a setting type.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "choice" => Some(Self::Choice),
            "int" => Some(Self::Int),
            "bool" => Some(Self::Bool),
            _ => None,
        }
    }

    /// The manifest spelling of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Choice => "choice",
            Self::Int => "int",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for SettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete setting value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl SettingValue {
    /// An empty text value. Used to enforce `required` settings.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// JSON type name, for error messages.
    fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Text(_) => "string",
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Schema of one configurable plugin option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingSpec {
    /// Value type.
    #[serde(rename = "type")]
    pub kind: SettingKind,

    /// Default value. Always satisfies `kind` and the constraints below.
    pub default: SettingValue,

    /// Shown in the settings editor.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Must hold a non-empty value before the plugin activates.
    pub required: bool,

    /// Allowed values (`choice` only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,

    /// Inclusive lower bound (`int` only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,

    /// Inclusive upper bound (`int` only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
}

impl SettingSpec {
    /// Check that `value` has the right type and satisfies the constraints.
    ///
    /// Returns a human-readable reason on failure.
    pub fn check(&self, value: &SettingValue) -> std::result::Result<(), String> {
        match (self.kind, value) {
            (SettingKind::String, SettingValue::Text(_)) => Ok(()),
            (SettingKind::Bool, SettingValue::Bool(_)) => Ok(()),
            (SettingKind::Choice, SettingValue::Text(s)) => {
                let options = self.options.as_deref().unwrap_or_default();
                if options.iter().any(|o| o == s) {
                    Ok(())
                } else {
                    Err(format!(
                        "'{}' is not one of the options [{}]",
                        s,
                        options.join(", ")
                    ))
                }
            }
            (SettingKind::Int, SettingValue::Int(n)) => {
                if let Some(min) = self.min {
                    if *n < min {
                        return Err(format!("{} is below the minimum {}", n, min));
                    }
                }
                if let Some(max) = self.max {
                    if *n > max {
                        return Err(format!("{} is above the maximum {}", n, max));
                    }
                }
                Ok(())
            }
            (kind, value) => Err(format!(
                "expected {} value, found {}",
                kind,
                value.type_name()
            )),
        }
    }

    /// Convert a JSON value into a checked setting value.
    pub fn coerce(&self, raw: &Value) -> std::result::Result<SettingValue, String> {
        let value = match (self.kind, raw) {
            (SettingKind::String | SettingKind::Choice, Value::String(s)) => {
                SettingValue::Text(s.clone())
            }
            (SettingKind::Int, Value::Number(n)) => match n.as_i64() {
                Some(n) => SettingValue::Int(n),
                None => return Err(format!("expected integer, found {}", n)),
            },
            (SettingKind::Bool, Value::Bool(b)) => SettingValue::Bool(*b),
            (kind, other) => {
                return Err(format!(
                    "expected {} value, found {}",
                    kind,
                    json_type_name(other)
                ))
            }
        };
        self.check(&value)?;
        Ok(value)
    }

    /// Convert free text typed by a user into a checked setting value.
    ///
    /// Integers and booleans are parsed leniently (`on`/`off`, `yes`/`no`,
    /// `1`/`0` for booleans); choices are matched after trimming.
    pub fn parse_input(&self, input: &str) -> std::result::Result<SettingValue, String> {
        let trimmed = input.trim();
        let value = match self.kind {
            SettingKind::String => SettingValue::Text(input.to_string()),
            SettingKind::Choice => SettingValue::Text(trimmed.to_string()),
            SettingKind::Int => trimmed
                .parse::<i64>()
                .map(SettingValue::Int)
                .map_err(|_| format!("'{}' is not an integer", trimmed))?,
            SettingKind::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => SettingValue::Bool(true),
                "false" | "no" | "off" | "0" => SettingValue::Bool(false),
                _ => return Err(format!("'{}' is not a boolean", trimmed)),
            },
        };
        self.check(&value)?;
        Ok(value)
    }
}

/// JSON type name, for error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Background work a plugin performs while active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackgroundTasks {
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Advisory metadata. Malformed entries never reject the manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManifestMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Oldest host version the plugin supports. `None` when absent or
    /// unparsable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_core_version: Option<Version>,

    /// Any other metadata keys, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A loaded plugin with its manifest, filesystem path, and enabled state.
#[derive(Debug, Clone)]
pub struct Plugin {
    /// The validated plugin manifest.
    pub manifest: PluginManifest,

    /// The directory path where the plugin was loaded from.
    pub path: PathBuf,

    /// Whether this plugin is currently enabled.
    pub enabled: bool,
}

impl Plugin {
    /// Create a new plugin; it starts enabled if the manifest says so.
    pub fn new(manifest: PluginManifest, path: PathBuf) -> Self {
        let enabled = manifest.enabled_by_default;
        Self {
            manifest,
            path,
            enabled,
        }
    }

    /// Get the plugin name from its manifest.
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Get the number of commands defined by this plugin.
    pub fn command_count(&self) -> usize {
        self.manifest.commands.len()
    }
}

/// Plugin system configuration, stored within the host's config.json.
///
/// Controls whether plugins are loaded, which directories are scanned, and
/// which plugins are allowed or blocked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Whether the plugin system is enabled. Defaults to true.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directories to scan for plugin subdirectories.
    /// Defaults to `["~/.botmods/plugins"]`.
    #[serde(default = "default_plugin_dirs")]
    pub plugin_dirs: Vec<String>,

    /// Allowlist of plugin names. If empty, all discovered plugins are allowed.
    #[serde(default)]
    pub allowed_plugins: Vec<String>,

    /// Blocklist of plugin names. Takes precedence over the allowlist.
    #[serde(default)]
    pub blocked_plugins: Vec<String>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            plugin_dirs: default_plugin_dirs(),
            allowed_plugins: Vec::new(),
            blocked_plugins: Vec::new(),
        }
    }
}

impl PluginConfig {
    /// Check whether a plugin name is permitted by the allow/block lists.
    ///
    /// A plugin is permitted if:
    /// - It is not in the blocked list, AND
    /// - The allowed list is empty (all plugins allowed) OR the plugin is in the allowed list.
    pub fn is_plugin_permitted(&self, name: &str) -> bool {
        if self.blocked_plugins.iter().any(|b| b == name) {
            return false;
        }
        self.allowed_plugins.is_empty() || self.allowed_plugins.iter().any(|a| a == name)
    }

    /// Plugin directories with a leading `~` expanded to the home directory.
    pub fn resolved_plugin_dirs(&self) -> Vec<PathBuf> {
        self.plugin_dirs.iter().map(|d| expand_home(d)).collect()
    }
}

fn default_true() -> bool {
    true
}

/// Returns the default plugin directories.
fn default_plugin_dirs() -> Vec<String> {
    vec!["~/.botmods/plugins".to_string()]
}

/// Expand a leading `~/` using the current user's home directory.
pub(crate) fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
