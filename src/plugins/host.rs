//! Plugin lifecycle and hosting for botmods
//!
//! Plugins are compiled into the host and registered explicitly at startup;
//! there is no directory-driven dynamic loading. Each plugin pairs a
//! validated manifest (from `plugin.json`) with a [`PluginModule`]
//! implementation:
//!
//! - [`PluginModule::activate`] receives an [`ActivationContext`] and returns
//!   an [`ActivePlugin`]: the per-installation instance that owns all of the
//!   plugin's mutable state.
//! - [`PluginModule::deactivate`] consumes that instance.
//!
//! Commands are routed by the host to the owning instance, which gets
//! `&mut self` for each call. Plugins never keep process-wide mutable state.
//!
//! # Example
//!
//! ```rust
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use botmods::error::Result;
//! use botmods::plugins::{
//!     manifest, ActivationContext, ActivePlugin, Invocation, Plugin, PluginConfig, PluginHost,
//!     PluginModule,
//! };
//! use semver::Version;
//! use serde_json::json;
//!
//! struct Counter;
//! struct ActiveCounter {
//!     hits: u64,
//! }
//!
//! #[async_trait]
//! impl ActivePlugin for ActiveCounter {
//!     async fn handle(&mut self, _invocation: &Invocation) -> Result<String> {
//!         self.hits += 1;
//!         Ok(format!("hits: {}", self.hits))
//!     }
//! }
//!
//! #[async_trait]
//! impl PluginModule for Counter {
//!     fn name(&self) -> &str {
//!         "counter"
//!     }
//!
//!     async fn activate(&self, _ctx: ActivationContext) -> Result<Box<dyn ActivePlugin>> {
//!         Ok(Box::new(ActiveCounter { hits: 0 }))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let tmp = std::env::temp_dir().join("botmods-doc-counter");
//! let mut host = PluginHost::new(PluginConfig::default(), Version::new(1, 0, 0), tmp);
//! let manifest = manifest::parse(&json!({
//!     "name": "counter",
//!     "version": "1.0.0",
//!     "commands": [{ "command": "count" }],
//!     "settings": {}
//! }))
//! .unwrap();
//! host.install(Plugin::new(manifest, PathBuf::from("counter")), Arc::new(Counter))
//!     .unwrap();
//! host.activate_all().await;
//!
//! let reply = host.dispatch(&Invocation::new("count", "", 1)).await.unwrap();
//! assert_eq!(reply, "hits: 1");
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{BotmodsError, Result};

use super::registry::PluginRegistry;
use super::settings::SettingsStore;
use super::types::{Plugin, PluginConfig, SettingValue};

/// File name of a plugin's persisted settings inside its data directory.
pub const SETTINGS_FILE: &str = "settings.json";

// ---------------------------------------------------------------------------
// Lifecycle interface
// ---------------------------------------------------------------------------

/// Everything a plugin receives when it is activated.
#[derive(Debug, Clone)]
pub struct ActivationContext {
    /// Plugin name.
    pub plugin: String,

    /// Setting values at activation time. Later edits apply on the next
    /// activation.
    pub settings: HashMap<String, SettingValue>,

    /// Private directory for the plugin's own data. Created by the host.
    pub data_dir: PathBuf,
}

impl ActivationContext {
    /// Look up a setting value.
    pub fn setting(&self, key: &str) -> Option<&SettingValue> {
        self.settings.get(key)
    }
}

/// A command invocation routed to a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Command token, without the leading slash.
    pub command: String,

    /// Everything after the command token.
    pub args: String,

    /// Chat user issuing the command.
    pub user_id: i64,

    /// Whether the user is privileged.
    pub is_admin: bool,

    /// Locale the user asked for, if known. [`PluginHost::dispatch`]
    /// replaces it with one the plugin supports.
    pub locale: Option<String>,
}

impl Invocation {
    /// A non-privileged invocation.
    pub fn new(command: impl Into<String>, args: impl Into<String>, user_id: i64) -> Self {
        Self {
            command: command.into(),
            args: args.into(),
            user_id,
            is_admin: false,
            locale: None,
        }
    }

    /// Mark the invocation as coming from a privileged user.
    pub fn as_admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    /// Attach the user's locale, e.g. `"ru"` or `"en-US"`.
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Parse a chat message like `/weather London`.
    ///
    /// Returns `None` if the text is not a command. A `@botname` suffix on
    /// the command token is stripped.
    pub fn parse(text: &str, user_id: i64) -> Option<Self> {
        let rest = text.trim_start().strip_prefix('/')?;
        let (token, args) = match rest.split_once(char::is_whitespace) {
            Some((token, args)) => (token, args.trim()),
            None => (rest, ""),
        };
        let token = token.split('@').next().unwrap_or_default();
        if token.is_empty() {
            return None;
        }
        Some(Self::new(token.to_ascii_lowercase(), args, user_id))
    }
}

/// A live plugin instance. Owns all per-installation mutable state.
#[async_trait]
pub trait ActivePlugin: Send {
    /// Handle one of the plugin's commands and return the reply text.
    async fn handle(&mut self, invocation: &Invocation) -> Result<String>;
}

/// The two-method capability every plugin implements.
#[async_trait]
pub trait PluginModule: Send + Sync {
    /// Must match the manifest's `name`.
    fn name(&self) -> &str;

    /// Bring the plugin up.
    async fn activate(&self, ctx: ActivationContext) -> Result<Box<dyn ActivePlugin>>;

    /// Tear the plugin down. The default just drops the instance.
    async fn deactivate(&self, active: Box<dyn ActivePlugin>) -> Result<()> {
        drop(active);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// Outcome of [`PluginHost::activate_all`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    /// Plugins activated by this call.
    pub activated: Vec<String>,

    /// Plugins that failed to activate, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Owns installed plugins, their settings, and their live instances.
///
/// Failures in one plugin (bad settings, incompatible host version,
/// activation errors) are logged and reported, never propagated to other
/// plugins.
pub struct PluginHost {
    config: PluginConfig,
    core_version: Version,
    data_root: PathBuf,
    overrides: HashMap<String, BTreeMap<String, Value>>,
    registry: PluginRegistry,
    modules: HashMap<String, Arc<dyn PluginModule>>,
    settings: HashMap<String, SettingsStore>,
    active: HashMap<String, Box<dyn ActivePlugin>>,
    usage: BTreeMap<(String, String), u64>,
}

impl PluginHost {
    /// Create an empty host.
    ///
    /// `core_version` is checked against each manifest's `min_core_version`;
    /// `data_root` holds one subdirectory per plugin.
    pub fn new(config: PluginConfig, core_version: Version, data_root: PathBuf) -> Self {
        Self {
            config,
            core_version,
            data_root,
            overrides: HashMap::new(),
            registry: PluginRegistry::new(),
            modules: HashMap::new(),
            settings: HashMap::new(),
            active: HashMap::new(),
            usage: BTreeMap::new(),
        }
    }

    /// Create a host from the full host configuration.
    pub fn from_config(config: &Config, core_version: Version) -> Self {
        let mut host = Self::new(config.plugins.clone(), core_version, config.data_dir());
        host.overrides = config.modules_settings.clone();
        host
    }

    /// The registry of installed plugins.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Data directory of one plugin.
    pub fn data_dir(&self, name: &str) -> PathBuf {
        self.data_root.join(name)
    }

    /// Install a plugin: register it and build its settings store.
    ///
    /// Settings are layered: manifest defaults, then configured overrides,
    /// then values the user saved in a previous run.
    pub fn install(&mut self, plugin: Plugin, module: Arc<dyn PluginModule>) -> Result<()> {
        let name = plugin.name().to_string();

        if module.name() != name {
            return Err(BotmodsError::Config(format!(
                "Module '{}' cannot serve plugin '{}'",
                module.name(),
                name
            )));
        }
        if !self.config.is_plugin_permitted(&name) {
            return Err(BotmodsError::Config(format!(
                "Plugin '{}' is not permitted by the allow/block lists",
                name
            )));
        }
        if self.active.contains_key(&name) {
            return Err(BotmodsError::Plugin(format!(
                "Plugin '{}' is active; deactivate it before reinstalling",
                name
            )));
        }

        let mut store = SettingsStore::from_manifest(&plugin.manifest);
        if let Some(overrides) = self.overrides.get(&name) {
            store.apply_overrides(overrides);
        }
        store.apply_saved(&self.settings_path(&name))?;

        self.registry.register(plugin)?;
        self.modules.insert(name.clone(), module);
        self.settings.insert(name, store);
        Ok(())
    }

    /// Deactivate (if needed) and remove a plugin.
    pub async fn uninstall(&mut self, name: &str) -> Result<()> {
        self.deactivate(name).await?;
        self.registry
            .unregister(name)
            .ok_or_else(|| BotmodsError::NotFound(format!("plugin '{}'", name)))?;
        self.modules.remove(name);
        self.settings.remove(name);
        Ok(())
    }

    /// Activate one plugin.
    ///
    /// Activating an already active plugin is a no-op. Fails while the
    /// plugin system is disabled in the host config.
    pub async fn activate(&mut self, name: &str) -> Result<()> {
        if !self.config.enabled {
            return Err(BotmodsError::Plugin(format!(
                "Plugin system is disabled, not activating '{}'",
                name
            )));
        }
        if self.active.contains_key(name) {
            debug!(plugin = %name, "Plugin already active");
            return Ok(());
        }

        let plugin = self
            .registry
            .get_plugin(name)
            .ok_or_else(|| BotmodsError::NotFound(format!("plugin '{}'", name)))?;
        if !plugin.enabled {
            return Err(BotmodsError::Plugin(format!("Plugin '{}' is disabled", name)));
        }
        if !plugin.manifest.is_compatible_with(&self.core_version) {
            return Err(BotmodsError::Plugin(format!(
                "Plugin '{}' requires core version {} or newer, this host is {}",
                name,
                plugin
                    .manifest
                    .metadata
                    .min_core_version
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                self.core_version
            )));
        }

        let store = self
            .settings
            .get(name)
            .ok_or_else(|| BotmodsError::NotFound(format!("settings for '{}'", name)))?;
        store.ensure_required()?;

        let module = self
            .modules
            .get(name)
            .cloned()
            .ok_or_else(|| BotmodsError::NotFound(format!("module for '{}'", name)))?;

        let data_dir = self.data_dir(name);
        tokio::fs::create_dir_all(&data_dir).await?;

        let ctx = ActivationContext {
            plugin: name.to_string(),
            settings: store.snapshot(),
            data_dir,
        };

        let instance = module.activate(ctx).await?;
        self.active.insert(name.to_string(), instance);
        info!(plugin = %name, "Activated plugin");
        Ok(())
    }

    /// Activate every enabled plugin that is not active yet.
    ///
    /// Individual failures are logged and collected in the report.
    pub async fn activate_all(&mut self) -> ActivationReport {
        let mut report = ActivationReport::default();

        if !self.config.enabled {
            info!("Plugin system disabled, not activating plugins");
            return report;
        }

        let pending: Vec<String> = self
            .registry
            .list_plugins()
            .into_iter()
            .filter(|p| p.enabled && !self.active.contains_key(p.name()))
            .map(|p| p.name().to_string())
            .collect();

        for name in pending {
            match self.activate(&name).await {
                Ok(()) => report.activated.push(name),
                Err(e) => {
                    warn!(plugin = %name, error = %e, "Failed to activate plugin, skipping");
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        info!(
            activated = report.activated.len(),
            failed = report.failed.len(),
            "Plugin activation finished"
        );
        report
    }

    /// Deactivate one plugin. Returns whether it was active.
    pub async fn deactivate(&mut self, name: &str) -> Result<bool> {
        let Some(instance) = self.active.remove(name) else {
            return Ok(false);
        };
        let module = self
            .modules
            .get(name)
            .cloned()
            .ok_or_else(|| BotmodsError::NotFound(format!("module for '{}'", name)))?;

        module.deactivate(instance).await?;
        info!(plugin = %name, "Deactivated plugin");
        Ok(true)
    }

    /// Deactivate every active plugin. Errors are logged, not returned.
    pub async fn shutdown(&mut self) {
        let mut names: Vec<String> = self.active.keys().cloned().collect();
        names.sort();
        for name in names {
            if let Err(e) = self.deactivate(&name).await {
                error!(plugin = %name, error = %e, "Failed to deactivate plugin");
            }
        }
    }

    /// Deactivate and activate a plugin, e.g. after its settings changed.
    pub async fn reload(&mut self, name: &str) -> Result<()> {
        self.deactivate(name).await?;
        self.activate(name).await
    }

    /// Enable or disable a plugin. Disabling an active plugin deactivates it.
    pub async fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        self.registry.set_enabled(name, enabled)?;
        if !enabled {
            self.deactivate(name).await?;
        }
        Ok(())
    }

    /// Whether a plugin currently has a live instance.
    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    /// Number of live plugin instances.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Settings of an installed plugin.
    pub fn settings(&self, name: &str) -> Option<&SettingsStore> {
        self.settings.get(name)
    }

    /// Mutable settings of an installed plugin. Call
    /// [`save_settings`](Self::save_settings) to persist and
    /// [`reload`](Self::reload) to hand new values to a live instance.
    pub fn settings_mut(&mut self, name: &str) -> Option<&mut SettingsStore> {
        self.settings.get_mut(name)
    }

    /// Persist a plugin's settings in its data directory.
    pub fn save_settings(&self, name: &str) -> Result<()> {
        let store = self
            .settings
            .get(name)
            .ok_or_else(|| BotmodsError::NotFound(format!("settings for '{}'", name)))?;
        store.save(&self.settings_path(name))
    }

    /// Number of dispatched calls to `command` of `plugin`.
    pub fn usage(&self, plugin: &str, command: &str) -> u64 {
        self.usage
            .get(&(plugin.to_string(), command.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Dispatch counts per `(plugin, command)`, sorted.
    pub fn usage_stats(&self) -> impl Iterator<Item = (&str, &str, u64)> + '_ {
        self.usage
            .iter()
            .map(|((plugin, command), count)| (plugin.as_str(), command.as_str(), *count))
    }

    /// Route an invocation to the plugin owning its command.
    ///
    /// The plugin sees the invocation with `locale` resolved to one of its
    /// declared languages. Calls that reach the plugin are counted, see
    /// [`usage`](Self::usage).
    ///
    /// # Errors
    /// - `NotFound` if no installed plugin provides the command
    /// - `Unauthorized` if the command is admin-only and the user is not
    /// - `Plugin` if the owning plugin is not active
    pub async fn dispatch(&mut self, invocation: &Invocation) -> Result<String> {
        let (plugin_name, admin_only, locale) = match self.registry.get_command(&invocation.command)
        {
            Some((plugin, command)) => {
                let requested = invocation.locale.as_deref().unwrap_or_default();
                (
                    plugin.name().to_string(),
                    command.admin,
                    plugin.manifest.resolve_language(requested).to_string(),
                )
            }
            None => {
                return Err(BotmodsError::NotFound(format!(
                    "command '/{}'",
                    invocation.command
                )))
            }
        };

        if admin_only && !invocation.is_admin {
            warn!(
                command = %invocation.command,
                user_id = invocation.user_id,
                "Rejected admin-only command"
            );
            return Err(BotmodsError::Unauthorized(format!(
                "command '/{}' is restricted to administrators",
                invocation.command
            )));
        }

        let instance = self.active.get_mut(&plugin_name).ok_or_else(|| {
            BotmodsError::Plugin(format!("Plugin '{}' is not active", plugin_name))
        })?;

        debug!(
            plugin = %plugin_name,
            command = %invocation.command,
            locale = %locale,
            "Dispatching command"
        );
        *self
            .usage
            .entry((plugin_name, invocation.command.clone()))
            .or_insert(0) += 1;

        let invocation = Invocation {
            locale: Some(locale),
            ..invocation.clone()
        };
        instance.handle(&invocation).await
    }

    fn settings_path(&self, name: &str) -> PathBuf {
        self.data_dir(name).join(SETTINGS_FILE)
    }
}
