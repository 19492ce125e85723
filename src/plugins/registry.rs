//! Plugin registry for botmods
//!
//! This module provides the `PluginRegistry` struct for managing loaded plugins
//! and routing command tokens back to their owning plugin. It enforces plugin
//! name uniqueness and command uniqueness across all registered plugins, and
//! builds the command menu shown to users.

use std::collections::HashMap;

use tracing::info;

use crate::error::{BotmodsError, Result};

use super::types::{CommandSpec, Plugin};

/// A registry that holds loaded plugins and indexes their commands.
///
/// The registry maintains two mappings:
/// - Plugin name to plugin instance
/// - Command token to plugin name (the routing table)
///
/// # Example
///
/// ```rust
/// use botmods::plugins::{manifest, Plugin, PluginRegistry};
/// use serde_json::json;
/// use std::path::PathBuf;
///
/// let manifest = manifest::parse(&json!({
///     "name": "weather",
///     "version": "1.0.0",
///     "commands": [{ "command": "weather" }],
///     "settings": {}
/// }))
/// .unwrap();
///
/// let mut registry = PluginRegistry::new();
/// registry.register(Plugin::new(manifest, PathBuf::from("/tmp/weather"))).unwrap();
///
/// assert_eq!(registry.plugin_count(), 1);
/// assert_eq!(registry.plugin_for_command("weather"), Some("weather"));
/// ```
#[derive(Debug, Default)]
pub struct PluginRegistry {
    /// Map from plugin name to plugin instance.
    plugins: HashMap<String, Plugin>,

    /// Map from command token to the name of the plugin that provides it.
    command_to_plugin: HashMap<String, String>,
}

impl PluginRegistry {
    /// Create a new empty plugin registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin in the registry.
    ///
    /// Fails if a plugin with the same name is already registered from a
    /// different directory, or if any of its commands is already owned by
    /// another plugin. On failure the registry is unchanged.
    ///
    /// Registering the same plugin (same name and path) again replaces the
    /// old entry and its command mappings.
    pub fn register(&mut self, plugin: Plugin) -> Result<()> {
        let plugin_name = plugin.name().to_string();

        if let Some(existing) = self.plugins.get(&plugin_name) {
            if existing.path != plugin.path {
                return Err(BotmodsError::Config(format!(
                    "Plugin '{}' from {} conflicts with already loaded plugin at {}",
                    plugin_name,
                    plugin.path.display(),
                    existing.path.display()
                )));
            }
        }

        for command in &plugin.manifest.commands {
            if let Some(owner) = self.command_to_plugin.get(&command.command) {
                if owner != &plugin_name {
                    return Err(BotmodsError::Config(format!(
                        "Command '{}' from plugin '{}' conflicts with existing command from plugin '{}'",
                        command.command, plugin_name, owner
                    )));
                }
            }
        }

        // Re-registration: drop stale mappings first
        self.command_to_plugin.retain(|_, owner| owner != &plugin_name);

        for command in &plugin.manifest.commands {
            self.command_to_plugin
                .insert(command.command.clone(), plugin_name.clone());
        }

        info!(
            plugin = %plugin_name,
            version = %plugin.manifest.version,
            commands = plugin.command_count(),
            "Registered plugin"
        );

        self.plugins.insert(plugin_name, plugin);
        Ok(())
    }

    /// Remove a plugin and its commands. Returns the removed plugin.
    pub fn unregister(&mut self, name: &str) -> Option<Plugin> {
        let plugin = self.plugins.remove(name)?;
        self.command_to_plugin.retain(|_, owner| owner != name);
        info!(plugin = %name, "Unregistered plugin");
        Some(plugin)
    }

    /// Get a plugin by name.
    pub fn get_plugin(&self, name: &str) -> Option<&Plugin> {
        self.plugins.get(name)
    }

    /// Enable or disable a plugin. Disabled plugins keep their commands
    /// reserved but are hidden from menus and not activated.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let plugin = self
            .plugins
            .get_mut(name)
            .ok_or_else(|| BotmodsError::NotFound(format!("plugin '{}'", name)))?;
        plugin.enabled = enabled;
        info!(plugin = %name, enabled, "Plugin state changed");
        Ok(())
    }

    /// Look up which plugin provides a command, and return both the plugin
    /// and the command definition.
    pub fn get_command(&self, token: &str) -> Option<(&Plugin, &CommandSpec)> {
        let plugin_name = self.command_to_plugin.get(token)?;
        let plugin = self.plugins.get(plugin_name)?;
        let command = plugin.manifest.command(token)?;
        Some((plugin, command))
    }

    /// Get the plugin name that provides a given command.
    pub fn plugin_for_command(&self, token: &str) -> Option<&str> {
        self.command_to_plugin.get(token).map(|s| s.as_str())
    }

    /// Get the number of registered plugins.
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Get the number of registered commands across all plugins.
    pub fn command_count(&self) -> usize {
        self.command_to_plugin.len()
    }

    /// All registered plugins, sorted by name.
    pub fn list_plugins(&self) -> Vec<&Plugin> {
        let mut plugins: Vec<&Plugin> = self.plugins.values().collect();
        plugins.sort_by(|a, b| a.name().cmp(b.name()));
        plugins
    }

    /// Commands a user may see in the bot menu.
    ///
    /// Only enabled plugins contribute. Admin-only commands are included only
    /// when `is_admin` is set. Sorted by category, then by token.
    pub fn visible_commands(&self, is_admin: bool) -> Vec<(&Plugin, &CommandSpec)> {
        let mut visible: Vec<(&Plugin, &CommandSpec)> = self
            .plugins
            .values()
            .filter(|p| p.enabled)
            .flat_map(|p| p.manifest.commands.iter().map(move |c| (p, c)))
            .filter(|(_, c)| is_admin || !c.admin)
            .collect();
        visible.sort_by(|(_, a), (_, b)| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.command.cmp(&b.command))
        });
        visible
    }
}
