//! List command: discover plugins and print the command menu.

use std::path::PathBuf;

use anyhow::{Context, Result};

use botmods::config::Config;
use botmods::plugins::{discover_plugins, PluginRegistry};

pub(crate) fn cmd_list(dirs: Vec<PathBuf>, admin: bool) -> Result<()> {
    let dirs = if dirs.is_empty() {
        let config = Config::load().context("Failed to load configuration")?;
        config.plugins.resolved_plugin_dirs()
    } else {
        dirs
    };

    let registry = build_registry(&dirs)?;
    print!("{}", render(&registry, admin));
    Ok(())
}

/// Discover plugins and register them. Plugins whose commands collide with an
/// already registered plugin are reported and left out.
pub(crate) fn build_registry(dirs: &[PathBuf]) -> Result<PluginRegistry> {
    let plugins = discover_plugins(dirs).context("Plugin discovery failed")?;

    let mut registry = PluginRegistry::new();
    for plugin in plugins {
        let name = plugin.name().to_string();
        if let Err(e) = registry.register(plugin) {
            eprintln!("Skipping plugin '{}': {}", name, e);
        }
    }
    Ok(registry)
}

fn render(registry: &PluginRegistry, admin: bool) -> String {
    if registry.plugin_count() == 0 {
        return "No plugins found.\n".to_string();
    }

    let mut out = format!("Plugins ({}):\n", registry.plugin_count());
    for plugin in registry.list_plugins() {
        let state = if plugin.enabled { "enabled" } else { "disabled" };
        out.push_str(&format!(
            "  {} v{} [{}] {}\n",
            plugin.name(),
            plugin.manifest.version,
            state,
            plugin.path.display()
        ));
    }

    let commands = registry.visible_commands(admin);
    out.push_str(&format!("\nCommands ({}):\n", commands.len()));
    let mut category = None;
    for (plugin, command) in commands {
        if category != Some(command.category.as_str()) {
            out.push_str(&format!("  {}\n", command.category));
            category = Some(command.category.as_str());
        }
        out.push_str(&format!(
            "    {} - {} ({})\n",
            command.label(),
            command.description,
            plugin.name()
        ));
    }
    out
}
