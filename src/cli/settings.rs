//! Settings command: show a plugin's settings after all layers are applied.

use std::path::PathBuf;

use anyhow::{Context, Result};
use semver::Version;

use botmods::config::Config;
use botmods::plugins::host::SETTINGS_FILE;
use botmods::plugins::{load_plugin, PluginManifest, SettingsStore};

pub(crate) fn cmd_settings(plugin_dir: PathBuf, core_version: Option<Version>) -> Result<()> {
    let plugin = load_plugin(&plugin_dir)
        .with_context(|| format!("Failed to load plugin from {}", plugin_dir.display()))?;
    let config = Config::load().context("Failed to load configuration")?;

    let mut store = SettingsStore::from_manifest(&plugin.manifest);
    if let Some(overrides) = config.settings_for(plugin.name()) {
        store.apply_overrides(overrides);
    }
    let saved = config.data_dir().join(plugin.name()).join(SETTINGS_FILE);
    store
        .apply_saved(&saved)
        .with_context(|| format!("Failed to read saved settings {}", saved.display()))?;

    println!("{} v{}", plugin.manifest.display_name, plugin.manifest.version);
    print!("{}", render(&store));

    let core_version = core_version.or_else(|| config.core_version.clone());
    if let Some(line) = compatibility(&plugin.manifest, core_version) {
        println!("{}", line);
    }
    match store.ensure_required() {
        Ok(()) => println!("Ready to activate."),
        Err(e) => println!("Not ready: {}", e),
    }
    Ok(())
}

/// Describe the `min_core_version` check. Without a known core version the
/// requirement is only reported.
fn compatibility(manifest: &PluginManifest, core: Option<Version>) -> Option<String> {
    let min = manifest.metadata.min_core_version.as_ref()?;
    Some(match core {
        Some(core) if manifest.is_compatible_with(&core) => {
            format!("Compatible with core {} (requires >= {}).", core, min)
        }
        Some(core) => format!("Warning: plugin requires core >= {}, this core is {}", min, core),
        None => format!("Requires core >= {} (pass --core-version to check).", min),
    })
}

fn render(store: &SettingsStore) -> String {
    let mut keys: Vec<(String, String)> = store
        .snapshot()
        .into_iter()
        .map(|(key, value)| (key, value.to_string()))
        .collect();
    keys.sort();

    let mut out = String::new();
    for (key, value) in keys {
        let source = store.source(&key).as_str();
        let kind = store
            .spec(&key)
            .map(|spec| spec.kind.to_string())
            .unwrap_or_default();
        out.push_str(&format!("  {} ({}) = {} [{}]\n", key, kind, value, source));
    }
    out
}
