//! Plugin discovery and loading for botmods
//!
//! This module handles discovering plugin directories and reading their
//! `plugin.json` descriptors from disk. Validation itself lives in
//! [`manifest`](super::manifest); this is the file-reading collaborator.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{BotmodsError, Result};

use super::manifest;
use super::types::{Plugin, PluginManifest};

/// File name of the descriptor inside each plugin directory.
pub const MANIFEST_FILE: &str = "plugin.json";

/// Discover plugins across multiple directories.
///
/// Scans each provided directory for subdirectories containing a `plugin.json`
/// file. Each valid plugin is loaded, validated, and returned sorted by name.
/// Invalid plugins are logged as warnings but do not cause the overall
/// discovery to fail.
///
/// # Example
///
/// ```no_run
/// use std::path::PathBuf;
/// use botmods::plugins::discover_plugins;
///
/// let dirs = vec![PathBuf::from("/home/user/.botmods/plugins")];
/// let plugins = discover_plugins(&dirs).unwrap();
/// for plugin in &plugins {
///     println!("Found plugin: {} v{}", plugin.name(), plugin.manifest.version);
/// }
/// ```
pub fn discover_plugins(dirs: &[PathBuf]) -> Result<Vec<Plugin>> {
    let mut plugins = Vec::new();

    for dir in dirs {
        if !dir.exists() {
            info!(dir = %dir.display(), "Plugin directory does not exist, skipping");
            continue;
        }

        if !dir.is_dir() {
            warn!(path = %dir.display(), "Plugin path is not a directory, skipping");
            continue;
        }

        let entries = fs::read_dir(dir).map_err(|e| {
            BotmodsError::Config(format!(
                "Failed to read plugin directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                BotmodsError::Config(format!("Failed to read directory entry: {}", e))
            })?;

            let entry_path = entry.path();
            if !entry_path.is_dir() || !entry_path.join(MANIFEST_FILE).exists() {
                debug!(path = %entry_path.display(), "No plugin manifest, skipping");
                continue;
            }

            match load_plugin(&entry_path) {
                Ok(plugin) => {
                    info!(
                        plugin = %plugin.name(),
                        version = %plugin.manifest.version,
                        commands = plugin.command_count(),
                        "Discovered plugin"
                    );
                    plugins.push(plugin);
                }
                Err(e) => {
                    warn!(
                        dir = %entry_path.display(),
                        error = %e,
                        "Failed to load plugin, skipping"
                    );
                }
            }
        }
    }

    plugins.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(plugins)
}

/// Load a single plugin from its directory.
///
/// Reads and validates `plugin.json` from the given directory and returns a
/// `Plugin`, enabled if the manifest's `enabled_by_default` says so.
///
/// # Errors
/// - `BotmodsError::NotFound` if `plugin.json` does not exist
/// - `BotmodsError::Json` if the JSON is malformed
/// - `BotmodsError::Manifest` if validation fails (see [`manifest::parse`])
pub fn load_plugin(dir: &Path) -> Result<Plugin> {
    let manifest_path = dir.join(MANIFEST_FILE);

    if !manifest_path.exists() {
        return Err(BotmodsError::NotFound(format!(
            "No {} found in {}",
            MANIFEST_FILE,
            dir.display()
        )));
    }

    let manifest = load_manifest(&manifest_path)?;
    Ok(Plugin::new(manifest, dir.to_path_buf()))
}

/// Read and validate a manifest file at an explicit path.
pub fn load_manifest(path: &Path) -> Result<PluginManifest> {
    let content = fs::read_to_string(path).map_err(|e| {
        BotmodsError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    manifest::parse_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ManifestError;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    /// Helper to build a valid manifest for testing.
    fn valid_manifest(name: &str, command: &str) -> Value {
        json!({
            "name": name,
            "version": "1.0.0",
            "description": "A test plugin",
            "commands": [{ "command": command, "description": "Test command" }],
            "settings": {
                "units": { "type": "choice", "options": ["metric", "imperial"], "default": "metric" }
            }
        })
    }

    /// Helper to write a plugin.json file into a new subdirectory.
    fn write_plugin(root: &Path, dir_name: &str, manifest: &Value) -> PathBuf {
        let dir = root.join(dir_name);
        fs::create_dir(&dir).unwrap();
        fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(manifest).unwrap(),
        )
        .unwrap();
        dir
    }

    // ---- discover_plugins tests ----

    #[test]
    fn test_discover_plugins_with_valid_plugins() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "weather", &valid_manifest("weather", "weather"));
        write_plugin(tmp.path(), "news", &valid_manifest("news", "news"));

        let plugins = discover_plugins(&[tmp.path().to_path_buf()]).unwrap();
        let names: Vec<&str> = plugins.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["news", "weather"]);
    }

    #[test]
    fn test_discover_plugins_empty_directory() {
        let tmp = TempDir::new().unwrap();
        let plugins = discover_plugins(&[tmp.path().to_path_buf()]).unwrap();
        assert!(plugins.is_empty());
    }

    #[test]
    fn test_discover_plugins_nonexistent_directory() {
        let plugins = discover_plugins(&[PathBuf::from("/nonexistent/path/plugins")]).unwrap();
        assert!(plugins.is_empty());
    }

    #[test]
    fn test_discover_plugins_skips_files_and_bare_dirs() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("not-a-dir.txt"), "hello").unwrap();
        fs::create_dir(tmp.path().join("empty-dir")).unwrap();

        let plugins = discover_plugins(&[tmp.path().to_path_buf()]).unwrap();
        assert!(plugins.is_empty());
    }

    #[test]
    fn test_discover_plugins_skips_invalid_plugins() {
        let tmp = TempDir::new().unwrap();
        write_plugin(tmp.path(), "weather", &valid_manifest("weather", "weather"));

        // Malformed JSON
        let broken = tmp.path().join("broken");
        fs::create_dir(&broken).unwrap();
        fs::write(broken.join(MANIFEST_FILE), "{ broken json").unwrap();

        // Valid JSON, invalid manifest
        let mut dup = valid_manifest("dup", "dup");
        dup["commands"] = json!([{ "command": "dup" }, { "command": "dup" }]);
        write_plugin(tmp.path(), "dup", &dup);

        let plugins = discover_plugins(&[tmp.path().to_path_buf()]).unwrap();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name(), "weather");
    }

    #[test]
    fn test_discover_plugins_multiple_directories() {
        let tmp1 = TempDir::new().unwrap();
        let tmp2 = TempDir::new().unwrap();
        write_plugin(tmp1.path(), "plugin-a", &valid_manifest("plugin-a", "a"));
        write_plugin(tmp2.path(), "plugin-b", &valid_manifest("plugin-b", "b"));

        let plugins =
            discover_plugins(&[tmp1.path().to_path_buf(), tmp2.path().to_path_buf()]).unwrap();
        assert_eq!(plugins.len(), 2);
    }

    // ---- load_plugin tests ----

    #[test]
    fn test_load_plugin_valid_manifest() {
        let tmp = TempDir::new().unwrap();
        let dir = write_plugin(tmp.path(), "weather", &valid_manifest("weather", "weather"));

        let plugin = load_plugin(&dir).unwrap();
        assert_eq!(plugin.name(), "weather");
        assert_eq!(plugin.manifest.version.to_string(), "1.0.0");
        assert!(plugin.enabled);
        assert_eq!(plugin.path, dir);
        assert_eq!(plugin.command_count(), 1);
    }

    #[test]
    fn test_load_plugin_respects_enabled_by_default() {
        let tmp = TempDir::new().unwrap();
        let mut manifest = valid_manifest("dormant", "dormant");
        manifest["enabled_by_default"] = json!(false);
        let dir = write_plugin(tmp.path(), "dormant", &manifest);

        assert!(!load_plugin(&dir).unwrap().enabled);
    }

    #[test]
    fn test_load_plugin_missing_plugin_json() {
        let tmp = TempDir::new().unwrap();
        let err = load_plugin(tmp.path()).unwrap_err();
        assert!(matches!(err, BotmodsError::NotFound(_)));
        assert!(err.to_string().contains("No plugin.json found"));
    }

    #[test]
    fn test_load_plugin_malformed_json() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(MANIFEST_FILE), "{ not valid json }").unwrap();

        let err = load_plugin(tmp.path()).unwrap_err();
        assert!(matches!(err, BotmodsError::Json(_)));
    }

    #[test]
    fn test_load_plugin_missing_required_fields() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(MANIFEST_FILE),
            r#"{"name": "incomplete", "version": "1.0.0", "settings": {}}"#,
        )
        .unwrap();

        let err = load_plugin(tmp.path()).unwrap_err();
        assert!(matches!(
            err,
            BotmodsError::Manifest(ManifestError::MissingField(ref f)) if f == "commands"
        ));
    }
}
