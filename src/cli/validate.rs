//! Validate command: check a single plugin manifest and print a summary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use botmods::plugins::loader::{load_manifest, MANIFEST_FILE};
use botmods::plugins::PluginManifest;

/// Resolve a path argument to the manifest file it names.
///
/// A directory means `<dir>/plugin.json`; anything else is taken as the
/// manifest itself.
pub(crate) fn manifest_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(MANIFEST_FILE)
    } else {
        path.to_path_buf()
    }
}

pub(crate) fn cmd_validate(path: PathBuf) -> Result<()> {
    let manifest_path = manifest_path(&path);
    let manifest = load_manifest(&manifest_path)
        .with_context(|| format!("Invalid plugin manifest: {}", manifest_path.display()))?;

    print!("{}", summary(&manifest));
    Ok(())
}

fn summary(manifest: &PluginManifest) -> String {
    let mut out = format!(
        "OK: {} ({}) v{}\n",
        manifest.display_name, manifest.name, manifest.version
    );
    if !manifest.description.is_empty() {
        out.push_str(&format!("  {}\n", manifest.description));
    }
    out.push_str(&format!("  Languages: {}\n", manifest.languages.join(", ")));
    if let Some(min) = &manifest.metadata.min_core_version {
        out.push_str(&format!("  Requires core: >= {}\n", min));
    }

    out.push_str(&format!("  Commands ({}):\n", manifest.commands.len()));
    for command in &manifest.commands {
        let admin = if command.admin { " [admin]" } else { "" };
        out.push_str(&format!(
            "    {} - {}{}\n",
            command.label(),
            command.description,
            admin
        ));
    }

    out.push_str(&format!("  Settings ({}):\n", manifest.settings.len()));
    for (key, spec) in &manifest.settings {
        let required = if spec.required { " (required)" } else { "" };
        out.push_str(&format!(
            "    {}: {} = {}{}\n",
            key, spec.kind, spec.default, required
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use botmods::plugins::manifest;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_path_for_directory_and_file() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(manifest_path(tmp.path()), tmp.path().join("plugin.json"));

        let file = tmp.path().join("custom.json");
        assert_eq!(manifest_path(&file), file);
    }

    #[test]
    fn test_summary_lists_commands_and_settings() {
        let manifest = manifest::parse(&json!({
            "name": "weather",
            "display_name": "Weather",
            "version": "1.2.0",
            "commands": [
                { "command": "weather", "description": "Current weather" },
                { "command": "weather_reset", "admin": true }
            ],
            "settings": {
                "api_key": { "type": "string", "default": "", "required": true },
                "forecast_days": { "type": "int", "default": 5, "min": 1, "max": 7 }
            }
        }))
        .unwrap();

        let text = summary(&manifest);
        assert!(text.starts_with("OK: Weather (weather) v1.2.0"));
        assert!(text.contains("Commands (2):"));
        assert!(text.contains("[admin]"));
        assert!(text.contains("api_key: string =  (required)"));
        assert!(text.contains("forecast_days: int = 5"));
    }

    #[test]
    fn test_cmd_validate_reports_manifest_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("plugin.json"),
            r#"{"name": "x", "version": "1.0.0", "commands": [{"command": "Bad"}], "settings": {}}"#,
        )
        .unwrap();

        let err = cmd_validate(tmp.path().to_path_buf()).unwrap_err();
        assert!(format!("{:#}", err).contains("Bad"));
    }
}
