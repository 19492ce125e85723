//! Manifest validation for botmods
//!
//! Turns raw, already-decoded `plugin.json` content into a validated
//! [`PluginManifest`]. Validation is a pure function: no I/O and no shared
//! state, so manifests can be checked from any thread. Reading the file is
//! the loader's job.
//!
//! Checks, in order:
//! - Required top-level fields: `name`, `version`, `commands`, `settings`
//! - Plugin slug and semantic version
//! - Command tokens match `[a-z0-9_]+` and are unique
//! - Setting types are recognised and defaults satisfy their constraints
//! - `metadata.min_core_version` is a semantic version (soft: a bad value is
//!   logged and dropped, never rejected)

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{BotmodsError, ManifestError};

use super::types::{
    json_type_name, BackgroundTasks, CommandSpec, ManifestMetadata, PluginManifest, SettingKind,
    SettingSpec, SettingValue, DEFAULT_LANGUAGE,
};

/// Fields every manifest must carry, in the order they are reported.
const REQUIRED_FIELDS: &[&str] = &["name", "version", "commands", "settings"];

/// Top-level fields with a typed home in [`PluginManifest`].
const KNOWN_FIELDS: &[&str] = &[
    "name",
    "display_name",
    "version",
    "description",
    "author",
    "dependencies",
    "commands",
    "settings",
    "languages",
    "background_tasks",
    "enabled_by_default",
    "metadata",
];

const DEFAULT_CATEGORY: &str = "General";

static PLUGIN_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_\-]{0,63}$").expect("plugin name pattern is valid")
});

static COMMAND_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").expect("command token pattern is valid"));

type ParseResult<T> = std::result::Result<T, ManifestError>;

/// Validate decoded manifest content.
///
/// # Errors
/// - `MissingField` naming the first absent required field
/// - `InvalidCommandToken` / `DuplicateCommand` for bad commands
/// - `UnknownSettingType`, `InvalidDefault`, `InvalidBounds` for bad settings.
///   A choice setting with an empty `options` list fails with
///   `InvalidDefault`, since no default can be one of its options.
/// - `InvalidField` for any other wrongly-shaped field
///
/// # Example
///
/// ```
/// use botmods::plugins::manifest::parse;
/// use serde_json::json;
///
/// let manifest = parse(&json!({
///     "name": "weather",
///     "version": "1.0.0",
///     "commands": [{ "command": "weather" }],
///     "settings": {
///         "forecast_days": { "type": "int", "default": 5, "min": 1, "max": 7 }
///     }
/// }))
/// .unwrap();
/// assert_eq!(manifest.commands[0].command, "weather");
/// ```
pub fn parse(raw: &Value) -> Result<PluginManifest, ManifestError> {
    let obj = raw.as_object().ok_or_else(|| ManifestError::InvalidField {
        field: "<root>".to_string(),
        reason: format!("expected object, found {}", json_type_name(raw)),
    })?;

    for field in REQUIRED_FIELDS {
        if present(obj.get(*field)).is_none() {
            return Err(ManifestError::MissingField(field.to_string()));
        }
    }

    let name = required_str(obj, "name")?;
    if name.trim().is_empty() {
        return Err(ManifestError::MissingField("name".to_string()));
    }
    if !PLUGIN_NAME_RE.is_match(&name) {
        return Err(invalid(
            "name",
            "must be 1-64 letters, digits, hyphens or underscores, starting with a letter or digit",
        ));
    }

    let version_str = required_str(obj, "version")?;
    let version = Version::parse(version_str.trim())
        .map_err(|e| invalid("version", format!("'{}' is not a semantic version: {}", version_str, e)))?;

    let display_name = optional_str(obj, "display_name")?.unwrap_or_else(|| name.clone());
    let description = optional_str(obj, "description")?.unwrap_or_default();
    let author = optional_str(obj, "author")?.unwrap_or_default();
    let dependencies = optional_str_list(obj, "dependencies")?.unwrap_or_default();

    let commands = parse_commands(&obj["commands"])?;
    let settings = parse_settings(&obj["settings"])?;
    let languages = parse_languages(obj.get("languages"))?;
    let background_tasks = parse_background_tasks(obj.get("background_tasks"))?;
    let enabled_by_default = optional_bool(obj, "enabled_by_default")?.unwrap_or(true);
    let metadata = parse_metadata(&name, obj.get("metadata"))?;

    let extra = obj
        .iter()
        .filter(|(key, _)| !KNOWN_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(PluginManifest {
        name,
        display_name,
        version,
        description,
        author,
        dependencies,
        commands,
        settings,
        languages,
        background_tasks,
        enabled_by_default,
        metadata,
        extra,
    })
}

/// Decode JSON text and validate it.
///
/// Malformed JSON surfaces as `BotmodsError::Json`; validation failures as
/// `BotmodsError::Manifest`.
pub fn parse_str(content: &str) -> Result<PluginManifest, BotmodsError> {
    let raw: Value = serde_json::from_str(content)?;
    Ok(parse(&raw)?)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn parse_commands(raw: &Value) -> ParseResult<Vec<CommandSpec>> {
    let entries = raw
        .as_array()
        .ok_or_else(|| invalid("commands", format!("expected array, found {}", json_type_name(raw))))?;

    let mut seen = HashSet::new();
    let mut commands = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let path = format!("commands[{}]", index);
        let obj = entry
            .as_object()
            .ok_or_else(|| invalid(&path, format!("expected object, found {}", json_type_name(entry))))?;

        let token = match present(obj.get("command")) {
            Some(Value::String(s)) => s.clone(),
            None => return Err(ManifestError::MissingField(format!("{}.command", path))),
            Some(other) => {
                return Err(invalid(
                    format!("{}.command", path),
                    format!("expected string, found {}", json_type_name(other)),
                ))
            }
        };

        if !COMMAND_TOKEN_RE.is_match(&token) {
            return Err(ManifestError::InvalidCommandToken(token));
        }
        if !seen.insert(token.clone()) {
            return Err(ManifestError::DuplicateCommand(token));
        }

        commands.push(CommandSpec {
            command: token,
            description: optional_str_at(obj, &path, "description")?.unwrap_or_default(),
            icon: optional_str_at(obj, &path, "icon")?,
            category: optional_str_at(obj, &path, "category")?
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            admin: optional_bool_at(obj, &path, "admin")?.unwrap_or(false),
        });
    }

    Ok(commands)
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

fn parse_settings(raw: &Value) -> ParseResult<BTreeMap<String, SettingSpec>> {
    let entries = raw
        .as_object()
        .ok_or_else(|| invalid("settings", format!("expected object, found {}", json_type_name(raw))))?;

    entries
        .iter()
        .map(|(key, value)| parse_setting(key, value).map(|spec| (key.clone(), spec)))
        .collect()
}

fn parse_setting(key: &str, raw: &Value) -> ParseResult<SettingSpec> {
    let path = format!("settings.{}", key);
    let obj = raw
        .as_object()
        .ok_or_else(|| invalid(&path, format!("expected object, found {}", json_type_name(raw))))?;

    let kind = match present(obj.get("type")) {
        Some(Value::String(s)) => {
            SettingKind::from_name(s).ok_or_else(|| ManifestError::UnknownSettingType {
                key: key.to_string(),
                kind: s.clone(),
            })?
        }
        None => return Err(ManifestError::MissingField(format!("{}.type", path))),
        Some(other) => {
            return Err(ManifestError::UnknownSettingType {
                key: key.to_string(),
                kind: other.to_string(),
            })
        }
    };

    let raw_default = present(obj.get("default"))
        .ok_or_else(|| ManifestError::MissingField(format!("{}.default", path)))?;

    let options = parse_options(key, &path, kind, obj)?;
    let (min, max) = parse_bounds(key, kind, obj)?;

    let mut spec = SettingSpec {
        kind,
        // Placeholder until the raw default is checked against the finished spec.
        default: SettingValue::Bool(false),
        description: optional_str_at(obj, &path, "description")?.unwrap_or_default(),
        required: optional_bool_at(obj, &path, "required")?.unwrap_or(false),
        options,
        min,
        max,
    };

    spec.default = spec
        .coerce(raw_default)
        .map_err(|reason| ManifestError::InvalidDefault {
            key: key.to_string(),
            reason,
        })?;

    Ok(spec)
}

fn parse_options(
    key: &str,
    path: &str,
    kind: SettingKind,
    obj: &Map<String, Value>,
) -> ParseResult<Option<Vec<String>>> {
    let raw = present(obj.get("options"));
    if kind != SettingKind::Choice {
        if raw.is_some() {
            return Err(invalid(
                format!("{}.options", path),
                format!("options only apply to choice settings, '{}' is {}", key, kind),
            ));
        }
        return Ok(None);
    }

    let raw = raw.ok_or_else(|| ManifestError::MissingField(format!("{}.options", path)))?;

    let options = string_list(raw).ok_or_else(|| {
        invalid(
            format!("{}.options", path),
            "expected array of strings",
        )
    })?;
    Ok(Some(options))
}

fn parse_bounds(
    key: &str,
    kind: SettingKind,
    obj: &Map<String, Value>,
) -> ParseResult<(Option<i64>, Option<i64>)> {
    let bound = |name: &str| -> ParseResult<Option<i64>> {
        match present(obj.get(name)) {
            None => Ok(None),
            Some(_) if kind != SettingKind::Int => Err(ManifestError::InvalidBounds {
                key: key.to_string(),
                reason: format!("'{}' only applies to int settings, this one is {}", name, kind),
            }),
            Some(value) => value.as_i64().map(Some).ok_or_else(|| ManifestError::InvalidBounds {
                key: key.to_string(),
                reason: format!("'{}' must be an integer, found {}", name, value),
            }),
        }
    };

    let min = bound("min")?;
    let max = bound("max")?;

    if let (Some(lo), Some(hi)) = (min, max) {
        if lo > hi {
            return Err(ManifestError::InvalidBounds {
                key: key.to_string(),
                reason: format!("min {} is greater than max {}", lo, hi),
            });
        }
    }

    Ok((min, max))
}

// ---------------------------------------------------------------------------
// Optional sections
// ---------------------------------------------------------------------------

fn parse_languages(raw: Option<&Value>) -> ParseResult<Vec<String>> {
    let raw = match present(raw) {
        Some(value) => value,
        None => return Ok(vec![DEFAULT_LANGUAGE.to_string()]),
    };
    let list = string_list(raw)
        .ok_or_else(|| invalid("languages", "expected array of locale codes"))?;

    let mut languages: Vec<String> = Vec::with_capacity(list.len());
    for code in list {
        let code = code.trim().to_string();
        if code.is_empty() {
            return Err(invalid("languages", "locale codes must not be empty"));
        }
        if !languages.contains(&code) {
            languages.push(code);
        }
    }

    if languages.is_empty() {
        return Err(invalid("languages", "at least one locale is required"));
    }
    Ok(languages)
}

fn parse_background_tasks(raw: Option<&Value>) -> ParseResult<Option<BackgroundTasks>> {
    match present(raw) {
        None => Ok(None),
        Some(Value::Bool(enabled)) => Ok(Some(BackgroundTasks {
            enabled: *enabled,
            description: None,
        })),
        Some(Value::Object(obj)) => Ok(Some(BackgroundTasks {
            enabled: optional_bool_at(obj, "background_tasks", "enabled")?.unwrap_or(true),
            description: optional_str_at(obj, "background_tasks", "description")?,
        })),
        Some(other) => Err(invalid(
            "background_tasks",
            format!("expected bool or object, found {}", json_type_name(other)),
        )),
    }
}

fn parse_metadata(plugin: &str, raw: Option<&Value>) -> ParseResult<ManifestMetadata> {
    let obj = match present(raw) {
        None => return Ok(ManifestMetadata::default()),
        Some(Value::Object(obj)) => obj,
        Some(other) => {
            return Err(invalid(
                "metadata",
                format!("expected object, found {}", json_type_name(other)),
            ))
        }
    };

    let tags = match present(obj.get("tags")) {
        None => Vec::new(),
        Some(value) => {
            string_list(value).ok_or_else(|| invalid("metadata.tags", "expected array of strings"))?
        }
    };

    let extra = obj
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "homepage" | "license" | "tags" | "min_core_version"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(ManifestMetadata {
        homepage: optional_str_at(obj, "metadata", "homepage")?,
        license: optional_str_at(obj, "metadata", "license")?,
        tags,
        min_core_version: parse_min_core_version(plugin, obj.get("min_core_version")),
        extra,
    })
}

/// Advisory constraint: anything unparsable is logged and treated as unset.
fn parse_min_core_version(plugin: &str, raw: Option<&Value>) -> Option<Version> {
    match present(raw) {
        None => None,
        Some(Value::String(s)) => match Version::parse(s.trim()) {
            Ok(version) => Some(version),
            Err(e) => {
                warn!(
                    plugin = %plugin,
                    value = %s,
                    error = %e,
                    "Ignoring malformed min_core_version"
                );
                None
            }
        },
        Some(other) => {
            warn!(
                plugin = %plugin,
                value = %other,
                "Ignoring non-string min_core_version"
            );
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// A field's value, with `null` treated the same as a missing key.
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ManifestError {
    ManifestError::InvalidField {
        field: field.into(),
        reason: reason.into(),
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn required_str(obj: &Map<String, Value>, field: &str) -> ParseResult<String> {
    optional_str(obj, field)?.ok_or_else(|| ManifestError::MissingField(field.to_string()))
}

fn optional_str(obj: &Map<String, Value>, field: &str) -> ParseResult<Option<String>> {
    optional_str_at(obj, "", field)
}

fn optional_bool(obj: &Map<String, Value>, field: &str) -> ParseResult<Option<bool>> {
    optional_bool_at(obj, "", field)
}

fn optional_str_list(obj: &Map<String, Value>, field: &str) -> ParseResult<Option<Vec<String>>> {
    match present(obj.get(field)) {
        None => Ok(None),
        Some(value) => string_list(value)
            .map(Some)
            .ok_or_else(|| invalid(field, "expected array of strings")),
    }
}

fn optional_str_at(
    obj: &Map<String, Value>,
    parent: &str,
    field: &str,
) -> ParseResult<Option<String>> {
    match present(obj.get(field)) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(invalid(
            join_path(parent, field),
            format!("expected string, found {}", json_type_name(other)),
        )),
    }
}

fn optional_bool_at(
    obj: &Map<String, Value>,
    parent: &str,
    field: &str,
) -> ParseResult<Option<bool>> {
    match present(obj.get(field)) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(invalid(
            join_path(parent, field),
            format!("expected bool, found {}", json_type_name(other)),
        )),
    }
}

fn join_path(parent: &str, field: &str) -> String {
    if parent.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", parent, field)
    }
}
