//! Plugin system for botmods
//!
//! A plugin bundles a set of chat commands with user-configurable settings.
//! Each plugin ships a `plugin.json` manifest next to its code; the manifest is
//! validated once at load time into a typed [`PluginManifest`] and nothing
//! downstream re-checks it.
//!
//! # Architecture
//!
//! - **types**: Core data structures (`PluginManifest`, `CommandSpec`, `SettingSpec`, `Plugin`, `PluginConfig`)
//! - **manifest**: Manifest validation (`parse`)
//! - **loader**: Plugin discovery and reading `plugin.json` from disk
//! - **registry**: Plugin and command registration with conflict detection
//! - **settings**: Per-plugin setting values, overrides, and persistence
//! - **host**: The activate/deactivate lifecycle and command dispatch
//!
//! # Plugin Directory Structure
//!
//! ```text
//! ~/.botmods/plugins/
//! ├── weather/
//! │   └── plugin.json
//! └── module_manager/
//!     └── plugin.json
//! ```
//!
//! # Example plugin.json
//!
//! ```json
//! {
//!   "name": "weather",
//!   "display_name": "Weather",
//!   "version": "1.0.0",
//!   "description": "Current weather and forecasts",
//!   "author": "Bot Team",
//!   "commands": [
//!     { "command": "weather", "description": "Current weather", "icon": "🌤" },
//!     { "command": "forecast", "description": "Multi-day forecast", "category": "Utility" }
//!   ],
//!   "settings": {
//!     "api_key": { "type": "string", "default": "", "required": true },
//!     "units": { "type": "choice", "options": ["metric", "imperial"], "default": "metric" },
//!     "forecast_days": { "type": "int", "default": 5, "min": 1, "max": 7 },
//!     "notifications_enabled": { "type": "bool", "default": false }
//!   },
//!   "languages": ["en", "ru"],
//!   "metadata": { "min_core_version": "1.0.0" }
//! }
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use botmods::plugins::{discover_plugins, PluginRegistry};
//!
//! let dirs = vec![PathBuf::from("/home/user/.botmods/plugins")];
//! let plugins = discover_plugins(&dirs).unwrap();
//!
//! let mut registry = PluginRegistry::new();
//! for plugin in plugins {
//!     registry.register(plugin).unwrap();
//! }
//!
//! println!("Loaded {} plugins with {} commands", registry.plugin_count(), registry.command_count());
//! ```

pub mod host;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod settings;
pub mod types;

pub use host::{
    ActivationContext, ActivationReport, ActivePlugin, Invocation, PluginHost, PluginModule,
};
pub use loader::{discover_plugins, load_manifest, load_plugin};
pub use manifest::parse;
pub use registry::PluginRegistry;
pub use settings::{SettingSource, SettingsStore};
pub use types::{
    CommandSpec, Plugin, PluginConfig, PluginManifest, SettingKind, SettingSpec, SettingValue,
};
