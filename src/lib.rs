//! botmods - plugin manifests, settings, and lifecycle for a chat-bot host

pub mod config;
pub mod error;
pub mod plugins;

pub use config::Config;
pub use error::{BotmodsError, ManifestError, Result};
