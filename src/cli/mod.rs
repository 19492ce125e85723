//! Subcommand implementations for the `botmods` binary.

pub(crate) mod list;
pub(crate) mod settings;
pub(crate) mod validate;
