use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "botmods")]
#[command(about = "Validate and inspect chat-bot plugin manifests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a plugin directory or a plugin.json file
    Validate {
        /// Plugin directory or manifest file
        path: PathBuf,
    },
    /// List discovered plugins and their commands
    List {
        /// Plugin directory to scan (repeatable). Defaults to the configured directories.
        #[arg(short, long)]
        dir: Vec<PathBuf>,

        /// Include admin-only commands
        #[arg(long)]
        admin: bool,
    },
    /// Show the resolved settings of a plugin
    Settings {
        /// Plugin directory
        plugin_dir: PathBuf,

        /// Bot core version to check `min_core_version` against.
        /// Defaults to `core_version` from the config file.
        #[arg(long)]
        core_version: Option<semver::Version>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if std::env::var("BOTMODS_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) | None => {
            println!("botmods {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Validate { path }) => cli::validate::cmd_validate(path)?,
        Some(Commands::List { dir, admin }) => cli::list::cmd_list(dir, admin)?,
        Some(Commands::Settings {
            plugin_dir,
            core_version,
        }) => cli::settings::cmd_settings(plugin_dir, core_version)?,
    }

    Ok(())
}
