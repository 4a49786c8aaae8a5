//! esapi - a command plugin for the electron-spirit input bar.
//!
//! Registers an input hook with the host over Socket.IO and turns the lines
//! typed after it into UI events: elements, stylesheets, scripts and
//! notifications.

mod client;
mod config;
mod plugin;
mod protocol;
mod session;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{HostConfig, Settings};
use plugin::classifier::classify;
use plugin::Plugin;
use std::path::{Path, PathBuf};
use std::process::Command as ProcessCommand;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "esapi")]
#[command(author, version, about = "Command plugin for the electron-spirit input bar")]
#[command(long_about = "Registers an input hook with electron-spirit and turns typed lines into UI events.\n\nType `api <content>` in the input bar to render content, or `api notify <text>`, `api js <key> <code>`, ...")]
struct Cli {
    /// Plugin settings file
    #[arg(long, global = true, value_name = "PATH", default_value = config::DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the host and serve input (default)
    Run(RunArgs),
    /// Dispatch lines from stdin offline and print the events
    Repl,
    /// Show how a piece of content would be classified
    Classify {
        /// Content to classify
        text: String,
    },
    /// Open the settings file in $EDITOR
    Config,
}

#[derive(clap::Args, Default)]
struct RunArgs {
    /// Host running electron-spirit
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Port of the host API (read from the host's api.json by default)
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Additional input hook to register
    #[arg(long = "hook", value_name = "NAME")]
    hooks: Vec<String>,

    /// Line to dispatch right after registering
    #[arg(long = "preload", value_name = "LINE")]
    preload: Vec<String>,

    /// Wait until this many elements exist before registering input hooks
    #[arg(long, value_name = "N")]
    min_elements: Option<u64>,

    /// Exit instead of reconnecting when the connection drops
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Some(Commands::Run(args)) => handle_run(&cli.settings, args).await,
        Some(Commands::Repl) => handle_repl(&cli.settings).await,
        Some(Commands::Classify { text }) => {
            println!("{}", classify(&text).as_str());
            Ok(())
        }
        Some(Commands::Config) => handle_config(&cli.settings),
        None => {
            let args = RunArgs {
                host: "localhost".to_string(),
                ..RunArgs::default()
            };
            handle_run(&cli.settings, args).await
        }
    }
}

/// Log to stderr so stdout stays machine-readable.
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "esapi=debug" } else { "esapi=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(level.parse()?)
                .add_directive("tungstenite=warn".parse()?),
        )
        .init();
    Ok(())
}

/// Load the settings, writing the merged result back.
fn load_settings(path: &Path) -> Result<Settings> {
    Settings::load_and_persist(path)
        .with_context(|| format!("Failed to persist settings to {}", path.display()))
}

fn hooks(settings: &Settings, extra: Vec<String>) -> Vec<String> {
    let mut hooks = vec![settings.input_hook.clone()];
    for hook in extra {
        if !hooks.contains(&hook) {
            hooks.push(hook);
        }
    }
    hooks
}

/// Connect to the host and serve until interrupted.
async fn handle_run(settings_path: &Path, args: RunArgs) -> Result<()> {
    let settings = load_settings(settings_path)?;
    let port = match args.port {
        Some(port) => port,
        None => HostConfig::load()?.api_port,
    };

    let mut plugin = Plugin::new(hooks(&settings, args.hooks));
    info!("Starting esapi with input hooks {:?}", plugin.hooks());

    let mut options = client::ConnectOptions::new(args.host, port);
    options.preload = args.preload;
    options.min_elements = args.min_elements;
    options.reconnect = !args.once;
    client::run(&mut plugin, &options).await
}

/// Run the offline REPL.
async fn handle_repl(settings_path: &Path) -> Result<()> {
    let settings = load_settings(settings_path)?;
    let mut plugin = Plugin::new(hooks(&settings, Vec::new()));
    client::run_repl(&mut plugin).await
}

/// Handle the config command.
fn handle_config(settings_path: &Path) -> Result<()> {
    // Create or normalize the file before editing
    load_settings(settings_path)?;

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let status = ProcessCommand::new(&editor)
        .arg(settings_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        eprintln!("Editor exited with non-zero status");
    }

    Ok(())
}
