//! DataSync CLI
//!
//! Command-line interface for inspecting and editing a datasync local store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use datasync_core::{Backend, Config, LocalStore};

mod commands;
mod output;
mod prompt;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "datasync")]
#[command(about = "DataSync - inspect and edit the local document store")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use this config file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count the documents of a type
    Count {
        /// Document type
        type_name: String,
    },
    /// List the ids of a type
    Keys {
        /// Document type
        type_name: String,
    },
    /// Show one document
    #[command(alias = "show")]
    Get {
        /// Document type
        type_name: String,
        /// Document id
        id: String,
    },
    /// Create or replace a document
    #[command(alias = "save")]
    Put {
        /// Document type
        type_name: String,
        /// Document id
        id: String,
        /// Document content as a JSON object
        #[arg(value_name = "JSON")]
        content: String,
    },
    /// Delete a document
    #[command(alias = "remove")]
    Rm {
        /// Document type
        type_name: String,
        /// Document id
        id: String,
    },
    /// Find documents whose id matches a pattern (* and ? wildcards)
    Find {
        /// Document type
        type_name: String,
        /// Id pattern
        pattern: String,
    },
    /// Show all documents of a type
    #[command(alias = "ls")]
    List {
        /// Document type
        type_name: String,
    },
    /// List the types that have stored documents
    Types,
    /// Delete all documents of a type
    Clear {
        /// Document type
        type_name: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete everything in the store
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, cache_size)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    let config_path = cli.config.unwrap_or_else(Config::config_file_path);
    let config = Config::load_from_path(&config_path).context("Failed to load configuration")?;

    // Commands that don't need the store
    if let Commands::Config { command } = cli.command {
        return match command {
            Some(ConfigCommands::Show) | None => {
                commands::config::show(&config, &config_path, &output)
            }
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(config, key, value, &config_path, &output)
            }
        };
    }

    let backend = Backend::open(&config).with_context(|| {
        format!("Failed to open local store at {}", config.data_dir.display())
    })?;
    let mut store = LocalStore::new(backend);

    match cli.command {
        Commands::Count { type_name } => commands::document::count(&mut store, &type_name, &output),
        Commands::Keys { type_name } => commands::document::keys(&mut store, &type_name, &output),
        Commands::Get { type_name, id } => {
            commands::document::get(&mut store, &type_name, id, &output)
        }
        Commands::Put {
            type_name,
            id,
            content,
        } => commands::document::put(&mut store, &type_name, id, &content, &output),
        Commands::Rm { type_name, id } => {
            commands::document::remove(&mut store, &type_name, id, &output)
        }
        Commands::Find { type_name, pattern } => {
            commands::document::find(&mut store, &type_name, &pattern, &output)
        }
        Commands::List { type_name } => commands::document::list(&mut store, &type_name, &output),
        Commands::Types => commands::store::types(&mut store, &output),
        Commands::Clear { type_name, yes } => {
            commands::store::clear(&mut store, &type_name, yes, &output)
        }
        Commands::Reset { yes } => commands::store::reset(&mut store, yes, &output),
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

/// Log to stderr; RUST_LOG wins over the -v flags
fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("datasync_core={},datasync={}", log_level, log_level))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
