//! modlink - keeps module-name symlinks in sync with `@providesModule` declarations.
//!
//! # Usage
//!
//! ```bash
//! # Reconcile individual files
//! modlink process src/a.js src/b.js
//!
//! # Watch a tree and reconcile every change
//! modlink watch . --pattern '**/*.js'
//!
//! # Rebuild all links of a project from module-map.json
//! modlink relink path/to/project
//!
//! # Show the persisted bindings
//! modlink list path/to/project --json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use modlink_cli::{commands, output};
use modlink_core::EngineConfig;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "modlink")]
#[command(about = "Keep module-name symlinks in sync with source declarations", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the given files once
    Process {
        /// Files to reconcile
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Watch a directory and reconcile changes as they happen
    Watch {
        /// Directory to watch
        dir: PathBuf,

        /// Only reconcile files matching this glob (relative to DIR)
        #[arg(short, long)]
        pattern: Option<String>,
    },

    /// Rebuild every link of a project root from its module map
    Relink {
        /// Project root
        root: PathBuf,
    },

    /// List the module bindings of a project root
    List {
        /// Project root
        root: PathBuf,

        /// Print the bindings as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::error(format!("{:#}", e));
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = EngineConfig::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Process { files } => commands::process(files, config).await?,
        Commands::Watch { dir, pattern } => commands::watch(dir, pattern, config).await?,
        Commands::Relink { root } => commands::relink(root, config).await?,
        Commands::List { root, json } => commands::list(root, json, config).await?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if verbose {
        EnvFilter::new("modlink_core=debug,modlink_engine=debug,modlink_cli=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
