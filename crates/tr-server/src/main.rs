//! Terrarium server: a multi-tenant grid world driven over JSON lines.

mod commands;
mod transport;

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use tr_simulation::Mode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "terrarium",
    about = "Terrarium: a shared grid world for remote agents",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options that shape the effective configuration.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// TOML configuration file (camelCase keys)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Deployment mode: training, testing, staging or prod
    #[arg(short, long)]
    mode: Option<Mode>,

    /// RNG seed for deterministic food placement
    #[arg(short, long)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the world and accept connections
    Serve {
        #[command(flatten)]
        config: ConfigArgs,

        /// TCP port to listen on
        #[arg(short, long, default_value = "9090")]
        port: u16,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr so `config` output stays machine-readable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Serve { config, port } => commands::serve::run(&config, port).await,
        Commands::Config { config } => commands::config::run(&config),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
