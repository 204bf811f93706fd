use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    version,
    about = "Offline cache agent for the voting simulator",
    long_about = "Keeps the simulator usable offline: reconciles the versioned manifest\n\
                  against the on-disk stores, caches the image sets of the locations\n\
                  the user selected, and serves requests cache-first."
)]
pub struct CliArgs {
    /// Override the configured application origin
    #[arg(long, global = true, help = "Base URL of the application (overrides config)")]
    pub origin: Option<String>,

    /// Override the configured data directory
    #[arg(long, global = true, help = "Directory holding the stores and the location ledger")]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable detailed debug logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run startup and report the resulting generation and stores
    Start,

    /// Keep the image sets of the given locations available offline
    Prefetch {
        #[arg(required = true, help = "Location codes, e.g. EJ.1")]
        codes: Vec<String>,
    },

    /// Route one request through the agent
    Fetch {
        #[arg(help = "Absolute URL, or a path relative to the origin")]
        url: String,
    },

    /// List stores with their entry counts and the saved selection
    Status,
}
