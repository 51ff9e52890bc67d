pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nanorss")]
#[command(about = "A small self-hosted RSS and page monitor", long_about = None)]
pub struct Cli {
    /// Optional TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP server and the background refresh worker (default)
    Serve,
    /// Fetch every subscription once
    Refresh,
    /// Remove expired items and stale statuses once
    Gc,
    /// Write a JSON snapshot of the database
    Backup {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load a JSON snapshot into the database
    Restore {
        /// Snapshot file written by `backup`
        file: PathBuf,
    },
    /// Create a user if missing and set its password
    SetPassword { username: String, password: String },
}
