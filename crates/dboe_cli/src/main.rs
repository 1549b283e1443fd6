//! DBOE CLI
//!
//! Command-line tools for inspecting transaction journals.
//!
//! # Commands
//!
//! - `inspect` - Summarize a journal and what recovery would do with it
//! - `dump-journal` - Print journal entries for debugging
//! - `verify-journal` - Check every entry's framing and checksum

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// DBOE transaction journal tools.
#[derive(Parser)]
#[command(name = "dboe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the journal file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the journal and pending recovery work
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump journal entries for debugging
    DumpJournal {
        /// Maximum number of entries to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Start from this byte position
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify journal integrity
    VerifyJournal,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("journal path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::DumpJournal {
            limit,
            offset,
            format,
        } => {
            let path = cli.path.ok_or("journal path required for dump-journal")?;
            commands::dump_journal::run(&path, limit, offset, &format)?;
        }
        Commands::VerifyJournal => {
            let path = cli.path.ok_or("journal path required for verify-journal")?;
            commands::verify::run(&path)?;
        }
        Commands::Version => {
            println!("DBOE CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("DBOE Transaction v{}", dboe_transaction::VERSION);
        }
    }

    Ok(())
}
