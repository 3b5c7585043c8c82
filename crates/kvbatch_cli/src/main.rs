//! KVBatch CLI
//!
//! Command-line tools for bulk-loading and backing up KVBatch stores.
//!
//! # Commands
//!
//! - `write` - Stream lines from stdin or a file into a store in batches
//! - `backup` - Write a full backup of a store to a file
//! - `restore` - Load a backup file into a store
//! - `verify` - Check a backup file's structure and checksum
//! - `scan` - Print the entries of a store in key order

mod commands;

use clap::{Parser, Subcommand};
use commands::write::InputFormat;
use kvbatch_core::pipeline::DEFAULT_BATCH_SIZE;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// KVBatch command-line tools.
#[derive(Parser)]
#[command(name = "kvbatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write newline-delimited records into a store
    Write {
        /// Store directory (created if missing)
        #[arg(short, long)]
        dir: PathBuf,

        /// Records per transaction
        #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Transactions committing at once (defaults to the number of CPUs)
        #[arg(short, long)]
        max_in_flight: Option<usize>,

        /// Read from this file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// How lines map to records
        #[arg(short, long, value_enum, default_value_t = InputFormat::Csv)]
        format: InputFormat,

        /// Field separator
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },

    /// Back up a store to a single file
    Backup {
        /// Store directory
        #[arg(short, long)]
        dir: PathBuf,

        /// Directory to write the backup into (created if missing)
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Backup file name
        #[arg(short, long, default_value = "db.bak")]
        name: String,
    },

    /// Restore a store from a backup file
    Restore {
        /// Store directory to restore into
        #[arg(short, long)]
        dir: PathBuf,

        /// Backup file
        #[arg(short, long)]
        input: PathBuf,

        /// Replace an existing non-empty store
        #[arg(short, long)]
        force: bool,
    },

    /// Verify a backup file without restoring it
    Verify {
        /// Backup file
        #[arg(short, long)]
        input: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print store entries in key order
    Scan {
        /// Store directory
        #[arg(short, long)]
        dir: PathBuf,

        /// Only keys starting with this prefix
        #[arg(short, long)]
        prefix: Option<String>,

        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose when set
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Write {
            dir,
            batch_size,
            max_in_flight,
            input,
            format,
            delimiter,
        } => {
            let options = commands::write::WriteOptions {
                batch_size,
                max_in_flight,
                format,
                delimiter,
            };
            commands::write::run(&dir, input.as_deref(), &options)?;
        }
        Commands::Backup {
            dir,
            output_dir,
            name,
        } => {
            commands::backup::create(&dir, &output_dir, &name)?;
        }
        Commands::Restore { dir, input, force } => {
            commands::backup::restore(&dir, &input, force)?;
        }
        Commands::Verify { input, format } => {
            commands::backup::verify(&input, &format)?;
        }
        Commands::Scan {
            dir,
            prefix,
            limit,
            format,
        } => {
            commands::scan::run(&dir, prefix.as_deref(), limit, &format)?;
        }
        Commands::Version => {
            println!("KVBatch CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("KVBatch Core v{}", kvbatch_core::VERSION);
        }
    }

    Ok(())
}
