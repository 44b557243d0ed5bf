//! xidb CLI
//!
//! Command-line tools for xidb record stores.
//!
//! # Commands
//!
//! - `derive` - Print the identifier derived from a subject string
//! - `create`, `upsert` - Write a record
//! - `get`, `exists` - Read a record by `(xid, path)`
//! - `update` - Merge fields into the current record
//! - `delete` - Soft-delete, or with `--hard` erase, a record
//! - `list`, `count` - Latest record per identity under a path
//! - `inspect` - Display store statistics
//! - `verify` - Check every log frame
//! - `compact` - Rewrite the log down to its held rows
//! - `dump-log` - Dump log frames for debugging

mod commands;

use clap::{Parser, Subcommand};
use commands::query::{FilterArgs, ListArgs};
use commands::records::{KeyArgs, RecordArgs};
use commands::{CliResult, StoreOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// xidb command-line record store tools.
#[derive(Parser)]
#[command(name = "xidb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Per-operation timeout in milliseconds (0 disables it)
    #[arg(global = true, long, default_value_t = 10_000)]
    timeout_ms: u64,

    /// Ignore idempotency keys on create
    #[arg(global = true, long)]
    no_idempotency: bool,

    /// Skip syncing the log after each write
    #[arg(global = true, long)]
    no_sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the identifier derived from each input
    Derive {
        /// Subject strings (emails, usernames, hostnames, ...)
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Derive from the input exactly as given, without normalizing
        #[arg(long)]
        raw: bool,
    },

    /// Insert a record
    Create {
        #[command(flatten)]
        record: RecordArgs,

        /// Collapse repeated creates carrying the same key
        #[arg(short = 'k', long)]
        idempotency_key: Option<String>,
    },

    /// Insert a record, or replace the current one at its key
    Upsert {
        #[command(flatten)]
        record: RecordArgs,
    },

    /// Print the current record at a key
    Get {
        #[command(flatten)]
        key: KeyArgs,

        /// Print every stored version, soft-deleted ones included
        #[arg(long)]
        history: bool,

        /// Keep only these fields (dotted paths)
        #[arg(short, long = "field")]
        fields: Vec<String>,
    },

    /// Report whether a live record exists at a key
    Exists {
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Merge fields into the current record at a key
    Update {
        #[command(flatten)]
        key: KeyArgs,

        /// Field to set, as PATH=JSON (repeatable)
        #[arg(short, long = "set", value_name = "PATH=JSON", required = true)]
        sets: Vec<String>,
    },

    /// Delete the record at a key
    Delete {
        #[command(flatten)]
        key: KeyArgs,

        /// Erase every version instead of tagging it deleted
        #[arg(long)]
        hard: bool,
    },

    /// List the latest record per identity
    List {
        #[command(flatten)]
        list: ListArgs,
    },

    /// Count identities with a live matching record
    Count {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Display store statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify log integrity
    Verify,

    /// Rewrite the log to reclaim space
    Compact {
        /// Dry run - show what would be done
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Dump log frames for debugging
    DumpLog {
        /// Maximum number of frames to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Start from this byte offset
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let opts = StoreOptions {
        dir: cli.dir,
        timeout_ms: cli.timeout_ms,
        idempotency: !cli.no_idempotency,
        sync: !cli.no_sync,
    };

    match cli.command {
        Commands::Derive { inputs, raw } => commands::derive::run(&inputs, raw),
        Commands::Create {
            record,
            idempotency_key,
        } => commands::records::create(&opts, &record, idempotency_key.as_deref()).await,
        Commands::Upsert { record } => commands::records::upsert(&opts, &record).await,
        Commands::Get {
            key,
            history,
            fields,
        } => commands::records::get(&opts, &key, history, &fields).await,
        Commands::Exists { key } => commands::records::exists(&opts, &key).await,
        Commands::Update { key, sets } => commands::records::update(&opts, &key, &sets).await,
        Commands::Delete { key, hard } => commands::records::delete(&opts, &key, hard).await,
        Commands::List { list } => commands::query::list(&opts, &list).await,
        Commands::Count { filter } => commands::query::count(&opts, &filter).await,
        Commands::Inspect { format } => commands::inspect::run(opts.require_dir("inspect")?, &format),
        Commands::Verify => commands::verify::run(opts.require_dir("verify")?),
        Commands::Compact { dry_run } => {
            commands::compact::run(opts.require_dir("compact")?, dry_run)
        }
        Commands::DumpLog {
            limit,
            offset,
            format,
        } => commands::dump_log::run(opts.require_dir("dump-log")?, limit, offset, &format),
        Commands::Version => {
            println!("xidb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("xidb core v{}", xidb_core::VERSION);
            println!(
                "Protocol {} v{}",
                xidb_core::PROTOCOL_NAME,
                xidb_core::PROTOCOL_VERSION
            );
            Ok(())
        }
    }
}
