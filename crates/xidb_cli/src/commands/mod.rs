//! CLI command implementations.

pub mod compact;
pub mod derive;
pub mod dump_log;
pub mod inspect;
pub mod query;
pub mod records;
pub mod verify;

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use xidb_core::log::LogBackend;
use xidb_core::{Context, LogConfig, RecordStore, StoreConfig};

/// Result type shared by every command.
pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Store settings taken from the global flags.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Store directory.
    pub dir: Option<PathBuf>,
    /// Per-operation timeout in milliseconds.
    pub timeout_ms: u64,
    /// Whether idempotency keys are honored.
    pub idempotency: bool,
    /// Whether every write is synced.
    pub sync: bool,
}

impl StoreOptions {
    /// Returns the store directory, or an error naming `command`.
    pub fn require_dir(&self, command: &str) -> CliResult<&Path> {
        self.dir
            .as_deref()
            .ok_or_else(|| format!("Store directory required for {command} (--dir)").into())
    }

    /// Opens the store. Only writing commands create a missing directory.
    pub fn open(&self, command: &str, create: bool) -> CliResult<(RecordStore, Arc<LogBackend>)> {
        let dir = self.require_dir(command)?;
        debug!(dir = %dir.display(), command, create, "opening store");
        let config = LogConfig::new()
            .create_if_missing(create)
            .sync_on_write(self.sync);
        let backend = Arc::new(LogBackend::open(dir, config)?);
        let store = RecordStore::with_query_support(backend.clone()).with_config(
            StoreConfig::new()
                .default_timeout(Duration::from_millis(self.timeout_ms))
                .enable_idempotency(self.idempotency),
        );
        Ok((store, backend))
    }

    /// Returns the context each command runs under.
    pub fn context(&self) -> Context {
        Context::new()
    }
}

/// Splits `KEY=VALUE`, reading the value as JSON and falling back to a
/// plain string.
pub fn parse_assignment(arg: &str) -> CliResult<(String, Value)> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("Expected KEY=VALUE, got {arg:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Empty key in {arg:?}").into());
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Prints `value` as one line of JSON, or pretty-printed.
pub fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> CliResult {
    if pretty {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", serde_json::to_string(value)?);
    }
    Ok(())
}
