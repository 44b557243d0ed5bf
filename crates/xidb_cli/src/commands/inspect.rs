//! Inspect command implementation.

use super::CliResult;
use serde::Serialize;
use std::path::Path;
use xidb_core::log::{LogBackend, LogStats};
use xidb_core::LogConfig;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store directory.
    pub path: String,
    /// Log counters.
    #[serde(flatten)]
    pub stats: LogStats,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> CliResult {
    let backend = LogBackend::open(path, LogConfig::new().create_if_missing(false))?;
    let result = InspectResult {
        path: path.display().to_string(),
        stats: backend.stats()?,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    let stats = &result.stats;
    println!("xidb Store Inspection");
    println!("=====================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Log:");
    println!("  Size:   {}", format_size(stats.bytes));
    println!("  Frames: {}", stats.frames);
    println!();
    println!("Rows:");
    println!("  Held:         {}", stats.rows);
    println!("  Live:         {}", stats.live_rows);
    println!("  Soft-deleted: {}", stats.tombstoned_rows);
    println!("  Keys:         {}", stats.distinct_keys);
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
