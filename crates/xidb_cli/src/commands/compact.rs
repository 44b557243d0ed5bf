//! Compact command implementation.

use super::CliResult;
use std::path::Path;
use xidb_core::log::{CompactionStats, LogBackend};
use xidb_core::LogConfig;

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> CliResult {
    println!("Compacting record log at {}", path.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let backend = LogBackend::open(path, LogConfig::new().create_if_missing(false))?;
    let plan = backend.compaction_plan()?;
    print_stats("Compaction Analysis:", &plan);

    if dry_run {
        return Ok(());
    }
    println!();
    if plan.frames_after < plan.frames_before {
        println!("Performing compaction...");
        let stats = backend.compact()?;
        println!(
            "✓ Compaction complete ({} bytes reclaimed)",
            stats.bytes_saved()
        );
    } else {
        println!("No compaction needed - log holds no superseded frames");
    }
    Ok(())
}

fn print_stats(title: &str, stats: &CompactionStats) {
    println!("{title}");
    println!("  Frames before: {}", stats.frames_before);
    println!("  Frames after:  {}", stats.frames_after);
    println!("  Size before:   {} bytes", stats.bytes_before);
    println!("  Size after:    {} bytes", stats.bytes_after);
    let percent = if stats.bytes_before > 0 {
        (stats.bytes_saved() as f64 / stats.bytes_before as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "  Space saved:   {} bytes ({percent:.1}%)",
        stats.bytes_saved()
    );
}
