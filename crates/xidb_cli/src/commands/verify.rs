//! Verify command implementation.

use super::dump_log::{open_log, scan};
use super::CliResult;
use std::collections::HashSet;
use std::path::Path;

/// Runs the verify command.
pub fn run(path: &Path) -> CliResult {
    println!("Verifying record log at {}", path.display());
    println!();

    let (_dir, backend) = open_log(path)?;
    let scan = scan(&backend, 0, None)?;

    let rows: HashSet<u64> = scan.frames.iter().map(|f| f.row).collect();
    let images = scan.frames.iter().filter(|f| f.kind == "image").count();
    println!("  Frames checked: {}", scan.frames.len() + scan.errors.len());
    println!("  Row images:     {images}");
    println!("  Erasures:       {}", scan.frames.len() - images);
    println!("  Distinct rows:  {}", rows.len());
    if scan.torn_bytes > 0 {
        println!(
            "  Torn tail:      {} bytes (cut off on next open)",
            scan.torn_bytes
        );
    }
    for error in &scan.errors {
        println!("  ✗ {error}");
    }

    println!();
    if scan.is_ok() {
        println!("✓ Record log verification passed");
        Ok(())
    } else {
        println!("✗ Record log verification failed");
        Err("Verification failed".into())
    }
}
