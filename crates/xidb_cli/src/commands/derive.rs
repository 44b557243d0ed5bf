//! Derive command implementation.

use super::CliResult;
use xidb_core::Xid;

/// Runs the derive command.
pub fn run(inputs: &[String], raw: bool) -> CliResult {
    for input in inputs {
        let xid = if raw {
            Xid::derive_raw(input)
        } else {
            Xid::derive(input)
        };
        println!("{xid}  {input}");
    }
    Ok(())
}
