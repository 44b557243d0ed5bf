//! Dump-log command implementation, and the frame scanner `verify` shares.

use super::CliResult;
use serde::Serialize;
use std::path::Path;
use xidb_core::log::{Frame, FrameKind, LogDir};
use xidb_storage::{FileBackend, StorageBackend};

/// One log frame as printed.
#[derive(Debug, Serialize)]
pub struct FrameInfo {
    /// Offset in the log file.
    pub offset: u64,
    /// Frame kind.
    pub kind: &'static str,
    /// Row the frame addresses.
    pub row: u64,
    /// Encoded frame size in bytes.
    pub len: usize,
    /// Path of the imaged row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Identifier of the imaged row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xid: Option<String>,
    /// Whether the imaged row carries a soft-delete tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
}

/// Outcome of walking the log.
#[derive(Debug, Default)]
pub struct Scan {
    /// Frames that decoded.
    pub frames: Vec<FrameInfo>,
    /// Damage found, one line per problem.
    pub errors: Vec<String>,
    /// Trailing bytes too short to hold the frame they announce.
    pub torn_bytes: u64,
}

impl Scan {
    /// Returns true if no damage was found. A torn tail is not damage; the
    /// next open cuts it off.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Walks frames from `start`, stopping after `limit` frames.
pub fn scan(backend: &dyn StorageBackend, start: u64, limit: Option<usize>) -> CliResult<Scan> {
    let size = backend.size()?;
    let max_frames = limit.unwrap_or(usize::MAX);
    let mut scan = Scan::default();
    let mut offset = start;

    while offset < size && scan.frames.len() < max_frames {
        let remaining = size - offset;
        if remaining < 4 {
            scan.torn_bytes = remaining;
            break;
        }
        let prefix = backend.read_at(offset, 4)?;
        let frame_len = Frame::peek_len([prefix[0], prefix[1], prefix[2], prefix[3]]);
        if frame_len < Frame::MIN_SIZE {
            scan.errors
                .push(format!("Invalid frame length {frame_len} at offset {offset}"));
            break;
        }
        if frame_len as u64 > remaining {
            scan.torn_bytes = remaining;
            break;
        }

        let data = backend.read_at(offset, frame_len)?;
        match Frame::decode(&data) {
            Ok(frame) => scan.frames.push(describe(offset, &frame, &mut scan.errors)),
            Err(e) => scan.errors.push(format!("Frame at offset {offset}: {e}")),
        }
        offset += frame_len as u64;
    }

    Ok(scan)
}

fn describe(offset: u64, frame: &Frame, errors: &mut Vec<String>) -> FrameInfo {
    let mut info = FrameInfo {
        offset,
        kind: match frame.kind {
            FrameKind::Image => "image",
            FrameKind::Erase => "erase",
        },
        row: frame.row.as_u64(),
        len: frame.encoded_len(),
        path: None,
        xid: None,
        deleted: None,
    };
    if frame.kind == FrameKind::Image {
        match frame.stored_record() {
            Ok(stored) => {
                info.deleted = Some(!stored.is_live());
                info.path = Some(stored.record.metadata.path);
                info.xid = Some(stored.record.xid.into_string());
            }
            Err(e) => errors.push(format!("Frame at offset {offset}: {e}")),
        }
    }
    info
}

/// Opens the log of the store at `path` for reading, holding its lock.
pub fn open_log(path: &Path) -> CliResult<(LogDir, FileBackend)> {
    let dir = LogDir::open(path, false)?;
    let log_path = dir.log_path();
    if !log_path.exists() {
        return Err(format!("No record log found at {}", path.display()).into());
    }
    let backend = FileBackend::open(&log_path)?;
    Ok((dir, backend))
}

/// Runs the dump-log command.
pub fn run(path: &Path, limit: Option<usize>, start_offset: u64, format: &str) -> CliResult {
    let (_dir, backend) = open_log(path)?;
    let scan = scan(&backend, start_offset, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&scan.frames)?);
        }
        _ => print_text_output(&scan),
    }
    Ok(())
}

fn print_text_output(scan: &Scan) {
    println!("{:>10}  {:<6} {:>8} {:>7}  KEY", "OFFSET", "KIND", "ROW", "BYTES");
    for frame in &scan.frames {
        let key = match (&frame.path, &frame.xid) {
            (Some(path), Some(xid)) => {
                let deleted = if frame.deleted == Some(true) { " (deleted)" } else { "" };
                format!("{xid} @ {path}{deleted}")
            }
            _ => String::new(),
        };
        println!(
            "{:>10}  {:<6} {:>8} {:>7}  {}",
            frame.offset, frame.kind, frame.row, frame.len, key
        );
    }
    for error in &scan.errors {
        println!("! {error}");
    }
    if scan.torn_bytes > 0 {
        println!("({} trailing bytes of a torn frame)", scan.torn_bytes);
    }
}
