//! Log-structured record backend.
//!
//! Records live in one append-only log of checksummed frames. An in-memory
//! view, rebuilt by replaying the log on open, serves every read.
//!
//! ## Frame Format
//!
//! ```text
//! | frame_len (4) | kind (1) | row (8) | body (N) | crc32 (4) |
//! ```
//!
//! Kinds:
//! - `1` = image (CBOR of the full stored row; a later image of the same row
//!   supersedes earlier ones)
//! - `2` = erase (the row was hard-deleted; empty body)
//!
//! ## Recovery
//!
//! A final frame cut short by a crash is discarded and the log truncated to
//! the last complete frame. Any other damage fails the open.

mod backend;
mod dir;
mod frame;
mod state;

pub use backend::{CompactionStats, LogBackend, LogStats};
pub use dir::LogDir;
pub use frame::{compute_crc32, Frame, FrameKind};
