//! # xidb storage
//!
//! The byte layer underneath the xidb record log.
//!
//! A [`StorageBackend`] is an opaque, append-oriented byte store. It knows
//! nothing about records, frames, or identities; `xidb_core` owns the log
//! format and hands this crate nothing but bytes.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - tests and throwaway stores
//! - [`FileBackend`] - a single file on the local file system
//!
//! ## Example
//!
//! ```rust
//! use xidb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"frame").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
