//! # xidb core
//!
//! Identity derivation, an append-only record store, and latest-per-identity
//! listing for XID protocol records.
//!
//! This crate provides:
//! - [`Xid`]: deterministic identifiers derived from subject strings
//! - [`Record`]: the protocol record envelope
//! - [`RecordStore`]: create, upsert, read, update, and delete by `(xid, path)`
//! - [`QueryEngine`]: one current record per identity, paged by cursor
//! - [`log::LogBackend`]: the bundled backend, an append-only record log
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use xidb_core::log::LogBackend;
//! use xidb_core::{Context, Info, Metadata, Operation, Query, Record, RecordStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> xidb_core::XdbResult<()> {
//! let store = RecordStore::with_query_support(Arc::new(LogBackend::in_memory()));
//! let ctx = Context::new();
//!
//! for (who, at) in [("u1", 100), ("u2", 200), ("u1", 300)] {
//!     let record = Record::new(
//!         Info::new(who, "username"),
//!         Metadata::new(Operation::Create, "/info/x", "application/json").with_created_at(at),
//!         json!({ "at": at }),
//!     );
//!     store.create(&ctx, "/info/x", record, None).await?;
//! }
//!
//! let page = store.list(&ctx, &Query::new("/info/x")).await?;
//! assert_eq!(page.records.len(), 2);
//! assert_eq!(page.records[0].metadata.created_at, 300);
//! assert_eq!(store.count(&ctx, &Query::new("/info/x")).await?, 2);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod context;
mod error;
mod fields;
pub mod log;
pub mod query;
mod record;
mod store;
mod types;
mod xid;

pub use backend::{InsertOutcome, LatestQuery, RecordBackend};
pub use config::{LogConfig, StoreConfig};
pub use context::Context;
pub use error::{ErrorKind, XdbError, XdbResult};
pub use fields::{project, FieldUpdate};
pub use query::{Page, Query, QueryEngine, SortField};
pub use record::{
    Encryption, Info, Metadata, Operation, Record, PROTOCOL_NAME, PROTOCOL_VERSION,
    RESERVED_METADATA_KEYS,
};
pub use store::RecordStore;
pub use types::{now_millis, RowId, StoredRecord};
pub use xid::{normalize, Xid};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
