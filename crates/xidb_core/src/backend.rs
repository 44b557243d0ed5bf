//! Persistence contracts.
//!
//! [`RecordBackend`] is what the record store needs from durable storage:
//! conditional insert, point lookup, replace, merge update, and soft and hard
//! delete, all keyed by `(xid, path)`. [`LatestQuery`] is the separate
//! capability of listing and counting the latest record per identity. A
//! backend without it can still serve every point operation; the store then
//! answers listing and counting with `NotImplemented`.
//!
//! Backends own atomicity. Each call either fully applies or leaves no trace,
//! and conditional inserts are decided under the backend's own exclusion,
//! never by a separate check followed by a write.

use crate::error::XdbResult;
use crate::fields::FieldUpdate;
use crate::query::{Page, Query};
use crate::record::Record;
use crate::types::{RowId, StoredRecord};
use crate::xid::Xid;
use async_trait::async_trait;

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written.
    Inserted(RowId),
    /// A row already held the key; nothing was written.
    Existing(RowId),
}

impl InsertOutcome {
    /// Returns the row that holds the key.
    #[must_use]
    pub const fn row(self) -> RowId {
        match self {
            Self::Inserted(row) | Self::Existing(row) => row,
        }
    }

    /// Returns true if this call wrote the row.
    #[must_use]
    pub const fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Point operations over records keyed by `(xid, path)`.
///
/// "Live" means not soft-deleted. "Current" means the live row with the
/// greatest `(createdAt, row id)`.
#[async_trait]
pub trait RecordBackend: Send + Sync {
    /// Returns true if a live row exists at `(xid, path)`.
    async fn exists(&self, path: &str, xid: &Xid) -> XdbResult<bool>;

    /// Returns the current row at `(xid, path)`.
    async fn find_by_xid(&self, path: &str, xid: &Xid) -> XdbResult<Option<StoredRecord>>;

    /// Appends a row.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if `idempotency_key` is set and already used
    /// under the record's path.
    async fn insert(&self, record: Record, idempotency_key: Option<String>) -> XdbResult<RowId>;

    /// Appends a row unless `(path, idempotency_key)` is already taken.
    ///
    /// Concurrent calls with the same key converge on one row.
    async fn insert_idempotent(&self, record: Record, idempotency_key: String)
        -> XdbResult<InsertOutcome>;

    /// Replaces the current row at the record's `(xid, path)`, or appends
    /// one when there is no live row.
    async fn upsert(&self, record: Record) -> XdbResult<RowId>;

    /// Replaces the current row at `(xid, path)`.
    ///
    /// The replacement keeps `createdAt` at or above the current row's.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when there is no live row.
    async fn replace(&self, path: &str, xid: &Xid, record: Record) -> XdbResult<RowId>;

    /// Merges `update` onto the current row at `(xid, path)`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when there is no live row, or `InvalidArgument`
    /// when the merged record is invalid.
    async fn update_fields(&self, path: &str, xid: &Xid, update: &FieldUpdate)
        -> XdbResult<RowId>;

    /// Tags every live row at `(xid, path)` as deleted at `deleted_at`.
    /// Returns the number of rows tagged.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when there is no live row.
    async fn delete_soft(&self, path: &str, xid: &Xid, deleted_at: i64) -> XdbResult<usize>;

    /// Removes every row at `(xid, path)`, tombstoned or not. Returns the
    /// number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the key has no rows at all.
    async fn delete_hard(&self, path: &str, xid: &Xid) -> XdbResult<usize>;
}

/// Latest-per-identity listing and counting.
#[async_trait]
pub trait LatestQuery: Send + Sync {
    /// Lists one page of current records, one per `xid`.
    async fn list_latest(&self, query: &Query) -> XdbResult<Page>;

    /// Counts the distinct `xid`s with a live row matching `query`.
    async fn count_latest(&self, query: &Query) -> XdbResult<u64>;
}
