//! Core type definitions for xidb.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Storage-assigned row identifier.
///
/// Row ids are monotonically increasing and never reused, so they double as
/// insertion order. Two rows with equal `createdAt` are ordered by row id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub u64);

impl RowId {
    /// Creates a row id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next row id.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row:{}", self.0)
    }
}

/// A record as a backend holds it: the document plus storage bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    /// Insertion order.
    pub row: RowId,
    /// The document.
    pub record: Record,
    /// Soft-delete timestamp in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
    /// The idempotency key the row was created under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl StoredRecord {
    /// Returns true unless the row carries a soft-delete tag.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Returns the `(createdAt, row)` pair that decides which row is latest.
    #[must_use]
    pub fn recency(&self) -> (i64, RowId) {
        (self.record.metadata.created_at, self.row)
    }
}

/// Returns the current time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// Returns a fresh per-record card id.
#[must_use]
pub fn new_card_id() -> String {
    Uuid::new_v4().simple().to_string()
}
