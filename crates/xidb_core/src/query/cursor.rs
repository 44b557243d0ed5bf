//! Continuation cursors.
//!
//! A cursor records the `(primary value, row id)` pair of the last row on a
//! page, plus the ordering it was issued under. Clients treat it as opaque:
//! it is CBOR, then base64 (URL-safe, no padding).
//!
//! A cursor only resumes the listing it came from. A token that does not
//! decode, has an unknown version, or was issued for a different path, sort
//! field, or direction is rejected, and the engine restarts from the first
//! page.

use super::filter::{Query, SortField, SortValue};
use crate::error::{XdbError, XdbResult};
use crate::types::{RowId, StoredRecord};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Cursor format version.
const CURSOR_VERSION: u8 = 1;

/// Why a cursor was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    /// Not base64, or not a cursor.
    #[error("cursor is malformed")]
    InvalidFormat,

    /// Issued by an incompatible format version.
    #[error("unsupported cursor version {0}")]
    UnsupportedVersion(u8),

    /// Issued for a different listing.
    #[error("cursor was issued for a different listing")]
    Mismatch,
}

/// The resume position of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    version: u8,
    path: String,
    sort: String,
    ascending: bool,
    value: SortValue,
    row: u64,
}

impl Cursor {
    /// Builds the cursor pointing just past `last` in `query`'s ordering.
    #[must_use]
    pub fn after_row(query: &Query, last: &StoredRecord) -> Self {
        Self {
            version: CURSOR_VERSION,
            path: query.path.clone(),
            sort: query.sort_by.as_str().to_string(),
            ascending: query.sort_asc,
            value: query.sort_by.value_of(last),
            row: last.row.as_u64(),
        }
    }

    /// Encodes the cursor as an opaque token.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the cursor fails to serialize.
    pub fn encode(&self) -> XdbResult<String> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|e| XdbError::codec(format!("cursor: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Decodes a token and checks it belongs to `query`.
    ///
    /// # Errors
    ///
    /// Returns a [`CursorError`] describing why the token cannot resume
    /// `query`.
    pub fn decode(token: &str, query: &Query) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CursorError::InvalidFormat)?;
        let cursor: Self =
            ciborium::de::from_reader(bytes.as_slice()).map_err(|_| CursorError::InvalidFormat)?;

        if cursor.version != CURSOR_VERSION {
            return Err(CursorError::UnsupportedVersion(cursor.version));
        }
        if cursor.path != query.path
            || cursor.sort != query.sort_by.as_str()
            || cursor.ascending != query.sort_asc
        {
            return Err(CursorError::Mismatch);
        }
        if !value_fits(query.sort_by, &cursor.value) {
            return Err(CursorError::InvalidFormat);
        }
        Ok(cursor)
    }

    /// Returns the row id of the last row served.
    #[must_use]
    pub fn row(&self) -> RowId {
        RowId::new(self.row)
    }

    /// Returns true if `row` comes strictly after this cursor in the
    /// listing's direction.
    #[must_use]
    pub fn admits(&self, sort: SortField, row: &StoredRecord) -> bool {
        let ordering = sort
            .value_of(row)
            .cmp(&self.value)
            .then(row.row.cmp(&self.row()));
        if self.ascending {
            ordering == Ordering::Greater
        } else {
            ordering == Ordering::Less
        }
    }
}

fn value_fits(sort: SortField, value: &SortValue) -> bool {
    matches!(
        (sort, value),
        (SortField::CreatedAt, SortValue::Int(_))
            | (SortField::Name, SortValue::Text(_))
            | (SortField::InsertionOrder, SortValue::None)
    )
}
