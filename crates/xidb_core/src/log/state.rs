//! In-memory view of the record log.

use super::frame::{Frame, FrameKind};
use crate::error::XdbResult;
use crate::types::{RowId, StoredRecord};
use crate::xid::Xid;
use std::collections::{BTreeMap, BTreeSet, HashMap};

type Key = (String, Xid);

/// Every row the log currently holds, with the indexes the backend needs.
///
/// Rebuilt by replaying frames on open and kept in step with every write.
#[derive(Debug, Default)]
pub struct LogState {
    rows: BTreeMap<RowId, StoredRecord>,
    by_key: HashMap<Key, BTreeSet<RowId>>,
    idempotency: HashMap<(String, String), RowId>,
    next_row: RowId,
    frames: u64,
}

impl LogState {
    /// Creates an empty state. The first row id is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_row: RowId::new(1),
            ..Self::default()
        }
    }

    /// Applies one replayed or freshly written frame.
    ///
    /// # Errors
    ///
    /// Returns an error if an image frame does not decode.
    pub fn apply(&mut self, frame: &Frame) -> XdbResult<()> {
        match frame.kind {
            FrameKind::Image => self.put(frame.stored_record()?),
            FrameKind::Erase => self.erase(frame.row),
        }
        if frame.row >= self.next_row {
            self.next_row = frame.row.next();
        }
        self.frames += 1;
        Ok(())
    }

    /// Reserves the next row id.
    pub fn allocate_row(&mut self) -> RowId {
        let row = self.next_row;
        self.next_row = row.next();
        row
    }

    /// Returns the highest row id ever issued, if any.
    #[must_use]
    pub fn last_row(&self) -> Option<RowId> {
        (self.next_row.as_u64() > 1).then(|| RowId::new(self.next_row.as_u64() - 1))
    }

    fn put(&mut self, stored: StoredRecord) {
        let row = stored.row;
        let key = (stored.record.metadata.path.clone(), stored.record.xid.clone());
        if let Some(idempotency_key) = &stored.idempotency_key {
            self.idempotency
                .insert((key.0.clone(), idempotency_key.clone()), row);
        }
        self.by_key.entry(key).or_default().insert(row);
        self.rows.insert(row, stored);
    }

    fn erase(&mut self, row: RowId) {
        let Some(stored) = self.rows.remove(&row) else {
            return;
        };
        let path = stored.record.metadata.path;
        if let Some(idempotency_key) = stored.idempotency_key {
            let slot = (path.clone(), idempotency_key);
            if self.idempotency.get(&slot) == Some(&row) {
                self.idempotency.remove(&slot);
            }
        }
        let key = (path, stored.record.xid);
        if let Some(rows) = self.by_key.get_mut(&key) {
            rows.remove(&row);
            if rows.is_empty() {
                self.by_key.remove(&key);
            }
        }
    }

    /// Returns every row of `(xid, path)` in insertion order, tombstoned
    /// rows included.
    pub fn history<'a>(&'a self, path: &str, xid: &Xid) -> impl Iterator<Item = &'a StoredRecord> {
        self.by_key
            .get(&(path.to_string(), xid.clone()))
            .into_iter()
            .flatten()
            .filter_map(move |row| self.rows.get(row))
    }

    /// Returns the live row of `(xid, path)` with the greatest
    /// `(createdAt, row id)`.
    #[must_use]
    pub fn current(&self, path: &str, xid: &Xid) -> Option<&StoredRecord> {
        self.history(path, xid)
            .filter(|row| row.is_live())
            .max_by_key(|row| row.recency())
    }

    /// Returns the row holding `(path, idempotency_key)`.
    #[must_use]
    pub fn idempotent_row(&self, path: &str, idempotency_key: &str) -> Option<RowId> {
        self.idempotency
            .get(&(path.to_string(), idempotency_key.to_string()))
            .copied()
    }

    /// Iterates over every row in insertion order.
    pub fn rows(&self) -> impl Iterator<Item = &StoredRecord> {
        self.rows.values()
    }

    /// Returns the number of frames applied since the log was last rewritten.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Resets the frame count after the log is rewritten.
    pub fn set_frames(&mut self, frames: u64) {
        self.frames = frames;
    }

    /// Returns true if `row` is held.
    #[must_use]
    pub fn contains_row(&self, row: RowId) -> bool {
        self.rows.contains_key(&row)
    }

    /// Returns the number of rows held.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns the number of distinct `(xid, path)` keys held.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.by_key.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Info, Metadata, Operation, Record};
    use serde_json::json;

    fn stored(row: u64, id: &str, created_at: i64, key: Option<&str>) -> StoredRecord {
        StoredRecord {
            row: RowId::new(row),
            record: Record::new(
                Info::new(id, "username"),
                Metadata::new(Operation::Create, "/p", "application/json")
                    .with_created_at(created_at),
                json!(row),
            ),
            deleted_at: None,
            idempotency_key: key.map(str::to_string),
        }
    }

    fn image(s: &StoredRecord) -> Frame {
        Frame::image(s).unwrap()
    }

    #[test]
    fn replay_tracks_next_row() {
        let mut state = LogState::new();
        assert_eq!(state.last_row(), None);
        state.apply(&image(&stored(4, "a", 1, None))).unwrap();
        assert_eq!(state.allocate_row(), RowId::new(5));
        assert_eq!(state.last_row(), Some(RowId::new(5)));
    }

    #[test]
    fn current_prefers_created_at_then_row() {
        let mut state = LogState::new();
        state.apply(&image(&stored(1, "a", 200, None))).unwrap();
        state.apply(&image(&stored(2, "a", 100, None))).unwrap();
        state.apply(&image(&stored(3, "a", 200, None))).unwrap();
        let xid = Xid::derive("a");
        assert_eq!(state.current("/p", &xid).unwrap().row, RowId::new(3));
        assert_eq!(state.history("/p", &xid).count(), 3);
    }

    #[test]
    fn later_image_supersedes() {
        let mut state = LogState::new();
        state.apply(&image(&stored(1, "a", 1, None))).unwrap();
        let mut tombstoned = stored(1, "a", 1, None);
        tombstoned.deleted_at = Some(9);
        state.apply(&image(&tombstoned)).unwrap();
        assert_eq!(state.row_count(), 1);
        assert!(state.current("/p", &Xid::derive("a")).is_none());
        assert_eq!(state.frames(), 2);
    }

    #[test]
    fn erase_clears_indexes() {
        let mut state = LogState::new();
        state.apply(&image(&stored(1, "a", 1, Some("k")))).unwrap();
        assert_eq!(state.idempotent_row("/p", "k"), Some(RowId::new(1)));

        state.apply(&Frame::erase(RowId::new(1))).unwrap();
        assert_eq!(state.idempotent_row("/p", "k"), None);
        assert_eq!(state.key_count(), 0);
        assert_eq!(state.row_count(), 0);
        // Erasing an unknown row is harmless.
        state.apply(&Frame::erase(RowId::new(77))).unwrap();
        assert_eq!(state.allocate_row(), RowId::new(78));
    }
}
