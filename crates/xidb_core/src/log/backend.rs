//! The log-structured record backend.

use super::dir::LogDir;
use super::frame::Frame;
use super::state::LogState;
use crate::backend::{InsertOutcome, LatestQuery, RecordBackend};
use crate::config::LogConfig;
use crate::error::{XdbError, XdbResult};
use crate::fields::FieldUpdate;
use crate::query::{count_distinct, latest_per_xid, paginate, Page, Query};
use crate::record::Record;
use crate::types::{RowId, StoredRecord};
use crate::xid::Xid;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};
use xidb_storage::{FileBackend, InMemoryBackend, StorageBackend};

/// Counters describing a record log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LogStats {
    /// Frames in the log, including superseded images.
    pub frames: u64,
    /// Rows held, tombstoned or not.
    pub rows: usize,
    /// Rows without a soft-delete tag.
    pub live_rows: usize,
    /// Rows with a soft-delete tag.
    pub tombstoned_rows: usize,
    /// Distinct `(xid, path)` keys.
    pub distinct_keys: usize,
    /// Size of the log in bytes.
    pub bytes: u64,
}

/// Result of a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CompactionStats {
    /// Frames before.
    pub frames_before: u64,
    /// Frames after.
    pub frames_after: u64,
    /// Bytes before.
    pub bytes_before: u64,
    /// Bytes after.
    pub bytes_after: u64,
}

impl CompactionStats {
    /// Returns the bytes reclaimed.
    #[must_use]
    pub fn bytes_saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

struct LogInner {
    storage: Box<dyn StorageBackend>,
    state: LogState,
}

impl LogInner {
    /// Appends `frames` as one write, then applies them to the state.
    ///
    /// On a failed write the log is cut back to its previous size and the
    /// state is left untouched.
    fn commit(&mut self, frames: &[Frame], sync: bool) -> XdbResult<()> {
        let bytes: Vec<u8> = frames.iter().flat_map(Frame::encode).collect();
        let size = self.storage.size()?;

        let written = self
            .storage
            .append(&bytes)
            .and_then(|_| self.storage.flush())
            .and_then(|()| if sync { self.storage.sync() } else { Ok(()) });
        if let Err(error) = written {
            if let Err(truncate_error) = self.storage.truncate(size) {
                warn!(%truncate_error, "failed to cut back partial write");
            }
            return Err(error.into());
        }

        for frame in frames {
            self.state.apply(frame)?;
        }
        Ok(())
    }

    fn insert(
        &mut self,
        record: Record,
        idempotency_key: Option<String>,
        sync: bool,
    ) -> XdbResult<RowId> {
        record.validate()?;
        let row = self.state.allocate_row();
        let stored = StoredRecord {
            row,
            record,
            deleted_at: None,
            idempotency_key,
        };
        self.commit(&[Frame::image(&stored)?], sync)?;
        Ok(row)
    }

    /// Overwrites the current row of the record's key, keeping its row id,
    /// idempotency key, and (when unset) its card id.
    ///
    /// `createdAt` never moves below the current row's. The current row has
    /// the greatest `(createdAt, row)` of its key, so the replacement stays
    /// current however old the incoming timestamp is.
    fn replace_current(&mut self, current: StoredRecord, mut record: Record, sync: bool) -> XdbResult<RowId> {
        record.validate()?;
        let metadata = &mut record.metadata;
        metadata.created_at = metadata.created_at.max(current.record.metadata.created_at);
        if metadata.card_id.is_none() {
            metadata.card_id = current.record.metadata.card_id;
        }
        let stored = StoredRecord {
            row: current.row,
            record,
            deleted_at: None,
            idempotency_key: current.idempotency_key,
        };
        self.commit(&[Frame::image(&stored)?], sync)?;
        Ok(stored.row)
    }

    fn current(&self, path: &str, xid: &Xid) -> XdbResult<StoredRecord> {
        self.state
            .current(path, xid)
            .cloned()
            .ok_or_else(|| XdbError::not_found(xid.as_str(), path))
    }
}

/// A record backend over an append-only log.
///
/// Every mutation appends frames and then updates an in-memory view under
/// one write lock, so conditional inserts are atomic and a failed write
/// leaves no trace. Reads are served from the in-memory view.
///
/// # Example
///
/// ```rust
/// use xidb_core::log::LogBackend;
///
/// let backend = LogBackend::in_memory();
/// assert_eq!(backend.stats().unwrap().rows, 0);
/// ```
pub struct LogBackend {
    inner: RwLock<LogInner>,
    config: LogConfig,
    dir: Option<LogDir>,
}

impl std::fmt::Debug for LogBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBackend")
            .field("dir", &self.dir.as_ref().map(LogDir::path))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LogBackend {
    /// Creates an empty backend held in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(LogInner {
                storage: Box::new(InMemoryBackend::new()),
                state: LogState::new(),
            }),
            config: LogConfig::default().sync_on_write(false),
            dir: None,
        }
    }

    /// Opens the store directory at `path`, replaying its log.
    ///
    /// # Errors
    ///
    /// Returns `StoreLocked` if another process has the directory open, or
    /// an error if the log is damaged beyond a torn final frame.
    pub fn open(path: &Path, config: LogConfig) -> XdbResult<Self> {
        let dir = LogDir::open(path, config.create_if_missing)?;
        let storage = FileBackend::open(&dir.log_path())?;
        let mut backend = Self::with_storage(Box::new(storage), config)?;
        let rows = backend.inner.read().state.row_count();
        info!(dir = %path.display(), rows, "opened record store");
        backend.dir = Some(dir);
        Ok(backend)
    }

    /// Replays the log held by `storage`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is damaged beyond a torn final frame.
    pub fn with_storage(mut storage: Box<dyn StorageBackend>, config: LogConfig) -> XdbResult<Self> {
        let state = replay(storage.as_mut())?;
        let backend = Self {
            inner: RwLock::new(LogInner { storage, state }),
            config,
            dir: None,
        };
        if backend.config.compact_on_open {
            backend.compact()?;
        }
        Ok(backend)
    }

    /// Returns the directory the backend was opened from, if any.
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(LogDir::path)
    }

    /// Returns counters describing the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log size cannot be read.
    pub fn stats(&self) -> XdbResult<LogStats> {
        let inner = self.inner.read();
        let live_rows = inner.state.rows().filter(|r| r.is_live()).count();
        let rows = inner.state.row_count();
        Ok(LogStats {
            frames: inner.state.frames(),
            rows,
            live_rows,
            tombstoned_rows: rows - live_rows,
            distinct_keys: inner.state.key_count(),
            bytes: inner.storage.size()?,
        })
    }

    /// Returns every row of `(xid, path)` in insertion order, tombstoned
    /// rows included.
    #[must_use]
    pub fn history(&self, path: &str, xid: &Xid) -> Vec<StoredRecord> {
        self.inner.read().state.history(path, xid).cloned().collect()
    }

    /// Reports what [`compact`](Self::compact) would do without touching
    /// the log.
    ///
    /// # Errors
    ///
    /// Returns an error if a row fails to encode.
    pub fn compaction_plan(&self) -> XdbResult<CompactionStats> {
        let inner = self.inner.read();
        let frames = compacted_frames(&inner.state)?;
        Ok(CompactionStats {
            frames_before: inner.state.frames(),
            frames_after: frames.len() as u64,
            bytes_before: inner.storage.size()?,
            bytes_after: frames.iter().map(|f| f.encoded_len() as u64).sum(),
        })
    }

    /// Rewrites the log to one image per held row, dropping superseded
    /// images and erased rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewrite fails; the previous log then stays
    /// in place.
    pub fn compact(&self) -> XdbResult<CompactionStats> {
        let mut inner = self.inner.write();
        let frames_before = inner.state.frames();
        let bytes_before = inner.storage.size()?;

        let frames = compacted_frames(&inner.state)?;
        let bytes: Vec<u8> = frames.iter().flat_map(Frame::encode).collect();
        inner.storage.rewrite(&bytes)?;
        inner.state.set_frames(frames.len() as u64);

        let stats = CompactionStats {
            frames_before,
            frames_after: frames.len() as u64,
            bytes_before,
            bytes_after: bytes.len() as u64,
        };
        info!(
            frames_before = stats.frames_before,
            frames_after = stats.frames_after,
            bytes_saved = stats.bytes_saved(),
            "compacted record log"
        );
        Ok(stats)
    }

    fn check_key(path: &str, xid: &Xid, record: &Record) -> XdbResult<()> {
        if record.metadata.path != path || &record.xid != xid {
            return Err(XdbError::invalid_argument(
                "record does not belong to the addressed (xid, path)",
            ));
        }
        Ok(())
    }
}

/// One image per held row, plus an erase marker for the highest issued row
/// id when that row is gone, so it is never reissued.
fn compacted_frames(state: &LogState) -> XdbResult<Vec<Frame>> {
    let mut frames = state.rows().map(Frame::image).collect::<XdbResult<Vec<_>>>()?;
    if let Some(last) = state.last_row() {
        if !state.contains_row(last) {
            frames.push(Frame::erase(last));
        }
    }
    Ok(frames)
}

/// Rebuilds the in-memory view from `storage`, cutting off a torn tail.
fn replay(storage: &mut dyn StorageBackend) -> XdbResult<LogState> {
    let size = storage.size()?;
    let mut state = LogState::new();
    let mut offset = 0u64;

    while offset < size {
        let remaining = size - offset;
        if remaining < 4 {
            break;
        }
        let prefix = storage.read_at(offset, 4)?;
        let frame_len = Frame::peek_len([prefix[0], prefix[1], prefix[2], prefix[3]]);
        if frame_len < Frame::MIN_SIZE {
            return Err(XdbError::corruption(format!(
                "frame at offset {offset} has length {frame_len}"
            )));
        }
        if frame_len as u64 > remaining {
            break;
        }

        let data = storage.read_at(offset, frame_len)?;
        let frame = Frame::decode(&data)?;
        state.apply(&frame)?;
        offset += frame_len as u64;
    }

    if offset < size {
        warn!(offset, discarded = size - offset, "truncating torn tail of record log");
        storage.truncate(offset)?;
    }
    Ok(state)
}

#[async_trait]
impl RecordBackend for LogBackend {
    async fn exists(&self, path: &str, xid: &Xid) -> XdbResult<bool> {
        Ok(self.inner.read().state.current(path, xid).is_some())
    }

    async fn find_by_xid(&self, path: &str, xid: &Xid) -> XdbResult<Option<StoredRecord>> {
        Ok(self.inner.read().state.current(path, xid).cloned())
    }

    async fn insert(&self, record: Record, idempotency_key: Option<String>) -> XdbResult<RowId> {
        let mut inner = self.inner.write();
        if let Some(key) = &idempotency_key {
            if inner.state.idempotent_row(&record.metadata.path, key).is_some() {
                return Err(XdbError::already_exists(format!(
                    "idempotency key {key} at path {}",
                    record.metadata.path
                )));
            }
        }
        inner.insert(record, idempotency_key, self.config.sync_on_write)
    }

    async fn insert_idempotent(
        &self,
        record: Record,
        idempotency_key: String,
    ) -> XdbResult<InsertOutcome> {
        let mut inner = self.inner.write();
        if let Some(row) = inner.state.idempotent_row(&record.metadata.path, &idempotency_key) {
            return Ok(InsertOutcome::Existing(row));
        }
        inner
            .insert(record, Some(idempotency_key), self.config.sync_on_write)
            .map(InsertOutcome::Inserted)
    }

    async fn upsert(&self, record: Record) -> XdbResult<RowId> {
        let mut inner = self.inner.write();
        let current = inner.state.current(&record.metadata.path, &record.xid).cloned();
        match current {
            Some(current) => inner.replace_current(current, record, self.config.sync_on_write),
            None => inner.insert(record, None, self.config.sync_on_write),
        }
    }

    async fn replace(&self, path: &str, xid: &Xid, record: Record) -> XdbResult<RowId> {
        Self::check_key(path, xid, &record)?;
        let mut inner = self.inner.write();
        let current = inner.current(path, xid)?;
        inner.replace_current(current, record, self.config.sync_on_write)
    }

    async fn update_fields(&self, path: &str, xid: &Xid, update: &FieldUpdate) -> XdbResult<RowId> {
        let mut inner = self.inner.write();
        let current = inner.current(path, xid)?;
        let merged = update.apply(&current.record)?;
        inner.replace_current(current, merged, self.config.sync_on_write)
    }

    async fn delete_soft(&self, path: &str, xid: &Xid, deleted_at: i64) -> XdbResult<usize> {
        let mut inner = self.inner.write();
        let frames = inner
            .state
            .history(path, xid)
            .filter(|row| row.is_live())
            .map(|row| {
                Frame::image(&StoredRecord {
                    deleted_at: Some(deleted_at),
                    ..row.clone()
                })
            })
            .collect::<XdbResult<Vec<_>>>()?;
        if frames.is_empty() {
            return Err(XdbError::not_found(xid.as_str(), path));
        }
        inner.commit(&frames, self.config.sync_on_write)?;
        Ok(frames.len())
    }

    async fn delete_hard(&self, path: &str, xid: &Xid) -> XdbResult<usize> {
        let mut inner = self.inner.write();
        let frames: Vec<Frame> = inner
            .state
            .history(path, xid)
            .map(|row| Frame::erase(row.row))
            .collect();
        if frames.is_empty() {
            return Err(XdbError::not_found(xid.as_str(), path));
        }
        inner.commit(&frames, self.config.sync_on_write)?;
        Ok(frames.len())
    }
}

#[async_trait]
impl LatestQuery for LogBackend {
    async fn list_latest(&self, query: &Query) -> XdbResult<Page> {
        let inner = self.inner.read();
        paginate(latest_per_xid(inner.state.rows(), query), query)
    }

    async fn count_latest(&self, query: &Query) -> XdbResult<u64> {
        Ok(count_distinct(self.inner.read().state.rows(), query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::record::{Info, Metadata, Operation};
    use serde_json::json;
    use tempfile::tempdir;

    fn record(id: &str, created_at: i64) -> Record {
        Record::new(
            Info::new(id, "username"),
            Metadata::new(Operation::Create, "/p", "application/json").with_created_at(created_at),
            json!({ "v": created_at }),
        )
    }

    /// Byte store whose `size` starts failing once `broken` is set.
    struct UnsizedStorage {
        bytes: InMemoryBackend,
        broken: std::sync::Arc<std::sync::atomic::AtomicBool>,
    }

    impl StorageBackend for UnsizedStorage {
        fn read_at(&self, offset: u64, len: usize) -> xidb_storage::StorageResult<Vec<u8>> {
            self.bytes.read_at(offset, len)
        }
        fn append(&mut self, data: &[u8]) -> xidb_storage::StorageResult<u64> {
            self.bytes.append(data)
        }
        fn flush(&mut self) -> xidb_storage::StorageResult<()> {
            self.bytes.flush()
        }
        fn size(&self) -> xidb_storage::StorageResult<u64> {
            if self.broken.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "size unavailable").into());
            }
            self.bytes.size()
        }
        fn sync(&mut self) -> xidb_storage::StorageResult<()> {
            self.bytes.sync()
        }
        fn truncate(&mut self, new_size: u64) -> xidb_storage::StorageResult<()> {
            self.bytes.truncate(new_size)
        }
        fn rewrite(&mut self, data: &[u8]) -> xidb_storage::StorageResult<()> {
            self.bytes.rewrite(data)
        }
    }

    #[test]
    fn stats_report_unreadable_size() {
        let broken = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let storage = UnsizedStorage {
            bytes: InMemoryBackend::new(),
            broken: broken.clone(),
        };
        let backend = LogBackend::with_storage(Box::new(storage), LogConfig::default()).unwrap();
        assert_eq!(backend.stats().unwrap().bytes, 0);

        broken.store(true, std::sync::atomic::Ordering::SeqCst);
        let err = backend.stats().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn insert_then_find_latest() {
        let backend = LogBackend::in_memory();
        backend.insert(record("a", 100), None).await.unwrap();
        backend.insert(record("a", 200), None).await.unwrap();
        let found = backend.find_by_xid("/p", &Xid::derive("a")).await.unwrap().unwrap();
        assert_eq!(found.record.metadata.created_at, 200);
        assert_eq!(backend.history("/p", &Xid::derive("a")).len(), 2);
    }

    #[tokio::test]
    async fn reused_idempotency_key_is_rejected_for_plain_insert() {
        let backend = LogBackend::in_memory();
        let first = backend.insert_idempotent(record("a", 1), "k".into()).await.unwrap();
        assert!(first.is_inserted());
        let again = backend.insert_idempotent(record("a", 2), "k".into()).await.unwrap();
        assert_eq!(again, InsertOutcome::Existing(first.row()));

        let err = backend.insert(record("b", 3), Some("k".into())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn replace_keeps_row_and_created_at() {
        let backend = LogBackend::in_memory();
        let row = backend.insert(record("a", 100), None).await.unwrap();
        let xid = Xid::derive("a");

        let mut next = record("a", 0);
        next.payload = json!({"v": "replaced"});
        next.metadata.card_id = None;
        assert_eq!(backend.replace("/p", &xid, next).await.unwrap(), row);

        let found = backend.find_by_xid("/p", &xid).await.unwrap().unwrap();
        assert_eq!(found.row, row);
        assert_eq!(found.record.metadata.created_at, 100);
        assert!(found.record.metadata.card_id.is_some());
        assert_eq!(found.record.payload, json!({"v": "replaced"}));
    }

    #[tokio::test]
    async fn older_timestamp_replacement_stays_current() {
        let backend = LogBackend::in_memory();
        let xid = Xid::derive("a");
        backend.insert(record("a", 100), None).await.unwrap();
        let newest = backend.insert(record("a", 200), None).await.unwrap();

        let mut next = record("a", 50);
        next.payload = json!({"v": "replaced"});
        assert_eq!(backend.replace("/p", &xid, next).await.unwrap(), newest);

        let found = backend.find_by_xid("/p", &xid).await.unwrap().unwrap();
        assert_eq!(found.row, newest);
        assert_eq!(found.record.metadata.created_at, 200);
        assert_eq!(found.record.payload, json!({"v": "replaced"}));
    }

    #[tokio::test]
    async fn replace_without_live_row_is_not_found() {
        let backend = LogBackend::in_memory();
        let err = backend
            .replace("/p", &Xid::derive("a"), record("a", 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn replace_rejects_foreign_record() {
        let backend = LogBackend::in_memory();
        backend.insert(record("a", 1), None).await.unwrap();
        let err = backend
            .replace("/p", &Xid::derive("a"), record("b", 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn soft_delete_hides_every_version_and_upsert_starts_fresh() {
        let backend = LogBackend::in_memory();
        let xid = Xid::derive("a");
        backend.insert(record("a", 1), None).await.unwrap();
        backend.insert(record("a", 2), None).await.unwrap();

        assert_eq!(backend.delete_soft("/p", &xid, 99).await.unwrap(), 2);
        assert!(!backend.exists("/p", &xid).await.unwrap());
        let err = backend.delete_soft("/p", &xid, 100).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let row = backend.upsert(record("a", 3)).await.unwrap();
        assert_eq!(row, RowId::new(3));
        assert_eq!(backend.stats().unwrap().tombstoned_rows, 2);
    }

    #[tokio::test]
    async fn hard_delete_removes_tombstones_too() {
        let backend = LogBackend::in_memory();
        let xid = Xid::derive("a");
        backend.insert(record("a", 1), None).await.unwrap();
        backend.delete_soft("/p", &xid, 5).await.unwrap();

        assert_eq!(backend.delete_hard("/p", &xid).await.unwrap(), 1);
        assert!(backend.history("/p", &xid).is_empty());
        let err = backend.delete_hard("/p", &xid).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn update_fields_merges_in_place() {
        let backend = LogBackend::in_memory();
        let xid = Xid::derive("a");
        let row = backend.insert(record("a", 7), None).await.unwrap();
        let update = FieldUpdate::new().set("payload.status", json!("done"));
        assert_eq!(backend.update_fields("/p", &xid, &update).await.unwrap(), row);

        let found = backend.find_by_xid("/p", &xid).await.unwrap().unwrap();
        assert_eq!(found.record.payload, json!({"v": 7, "status": "done"}));
        assert_eq!(found.record.metadata.created_at, 7);
    }

    #[tokio::test]
    async fn listing_and_counting() {
        let backend = LogBackend::in_memory();
        backend.insert(record("a", 1), None).await.unwrap();
        backend.insert(record("a", 5), None).await.unwrap();
        backend.insert(record("b", 3), None).await.unwrap();

        let page = backend.list_latest(&Query::new("/p")).await.unwrap();
        assert_eq!(page.xids(), vec![&Xid::derive("a"), &Xid::derive("b")]);
        assert_eq!(backend.count_latest(&Query::new("/p")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let backend = LogBackend::open(dir.path(), LogConfig::default()).unwrap();
            backend.insert(record("a", 1), Some("k".into())).await.unwrap();
            backend.insert(record("a", 2), None).await.unwrap();
            backend.delete_soft("/p", &Xid::derive("b"), 3).await.unwrap_err();
        }

        let backend = LogBackend::open(dir.path(), LogConfig::default()).unwrap();
        let stats = backend.stats().unwrap();
        assert_eq!(stats.rows, 2);
        assert_eq!(stats.frames, 2);
        let outcome = backend.insert_idempotent(record("a", 9), "k".into()).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Existing(RowId::new(1)));
        assert_eq!(backend.insert(record("c", 1), None).await.unwrap(), RowId::new(3));
    }

    #[test]
    fn second_open_is_locked_out() {
        let dir = tempdir().unwrap();
        let _first = LogBackend::open(dir.path(), LogConfig::default()).unwrap();
        let err = LogBackend::open(dir.path(), LogConfig::default()).unwrap_err();
        assert!(matches!(err, XdbError::StoreLocked));
    }

    #[test]
    fn torn_tail_is_truncated() {
        let stored = StoredRecord {
            row: RowId::new(1),
            record: record("a", 1),
            deleted_at: None,
            idempotency_key: None,
        };
        let mut bytes = Frame::image(&stored).unwrap().encode();
        let intact = bytes.len() as u64;
        let torn = Frame::erase(RowId::new(1)).encode();
        bytes.extend_from_slice(&torn[..torn.len() - 3]);

        let backend =
            LogBackend::with_storage(Box::new(InMemoryBackend::with_data(bytes)), LogConfig::default())
                .unwrap();
        let stats = backend.stats().unwrap();
        assert_eq!(stats.rows, 1);
        assert_eq!(stats.bytes, intact);
    }

    #[test]
    fn checksum_damage_is_fatal() {
        let stored = StoredRecord {
            row: RowId::new(1),
            record: record("a", 1),
            deleted_at: None,
            idempotency_key: None,
        };
        let mut bytes = Frame::image(&stored).unwrap().encode();
        bytes[20] ^= 0xFF;
        let err =
            LogBackend::with_storage(Box::new(InMemoryBackend::with_data(bytes)), LogConfig::default())
                .unwrap_err();
        assert!(matches!(err, XdbError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn compaction_keeps_state_and_row_ids() {
        let backend = LogBackend::in_memory();
        let xid = Xid::derive("a");
        backend.insert(record("a", 1), None).await.unwrap();
        backend.upsert(record("a", 2)).await.unwrap();
        backend.insert(record("b", 1), None).await.unwrap();
        backend.delete_hard("/p", &Xid::derive("b")).await.unwrap();
        assert_eq!(backend.stats().unwrap().frames, 4);

        let plan = backend.compaction_plan().unwrap();
        assert_eq!(backend.stats().unwrap().frames, 4);
        let stats = backend.compact().unwrap();
        assert_eq!(plan, stats);
        assert_eq!(stats.frames_before, 4);
        // One image for row 1 plus the marker for erased row 2.
        assert_eq!(stats.frames_after, 2);
        assert!(stats.bytes_saved() > 0);

        assert_eq!(
            backend.find_by_xid("/p", &xid).await.unwrap().unwrap().record.metadata.created_at,
            2
        );
        assert_eq!(backend.insert(record("c", 1), None).await.unwrap(), RowId::new(3));
    }

    #[tokio::test]
    async fn compact_on_open_rewrites_file() {
        let dir = tempdir().unwrap();
        {
            let backend = LogBackend::open(dir.path(), LogConfig::default()).unwrap();
            backend.insert(record("a", 1), None).await.unwrap();
            backend.upsert(record("a", 2)).await.unwrap();
            backend.upsert(record("a", 3)).await.unwrap();
            assert_eq!(backend.stats().unwrap().frames, 3);
        }
        let backend =
            LogBackend::open(dir.path(), LogConfig::default().compact_on_open(true)).unwrap();
        assert_eq!(backend.stats().unwrap().frames, 1);
        assert_eq!(backend.dir(), Some(dir.path()));
    }
}
