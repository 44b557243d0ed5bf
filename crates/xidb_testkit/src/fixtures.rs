//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores
//! and common test scenarios.

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use xidb_core::log::LogBackend;
use xidb_core::{
    Context, Info, LogConfig, Metadata, Operation, Record, RecordStore, XdbResult,
};

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store.
    pub store: RecordStore,
    /// The backend underneath, for inspection.
    pub backend: Arc<LogBackend>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a store held in memory.
    pub fn memory() -> Self {
        let backend = Arc::new(LogBackend::in_memory());
        Self {
            store: RecordStore::with_query_support(backend.clone()),
            backend,
            temp_dir: None,
        }
    }

    /// Creates a store held in memory whose `list` and `count` are
    /// unavailable.
    pub fn memory_without_query() -> Self {
        let backend = Arc::new(LogBackend::in_memory());
        Self {
            store: RecordStore::new(backend.clone()),
            backend,
            temp_dir: None,
        }
    }

    /// Creates a store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let backend = Self::open_dir(temp_dir.path());
        Self {
            store: RecordStore::with_query_support(backend.clone()),
            backend,
            temp_dir: Some(temp_dir),
        }
    }

    fn open_dir(path: &Path) -> Arc<LogBackend> {
        Arc::new(
            LogBackend::open(path, LogConfig::default().sync_on_write(false))
                .expect("Failed to open file store"),
        )
    }

    /// Closes the store and opens its directory again.
    ///
    /// # Panics
    ///
    /// Panics if the store is held in memory.
    #[must_use]
    pub fn reopen(self) -> Self {
        let Self {
            store,
            backend,
            temp_dir,
        } = self;
        let temp_dir = temp_dir.expect("Only file stores can be reopened");
        drop(store);
        drop(backend);

        let backend = Self::open_dir(temp_dir.path());
        Self {
            store: RecordStore::with_query_support(backend.clone()),
            backend,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store directory if file-based, None if in memory.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Returns a fresh context with no deadline.
    pub fn ctx(&self) -> Context {
        Context::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = RecordStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Builds records under one path.
#[derive(Debug, Clone)]
pub struct RecordFactory {
    path: String,
    kind: String,
}

impl RecordFactory {
    /// Creates a factory for records under `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: "username".to_string(),
        }
    }

    /// Sets the subject kind written to `info.type`.
    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Returns the path records are built for.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Builds a record for `id` created at `created_at`.
    pub fn record(&self, id: &str, created_at: i64) -> Record {
        Record::new(
            Info::new(id, &self.kind),
            Metadata::new(Operation::Create, &self.path, "application/json")
                .with_created_at(created_at),
            json!({ "id": id, "at": created_at }),
        )
    }

    /// Builds a record tagged with `tags`.
    pub fn tagged(&self, id: &str, created_at: i64, tags: &[&str]) -> Record {
        let mut record = self.record(id, created_at);
        if let Some(info) = record.info.as_mut() {
            info.tags = tags.iter().map(|t| (*t).to_string()).collect();
        }
        record
    }

    /// Builds a record whose payload carries `marker`, so tests can tell
    /// versions with equal timestamps apart.
    pub fn marked(&self, id: &str, created_at: i64, marker: usize) -> Record {
        let mut record = self.record(id, created_at);
        record.payload = json!({ "id": id, "at": created_at, "marker": marker });
        record
    }
}

/// Reads the marker [`RecordFactory::marked`] put in a payload.
pub fn marker_of(record: &Record) -> Option<usize> {
    record
        .payload
        .get("marker")
        .and_then(serde_json::Value::as_u64)
        .and_then(|m| usize::try_from(m).ok())
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates `versions` versions of each of `identities`, with
    /// `createdAt` increasing in write order starting at 1.
    pub async fn populate(
        store: &RecordStore,
        factory: &RecordFactory,
        identities: &[&str],
        versions: usize,
    ) -> XdbResult<()> {
        let ctx = Context::new();
        let mut created_at = 0;
        for _ in 0..versions {
            for id in identities {
                created_at += 1;
                store
                    .create(&ctx, factory.path(), factory.record(id, created_at), None)
                    .await?;
            }
        }
        Ok(())
    }
}
