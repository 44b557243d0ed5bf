//! The record store.
//!
//! [`RecordStore`] is the public surface over a [`RecordBackend`]. It checks
//! inputs, fills in store-assigned fields, decides between plain and
//! idempotent creation, and runs every backend call under the caller's
//! [`Context`]. It keeps no cache and never retries.

use crate::backend::{InsertOutcome, LatestQuery, RecordBackend};
use crate::config::StoreConfig;
use crate::context::Context;
use crate::error::{XdbError, XdbResult};
use crate::fields::FieldUpdate;
use crate::query::{Page, Query, QueryEngine};
use crate::record::Record;
use crate::types::{new_card_id, now_millis, RowId};
use crate::xid::Xid;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Versioned records keyed by `(xid, path)`.
///
/// Cloning is cheap; clones share the backend.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use serde_json::json;
/// use xidb_core::log::LogBackend;
/// use xidb_core::{Context, Info, Metadata, Operation, Record, RecordStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> xidb_core::XdbResult<()> {
/// let store = RecordStore::with_query_support(Arc::new(LogBackend::in_memory()));
/// let ctx = Context::new();
/// let record = Record::new(
///     Info::new("alice@example.com", "email"),
///     Metadata::new(Operation::Create, "/info/x", "application/json"),
///     json!({"team": "sec"}),
/// );
/// let xid = record.xid.clone();
/// store.create(&ctx, "/info/x", record, None).await?;
/// assert!(store.exists(&ctx, "/info/x", &xid).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn RecordBackend>,
    query: Option<Arc<dyn LatestQuery>>,
    engine: Option<QueryEngine>,
    config: StoreConfig,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("config", &self.config)
            .field("query_support", &self.supports_query())
            .finish_non_exhaustive()
    }
}

impl RecordStore {
    /// Creates a store over a backend without listing support.
    ///
    /// `list` and `count` return `NotImplemented`.
    pub fn new(backend: Arc<dyn RecordBackend>) -> Self {
        Self {
            backend,
            query: None,
            engine: None,
            config: StoreConfig::default(),
        }
    }

    /// Creates a store over a backend that also lists and counts.
    pub fn with_query_support<B>(backend: Arc<B>) -> Self
    where
        B: RecordBackend + LatestQuery + 'static,
    {
        let query: Arc<dyn LatestQuery> = backend.clone();
        let config = StoreConfig::default();
        Self {
            backend,
            engine: Some(QueryEngine::new(query.clone(), config.clone())),
            query: Some(query),
            config,
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.engine = self
            .query
            .clone()
            .map(|query| QueryEngine::new(query, config.clone()));
        self.config = config;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns true if `list` and `count` are available.
    #[must_use]
    pub fn supports_query(&self) -> bool {
        self.engine.is_some()
    }

    /// Returns the query engine, if the backend supports listing.
    #[must_use]
    pub fn query_engine(&self) -> Option<&QueryEngine> {
        self.engine.as_ref()
    }

    /// Stores `record` under `path`.
    ///
    /// `metadata.path` is set to `path`; `createdAt` and `cardId` are filled
    /// in when unset. With a non-empty `idempotency_key` and idempotency
    /// enabled, a second create with the same key under the same path
    /// writes nothing and reports the existing row.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty path or identity, or a payload
    /// that does not serialize.
    pub async fn create<P: Serialize>(
        &self,
        ctx: &Context,
        path: &str,
        record: Record<P>,
        idempotency_key: Option<&str>,
    ) -> XdbResult<InsertOutcome> {
        require_path(path)?;
        let mut record = record.into_json()?;
        record.metadata.path = path.to_string();
        stamp(&mut record);
        record.validate()?;

        let xid = record.xid.clone();
        let key = idempotency_key.filter(|k| !k.is_empty());
        let outcome = match key {
            Some(key) if self.config.enable_idempotency => {
                let insert = self.backend.insert_idempotent(record, key.to_string());
                ctx.run("create", self.config.default_timeout, insert).await?
            }
            _ => {
                let insert = self.backend.insert(record, None);
                InsertOutcome::Inserted(ctx.run("create", self.config.default_timeout, insert).await?)
            }
        };
        debug!(path, xid = %xid, inserted = outcome.is_inserted(), row = %outcome.row(), "create");
        Ok(outcome)
    }

    /// Stores `record` at its own `(xid, metadata.path)`, replacing the
    /// current value if there is one. Last writer wins; nothing is merged.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty path or identity.
    pub async fn upsert<P: Serialize>(&self, ctx: &Context, record: Record<P>) -> XdbResult<RowId> {
        let mut record = record.into_json()?;
        require_path(&record.metadata.path)?;
        stamp(&mut record);
        record.validate()?;

        let path = record.metadata.path.clone();
        let xid = record.xid.clone();
        let row = ctx
            .run("upsert", self.config.default_timeout, self.backend.upsert(record))
            .await?;
        debug!(path = %path, xid = %xid, row = %row, "upsert");
        Ok(row)
    }

    /// Returns the current record at `(xid, path)`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no live record.
    pub async fn get_by_xid(&self, ctx: &Context, path: &str, xid: &Xid) -> XdbResult<Record> {
        require_key(path, xid)?;
        let found = ctx
            .run("get", self.config.default_timeout, self.backend.find_by_xid(path, xid))
            .await?;
        debug!(path, xid = %xid, found = found.is_some(), "get");
        found
            .map(|stored| stored.record)
            .ok_or_else(|| XdbError::not_found(xid.as_str(), path))
    }

    /// Like [`get_by_xid`](Self::get_by_xid), reading the payload as `P`.
    ///
    /// # Errors
    ///
    /// Also returns `InvalidArgument` if the payload does not have the shape
    /// of `P`.
    pub async fn get_typed<P: DeserializeOwned>(
        &self,
        ctx: &Context,
        path: &str,
        xid: &Xid,
    ) -> XdbResult<Record<P>> {
        self.get_by_xid(ctx, path, xid).await?.with_payload_type()
    }

    /// Replaces the current record at `(xid, path)` wholesale.
    ///
    /// The record is re-keyed to `(xid, path)` before it is written. An unset
    /// `cardId` keeps the stored value, and `createdAt` never moves below the
    /// stored one, so the written record stays current.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no live record.
    pub async fn update_replace<P: Serialize>(
        &self,
        ctx: &Context,
        path: &str,
        xid: &Xid,
        record: Record<P>,
    ) -> XdbResult<()> {
        require_key(path, xid)?;
        let mut record = record.into_json()?;
        record.xid = xid.clone();
        record.metadata.path = path.to_string();
        record.validate()?;

        let row = ctx
            .run(
                "update_replace",
                self.config.default_timeout,
                self.backend.replace(path, xid, record),
            )
            .await?;
        debug!(path, xid = %xid, row = %row, "update_replace");
        Ok(())
    }

    /// Merges `update` onto the current record at `(xid, path)`.
    ///
    /// An empty update does nothing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a path outside the updatable fields or
    /// one that would change the record's identity, and `NotFound` if there
    /// is no live record.
    pub async fn update_fields(
        &self,
        ctx: &Context,
        path: &str,
        xid: &Xid,
        update: &FieldUpdate,
    ) -> XdbResult<()> {
        require_key(path, xid)?;
        if update.is_empty() {
            debug!(path, xid = %xid, "update_fields: nothing to apply");
            return Ok(());
        }
        update.validate()?;

        let row = ctx
            .run(
                "update_fields",
                self.config.default_timeout,
                self.backend.update_fields(path, xid, update),
            )
            .await?;
        debug!(path, xid = %xid, row = %row, fields = update.len(), "update_fields");
        Ok(())
    }

    /// Tags the record at `(xid, path)` as deleted. Reads, listings, and
    /// counts treat it as absent from then on.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no live record.
    pub async fn delete_soft(&self, ctx: &Context, path: &str, xid: &Xid) -> XdbResult<()> {
        require_key(path, xid)?;
        let tagged = ctx
            .run(
                "delete_soft",
                self.config.default_timeout,
                self.backend.delete_soft(path, xid, now_millis()),
            )
            .await?;
        debug!(path, xid = %xid, tagged, "delete_soft");
        Ok(())
    }

    /// Physically removes every version at `(xid, path)`, soft-deleted ones
    /// included.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing is stored at the key.
    pub async fn delete_hard(&self, ctx: &Context, path: &str, xid: &Xid) -> XdbResult<()> {
        require_key(path, xid)?;
        let removed = ctx
            .run(
                "delete_hard",
                self.config.default_timeout,
                self.backend.delete_hard(path, xid),
            )
            .await?;
        debug!(path, xid = %xid, removed, "delete_hard");
        Ok(())
    }

    /// Returns true if a live record exists at `(xid, path)`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty path or identity.
    pub async fn exists(&self, ctx: &Context, path: &str, xid: &Xid) -> XdbResult<bool> {
        require_key(path, xid)?;
        let exists = ctx
            .run("exists", self.config.default_timeout, self.backend.exists(path, xid))
            .await?;
        debug!(path, xid = %xid, exists, "exists");
        Ok(exists)
    }

    /// Lists one page of current records, one per identity.
    ///
    /// # Errors
    ///
    /// Returns `NotImplemented` if the backend cannot list.
    pub async fn list(&self, ctx: &Context, query: &Query) -> XdbResult<Page> {
        self.engine("list")?.list(ctx, query).await
    }

    /// Counts distinct live identities matching `query`'s filters.
    ///
    /// # Errors
    ///
    /// Returns `NotImplemented` if the backend cannot count.
    pub async fn count(&self, ctx: &Context, query: &Query) -> XdbResult<u64> {
        self.engine("count")?.count(ctx, query).await
    }

    fn engine(&self, capability: &'static str) -> XdbResult<&QueryEngine> {
        self.engine
            .as_ref()
            .ok_or(XdbError::NotImplemented { capability })
    }
}

fn stamp(record: &mut Record) {
    if record.metadata.created_at == 0 {
        record.metadata.created_at = now_millis();
    }
    if record.metadata.card_id.is_none() {
        record.metadata.card_id = Some(new_card_id());
    }
}

fn require_path(path: &str) -> XdbResult<()> {
    if path.trim().is_empty() {
        return Err(XdbError::invalid_argument("path must not be empty"));
    }
    Ok(())
}

fn require_key(path: &str, xid: &Xid) -> XdbResult<()> {
    require_path(path)?;
    if xid.as_str().trim().is_empty() {
        return Err(XdbError::invalid_argument("xid must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::log::LogBackend;
    use crate::record::{Info, Metadata, Operation};
    use serde_json::json;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn store() -> RecordStore {
        RecordStore::with_query_support(Arc::new(LogBackend::in_memory()))
    }

    fn record(id: &str, created_at: i64) -> Record {
        Record::new(
            Info::new(id, "username"),
            Metadata::new(Operation::Create, "/ignored", "application/json")
                .with_created_at(created_at),
            json!({ "at": created_at }),
        )
    }

    #[tokio::test]
    async fn create_sets_path_and_stamps() {
        let store = store();
        let ctx = Context::new();
        let mut r = record("alice", 0);
        r.metadata.card_id = None;
        let xid = r.xid.clone();
        store.create(&ctx, "/info/x", r, None).await.unwrap();

        let got = store.get_by_xid(&ctx, "/info/x", &xid).await.unwrap();
        assert_eq!(got.metadata.path, "/info/x");
        assert!(got.metadata.created_at > 0);
        assert!(got.metadata.card_id.is_some());
        let err = store.get_by_xid(&ctx, "/ignored", &xid).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn empty_path_is_invalid() {
        let store = store();
        let ctx = Context::new();
        let err = store.create(&ctx, "", record("a", 1), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = store.exists(&ctx, " ", &Xid::derive("a")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn idempotent_create_collapses() {
        let store = store();
        let ctx = Context::new();
        let first = store.create(&ctx, "/p", record("a", 1), Some("k")).await.unwrap();
        let second = store.create(&ctx, "/p", record("a", 2), Some("k")).await.unwrap();
        assert!(first.is_inserted());
        assert_eq!(second, InsertOutcome::Existing(first.row()));
        assert_eq!(store.count(&ctx, &Query::new("/p")).await.unwrap(), 1);
        let got = store.get_by_xid(&ctx, "/p", &Xid::derive("a")).await.unwrap();
        assert_eq!(got.metadata.created_at, 1);
    }

    #[tokio::test]
    async fn idempotency_can_be_disabled() {
        let store = store().with_config(StoreConfig::new().enable_idempotency(false));
        let ctx = Context::new();
        store.create(&ctx, "/p", record("a", 1), Some("k")).await.unwrap();
        let second = store.create(&ctx, "/p", record("a", 2), Some("k")).await.unwrap();
        assert!(second.is_inserted());
    }

    #[tokio::test]
    async fn latest_wins_and_tie_breaks_on_insertion() {
        let store = store();
        let ctx = Context::new();
        let xid = Xid::derive("a");
        store.create(&ctx, "/p", record("a", 200), None).await.unwrap();
        store.create(&ctx, "/p", record("a", 100), None).await.unwrap();
        assert_eq!(store.get_by_xid(&ctx, "/p", &xid).await.unwrap().metadata.created_at, 200);

        let mut tie = record("a", 200);
        tie.payload = json!("second");
        store.create(&ctx, "/p", tie, None).await.unwrap();
        assert_eq!(store.get_by_xid(&ctx, "/p", &xid).await.unwrap().payload, json!("second"));
    }

    #[tokio::test]
    async fn upsert_replaces_then_soft_delete_hides() {
        let store = store();
        let ctx = Context::new();
        let mut r = record("a", 5);
        r.metadata.path = "/p".into();
        let xid = r.xid.clone();
        let row = store.upsert(&ctx, r.clone()).await.unwrap();
        r.payload = json!("v2");
        assert_eq!(store.upsert(&ctx, r).await.unwrap(), row);
        assert_eq!(store.get_by_xid(&ctx, "/p", &xid).await.unwrap().payload, json!("v2"));

        store.delete_soft(&ctx, "/p", &xid).await.unwrap();
        assert!(!store.exists(&ctx, "/p", &xid).await.unwrap());
        assert_eq!(store.count(&ctx, &Query::new("/p")).await.unwrap(), 0);
        assert!(store.list(&ctx, &Query::new("/p")).await.unwrap().records.is_empty());
        store.delete_hard(&ctx, "/p", &xid).await.unwrap();
    }

    #[tokio::test]
    async fn update_replace_rekeys_record() {
        let store = store();
        let ctx = Context::new();
        let xid = Xid::derive("a");
        store.create(&ctx, "/p", record("a", 5), None).await.unwrap();

        let mut replacement = record("someone-else", 0);
        replacement.payload = json!({"replaced": true});
        store.update_replace(&ctx, "/p", &xid, replacement).await.unwrap();

        let got = store.get_by_xid(&ctx, "/p", &xid).await.unwrap();
        assert_eq!(got.xid, xid);
        assert_eq!(got.payload, json!({"replaced": true}));
        assert_eq!(got.metadata.created_at, 5);
    }

    #[tokio::test]
    async fn update_fields_rules() {
        let store = store();
        let ctx = Context::new();
        let xid = Xid::derive("a");

        // Empty update never touches the backend, even for a missing key.
        store.update_fields(&ctx, "/p", &xid, &FieldUpdate::new()).await.unwrap();

        let err = store
            .update_fields(&ctx, "/p", &xid, &FieldUpdate::new().set("payload.x", json!(1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        store.create(&ctx, "/p", record("a", 5), None).await.unwrap();
        let err = store
            .update_fields(&ctx, "/p", &xid, &FieldUpdate::new().set("xid", json!("b")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        store
            .update_fields(&ctx, "/p", &xid, &FieldUpdate::new().set("payload.x", json!(1)))
            .await
            .unwrap();
        let got = store.get_by_xid(&ctx, "/p", &xid).await.unwrap();
        assert_eq!(got.payload, json!({"at": 5, "x": 1}));
    }

    #[tokio::test]
    async fn typed_payload_round_trip() {
        #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
        struct Task {
            title: String,
        }

        let store = store();
        let ctx = Context::new();
        let r = Record::new(
            Info::new("bob", "username"),
            Metadata::new(Operation::Create, "/protocols/task", "application/json"),
            Task { title: "rotate".into() },
        );
        let xid = r.xid.clone();
        store.create(&ctx, "/protocols/task", r, None).await.unwrap();
        let got: Record<Task> = store.get_typed(&ctx, "/protocols/task", &xid).await.unwrap();
        assert_eq!(got.payload.title, "rotate");
    }

    #[tokio::test]
    async fn listing_without_capability_is_not_implemented() {
        let store = RecordStore::new(Arc::new(LogBackend::in_memory()));
        let ctx = Context::new();
        assert!(!store.supports_query());
        let err = store.list(&ctx, &Query::new("/p")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
        let err = store.count(&ctx, &Query::new("/p")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
        store.create(&ctx, "/p", record("a", 1), None).await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_context_writes_nothing() {
        let store = store();
        let token = CancellationToken::new();
        token.cancel();
        let ctx = Context::new().with_cancellation(token);
        let err = store.create(&ctx, "/p", record("a", 1), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);

        let ctx = Context::new().with_timeout(Duration::from_secs(1));
        assert!(!store.exists(&ctx, "/p", &Xid::derive("a")).await.unwrap());
    }
}
