//! Latest-per-identity listing.
//!
//! The algorithm, for backends that evaluate it in process:
//!
//! 1. keep live rows that pass every filter
//! 2. group by `xid` and keep the row with the greatest `(createdAt, row id)`
//! 3. sort the survivors by `(sort field, row id)` in the requested direction
//! 4. drop everything up to and including the cursor position
//! 5. take one page; issue a cursor only when the page is full and at least
//!    one more row follows it
//!
//! Filtering happens before grouping, so a filter selects identities whose
//! newest matching row passes, not identities whose newest row passes.

use super::cursor::Cursor;
use super::filter::Query;
use crate::backend::LatestQuery;
use crate::config::StoreConfig;
use crate::context::Context;
use crate::error::XdbResult;
use crate::fields::project;
use crate::record::Record;
use crate::types::StoredRecord;
use crate::xid::Xid;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// The current record of each identity on this page, in listing order.
    pub records: Vec<Record>,
    /// Token for the next page. `None` when nothing follows this page.
    pub next_cursor: Option<String>,
}

impl Page {
    /// Returns the identities on this page in order.
    #[must_use]
    pub fn xids(&self) -> Vec<&Xid> {
        self.records.iter().map(|r| &r.xid).collect()
    }

    /// Returns true if there is no further page.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Steps 1 and 2: the current matching row of each identity.
pub fn latest_per_xid<'a, I>(rows: I, query: &Query) -> Vec<&'a StoredRecord>
where
    I: IntoIterator<Item = &'a StoredRecord>,
{
    let mut latest: HashMap<&'a Xid, &'a StoredRecord> = HashMap::new();
    for row in rows.into_iter().filter(|row| query.matches(row)) {
        latest
            .entry(&row.record.xid)
            .and_modify(|current| {
                if row.recency() > current.recency() {
                    *current = row;
                }
            })
            .or_insert(row);
    }
    latest.into_values().collect()
}

/// Steps 3 to 5 over the output of [`latest_per_xid`].
///
/// # Errors
///
/// Returns a codec error if projecting a record or encoding the next
/// cursor fails.
pub fn paginate(mut latest: Vec<&StoredRecord>, query: &Query) -> XdbResult<Page> {
    let sort = query.sort_by;
    latest.sort_by(|a, b| {
        let ordering = sort.compare(a, b);
        if query.sort_asc {
            ordering
        } else {
            ordering.reverse()
        }
    });

    let cursor = resume_position(query);
    let page_size = query.effective_page_size();
    let mut page: Vec<&StoredRecord> = latest
        .into_iter()
        .filter(|row| cursor.as_ref().map_or(true, |c| c.admits(sort, row)))
        .take(page_size + 1)
        .collect();

    let has_more = page.len() > page_size;
    page.truncate(page_size);
    let next_cursor = match page.last() {
        Some(last) if has_more => Some(Cursor::after_row(query, last).encode()?),
        _ => None,
    };
    let records = page
        .into_iter()
        .map(|row| project(&row.record, &query.projection))
        .collect::<XdbResult<Vec<_>>>()?;

    Ok(Page {
        records,
        next_cursor,
    })
}

/// Counts the distinct identities with a live row matching `query`.
pub fn count_distinct<'a, I>(rows: I, query: &Query) -> u64
where
    I: IntoIterator<Item = &'a StoredRecord>,
{
    let xids: HashSet<&Xid> = rows
        .into_iter()
        .filter(|row| query.matches(row))
        .map(|row| &row.record.xid)
        .collect();
    xids.len() as u64
}

/// Decodes the query's cursor. An unusable cursor restarts the listing.
fn resume_position(query: &Query) -> Option<Cursor> {
    let token = query.after_cursor.as_deref().filter(|t| !t.is_empty())?;
    match Cursor::decode(token, query) {
        Ok(cursor) => Some(cursor),
        Err(error) => {
            warn!(path = %query.path, %error, "discarding cursor, listing from the first page");
            None
        }
    }
}

/// Runs listing and counting against a backend with the grouped-query
/// capability, under the caller's context.
#[derive(Clone)]
pub struct QueryEngine {
    backend: Arc<dyn LatestQuery>,
    config: StoreConfig,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QueryEngine {
    /// Creates an engine over `backend`.
    pub fn new(backend: Arc<dyn LatestQuery>, config: StoreConfig) -> Self {
        Self { backend, config }
    }

    /// Lists one page of current records, one per identity.
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` on timeout or cancellation, or whatever the
    /// backend reports.
    pub async fn list(&self, ctx: &Context, query: &Query) -> XdbResult<Page> {
        let page = ctx
            .run("list", self.config.default_timeout, self.backend.list_latest(query))
            .await?;
        debug!(
            path = %query.path,
            sort = %query.sort_by,
            asc = query.sort_asc,
            returned = page.records.len(),
            more = page.next_cursor.is_some(),
            "list"
        );
        Ok(page)
    }

    /// Counts distinct live identities matching the filters.
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` on timeout or cancellation, or whatever the
    /// backend reports.
    pub async fn count(&self, ctx: &Context, query: &Query) -> XdbResult<u64> {
        let total = ctx
            .run("count", self.config.default_timeout, self.backend.count_latest(query))
            .await?;
        debug!(path = %query.path, total, "count");
        Ok(total)
    }
}
