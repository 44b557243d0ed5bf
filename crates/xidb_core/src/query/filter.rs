//! Listing requests and the row predicates they compile to.

use crate::types::StoredRecord;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Page size used when the caller asks for zero or fewer rows.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest page a single listing call returns.
pub const MAX_PAGE_SIZE: usize = 100;

/// The field a listing is ordered by.
///
/// Every order uses the row id as the secondary key, so the order is total
/// even when primary values tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortField {
    /// `metadata.createdAt`.
    #[default]
    CreatedAt,
    /// The record `name`.
    Name,
    /// Insertion order alone.
    InsertionOrder,
}

impl SortField {
    /// Parses a caller-supplied sort name.
    ///
    /// Accepts `createdAt`, `name`, and `_id`. Anything else falls back to
    /// the default, `createdAt`.
    #[must_use]
    pub fn parse_lenient(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreatedAt => "createdAt",
            Self::Name => "name",
            Self::InsertionOrder => "_id",
        }
    }

    /// Returns the primary sort value of `row` under this field.
    #[must_use]
    pub fn value_of(self, row: &StoredRecord) -> SortValue {
        match self {
            Self::CreatedAt => SortValue::Int(row.record.metadata.created_at),
            Self::Name => SortValue::Text(row.record.name.clone()),
            Self::InsertionOrder => SortValue::None,
        }
    }

    /// Compares two rows by `(primary, row id)` ascending.
    #[must_use]
    pub fn compare(self, a: &StoredRecord, b: &StoredRecord) -> Ordering {
        let primary = match self {
            Self::CreatedAt => a
                .record
                .metadata
                .created_at
                .cmp(&b.record.metadata.created_at),
            Self::Name => a.record.name.cmp(&b.record.name),
            Self::InsertionOrder => Ordering::Equal,
        };
        primary.then(a.row.cmp(&b.row))
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = UnknownSortField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createdAt" | "metadata.createdAt" => Ok(Self::CreatedAt),
            "name" => Ok(Self::Name),
            "_id" => Ok(Self::InsertionOrder),
            other => Err(UnknownSortField(other.to_string())),
        }
    }
}

/// A sort name outside the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSortField(pub String);

impl fmt::Display for UnknownSortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown sort field: {}", self.0)
    }
}

impl std::error::Error for UnknownSortField {}

/// A primary sort value, as carried by a cursor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum SortValue {
    /// Ordering by insertion order alone carries no primary value.
    None,
    /// An integer field.
    Int(i64),
    /// A string field.
    Text(String),
}

/// A listing or counting request over one path.
///
/// Filters combine with AND. Unset filters match everything.
///
/// # Example
///
/// ```rust
/// use xidb_core::{Query, SortField};
///
/// let query = Query::new("/info/x")
///     .with_tag("admin")
///     .sort_by(SortField::Name)
///     .ascending()
///     .page_size(50);
/// assert_eq!(query.effective_page_size(), 50);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Path to list. Empty lists every path.
    pub path: String,
    /// Exact match on `name`.
    pub name_equals: Option<String>,
    /// Prefix match on `name`.
    pub name_prefix: Option<String>,
    /// Tags every matching record must carry in `info.tags`.
    pub tags_all: Vec<String>,
    /// Inclusive lower bound on `metadata.createdAt`.
    pub created_at_gte: Option<i64>,
    /// Exclusive upper bound on `metadata.createdAt`.
    pub created_at_lt: Option<i64>,
    /// Equality on extra metadata attributes. Dotted keys descend into
    /// nested values.
    pub attributes_eq: BTreeMap<String, Value>,
    /// Primary sort field.
    pub sort_by: SortField,
    /// Ascending when true, descending otherwise.
    pub sort_asc: bool,
    /// Requested page size; clamped by [`Query::effective_page_size`].
    pub page_size: i64,
    /// Continuation token from a previous page.
    pub after_cursor: Option<String>,
    /// Fields to keep in each returned record.
    pub projection: Vec<String>,
}

impl Query {
    /// Creates a query over `path` with default ordering (newest first).
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Requires `name == value`.
    #[must_use]
    pub fn name_equals(mut self, value: impl Into<String>) -> Self {
        self.name_equals = Some(value.into());
        self
    }

    /// Requires `name` to start with `prefix`.
    #[must_use]
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    /// Requires `tag` in `info.tags`.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags_all.push(tag.into());
        self
    }

    /// Restricts `createdAt` to `[from, until)`.
    #[must_use]
    pub fn created_between(mut self, from: Option<i64>, until: Option<i64>) -> Self {
        self.created_at_gte = from;
        self.created_at_lt = until;
        self
    }

    /// Requires extra attribute `key` to equal `value`.
    #[must_use]
    pub fn attribute_eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes_eq.insert(key.into(), value.into());
        self
    }

    /// Sets the primary sort field.
    #[must_use]
    pub fn sort_by(mut self, field: SortField) -> Self {
        self.sort_by = field;
        self
    }

    /// Sorts ascending.
    #[must_use]
    pub fn ascending(mut self) -> Self {
        self.sort_asc = true;
        self
    }

    /// Sorts descending.
    #[must_use]
    pub fn descending(mut self) -> Self {
        self.sort_asc = false;
        self
    }

    /// Sets the requested page size.
    #[must_use]
    pub fn page_size(mut self, size: i64) -> Self {
        self.page_size = size;
        self
    }

    /// Continues after `cursor`.
    #[must_use]
    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after_cursor = Some(cursor.into());
        self
    }

    /// Keeps only `fields` in returned records.
    #[must_use]
    pub fn project(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.projection = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the page size actually served: 20 for zero or negative
    /// requests, at most 100.
    #[must_use]
    pub fn effective_page_size(&self) -> usize {
        match usize::try_from(self.page_size) {
            Ok(0) | Err(_) => DEFAULT_PAGE_SIZE,
            Ok(n) => n.min(MAX_PAGE_SIZE),
        }
    }

    /// Returns true if `row` is live and passes every filter.
    #[must_use]
    pub fn matches(&self, row: &StoredRecord) -> bool {
        if !row.is_live() {
            return false;
        }
        let record = &row.record;
        if !self.path.is_empty() && record.metadata.path != self.path {
            return false;
        }
        if let Some(name) = &self.name_equals {
            if &record.name != name {
                return false;
            }
        }
        if let Some(prefix) = &self.name_prefix {
            if !record.name.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if !self.tags_all.is_empty() {
            let Some(info) = &record.info else {
                return false;
            };
            if !self.tags_all.iter().all(|t| info.tags.contains(t)) {
                return false;
            }
        }
        let created_at = record.metadata.created_at;
        if self.created_at_gte.is_some_and(|from| created_at < from) {
            return false;
        }
        if self.created_at_lt.is_some_and(|until| created_at >= until) {
            return false;
        }
        self.attributes_eq
            .iter()
            .all(|(key, expected)| attribute(&record.metadata.extra, key) == Some(expected))
    }
}

fn attribute<'a>(extra: &'a BTreeMap<String, Value>, key: &str) -> Option<&'a Value> {
    let mut segments = key.split('.');
    let first = extra.get(segments.next()?)?;
    segments.try_fold(first, |value, segment| value.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Info, Metadata, Operation, Record};
    use crate::types::RowId;
    use serde_json::json;

    fn row(row: u64, name: &str, created_at: i64) -> StoredRecord {
        let record = Record {
            name: name.to_string(),
            ..Record::new(
                Info::new("alice", "username").with_tag("admin").with_tag("ops"),
                Metadata::new(Operation::Create, "/info/x", "application/json")
                    .with_created_at(created_at)
                    .with_extra("team", json!("sec"))
                    .with_extra("owner", json!({"region": "eu"})),
                json!({}),
            )
        };
        StoredRecord {
            row: RowId::new(row),
            record,
            deleted_at: None,
            idempotency_key: None,
        }
    }

    #[test]
    fn page_size_guardrail() {
        assert_eq!(Query::new("/p").page_size(0).effective_page_size(), 20);
        assert_eq!(Query::new("/p").page_size(-5).effective_page_size(), 20);
        assert_eq!(Query::new("/p").page_size(500).effective_page_size(), 100);
        assert_eq!(Query::new("/p").page_size(1).effective_page_size(), 1);
    }

    #[test]
    fn unknown_sort_falls_back_to_created_at() {
        assert_eq!(SortField::parse_lenient("name"), SortField::Name);
        assert_eq!(SortField::parse_lenient("_id"), SortField::InsertionOrder);
        assert_eq!(SortField::parse_lenient("payload.size"), SortField::CreatedAt);
        assert!("payload.size".parse::<SortField>().is_err());
    }

    #[test]
    fn filters_combine() {
        let r = row(1, "xid-protocol", 100);
        assert!(Query::new("/info/x").matches(&r));
        assert!(Query::new("").matches(&r));
        assert!(!Query::new("/info/y").matches(&r));
        assert!(Query::new("/info/x").name_prefix("xid-").matches(&r));
        assert!(!Query::new("/info/x").name_equals("other").matches(&r));
        assert!(Query::new("/info/x").with_tag("admin").with_tag("ops").matches(&r));
        assert!(!Query::new("/info/x").with_tag("admin").with_tag("dev").matches(&r));
    }

    #[test]
    fn created_at_range_is_half_open() {
        let r = row(1, "n", 100);
        assert!(Query::new("/info/x").created_between(Some(100), Some(101)).matches(&r));
        assert!(!Query::new("/info/x").created_between(None, Some(100)).matches(&r));
        assert!(!Query::new("/info/x").created_between(Some(101), None).matches(&r));
    }

    #[test]
    fn attribute_equality_descends_dotted_keys() {
        let r = row(1, "n", 1);
        assert!(Query::new("/info/x").attribute_eq("team", "sec").matches(&r));
        assert!(Query::new("/info/x").attribute_eq("owner.region", "eu").matches(&r));
        assert!(!Query::new("/info/x").attribute_eq("team", "ops").matches(&r));
        assert!(!Query::new("/info/x").attribute_eq("missing", "x").matches(&r));
    }

    #[test]
    fn tombstoned_rows_never_match() {
        let mut r = row(1, "n", 1);
        r.deleted_at = Some(5);
        assert!(!Query::new("/info/x").matches(&r));
    }

    #[test]
    fn ties_break_on_row_id() {
        let a = row(1, "n", 100);
        let b = row(2, "n", 100);
        assert_eq!(SortField::CreatedAt.compare(&a, &b), Ordering::Less);
        assert_eq!(SortField::Name.compare(&b, &a), Ordering::Greater);
        let c = row(0, "m", 500);
        assert_eq!(SortField::Name.compare(&c, &a), Ordering::Less);
        assert_eq!(SortField::InsertionOrder.compare(&c, &a), Ordering::Less);
    }
}
