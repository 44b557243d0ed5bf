//! Dotted field paths over the JSON form of a record.
//!
//! [`FieldUpdate`] merges named fields onto a stored record; [`project`]
//! strips a listed record down to the requested fields. Both address fields
//! by dotted paths such as `payload.status` or `metadata.extra.team`.
//!
//! Extra metadata attributes serialize flattened into `metadata`, so the
//! `metadata.extra.<key>` spelling is rewritten to `metadata.<key>` before a
//! path is applied. Keys naming a typed metadata field are rejected there.

use crate::error::{XdbError, XdbResult};
use crate::record::{Record, RESERVED_METADATA_KEYS};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Roots a field update may write under.
const UPDATABLE_ROOTS: [&str; 5] = ["name", "info", "version", "metadata", "payload"];

/// Roots a projection may select. `xid` and `metadata` are always kept.
const PROJECTABLE_ROOTS: [&str; 4] = ["name", "version", "info", "payload"];

/// A set of dotted-path assignments to merge onto a record.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use xidb_core::FieldUpdate;
///
/// let update = FieldUpdate::new()
///     .set("payload.status", json!("closed"))
///     .set("metadata.extra.team", json!("sec"));
/// assert_eq!(update.len(), 2);
/// assert!(update.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUpdate {
    fields: BTreeMap<String, Value>,
}

impl FieldUpdate {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `value` to the field at `path`.
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: Value) -> Self {
        self.fields.insert(path.into(), value);
        self
    }

    /// Returns true if there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the number of assignments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Iterates over `(path, value)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Checks every path against the updatable roots.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty segment, a root outside
    /// `name`, `info`, `version`, `metadata`, `payload`, or a path that would
    /// change the record's identity (`xid`, `metadata.path`).
    pub fn validate(&self) -> XdbResult<()> {
        for (path, value) in &self.fields {
            for (segments, _) in expand(path, value)? {
                check_updatable(path, &segments)?;
            }
        }
        Ok(())
    }

    /// Returns `record` with every assignment merged in.
    ///
    /// The input is not modified; on error nothing has been applied.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a path is rejected, descends through a
    /// non-object value, or the merged document is no longer a valid record.
    pub fn apply(&self, record: &Record) -> XdbResult<Record> {
        let mut doc = serde_json::to_value(record)
            .map_err(|e| XdbError::codec(format!("record to json: {e}")))?;

        for (path, value) in &self.fields {
            for (segments, leaf) in expand(path, value)? {
                check_updatable(path, &segments)?;
                assign(&mut doc, &segments, leaf, path)?;
            }
        }

        let merged: Record = serde_json::from_value(doc).map_err(|e| {
            XdbError::invalid_argument(format!("field update leaves an invalid record: {e}"))
        })?;
        if merged.xid != record.xid || merged.metadata.path != record.metadata.path {
            return Err(XdbError::invalid_argument(
                "field update may not change xid or metadata.path",
            ));
        }
        merged.validate()?;
        Ok(merged)
    }
}

impl From<BTreeMap<String, Value>> for FieldUpdate {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl FromIterator<(String, Value)> for FieldUpdate {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Splits `path` into segments, rewriting the `metadata.extra` spelling.
///
/// A bare `metadata.extra` holding an object expands into one assignment per
/// key.
fn expand(path: &str, value: &Value) -> XdbResult<Vec<(Vec<String>, Value)>> {
    let segments = split(path)?;
    if segments.len() >= 2 && segments[0] == "metadata" && segments[1] == "extra" {
        if segments.len() > 2 {
            check_extra_key(path, &segments[2])?;
            let mut rewritten = vec!["metadata".to_string()];
            rewritten.extend(segments[2..].iter().cloned());
            return Ok(vec![(rewritten, value.clone())]);
        }
        let Value::Object(map) = value else {
            return Err(XdbError::invalid_argument(format!(
                "{path} must be assigned an object"
            )));
        };
        return map
            .iter()
            .map(|(k, v)| {
                check_extra_key(path, k)?;
                Ok((vec!["metadata".to_string(), k.clone()], v.clone()))
            })
            .collect();
    }
    Ok(vec![(segments, value.clone())])
}

/// Extra attributes may not reuse the name of a typed metadata field.
fn check_extra_key(path: &str, key: &str) -> XdbResult<()> {
    if RESERVED_METADATA_KEYS.contains(&key) {
        return Err(XdbError::invalid_argument(format!(
            "{path}: extra attribute {key} would overwrite metadata.{key}"
        )));
    }
    Ok(())
}

fn split(path: &str) -> XdbResult<Vec<String>> {
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return Err(XdbError::invalid_argument(format!(
            "malformed field path: {path:?}"
        )));
    }
    Ok(segments)
}

fn check_updatable(path: &str, segments: &[String]) -> XdbResult<()> {
    let root = segments[0].as_str();
    if root == "xid" {
        return Err(XdbError::invalid_argument("field update may not change xid"));
    }
    if !UPDATABLE_ROOTS.contains(&root) {
        return Err(XdbError::invalid_argument(format!(
            "field {path} is outside the updatable roots"
        )));
    }
    if root == "metadata" {
        match segments.get(1).map(String::as_str) {
            None => {
                return Err(XdbError::invalid_argument(
                    "metadata may only be updated field by field",
                ))
            }
            Some("path") => {
                return Err(XdbError::invalid_argument(
                    "field update may not change metadata.path",
                ))
            }
            Some(key) if segments.len() > 2 && RESERVED_METADATA_KEYS.contains(&key) && key != "encryption" => {
                return Err(XdbError::invalid_argument(format!(
                    "metadata.{key} has no sub-fields"
                )))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Sets `doc[segments...] = value`, creating missing objects on the way.
fn assign(doc: &mut Value, segments: &[String], value: Value, path: &str) -> XdbResult<()> {
    let Some((last, parents)) = segments.split_last() else {
        return Ok(());
    };
    let mut cursor = doc;
    for segment in parents {
        if cursor.is_null() {
            *cursor = Value::Object(Map::new());
        }
        let Value::Object(map) = cursor else {
            return Err(XdbError::invalid_argument(format!(
                "field {path} descends through a non-object at {segment}"
            )));
        };
        cursor = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if cursor.is_null() {
        *cursor = Value::Object(Map::new());
    }
    let Value::Object(map) = cursor else {
        return Err(XdbError::invalid_argument(format!(
            "field {path} descends through a non-object"
        )));
    };
    map.insert(last.clone(), value);
    Ok(())
}

/// Returns a copy of `record` holding only `xid`, `metadata`, and the listed
/// fields of `name`, `version`, `info`, and `payload`.
///
/// Paths under other roots are ignored. An empty list returns the record
/// unchanged.
///
/// # Errors
///
/// Returns a codec error if the record does not convert to JSON.
pub fn project(record: &Record, fields: &[String]) -> XdbResult<Record> {
    if fields.is_empty() {
        return Ok(record.clone());
    }

    let doc = serde_json::to_value(record)
        .map_err(|e| XdbError::codec(format!("record to json: {e}")))?;
    let mut out = Map::new();
    for key in ["xid", "metadata"] {
        if let Some(value) = doc.get(key) {
            out.insert(key.to_string(), value.clone());
        }
    }

    let mut projected = Value::Object(out);
    for path in fields {
        let Ok(segments) = split(path) else {
            continue;
        };
        if !PROJECTABLE_ROOTS.contains(&segments[0].as_str()) {
            continue;
        }
        if let Some(value) = lookup(&doc, &segments) {
            assign(&mut projected, &segments, value.clone(), path)?;
        }
    }
    if let Value::Object(map) = &mut projected {
        map.entry("payload").or_insert(Value::Null);
    }

    serde_json::from_value(projected).map_err(|e| XdbError::codec(format!("projection: {e}")))
}

fn lookup<'a>(doc: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(doc, |value, segment| value.get(segment.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::record::{Info, Metadata, Operation};
    use serde_json::json;

    fn record() -> Record {
        Record::new(
            Info::new("alice@example.com", "email").with_tag("admin"),
            Metadata::new(Operation::Create, "/info/x", "application/json")
                .with_extra("team", json!("infra")),
            json!({"status": "open", "owner": {"name": "alice"}}),
        )
    }

    #[test]
    fn sets_nested_payload_field() {
        let update = FieldUpdate::new()
            .set("payload.status", json!("closed"))
            .set("payload.owner.email", json!("a@x"));
        let merged = update.apply(&record()).unwrap();
        assert_eq!(merged.payload["status"], "closed");
        assert_eq!(merged.payload["owner"]["name"], "alice");
        assert_eq!(merged.payload["owner"]["email"], "a@x");
    }

    #[test]
    fn metadata_extra_spelling_targets_extra_map() {
        let merged = FieldUpdate::new()
            .set("metadata.extra.team", json!("sec"))
            .set("metadata.region", json!("eu"))
            .apply(&record())
            .unwrap();
        assert_eq!(merged.metadata.extra.get("team"), Some(&json!("sec")));
        assert_eq!(merged.metadata.extra.get("region"), Some(&json!("eu")));
    }

    #[test]
    fn bare_metadata_extra_object_merges_keys() {
        let merged = FieldUpdate::new()
            .set("metadata.extra", json!({"a": 1, "b": 2}))
            .apply(&record())
            .unwrap();
        assert_eq!(merged.metadata.extra.get("a"), Some(&json!(1)));
        assert_eq!(merged.metadata.extra.get("team"), Some(&json!("infra")));
    }

    #[test]
    fn identity_paths_are_rejected() {
        for path in ["xid", "metadata.path", "metadata.extra.path", "deletedAt", "metadata"] {
            let err = FieldUpdate::new().set(path, json!("x")).validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{path}");
        }
    }

    #[test]
    fn extra_attributes_cannot_shadow_typed_fields() {
        for key in RESERVED_METADATA_KEYS {
            let update = FieldUpdate::new().set(format!("metadata.extra.{key}"), json!(10));
            let err = update.apply(&record()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{key}");
            assert_eq!(update.validate().unwrap_err().kind(), ErrorKind::InvalidArgument);
        }
        let bare = FieldUpdate::new().set("metadata.extra", json!({"team": "x", "createdAt": 1}));
        assert_eq!(bare.apply(&record()).unwrap_err().kind(), ErrorKind::InvalidArgument);

        // The typed field itself stays writable.
        let direct = FieldUpdate::new().set("metadata.createdAt", json!(10));
        assert_eq!(direct.apply(&record()).unwrap().metadata.created_at, 10);
    }

    #[test]
    fn malformed_path_is_rejected() {
        let err = FieldUpdate::new().set("payload..x", json!(1)).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn undecodable_result_is_rejected() {
        let err = FieldUpdate::new()
            .set("metadata.createdAt", json!("yesterday"))
            .apply(&record())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn descending_through_scalar_is_rejected() {
        let err = FieldUpdate::new()
            .set("payload.status.code", json!(1))
            .apply(&record())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn projection_keeps_identity_and_listed_fields() {
        let fields = vec!["payload.status".to_string(), "info.tags".to_string()];
        let projected = project(&record(), &fields).unwrap();
        assert_eq!(projected.xid, record().xid);
        assert_eq!(projected.metadata.path, "/info/x");
        assert_eq!(projected.payload, json!({"status": "open"}));
        let info = projected.info.unwrap();
        assert_eq!(info.tags, vec!["admin".to_string()]);
        assert!(info.id.is_empty());
        assert!(projected.name.is_empty());
    }

    #[test]
    fn projection_without_payload_yields_null() {
        let projected = project(&record(), &["name".to_string()]).unwrap();
        assert_eq!(projected.name, "xid-protocol");
        assert_eq!(projected.payload, Value::Null);
        assert!(projected.info.is_none());
    }

    #[test]
    fn empty_projection_is_identity() {
        let record = record();
        assert_eq!(project(&record, &[]).unwrap(), record);
    }
}
