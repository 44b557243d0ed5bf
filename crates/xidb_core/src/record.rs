//! The record data model.
//!
//! A [`Record`] is one versioned document stored under `(xid, path)`. Field
//! names below are the wire contract; they serialize in camelCase exactly as
//! collaborators exchange them.
//!
//! [`Metadata`] types its known fields directly and routes every other key
//! into [`Metadata::extra`]. Serialization writes the known fields first and
//! then merges the extra attributes alongside them; deserialization sends any
//! unknown key back into `extra`.

use crate::error::{XdbError, XdbResult};
use crate::types::{new_card_id, now_millis};
use crate::xid::Xid;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The `name` tag of every record minted by this protocol, and the seed of
/// the identity namespace.
pub const PROTOCOL_NAME: &str = "xid-protocol";

/// The record format version written by [`Record::new`].
pub const PROTOCOL_VERSION: &str = "0.1.5";

/// Metadata keys owned by the typed fields. Extra attributes may not reuse them.
pub const RESERVED_METADATA_KEYS: [&str; 6] = [
    "createdAt",
    "operation",
    "cardId",
    "path",
    "contentType",
    "encryption",
];

/// What the producer was doing when it wrote a record.
///
/// Descriptive only: the store records it but never checks it against the
/// operation actually performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// A new identity or record.
    #[default]
    Create,
    /// A new version of existing state.
    Update,
    /// The subject was removed upstream.
    Delete,
    /// Written by an initial import.
    Init,
    /// A partial change.
    Modify,
}

impl Operation {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Init => "init",
            Self::Modify => "modify",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = XdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "init" => Ok(Self::Init),
            "modify" => Ok(Self::Modify),
            other => Err(XdbError::invalid_argument(format!(
                "unknown operation: {other}"
            ))),
        }
    }
}

/// Describes the subject an identity was derived from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Info {
    /// The plaintext identity (email, username, resource id).
    #[serde(default)]
    pub id: String,
    /// The kind of identity, e.g. `email` or `aws_instance`.
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Free-form labels, matched by tag-containment filters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Free-form attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl Info {
    /// Creates an info block.
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            tags: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Encryption descriptor. Reserved: stored and echoed, never acted on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Encryption {
    /// Algorithm name.
    pub algorithm: String,
    /// Whether the payload is encrypted.
    #[serde(default)]
    pub encryption_payload: bool,
    /// Whether the identity is encrypted.
    #[serde(default, rename = "encryptionID", skip_serializing_if = "is_false")]
    pub encryption_id: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// The envelope every record carries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Epoch milliseconds. Zero means "not set"; the store fills it in.
    #[serde(default)]
    pub created_at: i64,
    /// What the producer was doing.
    #[serde(default)]
    pub operation: Operation,
    /// Per-record random identifier. The store assigns one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,
    /// The logical partition the record belongs to.
    #[serde(default)]
    pub path: String,
    /// MIME type of the payload.
    #[serde(default)]
    pub content_type: String,
    /// Reserved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<Encryption>,
    /// Every other attribute.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Metadata {
    /// Creates metadata stamped with the current time and a fresh card id.
    pub fn new(
        operation: Operation,
        path: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            created_at: now_millis(),
            operation,
            card_id: Some(new_card_id()),
            path: path.into(),
            content_type: content_type.into(),
            encryption: None,
            extra: BTreeMap::new(),
        }
    }

    /// Sets an extra attribute.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }
}

/// One versioned document stored under `(xid, path)`.
///
/// The payload type defaults to `serde_json::Value`; producers with a fixed
/// payload shape can use their own type and convert at the store boundary
/// with [`Record::into_json`] and [`Record::with_payload_type`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<P = Value> {
    /// The owning system or protocol.
    #[serde(default)]
    pub name: String,
    /// The derived identity. Unique only together with `metadata.path`.
    pub xid: Xid,
    /// The subject the identity was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Info>,
    /// Record format version, bumped by producers.
    #[serde(default)]
    pub version: String,
    /// The envelope.
    pub metadata: Metadata,
    /// Producer-owned content, stored and echoed unchanged.
    pub payload: P,
}

impl<P> Record<P> {
    /// Builds a record for `info`, deriving the identity from `info.id`.
    pub fn new(info: Info, metadata: Metadata, payload: P) -> Self {
        Self {
            name: PROTOCOL_NAME.to_string(),
            xid: Xid::derive(&info.id),
            info: Some(info),
            version: PROTOCOL_VERSION.to_string(),
            metadata,
            payload,
        }
    }

    /// Returns the path the record is stored under.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.metadata.path
    }

    /// Replaces the payload, keeping everything else.
    pub fn map_payload<Q>(self, f: impl FnOnce(P) -> Q) -> Record<Q> {
        Record {
            name: self.name,
            xid: self.xid,
            info: self.info,
            version: self.version,
            metadata: self.metadata,
            payload: f(self.payload),
        }
    }
}

impl<P: Serialize> Record<P> {
    /// Converts a typed payload into the stored JSON form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the payload does not serialize.
    pub fn into_json(self) -> XdbResult<Record<Value>> {
        let Record {
            name,
            xid,
            info,
            version,
            metadata,
            payload,
        } = self;
        let payload = serde_json::to_value(payload)
            .map_err(|e| XdbError::invalid_argument(format!("payload: {e}")))?;
        Ok(Record {
            name,
            xid,
            info,
            version,
            metadata,
            payload,
        })
    }
}

impl Record<Value> {
    /// Reads the stored JSON payload back as `Q`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the payload does not have the shape of `Q`.
    pub fn with_payload_type<Q: DeserializeOwned>(self) -> XdbResult<Record<Q>> {
        let Record {
            name,
            xid,
            info,
            version,
            metadata,
            payload,
        } = self;
        let payload = serde_json::from_value(payload)
            .map_err(|e| XdbError::invalid_argument(format!("payload: {e}")))?;
        Ok(Record {
            name,
            xid,
            info,
            version,
            metadata,
            payload,
        })
    }

    /// Checks the invariants every stored record must satisfy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty identity or path, or an extra
    /// metadata attribute that shadows a typed field.
    pub fn validate(&self) -> XdbResult<()> {
        if self.xid.as_str().trim().is_empty() {
            return Err(XdbError::invalid_argument("record xid is empty"));
        }
        if self.metadata.path.is_empty() {
            return Err(XdbError::invalid_argument("record metadata.path is empty"));
        }
        if let Some(key) = self
            .metadata
            .extra
            .keys()
            .find(|k| RESERVED_METADATA_KEYS.contains(&k.as_str()))
        {
            return Err(XdbError::invalid_argument(format!(
                "metadata extra attribute {key} shadows a typed field"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_record_derives_identity_from_info() {
        let info = Info::new("Alice@Example.com", "email");
        let record = Record::new(info, Metadata::new(Operation::Init, "/info/x", "application/json"), json!({}));
        assert_eq!(record.xid, Xid::derive("alice@example.com"));
        assert_eq!(record.name, PROTOCOL_NAME);
        assert_eq!(record.version, PROTOCOL_VERSION);
        assert!(record.metadata.card_id.is_some());
        assert!(record.metadata.created_at > 0);
    }

    #[test]
    fn metadata_known_fields_first_then_extra() {
        let metadata = Metadata {
            created_at: 10,
            operation: Operation::Update,
            card_id: None,
            path: "/info/x".into(),
            content_type: "application/json".into(),
            encryption: None,
            extra: BTreeMap::from([("team".to_string(), json!("sec"))]),
        };
        let text = serde_json::to_string(&metadata).unwrap();
        assert_eq!(
            text,
            r#"{"createdAt":10,"operation":"update","path":"/info/x","contentType":"application/json","team":"sec"}"#
        );
    }

    #[test]
    fn unknown_metadata_keys_land_in_extra() {
        let metadata: Metadata = serde_json::from_value(json!({
            "createdAt": 5,
            "operation": "init",
            "path": "/protocols/task",
            "contentType": "application/json",
            "region": "eu",
            "shard": 3
        }))
        .unwrap();
        assert_eq!(metadata.operation, Operation::Init);
        assert_eq!(metadata.extra.get("region"), Some(&json!("eu")));
        assert_eq!(metadata.extra.get("shard"), Some(&json!(3)));
        assert_eq!(metadata.extra.len(), 2);
    }

    #[test]
    fn record_wire_names() {
        let record = Record {
            name: PROTOCOL_NAME.into(),
            xid: Xid::parse("abc").unwrap(),
            info: Some(Info::new("a", "email").with_tag("admin")),
            version: PROTOCOL_VERSION.into(),
            metadata: Metadata::default().with_created_at(1),
            payload: json!({"k": 1}),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["info"]["type"], "email");
        assert_eq!(value["info"]["tags"], json!(["admin"]));
        assert_eq!(value["metadata"]["createdAt"], 1);
        assert_eq!(value["payload"]["k"], 1);
    }

    #[test]
    fn typed_payload_round_trips_through_json() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Task {
            title: String,
        }

        let record = Record::new(
            Info::new("bob", "username"),
            Metadata::new(Operation::Create, "/protocols/task", "application/json"),
            Task {
                title: "rotate keys".into(),
            },
        );
        let stored = record.into_json().unwrap();
        assert_eq!(stored.payload, json!({"title": "rotate keys"}));
        let typed: Record<Task> = stored.with_payload_type().unwrap();
        assert_eq!(typed.payload.title, "rotate keys");
    }

    #[test]
    fn validate_rejects_shadowing_extra() {
        let mut record = Record::new(
            Info::new("a", "email"),
            Metadata::new(Operation::Create, "/p", "application/json"),
            json!(null),
        );
        record.validate().unwrap();
        record.metadata.extra.insert("path".into(), json!("/other"));
        assert!(record.validate().is_err());
    }

    #[test]
    fn operation_parses_wire_names() {
        assert_eq!("modify".parse::<Operation>().unwrap(), Operation::Modify);
        assert!("upsert".parse::<Operation>().is_err());
    }
}
