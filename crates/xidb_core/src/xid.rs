//! Deterministic identity derivation.
//!
//! An XID is a name-based UUID (version 5, SHA-1) computed from a normalized
//! plaintext identity such as an email address or a username. The namespace
//! is itself derived from [`PROTOCOL_NAME`] under the URL namespace, so every
//! deployment agrees on identifiers without sharing state.
//!
//! Derivation is pure and infallible. An empty input still yields a valid
//! identifier; rejecting empty identities is the caller's job.

use crate::error::{XdbError, XdbResult};
use crate::record::PROTOCOL_NAME;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

/// Returns the namespace every XID is derived under.
fn namespace() -> &'static Uuid {
    static NAMESPACE: OnceLock<Uuid> = OnceLock::new();
    NAMESPACE.get_or_init(|| Uuid::new_v5(&Uuid::NAMESPACE_URL, PROTOCOL_NAME.as_bytes()))
}

/// Normalizes a plaintext identity: surrounding whitespace trimmed, lower-cased.
#[must_use]
pub fn normalize(input: &str) -> String {
    input.trim().to_lowercase()
}

/// An opaque, content-derived identifier.
///
/// Equal normalized inputs always produce the same `Xid`. The identifier
/// reveals nothing about the input it came from.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Xid(String);

impl Xid {
    /// Derives the identifier of `input` after normalizing it.
    #[must_use]
    pub fn derive(input: &str) -> Self {
        Self::derive_raw(&normalize(input))
    }

    /// Derives an identifier from `input` exactly as given.
    ///
    /// Identifiers minted before inputs were normalized used this form; new
    /// producers should call [`Xid::derive`].
    #[must_use]
    pub fn derive_raw(input: &str) -> Self {
        Self(
            Uuid::new_v5(namespace(), input.as_bytes())
                .hyphenated()
                .to_string(),
        )
    }

    /// Wraps an identifier that was derived elsewhere.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `value` is empty or only whitespace.
    pub fn parse(value: &str) -> XdbResult<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(XdbError::invalid_argument("xid must not be empty"));
        }
        Ok(Self(value.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the identifier and returns the owned string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Xid({})", self.0)
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Xid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Xid> for String {
    fn from(xid: Xid) -> Self {
        xid.0
    }
}
