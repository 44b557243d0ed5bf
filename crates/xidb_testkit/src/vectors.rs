//! Identity derivation test vectors.
//!
//! These vectors pin the identifiers every producer must derive, whatever
//! language it is written in.

use serde::{Deserialize, Serialize};
use xidb_core::Xid;

/// Identifier of the derivation namespace: UUIDv5 of `xid-protocol` under
/// the URL namespace.
pub const XID_NAMESPACE: &str = "1e60a63b-64ca-55bb-a2fd-85685c161513";

/// A derivation vector that can be shared across languages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XidVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Plaintext identity as a producer receives it.
    pub input: String,
    /// Identifier derived after normalization.
    pub expected: String,
    /// Identifier derived from the input as given.
    pub expected_raw: String,
}

fn vector(id: &str, description: &str, input: &str, expected: &str, expected_raw: &str) -> XidVector {
    XidVector {
        id: id.into(),
        description: description.into(),
        input: input.into(),
        expected: expected.into(),
        expected_raw: expected_raw.into(),
    }
}

/// Derivation vectors.
pub fn xid_vectors() -> Vec<XidVector> {
    vec![
        vector(
            "xid_email",
            "Lower-case email address",
            "alice@example.com",
            "37a7009f-1d98-5a60-a899-9f255376c601",
            "37a7009f-1d98-5a60-a899-9f255376c601",
        ),
        vector(
            "xid_email_noisy",
            "Mixed case and surrounding whitespace normalize away",
            "  Alice@Example.COM ",
            "37a7009f-1d98-5a60-a899-9f255376c601",
            "e57929f6-5201-57fb-a6b0-e1639d7c2bd3",
        ),
        vector(
            "xid_username",
            "Short username",
            "bob",
            "83e6b252-f119-597e-ba19-d3024185d40e",
            "83e6b252-f119-597e-ba19-d3024185d40e",
        ),
        vector(
            "xid_instance",
            "Cloud instance id",
            "i-0abc123def4567890",
            "7dd48e84-cda3-5c3c-8266-73e8f2050a50",
            "7dd48e84-cda3-5c3c-8266-73e8f2050a50",
        ),
        vector(
            "xid_arn",
            "Resource name with upper-case segment",
            "arn:aws:iam::123456789012:user/Dev",
            "aba13967-e16d-5194-852e-d9d75373ff91",
            "c5e9c664-b85a-596c-88b1-a0edf856c39f",
        ),
        vector(
            "xid_unicode",
            "Non-ASCII identity hashed as UTF-8",
            "用户@例子.公司",
            "796ffd59-5daa-5b86-a46d-9e724e3a56bc",
            "796ffd59-5daa-5b86-a46d-9e724e3a56bc",
        ),
        vector(
            "xid_empty",
            "Empty input still derives an identifier",
            "",
            "36393b4c-cf00-5666-ba49-3c8d5b0457b1",
            "36393b4c-cf00-5666-ba49-3c8d5b0457b1",
        ),
    ]
}

/// Checks every vector against the implementation, returning one line per
/// mismatch.
pub fn check_xid_vectors() -> Vec<String> {
    let mut failures = Vec::new();
    for v in xid_vectors() {
        let derived = Xid::derive(&v.input);
        if derived.as_str() != v.expected {
            failures.push(format!("{}: derived {derived}, expected {}", v.id, v.expected));
        }
        let raw = Xid::derive_raw(&v.input);
        if raw.as_str() != v.expected_raw {
            failures.push(format!("{}: raw {raw}, expected {}", v.id, v.expected_raw));
        }
    }
    failures
}
