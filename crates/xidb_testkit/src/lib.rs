//! # xidb testkit
//!
//! Test utilities for xidb.
//!
//! This crate provides:
//! - Test fixtures and store helpers
//! - Property-based test generators using proptest
//! - A reference model of latest-per-identity selection
//! - Crash simulation for the byte layer
//! - Stress testing utilities
//! - Identity derivation test vectors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use xidb_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_store() {
//!     let store = TestStore::memory();
//!     let factory = RecordFactory::new("/info/test");
//!     store.create(&store.ctx(), "/info/test", factory.record("alice", 1), None).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use crate::vectors::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
pub use vectors::*;
