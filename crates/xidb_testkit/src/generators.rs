//! Property-based test generators using proptest.
//!
//! Provides strategies for generating identities, paths, and write plans,
//! plus a reference model of which version of each identity is current.

use proptest::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use xidb_core::SortField;

/// Strategy for generating plaintext identities.
pub fn identity_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[a-z][a-z0-9._]{0,11}@example\\.com").expect("Invalid regex"),
        prop::string::string_regex("[a-z][a-z0-9_-]{0,15}").expect("Invalid regex"),
        prop::string::string_regex("i-[0-9a-f]{17}").expect("Invalid regex"),
    ]
}

/// Strategy for generating identities with stray case and surrounding
/// whitespace, which derive the same identifier as their normal form.
pub fn noisy_identity_strategy() -> impl Strategy<Value = (String, String)> {
    (identity_strategy(), " {0,2}", " {0,2}", any::<bool>()).prop_map(
        |(clean, lead, trail, upper)| {
            let body = if upper { clean.to_uppercase() } else { clean.clone() };
            (clean, format!("{lead}{body}{trail}"))
        },
    )
}

/// Strategy for generating record paths.
pub fn path_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("/(info|protocols)/[a-z]{1,8}").expect("Invalid regex")
}

/// Strategy for generating creation timestamps from a narrow range, so
/// plans often contain ties.
pub fn created_at_strategy() -> impl Strategy<Value = i64> {
    1i64..=40
}

/// Strategy for generating requested page sizes, including out-of-range
/// ones.
pub fn page_size_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![
        3 => 1i64..=7,
        1 => -5i64..=0,
        1 => 90i64..=150,
    ]
}

/// Strategy for generating a sort order.
pub fn sort_strategy() -> impl Strategy<Value = (SortField, bool)> {
    (
        prop_oneof![
            Just(SortField::CreatedAt),
            Just(SortField::Name),
            Just(SortField::InsertionOrder),
        ],
        any::<bool>(),
    )
}

/// One create in a write plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOp {
    /// Index into the plan's identity list.
    pub identity: usize,
    /// `createdAt` of the version written.
    pub created_at: i64,
}

/// Strategy for generating a sequence of creates over `identities`
/// identities.
pub fn write_plan_strategy(
    identities: usize,
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<WriteOp>> {
    prop::collection::vec(
        (0..identities.max(1), created_at_strategy())
            .prop_map(|(identity, created_at)| WriteOp {
                identity,
                created_at,
            }),
        min_ops..max_ops,
    )
}

/// Returns, per identity, the index into `plan` of its current version:
/// greatest `createdAt`, later writes winning ties.
pub fn expected_latest(plan: &[WriteOp]) -> BTreeMap<usize, usize> {
    let mut latest: BTreeMap<usize, usize> = BTreeMap::new();
    for (index, op) in plan.iter().enumerate() {
        latest
            .entry(op.identity)
            .and_modify(|best| {
                if op.created_at >= plan[*best].created_at {
                    *best = index;
                }
            })
            .or_insert(index);
    }
    latest
}

/// Orders two plan indexes the way a listing sorted by `createdAt` does.
pub fn compare_by_created_at(plan: &[WriteOp], a: usize, b: usize, ascending: bool) -> Ordering {
    let ordering = plan[a]
        .created_at
        .cmp(&plan[b].created_at)
        .then(a.cmp(&b));
    if ascending {
        ordering
    } else {
        ordering.reverse()
    }
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
