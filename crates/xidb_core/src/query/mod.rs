//! Latest-per-identity listing, counting, and cursor pagination.
//!
//! ## Ordering
//!
//! Listings are ordered by `(sort field, row id)`. The row id makes the order
//! total, so a cursor taken between two rows with equal primary values
//! resumes at exactly the next row.

mod cursor;
mod engine;
mod filter;

pub use cursor::{Cursor, CursorError};
pub use engine::{count_distinct, latest_per_xid, paginate, Page, QueryEngine};
pub use filter::{Query, SortField, SortValue, UnknownSortField, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
