//! Tag storage and the tag-filtered content query engine.
//!
//! The normalized `content_tag` relation is the system of record. During the
//! migration window every tag write goes through [`TagWriter`], which keeps
//! the legacy array mirror on the content rows consistent with the relation;
//! [`BackfillMigrator`] closes the gap for rows that predate the relation.
//! Reads go through [`FilterQuery`], with [`TagPopularity`] supplying the
//! selectivity ordering for match-all queries.

pub mod backfill;
pub mod dual_write;
pub mod query;
pub mod stats;
pub mod store;
pub mod types;

pub use backfill::{BackfillConfig, BackfillError, BackfillMigrator, BackfillMode, BackfillReport};
pub use dual_write::TagWriter;
pub use query::{FilterQuery, QueryBackend};
pub use stats::TagPopularity;
pub use store::RelationStore;
pub use types::*;

#[cfg(test)]
pub(crate) mod testsupport;
