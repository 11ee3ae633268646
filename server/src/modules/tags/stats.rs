//! Tag popularity statistics for query planning.
//!
//! Match-all queries degrade badly when the scan is seeded on a hot tag, so
//! the query builder orders per-tag filter steps by ascending popularity.
//! Exact per-query counts would cost as much as the query itself at this
//! scale; instead a snapshot is refreshed periodically and injected into the
//! builder. Stale or missing counts degrade the plan, never the result.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use entity::content_tag;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QuerySelect};
use tracing::info;

use super::types::TagError;

/// Read-mostly snapshot of per-tag edge counts.
#[derive(Debug, Clone, Default)]
pub struct TagPopularity {
    counts: HashMap<i32, u64>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl TagPopularity {
    /// A snapshot with no statistics; every tag keeps its request order.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a snapshot from externally computed counts.
    pub fn from_counts(counts: HashMap<i32, u64>) -> Self {
        Self {
            counts,
            refreshed_at: Some(Utc::now()),
        }
    }

    /// Recomputes edge counts for every tag with one grouped scan.
    pub async fn refresh(db: &DatabaseConnection) -> Result<Self, TagError> {
        let rows: Vec<(i32, i64)> = content_tag::Entity::find()
            .select_only()
            .column(content_tag::Column::TagId)
            .column_as(content_tag::Column::TagId.count(), "edge_count")
            .group_by(content_tag::Column::TagId)
            .into_tuple()
            .all(db)
            .await?;

        let counts: HashMap<i32, u64> = rows
            .into_iter()
            .map(|(tag_id, count)| (tag_id, count.max(0) as u64))
            .collect();

        info!(tag_count = counts.len(), "Refreshed tag popularity snapshot");

        Ok(Self {
            counts,
            refreshed_at: Some(Utc::now()),
        })
    }

    pub fn count(&self, tag_id: i32) -> Option<u64> {
        self.counts.get(&tag_id).copied()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// Orders tags for progressive intersection: tags with known counts are
    /// stably sorted ascending (rarest first) among the positions they
    /// occupy; tags with no statistics keep their request position.
    pub fn order_by_selectivity(&self, tag_ids: &[i32]) -> Vec<i32> {
        let mut ordered = tag_ids.to_vec();

        let mut slots = Vec::new();
        let mut known = Vec::new();
        for (index, tag_id) in tag_ids.iter().enumerate() {
            if let Some(count) = self.counts.get(tag_id) {
                slots.push(index);
                known.push((*count, *tag_id));
            }
        }

        known.sort_by_key(|(count, _)| *count);
        for (slot, (_, tag_id)) in slots.into_iter().zip(known) {
            ordered[slot] = tag_id;
        }

        ordered
    }
}
