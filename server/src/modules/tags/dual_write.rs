//! Dual-write synchronizer for the tag migration window.
//!
//! Every tag mutation goes through [`TagWriter::upsert_content_tags`], which
//! updates the legacy array mirror on the content row and replaces the
//! normalized edge set in one database transaction. If any step fails the
//! whole write rolls back, so the two representations cannot diverge. Once
//! the mirror column is dropped this component reduces to a plain edge
//! replacement and the mirror write disappears.

use entity::{auto_content, content};
use sea_orm::{
    ActiveValue::Set, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, JsonValue,
    TransactionTrait,
};
use std::collections::BTreeSet;
use tracing::debug;

use super::store;
use super::types::{ContentKey, ContentSource, TagError};

pub struct TagWriter {
    db: DatabaseConnection,
}

impl TagWriter {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Replaces the full tag set of a content row in both representations.
    ///
    /// Replace-semantics, not incremental edit: all existing edges for the
    /// row are deleted and the new set inserted, so a reader never observes
    /// a mix of two writes. Fails with [`TagError::ContentNotFound`] if the
    /// content row does not exist.
    pub async fn upsert_content_tags(
        &self,
        key: ContentKey,
        tag_ids: &[i32],
    ) -> Result<(), TagError> {
        let tags: Vec<i32> = tag_ids
            .iter()
            .copied()
            .collect::<BTreeSet<i32>>()
            .into_iter()
            .collect();

        let txn = self.db.begin().await?;

        write_mirror(&txn, key, &tags).await?;
        store::delete_edges(&txn, key).await?;
        store::insert_edges(&txn, key, &tags).await?;

        txn.commit().await?;

        debug!(
            content_id = key.id,
            source = %key.source,
            tag_count = tags.len(),
            "Replaced content tag set"
        );

        Ok(())
    }
}

async fn write_mirror<C: ConnectionTrait>(
    conn: &C,
    key: ContentKey,
    tags: &[i32],
) -> Result<(), TagError> {
    let mirror = Set(Some(encode_mirror(tags)));

    let result = match key.source {
        ContentSource::Regular => {
            let model = content::ActiveModel {
                id: Set(key.id),
                tag_ids: mirror,
                ..Default::default()
            };
            content::Entity::update(model).exec(conn).await.map(|_| ())
        }
        ContentSource::Auto => {
            let model = auto_content::ActiveModel {
                id: Set(key.id),
                tag_ids: mirror,
                ..Default::default()
            };
            auto_content::Entity::update(model)
                .exec(conn)
                .await
                .map(|_| ())
        }
    };

    match result {
        Ok(()) => Ok(()),
        Err(DbErr::RecordNotUpdated) => Err(TagError::ContentNotFound {
            id: key.id,
            content_source: key.source,
        }),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn encode_mirror(tags: &[i32]) -> JsonValue {
    serde_json::json!(tags)
}

/// Decodes the legacy array column. Null, absent or malformed values decode
/// to the empty set; non-integer and out-of-range elements are skipped.
pub(crate) fn decode_mirror(value: Option<&JsonValue>) -> Vec<i32> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_i64())
                .filter_map(|id| i32::try_from(id).ok())
                .collect()
        })
        .unwrap_or_default()
}
