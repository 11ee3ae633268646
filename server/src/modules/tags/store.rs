//! The normalized content-tag relation store.
//!
//! Edge insertion is idempotent (duplicate edges are ignored, not errors):
//! the backfill migrator and the dual-write path may race on the same edge,
//! and both must be able to repeat work safely.

use std::collections::BTreeSet;

use entity::content_tag;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use tracing::debug;

use super::types::{ContentKey, ContentSource, TagError};

pub struct RelationStore {
    db: DatabaseConnection,
}

impl RelationStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Adds edges for a content row. Existing edges are left untouched;
    /// returns the number of rows actually inserted.
    pub async fn add_edges(&self, key: ContentKey, tag_ids: &[i32]) -> Result<u64, TagError> {
        insert_edges(&self.db, key, tag_ids).await
    }

    /// Removes every edge for a content row. Returns the number removed.
    pub async fn remove_all_edges(&self, key: ContentKey) -> Result<u64, TagError> {
        delete_edges(&self.db, key).await
    }

    /// Tags attached to one content row, ascending by tag id.
    pub async fn tags_for_content(&self, key: ContentKey) -> Result<Vec<i32>, TagError> {
        let tags: Vec<i32> = content_tag::Entity::find()
            .filter(content_tag::Column::ContentId.eq(key.id))
            .filter(content_tag::Column::ContentSource.eq(key.source.as_str()))
            .order_by_asc(content_tag::Column::TagId)
            .select_only()
            .column(content_tag::Column::TagId)
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(tags)
    }

    /// Content ids within one source carrying the given tag, ascending.
    pub async fn content_for_tag(
        &self,
        tag_id: i32,
        source: ContentSource,
    ) -> Result<Vec<i32>, TagError> {
        let ids: Vec<i32> = content_tag::Entity::find()
            .filter(content_tag::Column::TagId.eq(tag_id))
            .filter(content_tag::Column::ContentSource.eq(source.as_str()))
            .order_by_asc(content_tag::Column::ContentId)
            .select_only()
            .column(content_tag::Column::ContentId)
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(ids)
    }
}

/// Inserts the given edge set, ignoring edges that already exist. Input tag
/// ids are deduplicated; the relation is unique per triple.
pub(crate) async fn insert_edges<C: ConnectionTrait>(
    conn: &C,
    key: ContentKey,
    tag_ids: &[i32],
) -> Result<u64, TagError> {
    let unique: BTreeSet<i32> = tag_ids.iter().copied().collect();
    if unique.is_empty() {
        return Ok(0);
    }

    let models: Vec<content_tag::ActiveModel> = unique
        .into_iter()
        .map(|tag_id| content_tag::ActiveModel {
            content_id: Set(key.id),
            content_source: Set(key.source.as_str().to_string()),
            tag_id: Set(tag_id),
        })
        .collect();

    let inserted = content_tag::Entity::insert_many(models)
        .on_conflict(
            OnConflict::columns([
                content_tag::Column::ContentId,
                content_tag::Column::ContentSource,
                content_tag::Column::TagId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    debug!(
        content_id = key.id,
        source = %key.source,
        inserted = inserted,
        "Inserted content-tag edges"
    );

    Ok(inserted)
}

pub(crate) async fn delete_edges<C: ConnectionTrait>(
    conn: &C,
    key: ContentKey,
) -> Result<u64, TagError> {
    let result = content_tag::Entity::delete_many()
        .filter(content_tag::Column::ContentId.eq(key.id))
        .filter(content_tag::Column::ContentSource.eq(key.source.as_str()))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::tags::testsupport::{insert_content, setup_test_db};

    #[tokio::test]
    async fn test_add_edges_is_idempotent() {
        let db = setup_test_db().await;
        let store = RelationStore::new(db.clone());
        let key = insert_content(&db, ContentSource::Regular, 1, 0).await;

        let first = store.add_edges(key, &[10, 20, 30]).await.unwrap();
        assert_eq!(first, 3);

        // Re-inserting an overlapping set is a no-op for existing edges.
        let second = store.add_edges(key, &[20, 30, 40]).await.unwrap();
        assert_eq!(second, 1);

        let tags = store.tags_for_content(key).await.unwrap();
        assert_eq!(tags, vec![10, 20, 30, 40]);
    }

    #[tokio::test]
    async fn test_duplicate_input_tags_collapse() {
        let db = setup_test_db().await;
        let store = RelationStore::new(db.clone());
        let key = insert_content(&db, ContentSource::Auto, 1, 0).await;

        let inserted = store.add_edges(key, &[7, 7, 7]).await.unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(store.tags_for_content(key).await.unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_remove_all_edges() {
        let db = setup_test_db().await;
        let store = RelationStore::new(db.clone());
        let key = insert_content(&db, ContentSource::Regular, 1, 0).await;
        let other = insert_content(&db, ContentSource::Regular, 1, 1).await;

        store.add_edges(key, &[1, 2]).await.unwrap();
        store.add_edges(other, &[1]).await.unwrap();

        let removed = store.remove_all_edges(key).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.tags_for_content(key).await.unwrap().is_empty());

        // Edges of other rows are untouched.
        assert_eq!(store.tags_for_content(other).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_sources_are_independent() {
        let db = setup_test_db().await;
        let store = RelationStore::new(db.clone());

        // Same numeric id in both tables; edges must not collide.
        let regular = insert_content(&db, ContentSource::Regular, 1, 0).await;
        let auto = insert_content(&db, ContentSource::Auto, 1, 0).await;
        assert_eq!(regular.id, auto.id);

        store.add_edges(regular, &[5]).await.unwrap();
        store.add_edges(auto, &[6]).await.unwrap();

        assert_eq!(store.tags_for_content(regular).await.unwrap(), vec![5]);
        assert_eq!(store.tags_for_content(auto).await.unwrap(), vec![6]);
        assert_eq!(
            store
                .content_for_tag(5, ContentSource::Regular)
                .await
                .unwrap(),
            vec![regular.id]
        );
        assert!(store
            .content_for_tag(5, ContentSource::Auto)
            .await
            .unwrap()
            .is_empty());
    }
}
