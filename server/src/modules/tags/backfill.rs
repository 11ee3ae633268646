//! Batch backfill of the `content_tag` relation from the legacy mirrors.
//!
//! Iterates content rows in primary-key order per source, in fixed-size
//! batches, inserting the edge set decoded from the mirror column. Each
//! batch commits its edges and the advanced checkpoint in one transaction,
//! so a crash loses at most one uncommitted batch and a restart re-inserts
//! only idempotent edges. The job runs for hours against tens of millions
//! of rows and never holds a transaction wider than one batch.
//!
//! Rows mutated concurrently by the dual-write path are safe: edge inserts
//! ignore duplicates and a later delete-then-insert supersedes anything the
//! backfill wrote for that row.

use entity::{auto_content, backfill_checkpoint, content, content_tag};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, JsonValue, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};
use thiserror::Error;
use tracing::{info, warn};

use super::dual_write::decode_mirror;
use super::types::{ContentSource, TagError};

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("No checkpoint for source '{0}'; pass --restart to begin from the start")]
    MissingCheckpoint(ContentSource),
    #[error("Corrupt checkpoint for source '{0}': {1}")]
    CorruptCheckpoint(ContentSource, String),
    #[error(transparent)]
    Tag(#[from] TagError),
}

/// How to establish the starting cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillMode {
    /// Continue from the persisted checkpoint; its absence is an error,
    /// never silently treated as zero.
    Resume,
    /// Discard any existing checkpoint and start from the beginning.
    Restart,
}

#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// Content rows read per batch (and per transaction).
    pub batch_size: u64,
    /// Edge rows per INSERT statement within a batch.
    pub insert_chunk_size: usize,
    /// Attempts per batch before the job gives up.
    pub max_batch_retries: u32,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            insert_chunk_size: 1_000,
            max_batch_retries: 3,
        }
    }
}

impl BackfillConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - BACKFILL_BATCH_SIZE: rows per batch (default: 10000)
    /// - BACKFILL_INSERT_CHUNK: edges per insert statement (default: 1000)
    /// - BACKFILL_MAX_RETRIES: attempts per batch (default: 3)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: std::env::var("BACKFILL_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_size),
            insert_chunk_size: std::env::var("BACKFILL_INSERT_CHUNK")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.insert_chunk_size),
            max_batch_retries: std::env::var("BACKFILL_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_batch_retries),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BackfillReport {
    pub rows_processed: u64,
    pub edges_inserted: u64,
    pub batches: u64,
}

struct BatchOutcome {
    last_id: i32,
    rows: u64,
    edges: u64,
}

pub struct BackfillMigrator {
    db: DatabaseConnection,
    config: BackfillConfig,
}

impl BackfillMigrator {
    pub fn new(db: DatabaseConnection, config: BackfillConfig) -> Self {
        Self { db, config }
    }

    /// Runs the backfill to completion for one content source.
    pub async fn run(
        &self,
        source: ContentSource,
        mode: BackfillMode,
    ) -> Result<BackfillReport, BackfillError> {
        let mut cursor = self.prepare_cursor(source, mode).await?;

        info!(
            source = %source,
            start_after = cursor,
            batch_size = self.config.batch_size,
            "Starting tag backfill"
        );

        let mut report = BackfillReport::default();
        let mut attempts = 0u32;

        loop {
            match self.process_batch(source, cursor).await {
                Ok(None) => break,
                Ok(Some(outcome)) => {
                    cursor = outcome.last_id;
                    attempts = 0;
                    report.rows_processed += outcome.rows;
                    report.edges_inserted += outcome.edges;
                    report.batches += 1;
                    info!(
                        source = %source,
                        last_content_id = outcome.last_id,
                        rows = outcome.rows,
                        edges = outcome.edges,
                        "Backfill batch committed"
                    );
                }
                Err(e) if attempts < self.config.max_batch_retries => {
                    attempts += 1;
                    // Checkpoint did not advance; the retry re-reads the
                    // same batch and re-inserts idempotently.
                    warn!(
                        source = %source,
                        after = cursor,
                        attempt = attempts,
                        error = %e,
                        "Backfill batch failed, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            source = %source,
            rows = report.rows_processed,
            edges = report.edges_inserted,
            batches = report.batches,
            "Tag backfill complete"
        );

        Ok(report)
    }

    async fn prepare_cursor(
        &self,
        source: ContentSource,
        mode: BackfillMode,
    ) -> Result<i32, BackfillError> {
        match mode {
            BackfillMode::Restart => {
                persist_checkpoint(&self.db, source, 0).await?;
                Ok(0)
            }
            BackfillMode::Resume => {
                let checkpoint = backfill_checkpoint::Entity::find_by_id(source.as_str())
                    .one(&self.db)
                    .await?
                    .ok_or(BackfillError::MissingCheckpoint(source))?;
                if checkpoint.last_content_id < 0 {
                    return Err(BackfillError::CorruptCheckpoint(
                        source,
                        format!("negative last_content_id {}", checkpoint.last_content_id),
                    ));
                }
                Ok(checkpoint.last_content_id)
            }
        }
    }

    /// Processes one batch after `cursor`. Returns `None` when no rows
    /// remain. Edge inserts and the checkpoint advance commit atomically.
    async fn process_batch(
        &self,
        source: ContentSource,
        cursor: i32,
    ) -> Result<Option<BatchOutcome>, BackfillError> {
        let batch: Vec<(i32, Option<JsonValue>)> = match source {
            ContentSource::Regular => {
                content::Entity::find()
                    .filter(content::Column::Id.gt(cursor))
                    .order_by_asc(content::Column::Id)
                    .limit(self.config.batch_size)
                    .select_only()
                    .column(content::Column::Id)
                    .column(content::Column::TagIds)
                    .into_tuple()
                    .all(&self.db)
                    .await?
            }
            ContentSource::Auto => {
                auto_content::Entity::find()
                    .filter(auto_content::Column::Id.gt(cursor))
                    .order_by_asc(auto_content::Column::Id)
                    .limit(self.config.batch_size)
                    .select_only()
                    .column(auto_content::Column::Id)
                    .column(auto_content::Column::TagIds)
                    .into_tuple()
                    .all(&self.db)
                    .await?
            }
        };

        let Some((last_id, _)) = batch.last() else {
            return Ok(None);
        };
        let last_id = *last_id;
        let rows = batch.len() as u64;

        // Rows with empty or null mirrors contribute no edges but still
        // advance the checkpoint.
        let mut models: Vec<content_tag::ActiveModel> = Vec::new();
        for (content_id, mirror) in &batch {
            for tag_id in decode_mirror(mirror.as_ref()) {
                models.push(content_tag::ActiveModel {
                    content_id: Set(*content_id),
                    content_source: Set(source.as_str().to_string()),
                    tag_id: Set(tag_id),
                });
            }
        }

        let txn = self.db.begin().await?;

        let mut edges = 0u64;
        for chunk in models.chunks(self.config.insert_chunk_size) {
            edges += content_tag::Entity::insert_many(chunk.to_vec())
                .on_conflict(
                    OnConflict::columns([
                        content_tag::Column::ContentId,
                        content_tag::Column::ContentSource,
                        content_tag::Column::TagId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }

        persist_checkpoint(&txn, source, last_id).await?;

        txn.commit().await?;

        Ok(Some(BatchOutcome {
            last_id,
            rows,
            edges,
        }))
    }
}

async fn persist_checkpoint<C: sea_orm::ConnectionTrait>(
    conn: &C,
    source: ContentSource,
    last_content_id: i32,
) -> Result<(), BackfillError> {
    let model = backfill_checkpoint::ActiveModel {
        content_source: Set(source.as_str().to_string()),
        last_content_id: Set(last_content_id),
        updated_at: Set(chrono::Utc::now().into()),
    };

    backfill_checkpoint::Entity::insert(model)
        .on_conflict(
            OnConflict::column(backfill_checkpoint::Column::ContentSource)
                .update_columns([
                    backfill_checkpoint::Column::LastContentId,
                    backfill_checkpoint::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::tags::dual_write::encode_mirror;
    use crate::modules::tags::testsupport::{insert_content, setup_test_db};
    use crate::modules::tags::types::ContentKey;
    use crate::modules::tags::RelationStore;
    use sea_orm::ActiveModelTrait;

    /// Writes the legacy mirror directly, bypassing the dual-write path,
    /// the way pre-relation rows look in production.
    async fn set_mirror_only(db: &DatabaseConnection, key: ContentKey, tags: &[i32]) {
        match key.source {
            ContentSource::Regular => {
                let model = content::ActiveModel {
                    id: Set(key.id),
                    tag_ids: Set(Some(encode_mirror(tags))),
                    ..Default::default()
                };
                model.update(db).await.unwrap();
            }
            ContentSource::Auto => {
                let model = auto_content::ActiveModel {
                    id: Set(key.id),
                    tag_ids: Set(Some(encode_mirror(tags))),
                    ..Default::default()
                };
                model.update(db).await.unwrap();
            }
        }
    }

    fn small_batches() -> BackfillConfig {
        BackfillConfig {
            batch_size: 10,
            insert_chunk_size: 16,
            max_batch_retries: 0,
        }
    }

    async fn checkpoint_of(db: &DatabaseConnection, source: ContentSource) -> i32 {
        backfill_checkpoint::Entity::find_by_id(source.as_str())
            .one(db)
            .await
            .unwrap()
            .unwrap()
            .last_content_id
    }

    #[tokio::test]
    async fn test_backfill_populates_relation_from_mirrors() {
        let db = setup_test_db().await;
        let store = RelationStore::new(db.clone());

        let a = insert_content(&db, ContentSource::Regular, 1, 0).await;
        let b = insert_content(&db, ContentSource::Regular, 1, 1).await;
        set_mirror_only(&db, a, &[1, 2]).await;
        set_mirror_only(&db, b, &[2]).await;

        let migrator = BackfillMigrator::new(db.clone(), small_batches());
        let report = migrator
            .run(ContentSource::Regular, BackfillMode::Restart)
            .await
            .unwrap();

        assert_eq!(report.rows_processed, 2);
        assert_eq!(report.edges_inserted, 3);
        assert_eq!(store.tags_for_content(a).await.unwrap(), vec![1, 2]);
        assert_eq!(store.tags_for_content(b).await.unwrap(), vec![2]);
        assert_eq!(checkpoint_of(&db, ContentSource::Regular).await, b.id);
    }

    #[tokio::test]
    async fn test_backfill_is_idempotent() {
        let db = setup_test_db().await;
        let store = RelationStore::new(db.clone());

        let a = insert_content(&db, ContentSource::Auto, 1, 0).await;
        set_mirror_only(&db, a, &[5, 6]).await;

        let migrator = BackfillMigrator::new(db.clone(), small_batches());
        migrator
            .run(ContentSource::Auto, BackfillMode::Restart)
            .await
            .unwrap();
        let second = migrator
            .run(ContentSource::Auto, BackfillMode::Restart)
            .await
            .unwrap();

        // The second pass re-reads every row but inserts nothing new.
        assert_eq!(second.rows_processed, 1);
        assert_eq!(second.edges_inserted, 0);
        assert_eq!(store.tags_for_content(a).await.unwrap(), vec![5, 6]);
    }

    #[tokio::test]
    async fn test_resume_honors_checkpoint() {
        let db = setup_test_db().await;
        let store = RelationStore::new(db.clone());

        let mut keys = Vec::new();
        for seq in 0..25 {
            let key = insert_content(&db, ContentSource::Regular, 1, seq).await;
            set_mirror_only(&db, key, &[100]).await;
            keys.push(key);
        }

        let migrator = BackfillMigrator::new(db.clone(), small_batches());

        // Simulate an interruption: process exactly one batch, then stop.
        let cursor = migrator
            .prepare_cursor(ContentSource::Regular, BackfillMode::Restart)
            .await
            .unwrap();
        let outcome = migrator
            .process_batch(ContentSource::Regular, cursor)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.rows, 10);
        assert_eq!(checkpoint_of(&db, ContentSource::Regular).await, keys[9].id);

        // Retag an already-processed row behind the checkpoint; resume must
        // not revisit it.
        set_mirror_only(&db, keys[0], &[999]).await;

        let report = migrator
            .run(ContentSource::Regular, BackfillMode::Resume)
            .await
            .unwrap();
        assert_eq!(report.rows_processed, 15);

        assert_eq!(store.tags_for_content(keys[0]).await.unwrap(), vec![100]);
        assert_eq!(store.tags_for_content(keys[24]).await.unwrap(), vec![100]);
        assert_eq!(
            checkpoint_of(&db, ContentSource::Regular).await,
            keys[24].id
        );
    }

    #[tokio::test]
    async fn test_resume_without_checkpoint_is_fatal() {
        let db = setup_test_db().await;
        let migrator = BackfillMigrator::new(db, small_batches());

        let err = migrator
            .run(ContentSource::Regular, BackfillMode::Resume)
            .await
            .unwrap_err();
        assert!(matches!(err, BackfillError::MissingCheckpoint(_)));
    }

    #[tokio::test]
    async fn test_resume_with_corrupt_checkpoint_is_fatal() {
        let db = setup_test_db().await;

        let key = insert_content(&db, ContentSource::Regular, 1, 0).await;
        set_mirror_only(&db, key, &[1]).await;
        persist_checkpoint(&db, ContentSource::Regular, -5)
            .await
            .unwrap();

        // A negative cursor needs operator intervention; the run must stop
        // before touching any rows.
        let store = RelationStore::new(db.clone());
        let migrator = BackfillMigrator::new(db, small_batches());
        let err = migrator
            .run(ContentSource::Regular, BackfillMode::Resume)
            .await
            .unwrap_err();
        assert!(matches!(err, BackfillError::CorruptCheckpoint(_, _)));
        assert!(store.tags_for_content(key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_and_null_mirrors_still_advance() {
        let db = setup_test_db().await;
        let store = RelationStore::new(db.clone());

        let a = insert_content(&db, ContentSource::Regular, 1, 0).await;
        let b = insert_content(&db, ContentSource::Regular, 1, 1).await;
        set_mirror_only(&db, b, &[]).await;
        // a keeps its NULL mirror

        let migrator = BackfillMigrator::new(db.clone(), small_batches());
        let report = migrator
            .run(ContentSource::Regular, BackfillMode::Restart)
            .await
            .unwrap();

        assert_eq!(report.rows_processed, 2);
        assert_eq!(report.edges_inserted, 0);
        assert!(store.tags_for_content(a).await.unwrap().is_empty());
        assert_eq!(checkpoint_of(&db, ContentSource::Regular).await, b.id);
    }

    #[tokio::test]
    async fn test_sources_are_backfilled_independently() {
        let db = setup_test_db().await;
        let store = RelationStore::new(db.clone());

        let regular = insert_content(&db, ContentSource::Regular, 1, 0).await;
        let auto = insert_content(&db, ContentSource::Auto, 1, 0).await;
        set_mirror_only(&db, regular, &[1]).await;
        set_mirror_only(&db, auto, &[2]).await;

        let migrator = BackfillMigrator::new(db.clone(), small_batches());
        migrator
            .run(ContentSource::Auto, BackfillMode::Restart)
            .await
            .unwrap();

        // Only the auto table was processed.
        assert!(store.tags_for_content(regular).await.unwrap().is_empty());
        assert_eq!(store.tags_for_content(auto).await.unwrap(), vec![2]);
    }
}
