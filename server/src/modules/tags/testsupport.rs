//! Shared fixtures for the tag module tests: an in-memory SQLite database
//! with the full schema, plus seed helpers for content and tag rows.

use chrono::{Duration, TimeZone, Utc};
use entity::{auto_content, backfill_checkpoint, content, content_tag, tag};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, Database, DatabaseConnection, DbBackend,
    Schema,
};

use super::types::{ContentKey, ContentSource};

pub(crate) async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();

    let schema = Schema::new(DbBackend::Sqlite);
    let builder = db.get_database_backend();

    let statements = [
        schema.create_table_from_entity(content::Entity),
        schema.create_table_from_entity(auto_content::Entity),
        schema.create_table_from_entity(tag::Entity),
        schema.create_table_from_entity(content_tag::Entity),
        schema.create_table_from_entity(backfill_checkpoint::Entity),
    ];
    for stmt in statements {
        db.execute(builder.build(&stmt)).await.unwrap();
    }

    db
}

/// Inserts a content row with a deterministic creation time: a fixed epoch
/// plus `seq` seconds, so ordering in tests follows the seed order.
pub(crate) async fn insert_content(
    db: &DatabaseConnection,
    source: ContentSource,
    creator_id: i32,
    seq: i64,
) -> ContentKey {
    let created_at = (Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        + Duration::seconds(seq))
    .into();

    let id = match source {
        ContentSource::Regular => {
            let model = content::ActiveModel {
                creator_id: Set(creator_id),
                tag_ids: Set(None),
                created_at: Set(created_at),
                ..Default::default()
            };
            model.insert(db).await.unwrap().id
        }
        ContentSource::Auto => {
            let model = auto_content::ActiveModel {
                creator_id: Set(creator_id),
                tag_ids: Set(None),
                created_at: Set(created_at),
                ..Default::default()
            };
            model.insert(db).await.unwrap().id
        }
    };

    ContentKey::new(id, source)
}

pub(crate) async fn insert_tag(db: &DatabaseConnection, name: &str) -> i32 {
    let model = tag::ActiveModel {
        name: Set(name.to_string()),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    };
    model.insert(db).await.unwrap().id
}
