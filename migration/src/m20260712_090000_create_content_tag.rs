//! Migration to create the normalized content-tag relation.
//!
//! The composite primary key makes duplicate edges impossible and serves
//! reverse lookups by `(content_id, content_source)` prefix. The secondary
//! index keyed on `(tag_id, content_source, content_id)` keeps tag-seeded
//! scans and multi-tag intersections on index ranges.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ContentTag::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ContentTag::ContentId).integer().not_null())
                    .col(
                        ColumnDef::new(ContentTag::ContentSource)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ContentTag::TagId).integer().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk_content_tag")
                            .col(ContentTag::ContentId)
                            .col(ContentTag::ContentSource)
                            .col(ContentTag::TagId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_content_tag_tag_lookup")
                    .table(ContentTag::Table)
                    .col(ContentTag::TagId)
                    .col(ContentTag::ContentSource)
                    .col(ContentTag::ContentId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ContentTag::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ContentTag {
    Table,
    ContentId,
    ContentSource,
    TagId,
}
