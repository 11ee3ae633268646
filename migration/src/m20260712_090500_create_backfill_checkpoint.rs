use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BackfillCheckpoint::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BackfillCheckpoint::ContentSource)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(BackfillCheckpoint::LastContentId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BackfillCheckpoint::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BackfillCheckpoint::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BackfillCheckpoint {
    Table,
    ContentSource,
    LastContentId,
    UpdatedAt,
}
