pub use sea_orm_migration::prelude::*;

mod m20260601_120000_create_content_tables;
mod m20260712_090000_create_content_tag;
mod m20260712_090500_create_backfill_checkpoint;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260601_120000_create_content_tables::Migration),
            Box::new(m20260712_090000_create_content_tag::Migration),
            Box::new(m20260712_090500_create_backfill_checkpoint::Migration),
        ]
    }
}
