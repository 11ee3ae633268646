//! Resumability cursor for the tag backfill job, one row per content source.
//!
//! `last_content_id` is monotonically non-decreasing; the migrator never
//! persists a value below what is already stored.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "backfill_checkpoint")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub content_source: String,

    pub last_content_id: i32,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
