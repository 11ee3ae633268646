//! Entity for regular (user-submitted) content.
//!
//! `tag_ids` is the deprecated denormalized tag list kept in sync with the
//! `content_tag` relation for the duration of the migration. It is dropped
//! once all readers have moved to the relation.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "content")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Owning creator
    pub creator_id: i32,

    /// Legacy tag-id array mirror (JSON array of integers)
    #[sea_orm(column_type = "Json", nullable)]
    pub tag_ids: Option<Json>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
