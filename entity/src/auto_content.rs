//! Entity for auto-generated content.
//!
//! Physically separate from `content` but queried as one logical domain;
//! rows here carry `content_source = auto` in the tag relation.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "auto_content")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub creator_id: i32,

    /// Legacy tag-id array mirror (JSON array of integers)
    #[sea_orm(column_type = "Json", nullable)]
    pub tag_ids: Option<Json>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
