//! The normalized content-tag relation (one row per edge).
//!
//! Composite primary key guarantees at most one edge per
//! `(content_id, content_source, tag_id)` triple. No foreign key on
//! `content_id`: it can reference either content table, so cascade on
//! content deletion is handled by the write path.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "content_tag")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub content_id: i32,

    #[sea_orm(primary_key, auto_increment = false)]
    pub content_source: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub tag_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
