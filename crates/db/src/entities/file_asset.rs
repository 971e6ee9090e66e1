//! Stored upload entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// What an upload is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Client brief material.
    #[sea_orm(string_value = "attachment")]
    Attachment,
    /// Freelancer deliverable.
    #[sea_orm(string_value = "work")]
    Work,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file_asset")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub owner_id: i32,

    #[sea_orm(nullable)]
    pub task_id: Option<i32>,

    pub kind: AssetKind,

    /// Path relative to the storage root. Never rewritten after upload.
    #[sea_orm(column_type = "Text")]
    pub path: String,

    pub filename: String,

    #[sea_orm(nullable)]
    pub mime: Option<String>,

    pub size_bytes: i64,

    /// `private` or `public`
    pub visibility: String,

    pub uploaded_at: DateTimeWithTimeZone,
}

impl Model {
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime.as_deref().is_some_and(|m| m.starts_with("image/"))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::task_request::Entity",
        from = "Column::TaskId",
        to = "super::task_request::Column::Id",
        on_delete = "SetNull"
    )]
    Task,
}

impl Related<super::task_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Task.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
