//! Work submission entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "work_submission")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub task_id: i32,

    #[sea_orm(nullable)]
    pub assignment_id: Option<i32>,

    pub freelancer_id: i32,

    #[sea_orm(column_type = "Text", nullable)]
    pub comment: Option<String>,

    /// Submitted files as `[{"asset_id", "filename", "path"}]`
    #[sea_orm(column_type = "JsonBinary")]
    pub files_json: Json,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::task_request::Entity",
        from = "Column::TaskId",
        to = "super::task_request::Column::Id",
        on_delete = "Cascade"
    )]
    Task,
}

impl Related<super::task_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Task.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
