//! Review meeting entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Meeting status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
    #[sea_orm(string_value = "rescheduled")]
    Rescheduled,
    #[sea_orm(string_value = "canceled")]
    Canceled,
    #[sea_orm(string_value = "completed")]
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "meeting")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub task_id: i32,

    /// Conferencing provider, e.g. `google_meet`
    pub provider: String,

    pub status: MeetingStatus,

    pub scheduled_for: DateTimeWithTimeZone,

    pub duration_minutes: i32,

    #[sea_orm(column_type = "Text", nullable)]
    pub join_url: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,

    #[sea_orm(nullable)]
    pub created_by_id: Option<i32>,

    /// Calendar UID, stable across reschedules
    #[sea_orm(nullable)]
    pub invite_uid: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
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
