//! Assignment entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Assignment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "pending_accept")]
    PendingAccept,
    #[sea_orm(string_value = "accepted")]
    Accepted,
    #[sea_orm(string_value = "declined")]
    Declined,
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl AssignmentStatus {
    /// Statuses that still hold a claim on the task.
    pub const ACTIVE: [Self; 3] = [Self::Pending, Self::PendingAccept, Self::Accepted];

    /// Still waiting on the freelancer's answer.
    #[must_use]
    pub const fn is_awaiting_response(self) -> bool {
        matches!(self, Self::Pending | Self::PendingAccept)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "assignment")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub task_id: i32,

    /// Freelancer holding the assignment
    pub assignee_id: i32,

    /// Admin who created it
    #[sea_orm(nullable)]
    pub assigned_by: Option<i32>,

    pub status: AssignmentStatus,

    #[sea_orm(nullable)]
    pub accept_expires_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub accepted_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub declined_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Whether the acceptance window has closed at `now`.
    #[must_use]
    pub fn is_past_deadline(&self, now: DateTimeWithTimeZone) -> bool {
        self.accept_expires_at.is_some_and(|deadline| now > deadline)
    }
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

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::AssigneeId",
        to = "super::user::Column::Id"
    )]
    Assignee,
}

impl Related<super::task_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Task.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Assignee.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
