//! Task request entity.

use std::fmt;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[sea_orm(string_value = "submitted")]
    Submitted,
    #[sea_orm(string_value = "quoted")]
    Quoted,
    #[sea_orm(string_value = "pending_accept")]
    PendingAccept,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "review")]
    Review,
    #[sea_orm(string_value = "review_scheduled")]
    ReviewScheduled,
    #[sea_orm(string_value = "awaiting_payment")]
    AwaitingPayment,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "closed")]
    Closed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "archived")]
    Archived,
}

impl TaskStatus {
    /// Parse a status typed into a form.
    ///
    /// Input is trimmed and lowercased, and the American spelling
    /// `canceled` is accepted for `cancelled`.
    #[must_use]
    pub fn parse_requested(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        let normalized = if normalized == "canceled" {
            "cancelled".to_string()
        } else {
            normalized
        };
        Self::try_from_value(&normalized).ok()
    }

    /// Database/string form of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Quoted => "quoted",
            Self::PendingAccept => "pending_accept",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::ReviewScheduled => "review_scheduled",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Delivered => "delivered",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
            Self::Archived => "archived",
        }
    }

    /// Entering one of these statuses bills pay-on-delivery quotes.
    #[must_use]
    pub const fn triggers_review_invoice(self) -> bool {
        matches!(self, Self::Review | Self::ReviewScheduled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "task_request")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub client_id: i32,

    pub title: String,

    #[sea_orm(nullable)]
    pub category: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Internal notes, never shown to the client
    #[sea_orm(column_type = "Text", nullable)]
    pub admin_notes: Option<String>,

    #[sea_orm(nullable)]
    pub deadline_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub client_budget: Option<f64>,

    pub priority: String,

    pub status: TaskStatus,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::ClientId",
        to = "super::user::Column::Id"
    )]
    Client,

    #[sea_orm(has_many = "super::quote::Entity")]
    Quotes,

    #[sea_orm(has_many = "super::invoice::Entity")]
    Invoices,

    #[sea_orm(has_many = "super::assignment::Entity")]
    Assignments,

    #[sea_orm(has_many = "super::file_asset::Entity")]
    Assets,

    #[sea_orm(has_many = "super::meeting::Entity")]
    Meetings,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Client.def()
    }
}

impl Related<super::quote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Quotes.def()
    }
}

impl Related<super::invoice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Invoices.def()
    }
}

impl Related<super::assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Assignments.def()
    }
}

impl Related<super::file_asset::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Assets.def()
    }
}

impl Related<super::meeting::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Meetings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
