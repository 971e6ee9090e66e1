//! Invoice entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[sea_orm(string_value = "unpaid")]
    Unpaid,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "refunded")]
    Refunded,
    #[sea_orm(string_value = "void")]
    Void,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoice")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// At most one unpaid invoice per task (partial unique index).
    pub task_id: i32,

    pub amount: f64,

    pub currency: String,

    pub status: InvoiceStatus,

    pub issued_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub paid_at: Option<DateTimeWithTimeZone>,

    /// Gateway name, e.g. `pesapal`
    #[sea_orm(nullable)]
    pub gateway: Option<String>,

    /// Last status description reported by the gateway, uppercased
    #[sea_orm(nullable)]
    pub gateway_status: Option<String>,

    /// Raw payload of the last status lookup
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub gateway_meta: Option<Json>,

    #[sea_orm(nullable)]
    pub pesapal_tracking_id: Option<String>,

    #[sea_orm(nullable)]
    pub pesapal_merchant_ref: Option<String>,
}

impl Model {
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid
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
}

impl Related<super::task_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Task.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
