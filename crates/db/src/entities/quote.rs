//! Quote entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Quote status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "accepted")]
    Accepted,
    #[sea_orm(string_value = "declined")]
    Declined,
    #[sea_orm(string_value = "countered")]
    Countered,
}

/// When the client pays for a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum PayOption {
    /// Invoice is issued as soon as the quote is accepted.
    #[sea_orm(string_value = "pay_now")]
    PayNow,
    /// Invoice is issued when the task enters review.
    #[sea_orm(string_value = "pay_on_delivery")]
    PayOnDelivery,
}

impl PayOption {
    /// Parse a form value, defaulting to pay on delivery.
    #[must_use]
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("pay_now") => Self::PayNow,
            _ => Self::PayOnDelivery,
        }
    }
}

/// Status of a client counter-offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum CounterStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "accepted")]
    Accepted,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "quote")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub task_id: i32,

    pub proposed_price: f64,

    pub currency: String,

    pub status: QuoteStatus,

    pub pay_option: PayOption,

    #[sea_orm(column_type = "Text", nullable)]
    pub message: Option<String>,

    #[sea_orm(nullable)]
    pub valid_until: Option<DateTimeWithTimeZone>,

    // Client counter-offer
    #[sea_orm(nullable)]
    pub client_counter_amount: Option<f64>,

    #[sea_orm(nullable)]
    pub client_counter_currency: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub client_counter_reason: Option<String>,

    #[sea_orm(nullable)]
    pub client_counter_status: Option<CounterStatus>,

    #[sea_orm(nullable)]
    pub client_counter_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Price both sides agreed on: an accepted counter wins over the proposal.
    #[must_use]
    pub fn agreed_price(&self) -> f64 {
        match (self.client_counter_status, self.client_counter_amount) {
            (Some(CounterStatus::Accepted), Some(amount)) => amount,
            _ => self.proposed_price,
        }
    }

    /// Currency matching [`Self::agreed_price`].
    #[must_use]
    pub fn agreed_currency(&self) -> String {
        match (self.client_counter_status, &self.client_counter_currency) {
            (Some(CounterStatus::Accepted), Some(currency)) => currency.clone(),
            _ => self.currency.clone(),
        }
    }

    #[must_use]
    pub fn has_pending_counter(&self) -> bool {
        self.client_counter_status == Some(CounterStatus::Pending)
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
