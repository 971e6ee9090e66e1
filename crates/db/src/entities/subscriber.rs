//! Marketing subscriber entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscriber")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub email: String,

    #[sea_orm(nullable)]
    pub name: Option<String>,

    /// Where the signup came from, e.g. `footer`
    #[sea_orm(nullable)]
    pub source: Option<String>,

    /// Unsubscribe token
    #[sea_orm(unique)]
    pub token: String,

    pub is_active: bool,

    #[sea_orm(nullable)]
    pub unsubscribed_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
