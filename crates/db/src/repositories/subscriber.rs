//! Marketing subscriber repository.

use std::sync::Arc;

use crate::db_error;
use crate::entities::{Subscriber, subscriber};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use taskdesk_common::{AppError, AppResult};

/// Subscriber repository for database operations.
#[derive(Clone)]
pub struct SubscriberRepository {
    db: Arc<DatabaseConnection>,
}

impl SubscriberRepository {
    /// Create a new subscriber repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a subscriber by email (case-insensitive).
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<subscriber::Model>> {
        Subscriber::find()
            .filter(subscriber::Column::Email.eq(email.trim().to_lowercase()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a subscriber by unsubscribe token.
    pub async fn find_by_token(&self, token: &str) -> AppResult<Option<subscriber::Model>> {
        Subscriber::find()
            .filter(subscriber::Column::Token.eq(token))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All subscribers in signup order.
    pub async fn list_all(&self) -> AppResult<Vec<subscriber::Model>> {
        Subscriber::find()
            .order_by_asc(subscriber::Column::CreatedAt)
            .order_by_asc(subscriber::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a subscriber. A duplicate email yields [`AppError::Conflict`].
    pub async fn create(&self, model: subscriber::ActiveModel) -> AppResult<subscriber::Model> {
        model.insert(self.db.as_ref()).await.map_err(db_error)
    }

    /// Update a subscriber.
    pub async fn update(&self, model: subscriber::ActiveModel) -> AppResult<subscriber::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
