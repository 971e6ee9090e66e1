//! Quote repository.

use std::sync::Arc;

use crate::entities::{Quote, quote};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use taskdesk_common::{AppError, AppResult};

/// Quote repository for database operations.
#[derive(Clone)]
pub struct QuoteRepository {
    db: Arc<DatabaseConnection>,
}

impl QuoteRepository {
    /// Create a new quote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a quote by ID.
    pub async fn find_by_id(&self, id: i32) -> AppResult<Option<quote::Model>> {
        Quote::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a quote by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: i32) -> AppResult<quote::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Quote: {id}")))
    }

    /// Quotes of a task, newest first.
    pub async fn find_by_task(&self, task_id: i32) -> AppResult<Vec<quote::Model>> {
        Quote::find()
            .filter(quote::Column::TaskId.eq(task_id))
            .order_by_desc(quote::Column::CreatedAt)
            .order_by_desc(quote::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new quote.
    pub async fn create(&self, model: quote::ActiveModel) -> AppResult<quote::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
