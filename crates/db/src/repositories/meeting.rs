//! Meeting repository.

use std::sync::Arc;

use crate::entities::{Meeting, meeting};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use taskdesk_common::{AppError, AppResult};

/// Meeting repository for database operations.
#[derive(Clone)]
pub struct MeetingRepository {
    db: Arc<DatabaseConnection>,
}

impl MeetingRepository {
    /// Create a new meeting repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a meeting by ID.
    pub async fn find_by_id(&self, id: i32) -> AppResult<Option<meeting::Model>> {
        Meeting::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a meeting by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: i32) -> AppResult<meeting::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Meeting: {id}")))
    }

    /// Meetings of a task, soonest first.
    pub async fn find_by_task(&self, task_id: i32) -> AppResult<Vec<meeting::Model>> {
        Meeting::find()
            .filter(meeting::Column::TaskId.eq(task_id))
            .order_by_asc(meeting::Column::ScheduledFor)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new meeting.
    pub async fn create(&self, model: meeting::ActiveModel) -> AppResult<meeting::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a meeting.
    pub async fn update(&self, model: meeting::ActiveModel) -> AppResult<meeting::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
