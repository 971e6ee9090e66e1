//! Task request repository.

use std::sync::Arc;

use crate::entities::{TaskRequest, task_request};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use taskdesk_common::{AppError, AppResult};

/// Task repository for database operations.
#[derive(Clone)]
pub struct TaskRepository {
    db: Arc<DatabaseConnection>,
}

impl TaskRepository {
    /// Create a new task repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a task by ID.
    pub async fn find_by_id(&self, id: i32) -> AppResult<Option<task_request::Model>> {
        TaskRequest::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a task by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: i32) -> AppResult<task_request::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Task: {id}")))
    }

    /// Tasks owned by a client, newest first.
    pub async fn find_by_client(&self, client_id: i32) -> AppResult<Vec<task_request::Model>> {
        TaskRequest::find()
            .filter(task_request::Column::ClientId.eq(client_id))
            .order_by_desc(task_request::Column::CreatedAt)
            .order_by_desc(task_request::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All tasks, newest first, optionally filtered by status.
    pub async fn list(
        &self,
        status: Option<task_request::TaskStatus>,
    ) -> AppResult<Vec<task_request::Model>> {
        let mut query = TaskRequest::find()
            .order_by_desc(task_request::Column::CreatedAt)
            .order_by_desc(task_request::Column::Id);
        if let Some(status) = status {
            query = query.filter(task_request::Column::Status.eq(status));
        }
        query
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new task.
    pub async fn create(&self, model: task_request::ActiveModel) -> AppResult<task_request::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a task.
    pub async fn update(&self, model: task_request::ActiveModel) -> AppResult<task_request::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
