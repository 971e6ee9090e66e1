//! Assignment repository.

use std::sync::Arc;

use crate::entities::{Assignment, assignment};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use taskdesk_common::{AppError, AppResult};

/// Assignment repository for database operations.
#[derive(Clone)]
pub struct AssignmentRepository {
    db: Arc<DatabaseConnection>,
}

impl AssignmentRepository {
    /// Create a new assignment repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an assignment by ID.
    pub async fn find_by_id(&self, id: i32) -> AppResult<Option<assignment::Model>> {
        Assignment::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get an assignment by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: i32) -> AppResult<assignment::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Assignment: {id}")))
    }

    /// Assignments held by a freelancer, newest first.
    pub async fn find_by_assignee(&self, assignee_id: i32) -> AppResult<Vec<assignment::Model>> {
        Assignment::find()
            .filter(assignment::Column::AssigneeId.eq(assignee_id))
            .order_by_desc(assignment::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Latest assignment on a task that still holds a claim.
    pub async fn find_active_for_task(&self, task_id: i32) -> AppResult<Option<assignment::Model>> {
        Assignment::find()
            .filter(assignment::Column::TaskId.eq(task_id))
            .filter(assignment::Column::Status.is_in(assignment::AssignmentStatus::ACTIVE))
            .order_by_desc(assignment::Column::Id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// The freelancer's latest assignment on a task in one of `statuses`.
    pub async fn find_for_task_and_assignee(
        &self,
        task_id: i32,
        assignee_id: i32,
        statuses: &[assignment::AssignmentStatus],
    ) -> AppResult<Option<assignment::Model>> {
        Assignment::find()
            .filter(assignment::Column::TaskId.eq(task_id))
            .filter(assignment::Column::AssigneeId.eq(assignee_id))
            .filter(assignment::Column::Status.is_in(statuses.iter().copied()))
            .order_by_desc(assignment::Column::Id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update an assignment.
    pub async fn update(&self, model: assignment::ActiveModel) -> AppResult<assignment::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
