//! Work submission repository.

use std::sync::Arc;

use crate::entities::{WorkSubmission, work_submission};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use taskdesk_common::{AppError, AppResult};

/// Work submission repository for database operations.
#[derive(Clone)]
pub struct WorkSubmissionRepository {
    db: Arc<DatabaseConnection>,
}

impl WorkSubmissionRepository {
    /// Create a new work submission repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Submissions for a task, newest first.
    pub async fn find_by_task(&self, task_id: i32) -> AppResult<Vec<work_submission::Model>> {
        WorkSubmission::find()
            .filter(work_submission::Column::TaskId.eq(task_id))
            .order_by_desc(work_submission::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Record a submission.
    pub async fn create(
        &self,
        model: work_submission::ActiveModel,
    ) -> AppResult<work_submission::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
