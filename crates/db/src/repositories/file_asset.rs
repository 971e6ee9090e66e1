//! File asset repository.

use std::sync::Arc;

use crate::entities::{FileAsset, file_asset};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use taskdesk_common::{AppError, AppResult};

/// File asset repository for database operations.
#[derive(Clone)]
pub struct FileAssetRepository {
    db: Arc<DatabaseConnection>,
}

impl FileAssetRepository {
    /// Create a new file asset repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an asset by ID.
    pub async fn find_by_id(&self, id: i32) -> AppResult<Option<file_asset::Model>> {
        FileAsset::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get an asset by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: i32) -> AppResult<file_asset::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File: {id}")))
    }

    /// Assets attached to a task, oldest first.
    pub async fn find_by_task(&self, task_id: i32) -> AppResult<Vec<file_asset::Model>> {
        FileAsset::find()
            .filter(file_asset::Column::TaskId.eq(task_id))
            .order_by_asc(file_asset::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Remove an asset row.
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        FileAsset::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Record a stored upload.
    pub async fn create(&self, model: file_asset::ActiveModel) -> AppResult<file_asset::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
