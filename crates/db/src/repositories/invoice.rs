//! Invoice repository.

use std::sync::Arc;

use crate::entities::{Invoice, invoice};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    sea_query::Expr,
};
use taskdesk_common::{AppError, AppResult};

/// Invoice repository for database operations.
#[derive(Clone)]
pub struct InvoiceRepository {
    db: Arc<DatabaseConnection>,
}

impl InvoiceRepository {
    /// Create a new invoice repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an invoice by ID.
    pub async fn find_by_id(&self, id: i32) -> AppResult<Option<invoice::Model>> {
        Invoice::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get an invoice by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: i32) -> AppResult<invoice::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Invoice: {id}")))
    }

    /// Invoices of a task, newest first.
    pub async fn find_by_task(&self, task_id: i32) -> AppResult<Vec<invoice::Model>> {
        Invoice::find()
            .filter(invoice::Column::TaskId.eq(task_id))
            .order_by_desc(invoice::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// The unpaid invoice of a task, if any.
    pub async fn find_unpaid_for_task(&self, task_id: i32) -> AppResult<Option<invoice::Model>> {
        Invoice::find()
            .filter(invoice::Column::TaskId.eq(task_id))
            .filter(invoice::Column::Status.eq(invoice::InvoiceStatus::Unpaid))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Latest invoice carrying this merchant reference.
    pub async fn find_by_merchant_ref(&self, merchant_ref: &str) -> AppResult<Option<invoice::Model>> {
        Invoice::find()
            .filter(invoice::Column::PesapalMerchantRef.eq(merchant_ref))
            .order_by_desc(invoice::Column::Id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Latest invoice carrying this gateway tracking id.
    pub async fn find_by_tracking_id(&self, tracking_id: &str) -> AppResult<Option<invoice::Model>> {
        Invoice::find()
            .filter(invoice::Column::PesapalTrackingId.eq(tracking_id))
            .order_by_desc(invoice::Column::Id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update an invoice.
    pub async fn update(&self, model: invoice::ActiveModel) -> AppResult<invoice::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Mark an unpaid invoice paid.
    ///
    /// Returns `true` only for the call that performed the transition, so
    /// concurrent callbacks agree on who sends the receipt. Void and refunded
    /// invoices are never settled by a gateway callback.
    pub async fn mark_paid_if_unpaid(
        &self,
        id: i32,
        paid_at: chrono::DateTime<chrono::FixedOffset>,
    ) -> AppResult<bool> {
        let result = Invoice::update_many()
            .col_expr(
                invoice::Column::Status,
                Expr::value(invoice::InvoiceStatus::Paid),
            )
            .col_expr(invoice::Column::PaidAt, Expr::value(Some(paid_at)))
            .filter(invoice::Column::Id.eq(id))
            .filter(invoice::Column::Status.eq(invoice::InvoiceStatus::Unpaid))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }

    /// Keep a failed or reversed payment open as unpaid.
    ///
    /// Only rows still unpaid match, so paid, void and refunded invoices are
    /// left alone. Returns whether the invoice is still open.
    pub async fn mark_unpaid_if_open(&self, id: i32) -> AppResult<bool> {
        let result = Invoice::update_many()
            .col_expr(
                invoice::Column::Status,
                Expr::value(invoice::InvoiceStatus::Unpaid),
            )
            .filter(invoice::Column::Id.eq(id))
            .filter(invoice::Column::Status.eq(invoice::InvoiceStatus::Unpaid))
            .exec(self.db.as_ref())
            .await
            .map_err(crate::db_error)?;

        Ok(result.rows_affected == 1)
    }
}
