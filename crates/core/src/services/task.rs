//! Task lifecycle service.
//!
//! Status changes are permissive: any status may follow any other, the request
//! only has to name a valid status. Entering review bills pay-on-delivery
//! quotes in the same transaction.

use std::sync::Arc;

use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use taskdesk_common::{AppError, AppResult};
use taskdesk_db::entities::{TaskRequest, file_asset, invoice, meeting, quote, task_request, user};
use taskdesk_db::repositories::{
    InvoiceRepository, MeetingRepository, QuoteRepository, TaskRepository, UserRepository,
};
use validator::Validate;

use super::asset::{AssetService, StoredUploads, UploadedFile};
use super::billing::{ensure_review_invoice_in, notify_invoice};
use super::notification::{DeliveryOutcome, NotificationService};
use crate::input::{non_empty, now, parse_optional_amount, parse_optional_datetime};

use task_request::TaskStatus;

/// Statuses from which a client may no longer cancel.
const NOT_CANCELLABLE: [TaskStatus; 5] = [
    TaskStatus::InProgress,
    TaskStatus::Review,
    TaskStatus::ReviewScheduled,
    TaskStatus::Delivered,
    TaskStatus::Closed,
];

/// Input for a new task request.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateTaskInput {
    #[validate(length(max = 200, message = "Title is too long."))]
    pub title: String,

    #[validate(length(max = 100))]
    pub category: Option<String>,

    #[validate(length(max = 10000))]
    pub description: Option<String>,

    /// `datetime-local` or RFC 3339
    pub deadline: Option<String>,

    pub budget: Option<String>,

    #[validate(length(max = 16))]
    pub priority: Option<String>,
}

/// Result of a status change.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub task: task_request::Model,
    pub previous: TaskStatus,
    /// Invoice issued because the task entered review.
    pub invoice: Option<invoice::Model>,
    pub notification: Option<DeliveryOutcome>,
}

impl StatusChange {
    #[must_use]
    pub const fn invoice_created(&self) -> bool {
        self.invoice.is_some()
    }
}

/// Result of a bulk status change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkStatusOutcome {
    pub updated: usize,
    pub missing: usize,
}

/// A task created together with its attachments.
#[derive(Debug, Clone)]
pub struct TaskCreated {
    pub task: task_request::Model,
    pub uploads: StoredUploads,
}

/// A task with everything a detail page shows.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    pub task: task_request::Model,
    pub quotes: Vec<quote::Model>,
    pub invoices: Vec<invoice::Model>,
    pub assets: Vec<file_asset::Model>,
    pub meetings: Vec<meeting::Model>,
}

/// Assign `status` inside `conn`, billing the task if it enters review.
pub(crate) async fn transition_in<C: ConnectionTrait>(
    conn: &C,
    task: task_request::Model,
    status: TaskStatus,
) -> AppResult<(task_request::Model, Option<invoice::Model>)> {
    let task_id = task.id;
    let previous = task.status;

    let mut active: task_request::ActiveModel = task.into();
    active.status = Set(status);
    active.updated_at = Set(Some(now()));
    let task = active
        .update(conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    tracing::info!(task_id, from = %previous, to = %status, "Task status changed");

    let invoice = if status.triggers_review_invoice() {
        ensure_review_invoice_in(conn, task_id).await?
    } else {
        None
    };
    Ok((task, invoice))
}

/// Load a task inside `conn`.
pub(crate) async fn find_task_in<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
) -> AppResult<task_request::Model> {
    TaskRequest::find_by_id(task_id)
        .one(conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("Task: {task_id}")))
}

/// Task service for business logic.
#[derive(Clone)]
pub struct TaskService {
    db: Arc<DatabaseConnection>,
    task_repo: TaskRepository,
    quote_repo: QuoteRepository,
    invoice_repo: InvoiceRepository,
    meeting_repo: MeetingRepository,
    user_repo: UserRepository,
    assets: AssetService,
    notifications: NotificationService,
}

impl TaskService {
    /// Create a new task service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        assets: AssetService,
        notifications: NotificationService,
    ) -> Self {
        Self {
            task_repo: TaskRepository::new(Arc::clone(&db)),
            quote_repo: QuoteRepository::new(Arc::clone(&db)),
            invoice_repo: InvoiceRepository::new(Arc::clone(&db)),
            meeting_repo: MeetingRepository::new(Arc::clone(&db)),
            user_repo: UserRepository::new(Arc::clone(&db)),
            db,
            assets,
            notifications,
        }
    }

    // ==================== Status ====================

    /// Set a task's status from a form value.
    pub async fn set_status(&self, task_id: i32, requested: &str) -> AppResult<StatusChange> {
        let status = TaskStatus::parse_requested(requested)
            .ok_or_else(|| AppError::Validation(format!("Invalid status: {}", requested.trim())))?;
        self.apply_status(task_id, status).await
    }

    /// Move a task to `archived`.
    pub async fn archive(&self, task_id: i32) -> AppResult<StatusChange> {
        self.apply_status(task_id, TaskStatus::Archived).await
    }

    /// Bring an archived task back as `submitted`.
    pub async fn unarchive(&self, task_id: i32) -> AppResult<StatusChange> {
        self.apply_status(task_id, TaskStatus::Submitted).await
    }

    /// Apply one status to many tasks. Missing tasks are counted, not fatal.
    pub async fn bulk_set_status(
        &self,
        task_ids: &[i32],
        requested: &str,
    ) -> AppResult<BulkStatusOutcome> {
        let status = TaskStatus::parse_requested(requested)
            .ok_or_else(|| AppError::Validation(format!("Invalid status: {}", requested.trim())))?;

        let mut outcome = BulkStatusOutcome::default();
        for &task_id in task_ids {
            match self.apply_status(task_id, status).await {
                Ok(_) => outcome.updated += 1,
                Err(AppError::NotFound(_)) => outcome.missing += 1,
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            status = %status,
            updated = outcome.updated,
            missing = outcome.missing,
            "Bulk status change"
        );
        Ok(outcome)
    }

    /// Issue the review invoice for a task if it needs one.
    pub async fn ensure_review_invoice(&self, task_id: i32) -> AppResult<Option<invoice::Model>> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        let created = ensure_review_invoice_in(&txn, task_id).await?;
        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(created)
    }

    async fn apply_status(&self, task_id: i32, status: TaskStatus) -> AppResult<StatusChange> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let task = find_task_in(&txn, task_id).await?;
        let previous = task.status;
        let (task, invoice) = transition_in(&txn, task, status).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let notification = match &invoice {
            Some(invoice) => {
                Some(notify_invoice(&self.notifications, &self.user_repo, &task, invoice).await)
            }
            None => None,
        };

        Ok(StatusChange {
            task,
            previous,
            invoice,
            notification,
        })
    }

    // ==================== Client ====================

    /// Create a task request with optional attachments.
    pub async fn create_task(
        &self,
        client: &user::Model,
        input: CreateTaskInput,
        attachments: &[UploadedFile],
    ) -> AppResult<TaskCreated> {
        if client.role != user::UserRole::Client {
            return Err(AppError::Forbidden("Only clients can submit tasks".to_string()));
        }
        input.validate()?;

        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::Validation("Title is required.".to_string()));
        }
        let budget = parse_optional_amount(input.budget.as_deref())?;
        let deadline = parse_optional_datetime(input.deadline.as_deref())?;

        let model = task_request::ActiveModel {
            client_id: Set(client.id),
            title: Set(title),
            category: Set(non_empty(input.category)),
            description: Set(non_empty(input.description)),
            admin_notes: Set(None),
            deadline_at: Set(deadline),
            client_budget: Set(budget),
            priority: Set(non_empty(input.priority).unwrap_or_else(|| "normal".to_string())),
            status: Set(TaskStatus::Submitted),
            created_at: Set(now()),
            updated_at: Set(None),
            ..Default::default()
        };
        let task = self.task_repo.create(model).await?;
        tracing::info!(task_id = task.id, client_id = client.id, "Task submitted");

        let uploads = self
            .assets
            .store_all(
                client.id,
                Some(task.id),
                file_asset::AssetKind::Attachment,
                &client_task_dir(client.id, task.id),
                attachments,
            )
            .await?;

        Ok(TaskCreated { task, uploads })
    }

    /// Attach more files to one of the client's tasks.
    pub async fn add_attachments(
        &self,
        client: &user::Model,
        task_id: i32,
        files: &[UploadedFile],
    ) -> AppResult<StoredUploads> {
        let task = self.owned_task(client, task_id).await?;
        self.assets
            .store_all(
                client.id,
                Some(task.id),
                file_asset::AssetKind::Attachment,
                &client_task_dir(client.id, task.id),
                files,
            )
            .await
    }

    /// Cancel one of the client's tasks before work has started.
    pub async fn client_cancel(
        &self,
        client: &user::Model,
        task_id: i32,
    ) -> AppResult<task_request::Model> {
        let task = self.owned_task(client, task_id).await?;
        if NOT_CANCELLABLE.contains(&task.status) {
            return Err(AppError::Validation(format!(
                "A task that is {} can no longer be cancelled.",
                task.status.as_str().replace('_', " ")
            )));
        }

        let change = self.apply_status(task.id, TaskStatus::Cancelled).await?;
        Ok(change.task)
    }

    // ==================== Views ====================

    /// Tasks submitted by a client, newest first.
    pub async fn client_tasks(&self, client: &user::Model) -> AppResult<Vec<task_request::Model>> {
        self.task_repo.find_by_client(client.id).await
    }

    /// All tasks, optionally filtered by status.
    pub async fn admin_tasks(&self, status: Option<&str>) -> AppResult<Vec<task_request::Model>> {
        let status = match status.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                TaskStatus::parse_requested(raw)
                    .ok_or_else(|| AppError::Validation(format!("Invalid status: {raw}")))?,
            ),
            None => None,
        };
        self.task_repo.list(status).await
    }

    /// A task with its quotes, invoices, assets and meetings.
    ///
    /// Visible to the owning client and to admins.
    pub async fn task_detail(&self, actor: &user::Model, task_id: i32) -> AppResult<TaskDetail> {
        let task = self.task_repo.get_by_id(task_id).await?;
        if !actor.is_admin() && task.client_id != actor.id {
            return Err(AppError::Forbidden("Not your task".to_string()));
        }

        Ok(TaskDetail {
            quotes: self.quote_repo.find_by_task(task.id).await?,
            invoices: self.invoice_repo.find_by_task(task.id).await?,
            assets: self.assets.task_assets(task.id).await?,
            meetings: self.meeting_repo.find_by_task(task.id).await?,
            task,
        })
    }

    async fn owned_task(
        &self,
        client: &user::Model,
        task_id: i32,
    ) -> AppResult<task_request::Model> {
        let task = self.task_repo.get_by_id(task_id).await?;
        if task.client_id != client.id {
            return Err(AppError::Forbidden("Not your task".to_string()));
        }
        Ok(task)
    }
}

fn client_task_dir(client_id: i32, task_id: i32) -> String {
    format!("client/{client_id}/tasks/{task_id}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::notification::RecordingMailer;
    use taskdesk_common::LocalStorage;
    use taskdesk_common::config::StorageSettings;
    use taskdesk_db::entities::Invoice;
    use taskdesk_db::repositories::FileAssetRepository;
    use taskdesk_db::test_utils::TestDatabase;

    struct Harness {
        db: TestDatabase,
        _dir: tempfile::TempDir,
        mailer: Arc<RecordingMailer>,
        service: TaskService,
        client: user::Model,
    }

    async fn harness() -> Harness {
        let db = TestDatabase::in_memory().await.unwrap();
        let client = db.seed_user("client@example.com", user::UserRole::Client).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mailer = Arc::new(RecordingMailer::new());
        let notifications = NotificationService::new(
            mailer.clone(),
            Some("no-reply@taskdesk.test".to_string()),
            false,
            "https://taskdesk.test".to_string(),
        );
        let assets = AssetService::new(
            Arc::new(LocalStorage::new(dir.path().to_path_buf())),
            FileAssetRepository::new(db.shared()),
            &StorageSettings::default(),
        );
        let service = TaskService::new(db.shared(), assets, notifications);
        Harness {
            db,
            _dir: dir,
            mailer,
            service,
            client,
        }
    }

    #[tokio::test]
    async fn test_invalid_status_is_rejected_without_change() {
        let h = harness().await;
        let task = h.db.seed_task(h.client.id, "Logo").await.unwrap();

        let err = h.service.set_status(task.id, "done").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let stored = h.service.task_repo.get_by_id(task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Submitted);
    }

    #[tokio::test]
    async fn test_canceled_is_stored_as_cancelled() {
        let h = harness().await;
        let task = h.db.seed_task(h.client.id, "Logo").await.unwrap();

        let change = h.service.set_status(task.id, "Canceled").await.unwrap();
        assert_eq!(change.task.status, TaskStatus::Cancelled);
        assert_eq!(change.previous, TaskStatus::Submitted);
    }

    #[tokio::test]
    async fn test_missing_task_is_not_found() {
        let h = harness().await;
        let err = h.service.set_status(999, "review").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_review_bills_pay_on_delivery_once() {
        let h = harness().await;
        let task = h.db.seed_task(h.client.id, "Website copy").await.unwrap();
        h.db.seed_quote(task.id, 500.0, quote::PayOption::PayOnDelivery, quote::QuoteStatus::Accepted)
            .await
            .unwrap();

        let change = h.service.set_status(task.id, "review").await.unwrap();
        assert!(change.invoice_created());
        assert_eq!(change.notification, Some(DeliveryOutcome::Sent));

        let again = h.service.set_status(task.id, "review_scheduled").await.unwrap();
        assert!(!again.invoice_created());
        assert!(again.notification.is_none());

        let invoices = Invoice::find().all(h.db.connection()).await.unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].amount, 500.0);
        assert_eq!(h.mailer.sent_with_subject("Invoice issued").len(), 1);
    }

    #[tokio::test]
    async fn test_archive_and_bulk() {
        let h = harness().await;
        let a = h.db.seed_task(h.client.id, "A").await.unwrap();
        let b = h.db.seed_task(h.client.id, "B").await.unwrap();

        let archived = h.service.archive(a.id).await.unwrap();
        assert_eq!(archived.task.status, TaskStatus::Archived);
        let restored = h.service.unarchive(a.id).await.unwrap();
        assert_eq!(restored.task.status, TaskStatus::Submitted);

        let outcome = h
            .service
            .bulk_set_status(&[a.id, b.id, 4040], "closed")
            .await
            .unwrap();
        assert_eq!(outcome, BulkStatusOutcome { updated: 2, missing: 1 });

        let err = h.service.bulk_set_status(&[a.id], "bogus").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_task_with_attachments() {
        let h = harness().await;
        let input = CreateTaskInput {
            title: "  Annual report  ".to_string(),
            budget: Some("1,200,000".to_string()),
            deadline: Some("2030-01-15T09:00".to_string()),
            ..Default::default()
        };
        let files = vec![
            UploadedFile {
                filename: "brief.docx".to_string(),
                content_type: None,
                data: b"PK".to_vec(),
            },
            UploadedFile {
                filename: "run.sh".to_string(),
                content_type: None,
                data: b"#!".to_vec(),
            },
        ];

        let created = h.service.create_task(&h.client, input, &files).await.unwrap();
        assert_eq!(created.task.title, "Annual report");
        assert_eq!(created.task.client_budget, Some(1_200_000.0));
        assert_eq!(created.task.status, TaskStatus::Submitted);
        assert_eq!(created.uploads.skipped, 1);
        assert_eq!(
            created.uploads.assets[0].path,
            format!("client/{}/tasks/{}/brief.docx", h.client.id, created.task.id)
        );
    }

    #[tokio::test]
    async fn test_create_task_validation() {
        let h = harness().await;
        let blank = CreateTaskInput {
            title: "   ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            h.service.create_task(&h.client, blank, &[]).await,
            Err(AppError::Validation(_))
        ));

        let negative = CreateTaskInput {
            title: "Ok".to_string(),
            budget: Some("-5".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            h.service.create_task(&h.client, negative, &[]).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_client_cancel_rules() {
        let h = harness().await;
        let other = h.db.seed_user("other@example.com", user::UserRole::Client).await.unwrap();
        let task = h.db.seed_task(h.client.id, "Flyer").await.unwrap();

        let err = h.service.client_cancel(&other, task.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        h.service.set_status(task.id, "in_progress").await.unwrap();
        let err = h.service.client_cancel(&h.client, task.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        h.service.set_status(task.id, "quoted").await.unwrap();
        let cancelled = h.service.client_cancel(&h.client, task.id).await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_task_detail_visibility() {
        let h = harness().await;
        let admin = h.db.seed_user("admin@example.com", user::UserRole::Admin).await.unwrap();
        let stranger = h.db.seed_user("x@example.com", user::UserRole::Freelancer).await.unwrap();
        let task = h.db.seed_task(h.client.id, "Poster").await.unwrap();
        h.db.seed_quote(task.id, 80.0, quote::PayOption::PayNow, quote::QuoteStatus::Sent)
            .await
            .unwrap();

        let detail = h.service.task_detail(&admin, task.id).await.unwrap();
        assert_eq!(detail.quotes.len(), 1);
        assert!(h.service.task_detail(&h.client, task.id).await.is_ok());
        assert!(matches!(
            h.service.task_detail(&stranger, task.id).await,
            Err(AppError::Forbidden(_))
        ));
    }
}
