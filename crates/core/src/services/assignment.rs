//! Assignment service.
//!
//! Admins hand tasks to freelancers, who accept or decline before an optional
//! deadline and later submit their work. Expiry is checked when the
//! freelancer responds; nothing sweeps stale assignments in the background.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::Serialize;
use taskdesk_common::{AppError, AppResult};
use taskdesk_db::entities::{Assignment, assignment, file_asset, invoice, task_request, user, work_submission};
use taskdesk_db::repositories::{AssignmentRepository, TaskRepository, UserRepository};

use super::asset::{AssetService, UploadedFile};
use super::billing::notify_invoice;
use super::notification::{DeliveryOutcome, NotificationService};
use super::task::{find_task_in, transition_in};
use crate::input::{non_empty, now};

use assignment::AssignmentStatus;
use task_request::TaskStatus;

/// Task statuses that move forward when a freelancer is assigned or accepts.
const PRE_WORK: [TaskStatus; 3] = [
    TaskStatus::Submitted,
    TaskStatus::Quoted,
    TaskStatus::PendingAccept,
];

/// A new assignment and the invite outcome.
#[derive(Debug, Clone)]
pub struct AssignmentCreated {
    pub assignment: assignment::Model,
    pub notification: DeliveryOutcome,
}

/// Result of a bulk assignment.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkAssignOutcome {
    pub created: usize,
    /// Missing tasks and tasks that already hold an active assignment.
    pub skipped: usize,
    /// Invites that could not be delivered.
    pub failed_notifications: usize,
}

/// A freelancer's answer to an assignment.
#[derive(Debug, Clone)]
pub struct AssignmentResponse {
    pub assignment: assignment::Model,
    pub task: task_request::Model,
    pub notifications: Vec<DeliveryOutcome>,
}

/// A recorded work submission.
#[derive(Debug, Clone)]
pub struct WorkSubmitted {
    pub submission: work_submission::Model,
    pub task: task_request::Model,
    pub assets: Vec<file_asset::Model>,
    /// Files rejected by the extension allow-list.
    pub skipped: usize,
    /// Review invoice issued because the task entered review.
    pub invoice: Option<invoice::Model>,
    pub notifications: Vec<DeliveryOutcome>,
}

/// Assignment service for business logic.
#[derive(Clone)]
pub struct AssignmentService {
    db: Arc<DatabaseConnection>,
    assignment_repo: AssignmentRepository,
    task_repo: TaskRepository,
    user_repo: UserRepository,
    assets: AssetService,
    notifications: NotificationService,
}

impl AssignmentService {
    /// Create a new assignment service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        assets: AssetService,
        notifications: NotificationService,
    ) -> Self {
        Self {
            assignment_repo: AssignmentRepository::new(Arc::clone(&db)),
            task_repo: TaskRepository::new(Arc::clone(&db)),
            user_repo: UserRepository::new(Arc::clone(&db)),
            db,
            assets,
            notifications,
        }
    }

    /// A freelancer's assignments, newest first.
    pub async fn freelancer_assignments(
        &self,
        freelancer: &user::Model,
    ) -> AppResult<Vec<assignment::Model>> {
        self.assignment_repo.find_by_assignee(freelancer.id).await
    }

    /// Assign a task to a freelancer and send the invite.
    pub async fn create_assignment(
        &self,
        admin: &user::Model,
        task_id: i32,
        assignee_id: i32,
        accept_expires_at: Option<DateTime<FixedOffset>>,
    ) -> AppResult<AssignmentCreated> {
        require_admin(admin)?;
        let assignee = self.active_freelancer(assignee_id).await?;
        self.assign(admin, task_id, &assignee, accept_expires_at).await
    }

    /// Assign many tasks to one freelancer.
    pub async fn bulk_assign(
        &self,
        admin: &user::Model,
        task_ids: &[i32],
        assignee_id: i32,
        accept_expires_at: Option<DateTime<FixedOffset>>,
    ) -> AppResult<BulkAssignOutcome> {
        require_admin(admin)?;
        let assignee = self.active_freelancer(assignee_id).await?;

        let mut outcome = BulkAssignOutcome::default();
        for &task_id in task_ids {
            match self.assign(admin, task_id, &assignee, accept_expires_at).await {
                Ok(created) => {
                    outcome.created += 1;
                    if !created.notification.is_delivered() {
                        outcome.failed_notifications += 1;
                    }
                }
                Err(AppError::NotFound(_) | AppError::Validation(_)) => outcome.skipped += 1,
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            assignee_id,
            created = outcome.created,
            skipped = outcome.skipped,
            "Bulk assignment"
        );
        Ok(outcome)
    }

    /// Accept or decline an assignment as its freelancer.
    pub async fn freelancer_respond(
        &self,
        freelancer: &user::Model,
        assignment_id: i32,
        accept: bool,
    ) -> AppResult<AssignmentResponse> {
        let assignment = self.assignment_repo.get_by_id(assignment_id).await?;
        if assignment.assignee_id != freelancer.id {
            return Err(AppError::Forbidden("Not your assignment".to_string()));
        }
        if !assignment.status.is_awaiting_response() {
            return Err(AppError::Validation(
                "This assignment is no longer awaiting a response.".to_string(),
            ));
        }

        let at = now();
        if assignment.is_past_deadline(at) {
            let mut active: assignment::ActiveModel = assignment.into();
            active.status = Set(AssignmentStatus::Expired);
            let expired = self.assignment_repo.update(active).await?;
            tracing::info!(assignment_id = expired.id, "Assignment expired before response");
            return Err(AppError::Validation(
                "This assignment has expired.".to_string(),
            ));
        }

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let task = find_task_in(&txn, assignment.task_id).await?;
        let (status, stamp) = if accept {
            (AssignmentStatus::Accepted, assignment::Column::AcceptedAt)
        } else {
            (AssignmentStatus::Declined, assignment::Column::DeclinedAt)
        };
        // Only one of two racing answers finds the row still awaiting a response
        let result = Assignment::update_many()
            .col_expr(assignment::Column::Status, Expr::value(status))
            .col_expr(stamp, Expr::value(Some(at)))
            .filter(assignment::Column::Id.eq(assignment.id))
            .filter(assignment::Column::Status.is_in([
                AssignmentStatus::Pending,
                AssignmentStatus::PendingAccept,
            ]))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        if result.rows_affected == 0 {
            return Err(AppError::Validation(
                "This assignment is no longer awaiting a response.".to_string(),
            ));
        }
        let assignment = Assignment::find_by_id(assignment.id)
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(format!("Assignment: {}", assignment.id)))?;

        let task = if accept && PRE_WORK.contains(&task.status) {
            transition_in(&txn, task, TaskStatus::InProgress).await?.0
        } else {
            task
        };

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(
            assignment_id = assignment.id,
            freelancer_id = freelancer.id,
            accepted = accept,
            "Assignment answered"
        );

        let mut notifications = Vec::new();
        for admin in self.user_repo.find_active_admins().await? {
            notifications.push(
                self.notifications
                    .assignment_response(&admin, freelancer, &task, accept)
                    .await,
            );
        }

        Ok(AssignmentResponse {
            assignment,
            task,
            notifications,
        })
    }

    /// Record deliverables for a task the freelancer is working on.
    ///
    /// A task in progress moves to review, which bills pay-on-delivery quotes.
    pub async fn submit_work(
        &self,
        freelancer: &user::Model,
        task_id: i32,
        comment: Option<String>,
        files: &[UploadedFile],
    ) -> AppResult<WorkSubmitted> {
        let assignment = self
            .assignment_repo
            .find_for_task_and_assignee(
                task_id,
                freelancer.id,
                &[AssignmentStatus::Accepted, AssignmentStatus::Pending],
            )
            .await?
            .ok_or_else(|| AppError::Forbidden("You are not assigned to this task".to_string()))?;
        let task = self.task_repo.get_by_id(task_id).await?;

        let comment = non_empty(comment);
        if comment.is_none() && !self.assets.any_storable(files) {
            return Err(AppError::Validation(
                "Attach at least one allowed file or add a comment.".to_string(),
            ));
        }

        let uploads = self
            .assets
            .store_all(
                freelancer.id,
                Some(task.id),
                file_asset::AssetKind::Work,
                &format!("freelancer/{}/tasks/{}", freelancer.id, task.id),
                files,
            )
            .await?;

        let files_json = serde_json::Value::Array(
            uploads
                .assets
                .iter()
                .map(|a| {
                    serde_json::json!({
                        "asset_id": a.id,
                        "filename": a.filename,
                        "path": a.path,
                    })
                })
                .collect(),
        );

        let recorded = self
            .record_submission(task.id, assignment.id, freelancer.id, comment, files_json)
            .await;
        let (submission, task, invoice) = match recorded {
            Ok(recorded) => recorded,
            Err(e) => {
                tracing::warn!(task_id, error = %e, "Work submission failed; removing uploads");
                self.assets.discard(&uploads.assets).await;
                return Err(e);
            }
        };

        tracing::info!(
            task_id = task.id,
            submission_id = submission.id,
            files = uploads.assets.len(),
            "Work submitted"
        );

        let mut notifications = Vec::new();
        for admin in self.user_repo.find_active_admins().await? {
            notifications.push(
                self.notifications
                    .work_submitted(&admin, freelancer, &task, uploads.assets.len())
                    .await,
            );
        }
        if let Some(invoice) = &invoice {
            notifications.push(notify_invoice(&self.notifications, &self.user_repo, &task, invoice).await);
        }

        Ok(WorkSubmitted {
            submission,
            task,
            assets: uploads.assets,
            skipped: uploads.skipped,
            invoice,
            notifications,
        })
    }

    /// Insert the submission and move an in-progress task to review, atomically.
    async fn record_submission(
        &self,
        task_id: i32,
        assignment_id: i32,
        freelancer_id: i32,
        comment: Option<String>,
        files_json: serde_json::Value,
    ) -> AppResult<(work_submission::Model, task_request::Model, Option<invoice::Model>)> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let submission = work_submission::ActiveModel {
            task_id: Set(task_id),
            assignment_id: Set(Some(assignment_id)),
            freelancer_id: Set(freelancer_id),
            comment: Set(comment),
            files_json: Set(files_json),
            created_at: Set(now()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let task = find_task_in(&txn, task_id).await?;
        let (task, invoice) = if task.status == TaskStatus::InProgress {
            transition_in(&txn, task, TaskStatus::Review).await?
        } else {
            (task, None)
        };

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok((submission, task, invoice))
    }

    async fn assign(
        &self,
        admin: &user::Model,
        task_id: i32,
        assignee: &user::Model,
        accept_expires_at: Option<DateTime<FixedOffset>>,
    ) -> AppResult<AssignmentCreated> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let task = find_task_in(&txn, task_id).await?;
        let active = Assignment::find()
            .filter(assignment::Column::TaskId.eq(task.id))
            .filter(assignment::Column::Status.is_in(AssignmentStatus::ACTIVE))
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        if active.is_some() {
            return Err(AppError::Validation(format!(
                "Task #{} already has an active assignment.",
                task.id
            )));
        }

        let assignment = assignment::ActiveModel {
            task_id: Set(task.id),
            assignee_id: Set(assignee.id),
            assigned_by: Set(Some(admin.id)),
            status: Set(AssignmentStatus::Pending),
            accept_expires_at: Set(accept_expires_at),
            accepted_at: Set(None),
            declined_at: Set(None),
            created_at: Set(now()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let task = if PRE_WORK.contains(&task.status) {
            transition_in(&txn, task, TaskStatus::PendingAccept).await?.0
        } else {
            task
        };

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(
            assignment_id = assignment.id,
            task_id = task.id,
            assignee_id = assignee.id,
            "Task assigned"
        );

        let notification = self
            .notifications
            .assignment_invite(assignee, &task, &assignment)
            .await;

        Ok(AssignmentCreated {
            assignment,
            notification,
        })
    }

    async fn active_freelancer(&self, user_id: i32) -> AppResult<user::Model> {
        match self.user_repo.find_by_id(user_id).await? {
            Some(u) if u.role == user::UserRole::Freelancer && u.is_active() => Ok(u),
            _ => Err(AppError::Validation(
                "Assignee must be an active freelancer.".to_string(),
            )),
        }
    }
}

fn require_admin(actor: &user::Model) -> AppResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin access required".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::notification::RecordingMailer;
    use chrono::Duration;
    use taskdesk_common::LocalStorage;
    use taskdesk_common::config::StorageSettings;
    use taskdesk_db::entities::{FileAsset, Invoice, quote};
    use taskdesk_db::repositories::FileAssetRepository;
    use taskdesk_db::test_utils::TestDatabase;

    struct Harness {
        db: TestDatabase,
        uploads: tempfile::TempDir,
        mailer: Arc<RecordingMailer>,
        service: AssignmentService,
        admin: user::Model,
        client: user::Model,
        freelancer: user::Model,
    }

    async fn harness() -> Harness {
        let db = TestDatabase::in_memory().await.unwrap();
        let admin = db.seed_user("admin@example.com", user::UserRole::Admin).await.unwrap();
        let client = db.seed_user("client@example.com", user::UserRole::Client).await.unwrap();
        let freelancer = db
            .seed_user("writer@example.com", user::UserRole::Freelancer)
            .await
            .unwrap();
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
        let service = AssignmentService::new(db.shared(), assets, notifications);
        Harness {
            db,
            uploads: dir,
            mailer,
            service,
            admin,
            client,
            freelancer,
        }
    }

    #[tokio::test]
    async fn test_create_assignment_moves_task_and_invites() {
        let h = harness().await;
        let task = h.db.seed_task(h.client.id, "Logo").await.unwrap();

        let created = h
            .service
            .create_assignment(&h.admin, task.id, h.freelancer.id, None)
            .await
            .unwrap();
        assert_eq!(created.assignment.status, AssignmentStatus::Pending);
        assert_eq!(created.assignment.assigned_by, Some(h.admin.id));
        assert_eq!(created.notification, DeliveryOutcome::Sent);
        assert_eq!(h.mailer.sent()[0].to, "writer@example.com");

        let task = h.service.task_repo.get_by_id(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::PendingAccept);

        let err = h
            .service
            .create_assignment(&h.admin, task.id, h.freelancer.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_assignee_must_be_active_freelancer() {
        let h = harness().await;
        let task = h.db.seed_task(h.client.id, "Logo").await.unwrap();
        let err = h
            .service
            .create_assignment(&h.admin, task.id, h.client.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_bulk_assign_skips_missing_and_taken() {
        let h = harness().await;
        let a = h.db.seed_task(h.client.id, "A").await.unwrap();
        let b = h.db.seed_task(h.client.id, "B").await.unwrap();
        h.service
            .create_assignment(&h.admin, b.id, h.freelancer.id, None)
            .await
            .unwrap();

        let outcome = h
            .service
            .bulk_assign(&h.admin, &[a.id, b.id, 777], h.freelancer.id, None)
            .await
            .unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.skipped, 2);
    }

    #[tokio::test]
    async fn test_accept_moves_task_in_progress() {
        let h = harness().await;
        let task = h.db.seed_task(h.client.id, "Logo").await.unwrap();
        let created = h
            .service
            .create_assignment(&h.admin, task.id, h.freelancer.id, Some(now() + Duration::days(2)))
            .await
            .unwrap();

        let response = h
            .service
            .freelancer_respond(&h.freelancer, created.assignment.id, true)
            .await
            .unwrap();
        assert_eq!(response.assignment.status, AssignmentStatus::Accepted);
        assert!(response.assignment.accepted_at.is_some());
        assert_eq!(response.task.status, TaskStatus::InProgress);
        assert_eq!(response.notifications, vec![DeliveryOutcome::Sent]);
        assert_eq!(h.mailer.sent_with_subject("Assignment accepted").len(), 1);

        let err = h
            .service
            .freelancer_respond(&h.freelancer, created.assignment.id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_racing_responses_settle_once() {
        let h = harness().await;
        let task = h.db.seed_task(h.client.id, "Logo").await.unwrap();
        let created = h
            .service
            .create_assignment(&h.admin, task.id, h.freelancer.id, None)
            .await
            .unwrap();
        let id = created.assignment.id;

        let (accepted, declined) = tokio::join!(
            h.service.freelancer_respond(&h.freelancer, id, true),
            h.service.freelancer_respond(&h.freelancer, id, false),
        );
        let stored = h.service.assignment_repo.get_by_id(id).await.unwrap();
        match (accepted, declined) {
            (Ok(won), Err(AppError::Validation(_))) => {
                assert_eq!(won.assignment.status, AssignmentStatus::Accepted);
                assert_eq!(stored.status, AssignmentStatus::Accepted);
                assert!(stored.declined_at.is_none());
            }
            (Err(AppError::Validation(_)), Ok(won)) => {
                assert_eq!(won.assignment.status, AssignmentStatus::Declined);
                assert_eq!(stored.status, AssignmentStatus::Declined);
                assert!(stored.accepted_at.is_none());
            }
            (a, b) => panic!("expected exactly one answer to win: {a:?} / {b:?}"),
        }
    }

    #[tokio::test]
    async fn test_expired_assignment_is_marked_and_rejected() {
        let h = harness().await;
        let task = h.db.seed_task(h.client.id, "Logo").await.unwrap();
        let created = h
            .service
            .create_assignment(&h.admin, task.id, h.freelancer.id, Some(now() - Duration::hours(1)))
            .await
            .unwrap();

        let err = h
            .service
            .freelancer_respond(&h.freelancer, created.assignment.id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let stored = h.service.assignment_repo.get_by_id(created.assignment.id).await.unwrap();
        assert_eq!(stored.status, AssignmentStatus::Expired);

        // The expired claim no longer blocks reassignment.
        assert!(h
            .service
            .create_assignment(&h.admin, task.id, h.freelancer.id, None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_only_assignee_may_respond() {
        let h = harness().await;
        let other = h.db.seed_user("other@example.com", user::UserRole::Freelancer).await.unwrap();
        let task = h.db.seed_task(h.client.id, "Logo").await.unwrap();
        let created = h
            .service
            .create_assignment(&h.admin, task.id, h.freelancer.id, None)
            .await
            .unwrap();

        let err = h
            .service
            .freelancer_respond(&other, created.assignment.id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_submit_work_enters_review_and_bills() {
        let h = harness().await;
        let task = h.db.seed_task(h.client.id, "Report").await.unwrap();
        h.db.seed_quote(task.id, 500.0, quote::PayOption::PayOnDelivery, quote::QuoteStatus::Accepted)
            .await
            .unwrap();
        let created = h
            .service
            .create_assignment(&h.admin, task.id, h.freelancer.id, None)
            .await
            .unwrap();
        h.service
            .freelancer_respond(&h.freelancer, created.assignment.id, true)
            .await
            .unwrap();

        let files = vec![
            UploadedFile {
                filename: "final report.pdf".to_string(),
                content_type: Some("application/pdf".to_string()),
                data: b"%PDF".to_vec(),
            },
            UploadedFile {
                filename: "tool.exe".to_string(),
                content_type: None,
                data: b"MZ".to_vec(),
            },
        ];
        let submitted = h
            .service
            .submit_work(&h.freelancer, task.id, Some("Done".to_string()), &files)
            .await
            .unwrap();

        assert_eq!(submitted.task.status, TaskStatus::Review);
        assert_eq!(submitted.skipped, 1);
        assert_eq!(
            submitted.assets[0].path,
            format!("freelancer/{}/tasks/{}/final_report.pdf", h.freelancer.id, task.id)
        );
        assert_eq!(submitted.assets[0].kind, file_asset::AssetKind::Work);
        assert_eq!(submitted.submission.files_json[0]["filename"], "final_report.pdf");

        let invoice = submitted.invoice.unwrap();
        assert_eq!(invoice.amount, 500.0);
        assert_eq!(Invoice::find().all(h.db.connection()).await.unwrap().len(), 1);
        assert_eq!(h.mailer.sent_with_subject("Work submitted").len(), 1);
        assert_eq!(h.mailer.sent_with_subject("Invoice issued").len(), 1);
    }

    #[tokio::test]
    async fn test_submit_work_requires_assignment() {
        let h = harness().await;
        let task = h.db.seed_task(h.client.id, "Report").await.unwrap();
        let err = h
            .service
            .submit_work(&h.freelancer, task.id, Some("Done".to_string()), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(FileAsset::find().all(h.db.connection()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_submission_stores_nothing() {
        let h = harness().await;
        let task = h.db.seed_task(h.client.id, "Report").await.unwrap();
        let created = h
            .service
            .create_assignment(&h.admin, task.id, h.freelancer.id, None)
            .await
            .unwrap();
        h.service
            .freelancer_respond(&h.freelancer, created.assignment.id, true)
            .await
            .unwrap();

        let files = vec![UploadedFile {
            filename: "tool.exe".to_string(),
            content_type: None,
            data: b"MZ".to_vec(),
        }];
        let err = h
            .service
            .submit_work(&h.freelancer, task.id, None, &files)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(FileAsset::find().all(h.db.connection()).await.unwrap().is_empty());
        assert!(!h.uploads.path().join("freelancer").exists());
    }
}
