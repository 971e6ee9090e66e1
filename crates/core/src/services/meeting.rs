//! Review meeting service.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set, TransactionTrait};
use serde::Deserialize;
use taskdesk_common::{AppError, AppResult};
use taskdesk_db::entities::{invoice, meeting, task_request, user};
use taskdesk_db::repositories::{MeetingRepository, TaskRepository, UserRepository};

use super::billing::{notify_invoice, task_client};
use super::notification::{DeliveryOutcome, NotificationService};
use super::task::{find_task_in, transition_in};
use crate::input::{non_empty, now};

use meeting::MeetingStatus;
use task_request::TaskStatus;

const DEFAULT_PROVIDER: &str = "google_meet";
const DEFAULT_DURATION_MINUTES: i32 = 30;

/// Input for scheduling a review meeting.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleMeetingInput {
    pub scheduled_for: DateTime<FixedOffset>,
    pub duration_minutes: Option<i32>,
    pub join_url: Option<String>,
    pub notes: Option<String>,
    pub provider: Option<String>,
}

/// A meeting after a change, with the emails it triggered.
#[derive(Debug, Clone)]
pub struct MeetingUpdate {
    pub meeting: meeting::Model,
    pub task: task_request::Model,
    /// Review invoice issued because the task entered review_scheduled.
    pub invoice: Option<invoice::Model>,
    pub notification: DeliveryOutcome,
    pub invoice_notification: Option<DeliveryOutcome>,
}

/// Meeting service for business logic.
#[derive(Clone)]
pub struct MeetingService {
    db: Arc<DatabaseConnection>,
    meeting_repo: MeetingRepository,
    task_repo: TaskRepository,
    user_repo: UserRepository,
    notifications: NotificationService,
}

impl MeetingService {
    /// Create a new meeting service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, notifications: NotificationService) -> Self {
        Self {
            meeting_repo: MeetingRepository::new(Arc::clone(&db)),
            task_repo: TaskRepository::new(Arc::clone(&db)),
            user_repo: UserRepository::new(Arc::clone(&db)),
            db,
            notifications,
        }
    }

    pub async fn task_meetings(&self, task_id: i32) -> AppResult<Vec<meeting::Model>> {
        self.meeting_repo.find_by_task(task_id).await
    }

    /// Schedule a review meeting and email the client an invite.
    pub async fn schedule(
        &self,
        admin: &user::Model,
        task_id: i32,
        input: ScheduleMeetingInput,
    ) -> AppResult<MeetingUpdate> {
        require_admin(admin)?;
        let duration = input.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        if duration <= 0 {
            return Err(AppError::Validation(
                "Meeting duration must be positive.".to_string(),
            ));
        }

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let task = find_task_in(&txn, task_id).await?;
        let created = meeting::ActiveModel {
            task_id: Set(task.id),
            provider: Set(non_empty(input.provider).unwrap_or_else(|| DEFAULT_PROVIDER.to_string())),
            status: Set(MeetingStatus::Scheduled),
            scheduled_for: Set(input.scheduled_for),
            duration_minutes: Set(duration),
            join_url: Set(non_empty(input.join_url)),
            notes: Set(non_empty(input.notes)),
            created_by_id: Set(Some(admin.id)),
            invite_uid: Set(None),
            created_at: Set(now()),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let uid = invite_uid(task.id, created.id);
        let mut active: meeting::ActiveModel = created.into();
        active.invite_uid = Set(Some(uid));
        let meeting = active
            .update(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let (task, invoice) = if task.status == TaskStatus::Review {
            transition_in(&txn, task, TaskStatus::ReviewScheduled).await?
        } else {
            (task, None)
        };

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(
            meeting_id = meeting.id,
            task_id = task.id,
            scheduled_for = %meeting.scheduled_for,
            "Review meeting scheduled"
        );

        self.finish(meeting, task, invoice).await
    }

    /// Move a meeting to a new time.
    pub async fn reschedule(
        &self,
        admin: &user::Model,
        meeting_id: i32,
        scheduled_for: DateTime<FixedOffset>,
        duration_minutes: Option<i32>,
    ) -> AppResult<MeetingUpdate> {
        require_admin(admin)?;
        let existing = self.meeting_repo.get_by_id(meeting_id).await?;
        if matches!(existing.status, MeetingStatus::Canceled | MeetingStatus::Completed) {
            return Err(AppError::Validation(
                "This meeting can no longer be rescheduled.".to_string(),
            ));
        }

        let mut active: meeting::ActiveModel = existing.into();
        active.status = Set(MeetingStatus::Rescheduled);
        active.scheduled_for = Set(scheduled_for);
        if let Some(minutes) = duration_minutes.filter(|m| *m > 0) {
            active.duration_minutes = Set(minutes);
        }
        active.updated_at = Set(Some(now()));
        let meeting = self.meeting_repo.update(active).await?;

        tracing::info!(meeting_id = meeting.id, scheduled_for = %meeting.scheduled_for, "Review meeting rescheduled");
        let task = self.task_repo.get_by_id(meeting.task_id).await?;
        self.finish(meeting, task, None).await
    }

    /// Cancel a meeting.
    pub async fn cancel(&self, admin: &user::Model, meeting_id: i32) -> AppResult<MeetingUpdate> {
        self.set_status(admin, meeting_id, MeetingStatus::Canceled).await
    }

    /// Mark a meeting as held.
    pub async fn complete(&self, admin: &user::Model, meeting_id: i32) -> AppResult<MeetingUpdate> {
        self.set_status(admin, meeting_id, MeetingStatus::Completed).await
    }

    /// Calendar invite for a meeting, for admins and the task's client.
    pub async fn invite(&self, actor: &user::Model, meeting_id: i32) -> AppResult<String> {
        let meeting = self.meeting_repo.get_by_id(meeting_id).await?;
        let task = self.task_repo.get_by_id(meeting.task_id).await?;
        if !actor.is_admin() && task.client_id != actor.id {
            return Err(AppError::Forbidden("Not your meeting".to_string()));
        }
        Ok(render_ics(&meeting, &task))
    }

    async fn set_status(
        &self,
        admin: &user::Model,
        meeting_id: i32,
        status: MeetingStatus,
    ) -> AppResult<MeetingUpdate> {
        require_admin(admin)?;
        let existing = self.meeting_repo.get_by_id(meeting_id).await?;
        let previous = existing.status;

        let mut active: meeting::ActiveModel = existing.into();
        active.status = Set(status);
        active.updated_at = Set(Some(now()));
        let meeting = self.meeting_repo.update(active).await?;

        tracing::info!(meeting_id = meeting.id, from = ?previous, to = ?status, "Meeting status changed");
        let task = self.task_repo.get_by_id(meeting.task_id).await?;
        self.finish(meeting, task, None).await
    }

    async fn finish(
        &self,
        meeting: meeting::Model,
        task: task_request::Model,
        invoice: Option<invoice::Model>,
    ) -> AppResult<MeetingUpdate> {
        let notification = match task_client(&self.user_repo, &task).await {
            Some(client) => {
                self.notifications
                    .meeting_update(&client, &task, &meeting, render_ics(&meeting, &task))
                    .await
            }
            None => DeliveryOutcome::Skipped("client not found".to_string()),
        };

        let invoice_notification = match &invoice {
            Some(invoice) => Some(notify_invoice(&self.notifications, &self.user_repo, &task, invoice).await),
            None => None,
        };

        Ok(MeetingUpdate {
            meeting,
            task,
            invoice,
            notification,
            invoice_notification,
        })
    }
}

/// Calendar UID, stable for the life of the meeting.
#[must_use]
pub fn invite_uid(task_id: i32, meeting_id: i32) -> String {
    format!("task-{task_id}-meeting-{meeting_id}@taskdesk")
}

/// Render the meeting as an iCalendar document.
#[must_use]
pub fn render_ics(meeting: &meeting::Model, task: &task_request::Model) -> String {
    render_ics_at(meeting, task, Utc::now())
}

/// Render with a fixed `DTSTAMP`.
#[must_use]
pub fn render_ics_at(
    meeting: &meeting::Model,
    task: &task_request::Model,
    stamp: DateTime<Utc>,
) -> String {
    let start = meeting.scheduled_for.with_timezone(&Utc);
    let end = start + Duration::minutes(i64::from(meeting.duration_minutes));
    let canceled = meeting.status == MeetingStatus::Canceled;
    let uid = meeting
        .invite_uid
        .clone()
        .unwrap_or_else(|| invite_uid(task.id, meeting.id));

    let mut description = format!("Review meeting for Task #{}", task.id);
    if let Some(url) = &meeting.join_url {
        description.push_str("\nJoin: ");
        description.push_str(url);
    }
    if let Some(notes) = &meeting.notes {
        description.push_str("\n\n");
        description.push_str(notes);
    }

    let lines = [
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//TaskDesk//EN".to_string(),
        format!("METHOD:{}", if canceled { "CANCEL" } else { "REQUEST" }),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{uid}"),
        format!("DTSTAMP:{}", ics_time(stamp)),
        format!("DTSTART:{}", ics_time(start)),
        format!("DTEND:{}", ics_time(end)),
        format!("SUMMARY:{}", ics_escape(&format!("Review: Task #{} - {}", task.id, task.title))),
        format!(
            "LOCATION:{}",
            ics_escape(meeting.join_url.as_deref().unwrap_or("Online"))
        ),
        format!("DESCRIPTION:{}", ics_escape(&description)),
        format!("STATUS:{}", if canceled { "CANCELLED" } else { "CONFIRMED" }),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ];

    let mut out = String::new();
    for line in lines {
        let _ = write!(out, "{line}\r\n");
    }
    out
}

fn ics_time(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

fn ics_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            ',' => out.push_str("\\,"),
            ';' => out.push_str("\\;"),
            _ => out.push(c),
        }
    }
    out
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
    use chrono::TimeZone;
    use taskdesk_db::entities::quote;
    use taskdesk_db::test_utils::TestDatabase;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<FixedOffset> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap().fixed_offset()
    }

    fn sample(status: MeetingStatus) -> (meeting::Model, task_request::Model) {
        let task = task_request::Model {
            id: 7,
            client_id: 1,
            title: "Logo, v2; final".to_string(),
            category: None,
            description: None,
            admin_notes: None,
            deadline_at: None,
            client_budget: None,
            priority: "normal".to_string(),
            status: TaskStatus::Review,
            created_at: utc(2025, 1, 1, 0, 0),
            updated_at: None,
        };
        let meeting = meeting::Model {
            id: 3,
            task_id: 7,
            provider: "google_meet".to_string(),
            status,
            scheduled_for: utc(2025, 3, 4, 14, 30),
            duration_minutes: 45,
            join_url: Some("https://meet.example.com/abc".to_string()),
            notes: Some("Bring drafts".to_string()),
            created_by_id: Some(1),
            invite_uid: Some(invite_uid(7, 3)),
            created_at: utc(2025, 3, 1, 9, 0),
            updated_at: None,
        };
        (meeting, task)
    }

    #[test]
    fn test_render_ics() {
        let (meeting, task) = sample(MeetingStatus::Scheduled);
        let stamp = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let ics = render_ics_at(&meeting, &task, stamp);

        assert!(ics.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//TaskDesk//EN\r\n"));
        assert!(ics.ends_with("END:VEVENT\r\nEND:VCALENDAR\r\n"));
        assert!(ics.contains("METHOD:REQUEST\r\n"));
        assert!(ics.contains("UID:task-7-meeting-3@taskdesk\r\n"));
        assert!(ics.contains("DTSTAMP:20250301T090000Z\r\n"));
        assert!(ics.contains("DTSTART:20250304T143000Z\r\n"));
        assert!(ics.contains("DTEND:20250304T151500Z\r\n"));
        assert!(ics.contains("SUMMARY:Review: Task #7 - Logo\\, v2\\; final\r\n"));
        assert!(ics.contains("LOCATION:https://meet.example.com/abc\r\n"));
        assert!(ics.contains("DESCRIPTION:Review meeting for Task #7\\nJoin: https://meet.example.com/abc\\n\\nBring drafts\r\n"));
        assert!(ics.contains("STATUS:CONFIRMED\r\n"));
    }

    #[test]
    fn test_render_ics_canceled() {
        let (mut meeting, task) = sample(MeetingStatus::Canceled);
        meeting.join_url = None;
        let ics = render_ics_at(&meeting, &task, Utc::now());

        assert!(ics.contains("METHOD:CANCEL\r\n"));
        assert!(ics.contains("STATUS:CANCELLED\r\n"));
        assert!(ics.contains("LOCATION:Online\r\n"));
    }

    #[test]
    fn test_offset_times_are_converted_to_utc() {
        let (mut meeting, task) = sample(MeetingStatus::Scheduled);
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        meeting.scheduled_for = offset.with_ymd_and_hms(2025, 3, 4, 17, 30, 0).unwrap();
        let ics = render_ics_at(&meeting, &task, Utc::now());
        assert!(ics.contains("DTSTART:20250304T143000Z\r\n"));
    }

    struct Harness {
        db: TestDatabase,
        mailer: Arc<RecordingMailer>,
        service: MeetingService,
        admin: user::Model,
        client: user::Model,
    }

    async fn harness() -> Harness {
        let db = TestDatabase::in_memory().await.unwrap();
        let admin = db.seed_user("admin@example.com", user::UserRole::Admin).await.unwrap();
        let client = db.seed_user("client@example.com", user::UserRole::Client).await.unwrap();
        let mailer = Arc::new(RecordingMailer::new());
        let notifications = NotificationService::new(
            mailer.clone(),
            Some("no-reply@taskdesk.test".to_string()),
            false,
            "https://taskdesk.test".to_string(),
        );
        let service = MeetingService::new(db.shared(), notifications);
        Harness {
            db,
            mailer,
            service,
            admin,
            client,
        }
    }

    fn input() -> ScheduleMeetingInput {
        ScheduleMeetingInput {
            scheduled_for: utc(2030, 5, 6, 10, 0),
            duration_minutes: None,
            join_url: Some("https://meet.example.com/xyz".to_string()),
            notes: None,
            provider: None,
        }
    }

    #[tokio::test]
    async fn test_schedule_moves_review_task_and_bills() {
        let h = harness().await;
        let task = h.db.seed_task(h.client.id, "Deck").await.unwrap();
        h.db.seed_quote(task.id, 800.0, quote::PayOption::PayOnDelivery, quote::QuoteStatus::Accepted)
            .await
            .unwrap();
        let mut active: task_request::ActiveModel = task.clone().into();
        active.status = Set(TaskStatus::Review);
        h.service.task_repo.update(active).await.unwrap();

        let update = h.service.schedule(&h.admin, task.id, input()).await.unwrap();

        assert_eq!(update.meeting.status, MeetingStatus::Scheduled);
        assert_eq!(update.meeting.duration_minutes, 30);
        assert_eq!(update.meeting.provider, "google_meet");
        assert_eq!(
            update.meeting.invite_uid.as_deref(),
            Some(invite_uid(task.id, update.meeting.id).as_str())
        );
        assert_eq!(update.task.status, TaskStatus::ReviewScheduled);
        assert_eq!(update.invoice.unwrap().amount, 800.0);
        assert_eq!(update.notification, DeliveryOutcome::Sent);

        let invite = &h.mailer.sent_with_subject("Review meeting scheduled")[0];
        assert_eq!(invite.attachments[0].filename, "review_meeting.ics");
        assert_eq!(h.mailer.sent_with_subject("Invoice issued").len(), 1);
    }

    #[tokio::test]
    async fn test_reschedule_cancel_complete() {
        let h = harness().await;
        let task = h.db.seed_task(h.client.id, "Deck").await.unwrap();
        let scheduled = h.service.schedule(&h.admin, task.id, input()).await.unwrap();
        assert_eq!(scheduled.task.status, TaskStatus::Submitted);
        assert!(scheduled.invoice.is_none());

        let moved = h
            .service
            .reschedule(&h.admin, scheduled.meeting.id, utc(2030, 5, 7, 12, 0), Some(60))
            .await
            .unwrap();
        assert_eq!(moved.meeting.status, MeetingStatus::Rescheduled);
        assert_eq!(moved.meeting.duration_minutes, 60);
        assert_eq!(moved.meeting.invite_uid, scheduled.meeting.invite_uid);

        let canceled = h.service.cancel(&h.admin, scheduled.meeting.id).await.unwrap();
        assert_eq!(canceled.meeting.status, MeetingStatus::Canceled);
        let mail = &h.mailer.sent_with_subject("Review meeting canceled")[0];
        let ics = String::from_utf8(mail.attachments[0].data.clone()).unwrap();
        assert!(ics.contains("METHOD:CANCEL"));

        let err = h
            .service
            .reschedule(&h.admin, scheduled.meeting.id, utc(2030, 5, 8, 12, 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let completed = h.service.complete(&h.admin, scheduled.meeting.id).await.unwrap();
        assert_eq!(completed.meeting.status, MeetingStatus::Completed);
        assert_eq!(h.mailer.sent().len(), 4);
    }

    #[tokio::test]
    async fn test_schedule_requires_admin() {
        let h = harness().await;
        let task = h.db.seed_task(h.client.id, "Deck").await.unwrap();
        let err = h.service.schedule(&h.client, task.id, input()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_invite_visible_to_owner_only() {
        let h = harness().await;
        let task = h.db.seed_task(h.client.id, "Deck").await.unwrap();
        let stranger = h.db.seed_user("other@example.com", user::UserRole::Client).await.unwrap();
        let scheduled = h.service.schedule(&h.admin, task.id, input()).await.unwrap();

        let ics = h.service.invite(&h.client, scheduled.meeting.id).await.unwrap();
        assert!(ics.contains(&format!("UID:{}", invite_uid(task.id, scheduled.meeting.id))));
        assert!(h.service.invite(&h.admin, scheduled.meeting.id).await.is_ok());
        assert!(matches!(
            h.service.invite(&stranger, scheduled.meeting.id).await,
            Err(AppError::Forbidden(_))
        ));
    }
}
