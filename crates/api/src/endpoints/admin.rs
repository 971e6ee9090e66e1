//! Admin endpoints: task lifecycle, quotes, assignments, meetings and rating moderation.

use std::fmt::Write as _;

use axum::{
    Form, Router,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use taskdesk_common::AppResult;
use taskdesk_core::{
    CreateQuoteInput, MeetingUpdate, RatingModeration, ScheduleMeetingInput, StatusChange,
    TaskDetail,
    input::{parse_datetime, parse_optional_datetime},
};
use taskdesk_db::entities::{rating, task_request};
use taskdesk_db::repositories::RatingVisibility;

use super::{parse_ids, parse_optional_int};
use crate::{
    extractors::{AdminUser, AuthUser, Back},
    middleware::AppState,
    response::{ApiResponse, FormError, OrBack, flash_redirect, with_delivery},
};

#[derive(Debug, Deserialize)]
pub struct TaskFilter {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkStatusForm {
    /// Comma or space separated task ids
    pub task_ids: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignForm {
    pub assignee_id: i32,
    pub accept_expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkAssignForm {
    pub task_ids: String,
    pub assignee_id: i32,
    pub accept_expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MeetingForm {
    pub scheduled_for: String,
    pub duration_minutes: Option<String>,
    pub join_url: Option<String>,
    pub notes: Option<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RatingFilter {
    pub q: Option<String>,
    /// `public`, `hidden`, `deleted`; anything else lists all non-deleted
    pub vis: Option<String>,
    pub page: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleForm {
    pub scheduled_for: String,
    pub duration_minutes: Option<String>,
}

// ==================== Tasks ====================

async fn list_tasks(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(filter): Query<TaskFilter>,
) -> AppResult<ApiResponse<Vec<task_request::Model>>> {
    let tasks = state.task_service.admin_tasks(filter.status.as_deref()).await?;
    Ok(ApiResponse::ok(tasks))
}

async fn show_task(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i32>,
) -> AppResult<ApiResponse<TaskDetail>> {
    let detail = state.task_service.task_detail(&admin, id).await?;
    Ok(ApiResponse::ok(detail))
}

async fn set_status(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    back: Back,
    Path(id): Path<i32>,
    Form(form): Form<StatusForm>,
) -> Result<Response, FormError> {
    let change = state
        .task_service
        .set_status(id, &form.status)
        .await
        .or_back(&back)?;
    Ok(status_changed(&change))
}

async fn archive(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    back: Back,
    Path(id): Path<i32>,
) -> Result<Response, FormError> {
    let change = state.task_service.archive(id).await.or_back(&back)?;
    Ok(status_changed(&change))
}

async fn unarchive(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    back: Back,
    Path(id): Path<i32>,
) -> Result<Response, FormError> {
    let change = state.task_service.unarchive(id).await.or_back(&back)?;
    Ok(status_changed(&change))
}

async fn bulk_status(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    back: Back,
    Form(form): Form<BulkStatusForm>,
) -> Result<Response, FormError> {
    let ids = parse_ids(&form.task_ids).or_back(&back)?;
    let outcome = state
        .task_service
        .bulk_set_status(&ids, &form.status)
        .await
        .or_back(&back)?;

    let message = match outcome.missing {
        0 => format!("Updated {} task(s).", outcome.updated),
        missing => format!(
            "Updated {} task(s); {missing} could not be found.",
            outcome.updated
        ),
    };
    Ok(flash_redirect(&back.0, "success", message))
}

fn status_changed(change: &StatusChange) -> Response {
    let mut message = format!(
        "Task #{} is now {}.",
        change.task.id,
        change.task.status.as_str().replace('_', " ")
    );
    if change.invoice_created() {
        message.push_str(" A review invoice was issued.");
    }
    let (level, message) = match &change.notification {
        Some(outcome) => with_delivery(&message, outcome),
        None => ("success", message),
    };
    flash_redirect(&admin_task_path(change.task.id), level, message)
}

// ==================== Quotes ====================

async fn create_quote(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Path(task_id): Path<i32>,
    Form(input): Form<CreateQuoteInput>,
) -> Result<Response, FormError> {
    let created = state
        .quote_service
        .create_quote(&admin, task_id, input)
        .await
        .or_back(&back)?;

    let (level, message) = with_delivery("Quote sent to the client.", &created.notification);
    Ok(flash_redirect(&admin_task_path(created.quote.task_id), level, message))
}

async fn accept_counter(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Path(quote_id): Path<i32>,
) -> Result<Response, FormError> {
    let accepted = state
        .quote_service
        .admin_accept_counter(&admin, quote_id)
        .await
        .or_back(&back)?;

    let message = "Counter-offer accepted.";
    let (level, message) = match &accepted.notification {
        Some(outcome) => with_delivery(message, outcome),
        None => ("success", message.to_string()),
    };
    Ok(flash_redirect(&admin_task_path(accepted.task.id), level, message))
}

async fn reject_counter(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Path(quote_id): Path<i32>,
) -> Result<Response, FormError> {
    let quote = state
        .quote_service
        .admin_reject_counter(&admin, quote_id)
        .await
        .or_back(&back)?;
    Ok(flash_redirect(
        &admin_task_path(quote.task_id),
        "info",
        "Counter-offer rejected. The original price stands.",
    ))
}

// ==================== Assignments ====================

async fn assign(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Path(task_id): Path<i32>,
    Form(form): Form<AssignForm>,
) -> Result<Response, FormError> {
    let expires = parse_optional_datetime(form.accept_expires_at.as_deref()).or_back(&back)?;
    let created = state
        .assignment_service
        .create_assignment(&admin, task_id, form.assignee_id, expires)
        .await
        .or_back(&back)?;

    let (level, message) = with_delivery("Freelancer assigned.", &created.notification);
    Ok(flash_redirect(&admin_task_path(task_id), level, message))
}

async fn bulk_assign(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Form(form): Form<BulkAssignForm>,
) -> Result<Response, FormError> {
    let ids = parse_ids(&form.task_ids).or_back(&back)?;
    let expires = parse_optional_datetime(form.accept_expires_at.as_deref()).or_back(&back)?;
    let outcome = state
        .assignment_service
        .bulk_assign(&admin, &ids, form.assignee_id, expires)
        .await
        .or_back(&back)?;

    let level = if outcome.failed_notifications == 0 {
        "success"
    } else {
        "warning"
    };
    let mut message = format!("Assigned {} task(s).", outcome.created);
    if outcome.skipped > 0 {
        let _ = write!(message, " Skipped {}.", outcome.skipped);
    }
    if outcome.failed_notifications > 0 {
        let _ = write!(
            message,
            " {} invite(s) could not be sent.",
            outcome.failed_notifications
        );
    }
    Ok(flash_redirect(&back.0, level, message))
}

// ==================== Meetings ====================

async fn schedule_meeting(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Path(task_id): Path<i32>,
    Form(form): Form<MeetingForm>,
) -> Result<Response, FormError> {
    let input = ScheduleMeetingInput {
        scheduled_for: parse_datetime(&form.scheduled_for).or_back(&back)?,
        duration_minutes: parse_optional_int(form.duration_minutes.as_deref(), "duration")
            .or_back(&back)?,
        join_url: form.join_url,
        notes: form.notes,
        provider: form.provider,
    };
    let update = state
        .meeting_service
        .schedule(&admin, task_id, input)
        .await
        .or_back(&back)?;
    Ok(meeting_changed(&update, "Review meeting scheduled."))
}

async fn reschedule_meeting(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Path(id): Path<i32>,
    Form(form): Form<RescheduleForm>,
) -> Result<Response, FormError> {
    let scheduled_for = parse_datetime(&form.scheduled_for).or_back(&back)?;
    let duration =
        parse_optional_int(form.duration_minutes.as_deref(), "duration").or_back(&back)?;
    let update = state
        .meeting_service
        .reschedule(&admin, id, scheduled_for, duration)
        .await
        .or_back(&back)?;
    Ok(meeting_changed(&update, "Review meeting rescheduled."))
}

async fn cancel_meeting(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Path(id): Path<i32>,
) -> Result<Response, FormError> {
    let update = state.meeting_service.cancel(&admin, id).await.or_back(&back)?;
    Ok(meeting_changed(&update, "Review meeting canceled."))
}

async fn complete_meeting(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Path(id): Path<i32>,
) -> Result<Response, FormError> {
    let update = state.meeting_service.complete(&admin, id).await.or_back(&back)?;
    Ok(meeting_changed(&update, "Review meeting marked as completed."))
}

/// Calendar file for a meeting. Clients may fetch their own.
async fn meeting_invite(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    let ics = state.meeting_service.invite(&user, id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"review_meeting.ics\"",
            ),
        ],
        ics,
    )
        .into_response())
}

fn meeting_changed(update: &MeetingUpdate, message: &str) -> Response {
    let (mut level, mut message) = with_delivery(message, &update.notification);
    if update.invoice.is_some() {
        message.push_str(" A review invoice was issued.");
    }
    if update
        .invoice_notification
        .as_ref()
        .is_some_and(|outcome| !outcome.is_delivered())
    {
        level = "warning";
    }
    flash_redirect(&admin_task_path(update.task.id), level, message)
}

// ==================== Ratings ====================

const RATINGS_PATH: &str = "/admin/ratings";

async fn list_ratings(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(filter): Query<RatingFilter>,
) -> AppResult<ApiResponse<Vec<rating::Model>>> {
    let visibility = filter
        .vis
        .as_deref()
        .map(RatingVisibility::parse)
        .unwrap_or_default();
    let ratings = state
        .rating_service
        .admin_list(visibility, filter.q, filter.page.unwrap_or(1))
        .await?;
    Ok(ApiResponse::ok(ratings))
}

async fn moderate_rating(
    state: &AppState,
    admin_id: i32,
    back: &Back,
    id: i32,
    action: RatingModeration,
) -> Result<Response, FormError> {
    state
        .rating_service
        .moderate(admin_id, id, action)
        .await
        .or_back(back)?;
    // No usable referer resolves to the home page
    let target = if back.0 == "/" { RATINGS_PATH } else { back.0.as_str() };
    Ok(flash_redirect(target, "success", action.message()))
}

async fn hide_rating(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Path(id): Path<i32>,
) -> Result<Response, FormError> {
    moderate_rating(&state, admin.id, &back, id, RatingModeration::Hide).await
}

async fn unhide_rating(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Path(id): Path<i32>,
) -> Result<Response, FormError> {
    moderate_rating(&state, admin.id, &back, id, RatingModeration::Unhide).await
}

async fn delete_rating(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Path(id): Path<i32>,
) -> Result<Response, FormError> {
    moderate_rating(&state, admin.id, &back, id, RatingModeration::Delete).await
}

async fn restore_rating(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Path(id): Path<i32>,
) -> Result<Response, FormError> {
    moderate_rating(&state, admin.id, &back, id, RatingModeration::Restore).await
}

fn admin_task_path(task_id: i32) -> String {
    format!("/admin/tasks/{task_id}")
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks))
        .route("/tasks/bulk-status", post(bulk_status))
        .route("/tasks/{id}", get(show_task))
        .route("/tasks/{id}/status", post(set_status))
        .route("/tasks/{id}/archive", post(archive))
        .route("/tasks/{id}/unarchive", post(unarchive))
        .route("/tasks/{id}/quotes", post(create_quote))
        .route("/quotes/{id}/counter/accept", post(accept_counter))
        .route("/quotes/{id}/counter/reject", post(reject_counter))
        .route("/tasks/{id}/assign", post(assign))
        .route("/assignments/bulk", post(bulk_assign))
        .route("/tasks/{id}/meetings", post(schedule_meeting))
        .route("/meetings/{id}/reschedule", post(reschedule_meeting))
        .route("/meetings/{id}/cancel", post(cancel_meeting))
        .route("/meetings/{id}/complete", post(complete_meeting))
        .route("/meetings/{id}/invite.ics", get(meeting_invite))
        .route("/ratings", get(list_ratings))
        .route("/ratings/{id}/hide", post(hide_rating))
        .route("/ratings/{id}/unhide", post(unhide_rating))
        .route("/ratings/{id}/delete", post(delete_rating))
        .route("/ratings/{id}/restore", post(restore_rating))
}
