//! Freelancer endpoints.

use axum::{
    Router,
    extract::{Path, State},
    response::Response,
    routing::{get, post},
};
use taskdesk_common::AppResult;
use taskdesk_db::entities::{assignment, user};

use crate::{
    extractors::{AuthUser, Back, MultipartForm},
    middleware::AppState,
    response::{ApiResponse, FormError, OrBack, flash_redirect, with_skipped},
};

const ASSIGNMENTS_PATH: &str = "/freelancer/assignments";

async fn list_assignments(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse<Vec<assignment::Model>>> {
    let assignments = state.assignment_service.freelancer_assignments(&user).await?;
    Ok(ApiResponse::ok(assignments))
}

async fn respond(
    state: &AppState,
    user: &user::Model,
    back: &Back,
    id: i32,
    accept: bool,
) -> Result<Response, FormError> {
    let response = state
        .assignment_service
        .freelancer_respond(user, id, accept)
        .await
        .or_back(back)?;

    let message = if accept {
        format!("You accepted Task #{}.", response.task.id)
    } else {
        format!("You declined Task #{}.", response.task.id)
    };
    Ok(flash_redirect(ASSIGNMENTS_PATH, "success", message))
}

async fn accept(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    back: Back,
    Path(id): Path<i32>,
) -> Result<Response, FormError> {
    respond(&state, &user, &back, id, true).await
}

async fn decline(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    back: Back,
    Path(id): Path<i32>,
) -> Result<Response, FormError> {
    respond(&state, &user, &back, id, false).await
}

/// Upload deliverables for a task.
async fn submit_work(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    back: Back,
    Path(task_id): Path<i32>,
    form: MultipartForm,
) -> Result<Response, FormError> {
    let submitted = state
        .assignment_service
        .submit_work(&user, task_id, form.text("comment"), &form.files)
        .await
        .or_back(&back)?;

    let level = if submitted.notifications.iter().all(|n| n.is_delivered()) {
        "success"
    } else {
        "warning"
    };
    let message = format!(
        "Work submitted for Task #{} with {} file(s).",
        submitted.task.id,
        submitted.assets.len()
    );
    Ok(flash_redirect(
        ASSIGNMENTS_PATH,
        level,
        with_skipped(message, submitted.skipped),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/assignments", get(list_assignments))
        .route("/assignments/{id}/accept", post(accept))
        .route("/assignments/{id}/decline", post(decline))
        .route("/tasks/{id}/submit", post(submit_work))
}
