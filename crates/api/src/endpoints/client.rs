//! Client endpoints: task requests, quotes and invoices.

use axum::{
    Form, Router,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use taskdesk_common::{AppError, AppResult};
use taskdesk_core::{CheckoutOutcome, CreateTaskInput, DeclineOutcome, DeclineQuoteInput, TaskDetail};
use taskdesk_db::entities::task_request;

use crate::{
    extractors::{AuthUser, Back, MultipartForm},
    middleware::AppState,
    response::{ApiResponse, FormError, OrBack, flash_redirect, with_delivery, with_skipped},
};

/// The client's tasks, newest first.
async fn list_tasks(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse<Vec<task_request::Model>>> {
    let tasks = state.task_service.client_tasks(&user).await?;
    Ok(ApiResponse::ok(tasks))
}

/// Submit a task request with optional attachments.
async fn create_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    back: Back,
    form: MultipartForm,
) -> Result<Response, FormError> {
    let input = CreateTaskInput {
        title: form.text("title").unwrap_or_default(),
        category: form.text("category"),
        description: form.text("description"),
        deadline: form.text("deadline"),
        budget: form.text("budget"),
        priority: form.text("priority"),
    };
    let created = state
        .task_service
        .create_task(&user, input, &form.files)
        .await
        .or_back(&back)?;

    Ok(flash_redirect(
        &task_path(created.task.id),
        "success",
        with_skipped("Task submitted.".to_string(), created.uploads.skipped),
    ))
}

/// A task with its quotes, invoices, assets and meetings.
async fn show_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i32>,
) -> AppResult<ApiResponse<TaskDetail>> {
    let detail = state.task_service.task_detail(&user, id).await?;
    Ok(ApiResponse::ok(detail))
}

async fn add_attachments(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    back: Back,
    Path(id): Path<i32>,
    form: MultipartForm,
) -> Result<Response, FormError> {
    if form.files.is_empty() {
        return Err(FormError {
            error: AppError::Validation("Choose at least one file.".to_string()),
            back: back.0,
        });
    }
    let stored = state
        .task_service
        .add_attachments(&user, id, &form.files)
        .await
        .or_back(&back)?;

    let message = format!("{} file(s) attached.", stored.assets.len());
    Ok(flash_redirect(
        &task_path(id),
        "success",
        with_skipped(message, stored.skipped),
    ))
}

async fn cancel_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    back: Back,
    Path(id): Path<i32>,
) -> Result<Response, FormError> {
    let task = state
        .task_service
        .client_cancel(&user, id)
        .await
        .or_back(&back)?;
    Ok(flash_redirect(&task_path(task.id), "info", "Task cancelled."))
}

async fn accept_quote(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    back: Back,
    Path(id): Path<i32>,
) -> Result<Response, FormError> {
    let accepted = state
        .quote_service
        .accept_quote(&user, id)
        .await
        .or_back(&back)?;

    let message = if accepted.invoice.is_some() {
        "Quote accepted. Your invoice is ready for payment."
    } else {
        "Quote accepted. You will be invoiced on delivery."
    };
    let (level, message) = match &accepted.notification {
        Some(outcome) => with_delivery(message, outcome),
        None => ("success", message.to_string()),
    };
    Ok(flash_redirect(&task_path(accepted.task.id), level, message))
}

async fn decline_quote(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    back: Back,
    Path(id): Path<i32>,
    Form(input): Form<DeclineQuoteInput>,
) -> Result<Response, FormError> {
    let outcome = state
        .quote_service
        .decline_quote(&user, id, input)
        .await
        .or_back(&back)?;

    let message = match outcome {
        DeclineOutcome::Declined(_) => "Quote declined.",
        DeclineOutcome::Countered(_) => "Counter-offer sent. We'll get back to you shortly.",
    };
    Ok(flash_redirect(&task_path(outcome.quote().task_id), "info", message))
}

/// Send the client to the payment gateway.
pub(crate) async fn pay_invoice(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    back: Back,
    Path(id): Path<i32>,
) -> Result<Response, FormError> {
    match state.payment_service.start_checkout(&user, id).await {
        Ok(CheckoutOutcome::Redirect(url)) => Ok(Redirect::to(&url).into_response()),
        Ok(CheckoutOutcome::AlreadyPaid { task_id }) => Ok(flash_redirect(
            &task_path(task_id),
            "info",
            "This invoice is already paid.",
        )),
        Err(AppError::ExternalService(_)) => Ok(flash_redirect(
            &back.0,
            "danger",
            "Failed to contact payment gateway.",
        )),
        Err(error) => Err(FormError {
            error,
            back: back.0,
        }),
    }
}

pub(crate) fn task_path(task_id: i32) -> String {
    format!("/client/tasks/{task_id}")
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", get(show_task))
        .route("/tasks/{id}/attachments", post(add_attachments))
        .route("/tasks/{id}/cancel", post(cancel_task))
        .route("/quotes/{id}/accept", post(accept_quote))
        .route("/quotes/{id}/decline", post(decline_quote))
        .route("/invoices/{id}/pay", post(pay_invoice))
}
