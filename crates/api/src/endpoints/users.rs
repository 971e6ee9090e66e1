//! Admin user management endpoints.

use axum::{
    Form, Router,
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
};
use serde::Deserialize;
use taskdesk_common::AppResult;
use taskdesk_db::entities::user;

use crate::{
    extractors::{AdminUser, Back},
    middleware::AppState,
    response::{ApiResponse, FormError, OrBack, flash_redirect},
};

const USERS_PATH: &str = "/admin/users";

#[derive(Debug, Deserialize)]
pub struct UserFilter {
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoleForm {
    pub role: String,
}

async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(filter): Query<UserFilter>,
) -> AppResult<ApiResponse<Vec<user::Model>>> {
    let users = state.user_service.list_users(filter.role.as_deref()).await?;
    Ok(ApiResponse::ok(users))
}

async fn suspend(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Path(id): Path<i32>,
) -> Result<Response, FormError> {
    let user = state.user_service.suspend(&admin, id).await.or_back(&back)?;
    Ok(flash_redirect(USERS_PATH, "info", format!("{} was suspended.", user.email)))
}

async fn unsuspend(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Path(id): Path<i32>,
) -> Result<Response, FormError> {
    let user = state.user_service.unsuspend(&admin, id).await.or_back(&back)?;
    Ok(flash_redirect(USERS_PATH, "success", format!("{} is active again.", user.email)))
}

async fn delete(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Path(id): Path<i32>,
) -> Result<Response, FormError> {
    let user = state.user_service.soft_delete(&admin, id).await.or_back(&back)?;
    Ok(flash_redirect(USERS_PATH, "info", format!("{} was deleted.", user.email)))
}

async fn set_role(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    back: Back,
    Path(id): Path<i32>,
    Form(form): Form<RoleForm>,
) -> Result<Response, FormError> {
    let user = state
        .user_service
        .set_role(&admin, id, &form.role)
        .await
        .or_back(&back)?;
    Ok(flash_redirect(
        USERS_PATH,
        "success",
        format!("{} is now {}.", user.email, form.role.trim().to_lowercase()),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/{id}/suspend", post(suspend))
        .route("/{id}/unsuspend", post(unsuspend))
        .route("/{id}/delete", post(delete))
        .route("/{id}/role", post(set_role))
}
