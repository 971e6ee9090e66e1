//! Authentication endpoints.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::post,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use taskdesk_common::AppResult;
use taskdesk_core::{RegisterInput, Session};
use taskdesk_db::entities::user;

use crate::{
    extractors::AuthUser,
    middleware::{AppState, SESSION_COOKIE},
    response::ApiResponse,
};

/// Signin request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Signed-in session.
#[derive(Serialize)]
pub struct SessionResponse {
    pub user: user::Model,
    pub token: String,
}

/// Register a client or freelancer account.
async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<RegisterInput>,
) -> AppResult<(CookieJar, ApiResponse<SessionResponse>)> {
    let session = state.user_service.register(req).await?;
    Ok(signed_in(&state, jar, session))
}

/// Sign in to an existing account.
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> AppResult<(CookieJar, ApiResponse<SessionResponse>)> {
    let session = state.user_service.login(&req.email, &req.password).await?;
    Ok(signed_in(&state, jar, session))
}

/// Sign out and drop the session cookie.
async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    jar: CookieJar,
) -> AppResult<(CookieJar, StatusCode)> {
    state.user_service.logout(&user).await?;
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, StatusCode::NO_CONTENT))
}

fn signed_in(
    state: &AppState,
    jar: CookieJar,
    session: Session,
) -> (CookieJar, ApiResponse<SessionResponse>) {
    let cookie = Cookie::build((SESSION_COOKIE, session.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.cookies.secure)
        .max_age(cookie_max_age(state.config.cookies.max_age_days))
        .build();

    (
        jar.add(cookie),
        ApiResponse::ok(SessionResponse {
            user: session.user,
            token: session.token,
        }),
    )
}

/// Lifetime of long-lived cookies.
pub(crate) fn cookie_max_age(days: i64) -> time::Duration {
    time::Duration::days(days)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}
