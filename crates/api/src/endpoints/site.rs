//! Public site endpoints: cookie consent, language, newsletter and ratings.

use axum::{
    Form, Router,
    extract::{Path, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use taskdesk_common::{AppError, AppResult};
use taskdesk_core::RatingInput;
use taskdesk_db::repositories::RatingSummary;

use super::auth::cookie_max_age;
use crate::{
    extractors::{Back, ClientIp, MaybeAuthUser, header_str},
    middleware::AppState,
    response::{ApiResponse, FLASH_COOKIE, Flash, FormError, OrBack, flash_redirect},
};

/// Cookie holding the visitor's consent choices.
pub const CONSENT_COOKIE: &str = "td.consent";

/// Cookie holding the chosen language.
pub const LANG_COOKIE: &str = "td.lang";

const SUPPORTED_LANGUAGES: [&str; 4] = ["en", "fr", "de", "sw"];

#[derive(Debug, Default, Deserialize)]
pub struct ConsentForm {
    pub analytics: Option<String>,
    pub marketing: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LanguageForm {
    pub lang: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeForm {
    pub email: String,
    pub name: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RatingForm {
    pub stars: String,
    pub comment: Option<String>,
}

/// HTML checkbox semantics.
fn checked(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("on" | "1" | "true" | "yes")
    )
}

async fn consent(
    State(state): State<AppState>,
    back: Back,
    jar: CookieJar,
    Form(form): Form<ConsentForm>,
) -> Response {
    let value = json!({
        "essential": true,
        "analytics": checked(form.analytics.as_deref()),
        "marketing": checked(form.marketing.as_deref()),
        "ts": Utc::now().timestamp(),
    });
    let cookie = Cookie::build((CONSENT_COOKIE, value.to_string()))
        .path("/")
        .max_age(cookie_max_age(state.config.cookies.max_age_days))
        .same_site(SameSite::Lax)
        .secure(state.config.cookies.secure)
        .http_only(false)
        .build();

    (
        jar.add(cookie),
        flash_redirect(&back.0, "success", "Your cookie preferences were saved."),
    )
        .into_response()
}

async fn withdraw_consent(back: Back, jar: CookieJar) -> Response {
    (
        jar.remove(Cookie::build(CONSENT_COOKIE).path("/")),
        flash_redirect(&back.0, "info", "Your cookie consent was withdrawn."),
    )
        .into_response()
}

async fn set_language(
    State(state): State<AppState>,
    back: Back,
    jar: CookieJar,
    Form(form): Form<LanguageForm>,
) -> Response {
    let lang = form.lang.trim().to_ascii_lowercase();
    if !SUPPORTED_LANGUAGES.contains(&lang.as_str()) {
        return flash_redirect(&back.0, "warning", "Unsupported language.");
    }

    let cookie = Cookie::build((LANG_COOKIE, lang))
        .path("/")
        .max_age(cookie_max_age(state.config.cookies.max_age_days))
        .same_site(SameSite::Lax)
        .secure(state.config.cookies.secure)
        .build();
    (jar.add(cookie), Redirect::to(&back.0)).into_response()
}

async fn subscribe(
    State(state): State<AppState>,
    back: Back,
    Form(form): Form<SubscribeForm>,
) -> Result<Response, FormError> {
    state
        .marketing_service
        .subscribe(&form.email, form.name, form.source)
        .await
        .or_back(&back)?;
    Ok(flash_redirect(&back.0, "success", "Thanks for subscribing!"))
}

async fn unsubscribe(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Response> {
    state.marketing_service.unsubscribe(&token).await?;
    Ok(flash_redirect("/", "info", "You have been unsubscribed."))
}

async fn rate(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    ClientIp(ip): ClientIp,
    back: Back,
    headers: HeaderMap,
    Form(form): Form<RatingForm>,
) -> Result<Response, FormError> {
    let input = RatingInput {
        user_id: user.map(|u| u.id),
        ip,
        user_agent: header_str(&headers, header::USER_AGENT.as_str()).map(str::to_string),
        stars: form.stars.trim().parse().unwrap_or(0),
        comment: form.comment,
    };

    match state.rating_service.submit(input).await {
        Ok(_) => Ok(flash_redirect(&back.0, "success", "Thanks for your feedback!")),
        Err(AppError::RateLimited) => Ok(flash_redirect(
            &back.0,
            "warning",
            "You're sending feedback too quickly. Please try again shortly.",
        )),
        Err(error) => Err(FormError {
            error,
            back: back.0,
        }),
    }
}

/// Hand the pending flash message to the page and clear it.
async fn take_flash(jar: CookieJar) -> (CookieJar, ApiResponse<Option<Flash>>) {
    let flash = Flash::from_jar(&jar);
    let jar = if flash.is_some() {
        jar.remove(Cookie::build(FLASH_COOKIE).path("/"))
    } else {
        jar
    };
    (jar, ApiResponse::ok(flash))
}

async fn rating_summary(State(state): State<AppState>) -> AppResult<ApiResponse<RatingSummary>> {
    let summary = state.rating_service.summary().await?;
    Ok(ApiResponse::ok(summary))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cookies/consent", post(consent))
        .route("/cookies/withdraw", post(withdraw_consent))
        .route("/i18n/set", post(set_language))
        .route("/subscribe", post(subscribe))
        .route("/unsubscribe/{token}", get(unsubscribe))
        .route("/ratings", post(rate))
        .route("/ratings/summary", get(rating_summary))
        .route("/flash", get(take_flash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkbox_values() {
        assert!(checked(Some("on")));
        assert!(checked(Some("TRUE")));
        assert!(!checked(Some("off")));
        assert!(!checked(None));
    }
}
