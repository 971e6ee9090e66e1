//! API response types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use taskdesk_common::{AppError, AppResult};
use taskdesk_core::DeliveryOutcome;

use crate::extractors::Back;

/// Cookie carrying the one-shot flash message.
pub const FLASH_COOKIE: &str = "td.flash";

/// Standard API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a success response.
    pub const fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response.
    pub fn err(code: impl Into<String>, message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = if self.error.is_some() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::OK
        };
        (status, Json(self)).into_response()
    }
}

/// Flash message as stored in [`FLASH_COOKIE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct Flash {
    pub level: String,
    pub message: String,
}

impl Flash {
    /// Parse a flash cookie value. The jar has already percent-decoded it.
    #[must_use]
    pub fn decode(value: &str) -> Option<Self> {
        serde_json::from_str(value).ok()
    }

    /// The pending flash message of a request, if any.
    #[must_use]
    pub fn from_jar(jar: &CookieJar) -> Option<Self> {
        jar.get(FLASH_COOKIE).and_then(|cookie| Self::decode(cookie.value()))
    }

    fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// 303 redirect to `to` with a flash message.
pub fn flash_redirect(to: &str, level: &str, message: impl Into<String>) -> Response {
    let flash = Flash {
        level: level.to_string(),
        message: message.into(),
    };
    let cookie = Cookie::build((FLASH_COOKIE, flash.encode()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    (CookieJar::new().add(cookie), Redirect::to(to)).into_response()
}

/// Error of a form endpoint.
///
/// Validation failures go back to the form with a warning flash. Everything
/// else renders like any other [`AppError`].
#[derive(Debug)]
pub struct FormError {
    pub error: AppError,
    pub back: String,
}

impl IntoResponse for FormError {
    fn into_response(self) -> Response {
        match self.error {
            AppError::Validation(message) | AppError::BadRequest(message) => {
                flash_redirect(&self.back, "warning", message)
            }
            error => error.into_response(),
        }
    }
}

/// Attach the redirect target to a service result.
pub trait OrBack<T> {
    fn or_back(self, back: &Back) -> Result<T, FormError>;
}

impl<T> OrBack<T> for AppResult<T> {
    fn or_back(self, back: &Back) -> Result<T, FormError> {
        self.map_err(|error| FormError {
            error,
            back: back.0.clone(),
        })
    }
}

/// Flash level and message for an action that also sent an email.
pub fn with_delivery(message: &str, outcome: &DeliveryOutcome) -> (&'static str, String) {
    if outcome.is_delivered() {
        ("success", message.to_string())
    } else {
        (
            "warning",
            format!("{message} The notification email could not be sent."),
        )
    }
}

/// Append a note about files refused by the extension allow-list.
pub fn with_skipped(message: String, skipped: usize) -> String {
    match skipped {
        0 => message,
        1 => format!("{message} 1 file was skipped because its type is not allowed."),
        n => format!("{message} {n} files were skipped because their type is not allowed."),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn test_flash_redirect_sets_cookie() {
        let response = flash_redirect("/client/tasks/3", "success", "Saved, thanks!");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/client/tasks/3");

        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        // Encoded once by the jar, so one decode yields the JSON
        assert!(!set_cookie.contains("%25"));
        let cookie = Cookie::parse_encoded(set_cookie).unwrap();
        assert_eq!(cookie.name(), FLASH_COOKIE);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(cookie.value()).unwrap()["level"],
            "success"
        );

        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("{FLASH_COOKIE}={}", cookie.encoded().stripped()).parse().unwrap(),
        );
        assert_eq!(
            Flash::from_jar(&CookieJar::from_headers(&headers)).unwrap(),
            Flash {
                level: "success".to_string(),
                message: "Saved, thanks!".to_string(),
            }
        );
    }

    #[test]
    fn test_form_error_validation_redirects_back() {
        let response = FormError {
            error: AppError::Validation("Amount is required.".to_string()),
            back: "/admin/tasks/1".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/admin/tasks/1");
    }

    #[test]
    fn test_form_error_not_found_is_404() {
        let response = FormError {
            error: AppError::NotFound("Task: 9".to_string()),
            back: "/".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_delivery_notice() {
        assert_eq!(
            with_delivery("Quote sent.", &DeliveryOutcome::Sent),
            ("success", "Quote sent.".to_string())
        );
        let (level, message) =
            with_delivery("Quote sent.", &DeliveryOutcome::Failed("smtp down".to_string()));
        assert_eq!(level, "warning");
        assert!(message.starts_with("Quote sent. "));
        assert_eq!(with_skipped("Done.".to_string(), 0), "Done.");
        assert!(with_skipped("Done.".to_string(), 2).contains("2 files"));
    }
}
