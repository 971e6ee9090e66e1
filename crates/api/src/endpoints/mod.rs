//! API endpoints.

mod admin;
mod auth;
mod client;
mod files;
mod freelancer;
mod payments;
mod site;
mod users;

use axum::Router;
use taskdesk_common::{AppError, AppResult};

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/client", client::router())
        .nest("/freelancer", freelancer::router())
        .nest("/admin", admin::router().merge(files::router()))
        .nest("/admin/users", users::router())
        .merge(payments::router())
        .merge(site::router())
}

/// Parse ids typed or posted as `1, 2 3`.
pub(crate) fn parse_ids(raw: &str) -> AppResult<Vec<i32>> {
    let ids = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i32>()
                .map_err(|_| AppError::Validation(format!("Invalid id: {part}")))
        })
        .collect::<AppResult<Vec<_>>>()?;
    if ids.is_empty() {
        return Err(AppError::Validation("Select at least one task.".to_string()));
    }
    Ok(ids)
}

/// Parse an optional whole number typed into a form.
pub(crate) fn parse_optional_int(raw: Option<&str>, field: &str) -> AppResult<Option<i32>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<i32>()
            .map(Some)
            .map_err(|_| AppError::Validation(format!("Invalid {field}: {value}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_ids("1, 2 3,,4").unwrap(), vec![1, 2, 3, 4]);
        assert!(matches!(parse_ids(" "), Err(AppError::Validation(_))));
        assert!(matches!(parse_ids("1,x"), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_parse_optional_int() {
        assert_eq!(parse_optional_int(None, "duration").unwrap(), None);
        assert_eq!(parse_optional_int(Some(" "), "duration").unwrap(), None);
        assert_eq!(parse_optional_int(Some("45"), "duration").unwrap(), Some(45));
        assert!(parse_optional_int(Some("soon"), "duration").is_err());
    }
}
