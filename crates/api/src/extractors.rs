//! Request extractors.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequest, FromRequestParts, Multipart, Request},
    http::{HeaderMap, header, request::Parts},
};
use taskdesk_common::AppError;
use taskdesk_core::UploadedFile;
use taskdesk_db::entities::user;
use url::Url;

use crate::middleware::AppState;

/// Authenticated user extractor.
#[derive(Debug, Clone)]
pub struct AuthUser(pub user::Model);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by the auth middleware
        parts
            .extensions
            .get::<user::Model>()
            .cloned()
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}

/// Optional authenticated user extractor.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<user::Model>);

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<user::Model>().cloned()))
    }
}

/// Authenticated admin extractor.
#[derive(Debug, Clone)]
pub struct AdminUser(pub user::Model);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(Self(user))
    }
}

/// Best-effort client address: `X-Forwarded-For`, `X-Real-IP`, then the socket.
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = header_str(&parts.headers, "x-forwarded-for")
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .or_else(|| header_str(&parts.headers, "x-real-ip").map(str::trim))
            .map(str::to_string);

        let ip = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });
        Ok(Self(ip))
    }
}

/// Where a form should send the user back to.
///
/// The `Referer` path when it points at this site, otherwise `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Back(pub String);

impl Back {
    /// Resolve `referer` against the site URL.
    #[must_use]
    pub fn from_referer(referer: Option<&str>, site_url: &str) -> Self {
        let Some(referer) = referer.map(str::trim).filter(|r| !r.is_empty()) else {
            return Self::home();
        };

        if referer.starts_with('/') && !referer.starts_with("//") {
            return Self(referer.to_string());
        }

        let (Ok(target), Ok(site)) = (Url::parse(referer), Url::parse(site_url)) else {
            return Self::home();
        };
        if target.origin() != site.origin() {
            return Self::home();
        }

        match target.query() {
            Some(query) => Self(format!("{}?{query}", target.path())),
            None => Self(target.path().to_string()),
        }
    }

    fn home() -> Self {
        Self("/".to_string())
    }
}

impl FromRequestParts<AppState> for Back {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_referer(
            header_str(&parts.headers, header::REFERER.as_str()),
            &state.config.server.url,
        ))
    }
}

/// A multipart form split into text fields and uploaded files.
///
/// File inputs left empty by the browser are dropped.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl MultipartForm {
    /// A text field, `None` when missing.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }
}

impl<S> FromRequest<S> for MultipartForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type = field.content_type().map(str::to_string);
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(e.body_text()))?;
                    if filename.is_empty() || data.is_empty() {
                        continue;
                    }
                    form.files.push(UploadedFile {
                        filename,
                        content_type,
                        data: data.to_vec(),
                    });
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.body_text()))?;
                    form.fields.insert(name, value);
                }
            }
        }
        Ok(form)
    }
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = "https://taskdesk.example.com";

    #[test]
    fn test_back_same_origin() {
        assert_eq!(
            Back::from_referer(Some("https://taskdesk.example.com/admin/tasks?status=review"), SITE),
            Back("/admin/tasks?status=review".to_string())
        );
        assert_eq!(
            Back::from_referer(Some("/client/tasks/4"), SITE),
            Back("/client/tasks/4".to_string())
        );
    }

    #[test]
    fn test_back_rejects_foreign_origin() {
        for referer in [
            "https://evil.example.com/phish",
            "http://taskdesk.example.com/admin",
            "//evil.example.com/",
            "not a url",
        ] {
            assert_eq!(Back::from_referer(Some(referer), SITE), Back("/".to_string()));
        }
        assert_eq!(Back::from_referer(None, SITE), Back("/".to_string()));
    }
}
