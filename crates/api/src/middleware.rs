//! API middleware.

#![allow(missing_docs)]

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use sea_orm::DatabaseConnection;
use taskdesk_common::{Config, StorageBackend};
use taskdesk_core::{
    AssetService, AssignmentService, Mailer, MarketingService, MeetingService,
    NotificationService, PaymentGateway, PaymentService, QuoteService, RatingService, TaskService,
    UserService,
};
use taskdesk_db::repositories::{
    FileAssetRepository, RatingRepository, SubscriberRepository, UserRepository,
};

use crate::extractors::header_str;

/// Cookie holding the session token.
pub const SESSION_COOKIE: &str = "td.session";

/// Logo embedded in receipt emails.
#[derive(Debug, Clone)]
pub struct Logo {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub user_service: UserService,
    pub task_service: TaskService,
    pub quote_service: QuoteService,
    pub assignment_service: AssignmentService,
    pub meeting_service: MeetingService,
    pub payment_service: PaymentService,
    pub asset_service: AssetService,
    pub marketing_service: MarketingService,
    pub rating_service: RatingService,
}

impl AppState {
    /// Wire every service against one database and set of adapters.
    #[must_use]
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: Arc<Config>,
        mailer: Arc<dyn Mailer>,
        storage: Arc<dyn StorageBackend>,
        gateway: Arc<dyn PaymentGateway>,
        logo: Option<Logo>,
    ) -> Self {
        let mut notifications = NotificationService::new(
            mailer,
            config.mail.sender.clone(),
            config.mail.suppress_send,
            config.server.url.clone(),
        );
        if let Some(logo) = logo {
            notifications = notifications.with_logo(&logo.content_type, logo.data);
        }

        let asset_service = AssetService::new(
            storage,
            FileAssetRepository::new(Arc::clone(&db)),
            &config.storage,
        );

        Self {
            user_service: UserService::new(UserRepository::new(Arc::clone(&db))),
            task_service: TaskService::new(
                Arc::clone(&db),
                asset_service.clone(),
                notifications.clone(),
            ),
            quote_service: QuoteService::new(
                Arc::clone(&db),
                notifications.clone(),
                config.payments.default_currency.clone(),
            ),
            assignment_service: AssignmentService::new(
                Arc::clone(&db),
                asset_service.clone(),
                notifications.clone(),
            ),
            meeting_service: MeetingService::new(Arc::clone(&db), notifications.clone()),
            payment_service: PaymentService::new(Arc::clone(&db), gateway, notifications),
            marketing_service: MarketingService::new(SubscriberRepository::new(Arc::clone(&db))),
            rating_service: RatingService::new(RatingRepository::new(db), &config.ratings),
            asset_service,
            config,
        }
    }
}

/// Authentication middleware.
///
/// Accepts `Authorization: Bearer <token>` or the session cookie.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = header_str(req.headers(), header::AUTHORIZATION.as_str())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| {
            CookieJar::from_headers(req.headers())
                .get(SESSION_COOKIE)
                .map(|cookie| cookie.value().to_string())
        })
        .filter(|token| !token.is_empty());

    if let Some(token) = token {
        match state.user_service.authenticate(&token).await {
            Ok(user) => {
                req.extensions_mut().insert(user);
            }
            Err(e) if e.is_server_error() => {
                tracing::error!(error = %e, "Session lookup failed");
            }
            Err(_) => {}
        }
    }

    next.run(req).await
}
