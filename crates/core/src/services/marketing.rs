//! Newsletter subscribers.

use std::fmt::Write as _;

use chrono::{SecondsFormat, Utc};
use sea_orm::Set;
use taskdesk_common::{AppError, AppResult, TokenGenerator};
use taskdesk_db::entities::subscriber;
use taskdesk_db::repositories::SubscriberRepository;

use crate::input::{non_empty, now};

const DEFAULT_SOURCE: &str = "footer";
const CSV_HEADER: &str = "email,name,is_active,source,created_at";

/// Marketing service for business logic.
#[derive(Clone)]
pub struct MarketingService {
    subscriber_repo: SubscriberRepository,
    tokens: TokenGenerator,
}

impl MarketingService {
    /// Create a new marketing service.
    #[must_use]
    pub const fn new(subscriber_repo: SubscriberRepository) -> Self {
        Self {
            subscriber_repo,
            tokens: TokenGenerator::new(),
        }
    }

    /// Subscribe an address. Repeating it is harmless and revives an
    /// unsubscribed entry.
    pub async fn subscribe(
        &self,
        email: &str,
        name: Option<String>,
        source: Option<String>,
    ) -> AppResult<subscriber::Model> {
        let email = email.trim().to_lowercase();
        if !validator::ValidateEmail::validate_email(&email) {
            return Err(AppError::Validation("Please enter a valid email.".to_string()));
        }
        let name = non_empty(name);

        if let Some(existing) = self.subscriber_repo.find_by_email(&email).await? {
            if existing.is_active && (existing.name.is_some() || name.is_none()) {
                return Ok(existing);
            }
            let reactivated = !existing.is_active;
            let mut active: subscriber::ActiveModel = existing.clone().into();
            if reactivated {
                active.is_active = Set(true);
                active.unsubscribed_at = Set(None);
            }
            if existing.name.is_none() && name.is_some() {
                active.name = Set(name);
            }
            let updated = self.subscriber_repo.update(active).await?;
            if reactivated {
                tracing::info!(subscriber_id = updated.id, "Subscriber reactivated");
            }
            return Ok(updated);
        }

        let created = self
            .subscriber_repo
            .create(subscriber::ActiveModel {
                email: Set(email),
                name: Set(name),
                source: Set(Some(non_empty(source).unwrap_or_else(|| DEFAULT_SOURCE.to_string()))),
                token: Set(self.tokens.link_token()),
                is_active: Set(true),
                unsubscribed_at: Set(None),
                created_at: Set(now()),
                ..Default::default()
            })
            .await?;
        tracing::info!(subscriber_id = created.id, "Subscriber added");
        Ok(created)
    }

    /// Unsubscribe via the link token.
    pub async fn unsubscribe(&self, token: &str) -> AppResult<subscriber::Model> {
        let existing = self
            .subscriber_repo
            .find_by_token(token)
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;
        if !existing.is_active {
            return Ok(existing);
        }

        let mut active: subscriber::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.unsubscribed_at = Set(Some(now()));
        let updated = self.subscriber_repo.update(active).await?;
        tracing::info!(subscriber_id = updated.id, "Subscriber unsubscribed");
        Ok(updated)
    }

    /// All subscribers as CSV, newest first.
    pub async fn export_csv(&self) -> AppResult<String> {
        let subscribers = self.subscriber_repo.list_all().await?;
        Ok(subscribers_csv(&subscribers))
    }
}

/// Render subscribers as CSV.
#[must_use]
pub fn subscribers_csv(subscribers: &[subscriber::Model]) -> String {
    let mut out = String::with_capacity(64 * (subscribers.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');
    for s in subscribers {
        let _ = writeln!(
            out,
            "{},{},{},{},{}",
            s.email,
            s.name.as_deref().unwrap_or_default().replace(',', " "),
            u8::from(s.is_active),
            s.source.as_deref().unwrap_or_default(),
            s.created_at
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use taskdesk_db::test_utils::TestDatabase;

    async fn service() -> (TestDatabase, MarketingService) {
        let db = TestDatabase::in_memory().await.unwrap();
        let service = MarketingService::new(SubscriberRepository::new(db.shared()));
        (db, service)
    }

    #[test]
    fn test_csv_escaping() {
        let row = subscriber::Model {
            id: 1,
            email: "a@example.com".to_string(),
            name: Some("Doe, Jane".to_string()),
            source: None,
            token: "t".to_string(),
            is_active: false,
            unsubscribed_at: None,
            created_at: Utc.with_ymd_and_hms(2025, 2, 3, 4, 5, 6).unwrap().fixed_offset(),
        };
        assert_eq!(
            subscribers_csv(&[row]),
            "email,name,is_active,source,created_at\na@example.com,Doe  Jane,0,,2025-02-03T04:05:06Z\n"
        );
        assert_eq!(subscribers_csv(&[]), "email,name,is_active,source,created_at\n");
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent_and_reactivates() {
        let (_db, service) = service().await;

        let first = service.subscribe(" News@Example.com ", None, None).await.unwrap();
        assert_eq!(first.email, "news@example.com");
        assert_eq!(first.source.as_deref(), Some("footer"));

        let again = service
            .subscribe("news@example.com", Some("Neo".to_string()), Some("blog".to_string()))
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.name.as_deref(), Some("Neo"));
        assert_eq!(again.source.as_deref(), Some("footer"));

        let gone = service.unsubscribe(&first.token).await.unwrap();
        assert!(!gone.is_active);
        assert!(gone.unsubscribed_at.is_some());

        let back = service.subscribe("news@example.com", None, None).await.unwrap();
        assert_eq!(back.id, first.id);
        assert!(back.is_active);
        assert!(back.unsubscribed_at.is_none());

        let csv = service.export_csv().await.unwrap();
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.lines().nth(1).unwrap().starts_with("news@example.com,Neo,1,footer,"));
    }

    #[tokio::test]
    async fn test_subscribe_rejects_bad_email() {
        let (_db, service) = service().await;
        let err = service.subscribe("not-an-email", None, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_token() {
        let (_db, service) = service().await;
        assert!(matches!(
            service.unsubscribe("missing").await,
            Err(AppError::NotFound(_))
        ));
    }
}
