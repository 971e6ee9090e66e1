//! Site ratings.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use sea_orm::Set;
use taskdesk_common::config::RatingsConfig;
use taskdesk_common::{AppError, AppResult, TtlCache};
use taskdesk_db::entities::rating;
use taskdesk_db::repositories::{RatingRepository, RatingSummary, RatingVisibility};

use crate::input::{non_empty, now};

const MAX_COMMENT_CHARS: usize = 2000;
const MAX_USER_AGENT_CHARS: usize = 300;
const MAX_IP_CHARS: usize = 64;
const ADMIN_PAGE_SIZE: u64 = 30;

/// A rating as submitted from the site footer.
#[derive(Debug, Clone, Default)]
pub struct RatingInput {
    pub user_id: Option<i32>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub stars: i16,
    pub comment: Option<String>,
}

/// Admin moderation actions on a rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingModeration {
    Hide,
    Unhide,
    Delete,
    Restore,
}

impl RatingModeration {
    /// Flash text after the action succeeds.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Hide => "Rating hidden.",
            Self::Unhide => "Rating made public.",
            Self::Delete => "Rating deleted.",
            Self::Restore => "Rating restored.",
        }
    }

    const fn flags(self) -> (Option<bool>, Option<bool>) {
        match self {
            Self::Hide => (Some(false), None),
            Self::Unhide => (Some(true), None),
            Self::Delete => (None, Some(true)),
            Self::Restore => (None, Some(false)),
        }
    }
}

/// Rating service for business logic.
#[derive(Clone)]
pub struct RatingService {
    rating_repo: RatingRepository,
    throttle: ChronoDuration,
    summary_cache: Arc<TtlCache<(), RatingSummary>>,
}

impl RatingService {
    /// Create a new rating service.
    #[must_use]
    pub fn new(rating_repo: RatingRepository, config: &RatingsConfig) -> Self {
        Self {
            rating_repo,
            throttle: ChronoDuration::seconds(config.throttle_seconds),
            summary_cache: Arc::new(TtlCache::new(Duration::from_secs(config.summary_ttl_secs))),
        }
    }

    /// Record a rating, throttled per signed-in user or else per IP.
    pub async fn submit(&self, input: RatingInput) -> AppResult<rating::Model> {
        if !(1..=5).contains(&input.stars) {
            return Err(AppError::Validation(
                "Please select a rating between 1 and 5 stars.".to_string(),
            ));
        }
        let comment = non_empty(input.comment);
        if comment.as_ref().is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS) {
            return Err(AppError::Validation("Comment is too long.".to_string()));
        }

        let ip = non_empty(input.ip).map(|ip| truncate(&ip, MAX_IP_CHARS));
        let at = now();
        let recent = match input.user_id {
            Some(user_id) => {
                self.rating_repo
                    .count_recent(Some(user_id), None, at - self.throttle)
                    .await?
            }
            None => {
                self.rating_repo
                    .count_recent(None, ip.as_deref(), at - self.throttle)
                    .await?
            }
        };
        if recent > 0 {
            tracing::debug!(user_id = ?input.user_id, ip = ?ip, "Rating throttled");
            return Err(AppError::RateLimited);
        }

        let created = self
            .rating_repo
            .create(rating::ActiveModel {
                user_id: Set(input.user_id),
                stars: Set(input.stars),
                comment: Set(comment),
                is_public: Set(true),
                is_deleted: Set(false),
                ip: Set(ip),
                user_agent: Set(non_empty(input.user_agent).map(|ua| truncate(&ua, MAX_USER_AGENT_CHARS))),
                created_at: Set(at),
                ..Default::default()
            })
            .await?;

        self.summary_cache.invalidate(&());
        tracing::info!(rating_id = created.id, stars = created.stars, "Rating recorded");
        Ok(created)
    }

    /// Public average and count, served from cache.
    pub async fn summary(&self) -> AppResult<RatingSummary> {
        if let Some(summary) = self.summary_cache.get(&()) {
            return Ok(summary);
        }
        let summary = self.rating_repo.summary().await?;
        self.summary_cache.insert((), summary);
        Ok(summary)
    }

    /// One page of ratings for the admin listing. Pages start at 1.
    pub async fn admin_list(
        &self,
        visibility: RatingVisibility,
        search: Option<String>,
        page: u64,
    ) -> AppResult<Vec<rating::Model>> {
        let search = non_empty(search);
        let offset = page.max(1).saturating_sub(1) * ADMIN_PAGE_SIZE;
        self.rating_repo
            .list(visibility, search.as_deref(), offset, ADMIN_PAGE_SIZE)
            .await
    }

    /// Hide, unhide, delete or restore a rating.
    pub async fn moderate(
        &self,
        admin_id: i32,
        rating_id: i32,
        action: RatingModeration,
    ) -> AppResult<rating::Model> {
        let (is_public, is_deleted) = action.flags();
        let rating = self
            .rating_repo
            .set_flags(rating_id, is_public, is_deleted)
            .await?;
        self.summary_cache.invalidate(&());
        tracing::info!(rating_id, admin_id, ?action, "Rating moderated");
        Ok(rating)
    }
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use taskdesk_db::test_utils::TestDatabase;

    async fn service(throttle_seconds: i64) -> (TestDatabase, RatingService) {
        let db = TestDatabase::in_memory().await.unwrap();
        let config = RatingsConfig {
            throttle_seconds,
            summary_ttl_secs: 60,
        };
        let service = RatingService::new(RatingRepository::new(db.shared()), &config);
        (db, service)
    }

    fn from_ip(ip: &str, stars: i16) -> RatingInput {
        RatingInput {
            ip: Some(ip.to_string()),
            user_agent: Some("test-agent".to_string()),
            stars,
            ..RatingInput::default()
        }
    }

    #[tokio::test]
    async fn test_stars_are_bounded() {
        let (_db, service) = service(60).await;
        for stars in [0, 6] {
            assert!(matches!(
                service.submit(from_ip("10.0.0.1", stars)).await,
                Err(AppError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_throttle_per_ip() {
        let (_db, service) = service(60).await;
        service.submit(from_ip("10.0.0.1", 5)).await.unwrap();

        assert!(matches!(
            service.submit(from_ip("10.0.0.1", 4)).await,
            Err(AppError::RateLimited)
        ));
        assert!(service.submit(from_ip("10.0.0.2", 4)).await.is_ok());
    }

    #[tokio::test]
    async fn test_summary_is_refreshed_after_submit() {
        let (_db, service) = service(0).await;
        assert_eq!(service.summary().await.unwrap().count, 0);

        service.submit(from_ip("10.0.0.1", 5)).await.unwrap();
        service.submit(from_ip("10.0.0.2", 4)).await.unwrap();
        service.submit(from_ip("10.0.0.3", 4)).await.unwrap();

        let summary = service.summary().await.unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.avg, 4.3);
    }

    #[tokio::test]
    async fn test_moderation_updates_summary_and_listing() {
        let (_db, service) = service(0).await;
        let five = service.submit(from_ip("10.0.0.1", 5)).await.unwrap();
        let mut spam = from_ip("10.0.0.2", 1);
        spam.comment = Some("buy cheap followers".to_string());
        let spam = service.submit(spam).await.unwrap();
        assert_eq!(service.summary().await.unwrap().count, 2);

        let hidden = service.moderate(1, spam.id, RatingModeration::Hide).await.unwrap();
        assert!(!hidden.is_public);
        let summary = service.summary().await.unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.avg, 5.0);

        let listed = service
            .admin_list(RatingVisibility::Hidden, Some("cheap".to_string()), 1)
            .await
            .unwrap();
        assert_eq!(listed.iter().map(|r| r.id).collect::<Vec<_>>(), vec![spam.id]);

        service.moderate(1, five.id, RatingModeration::Delete).await.unwrap();
        assert_eq!(service.summary().await.unwrap().count, 0);
        let active = service
            .admin_list(RatingVisibility::Active, None, 1)
            .await
            .unwrap();
        assert_eq!(active.iter().map(|r| r.id).collect::<Vec<_>>(), vec![spam.id]);

        service.moderate(1, five.id, RatingModeration::Restore).await.unwrap();
        service.moderate(1, spam.id, RatingModeration::Unhide).await.unwrap();
        assert_eq!(service.summary().await.unwrap().count, 2);
        assert!(
            service
                .admin_list(RatingVisibility::Deleted, None, 1)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_moderating_missing_rating_is_not_found() {
        let (_db, service) = service(0).await;
        assert!(matches!(
            service.moderate(1, 404, RatingModeration::Hide).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_long_comment_rejected() {
        let (_db, service) = service(60).await;
        let mut input = from_ip("10.0.0.1", 3);
        input.comment = Some("x".repeat(MAX_COMMENT_CHARS + 1));
        assert!(matches!(service.submit(input).await, Err(AppError::Validation(_))));
    }
}
