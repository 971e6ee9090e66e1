//! Rating repository.

use std::sync::Arc;

use crate::entities::{Rating, rating};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use taskdesk_common::{AppError, AppResult};

/// Aggregate over public, non-deleted ratings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatingSummary {
    /// Average stars rounded to one decimal, `0.0` when there are none.
    pub avg: f64,
    /// Number of ratings counted.
    pub count: i64,
}

impl RatingSummary {
    fn from_stars(stars: &[i16]) -> Self {
        if stars.is_empty() {
            return Self { avg: 0.0, count: 0 };
        }
        let total: i64 = stars.iter().map(|s| i64::from(*s)).sum();
        let avg = total as f64 / stars.len() as f64;
        Self {
            avg: (avg * 10.0).round() / 10.0,
            count: stars.len() as i64,
        }
    }
}

/// Which ratings an admin listing shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RatingVisibility {
    /// Everything not deleted.
    #[default]
    Active,
    Public,
    Hidden,
    Deleted,
}

impl RatingVisibility {
    /// Parse a `vis` filter; unknown values fall back to [`Self::Active`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "public" => Self::Public,
            "hidden" => Self::Hidden,
            "deleted" => Self::Deleted,
            _ => Self::Active,
        }
    }

    fn condition(self) -> Condition {
        let live = rating::Column::IsDeleted.eq(false);
        match self {
            Self::Active => Condition::all().add(live),
            Self::Public => Condition::all()
                .add(live)
                .add(rating::Column::IsPublic.eq(true)),
            Self::Hidden => Condition::all()
                .add(live)
                .add(rating::Column::IsPublic.eq(false)),
            Self::Deleted => Condition::all().add(rating::Column::IsDeleted.eq(true)),
        }
    }
}

/// Rating repository for database operations.
#[derive(Clone)]
pub struct RatingRepository {
    db: Arc<DatabaseConnection>,
}

impl RatingRepository {
    /// Create a new rating repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Record a rating.
    pub async fn create(&self, model: rating::ActiveModel) -> AppResult<rating::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a rating by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: i32) -> AppResult<rating::Model> {
        Rating::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(format!("Rating: {id}")))
    }

    /// Newest first, optionally narrowed to comments containing `search`.
    pub async fn list(
        &self,
        visibility: RatingVisibility,
        search: Option<&str>,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<rating::Model>> {
        let mut query = Rating::find().filter(visibility.condition());
        if let Some(search) = search {
            query = query.filter(rating::Column::Comment.contains(search));
        }
        query
            .order_by_desc(rating::Column::CreatedAt)
            .order_by_desc(rating::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Overwrite the moderation flags that are `Some`.
    pub async fn set_flags(
        &self,
        id: i32,
        is_public: Option<bool>,
        is_deleted: Option<bool>,
    ) -> AppResult<rating::Model> {
        let mut active: rating::ActiveModel = self.get_by_id(id).await?.into();
        if let Some(is_public) = is_public {
            active.is_public = Set(is_public);
        }
        if let Some(is_deleted) = is_deleted {
            active.is_deleted = Set(is_deleted);
        }
        active
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count ratings from this user or IP created at or after `since`.
    pub async fn count_recent(
        &self,
        user_id: Option<i32>,
        ip: Option<&str>,
        since: chrono::DateTime<chrono::FixedOffset>,
    ) -> AppResult<u64> {
        let mut who = Condition::any();
        if let Some(user_id) = user_id {
            who = who.add(rating::Column::UserId.eq(user_id));
        }
        if let Some(ip) = ip {
            who = who.add(rating::Column::Ip.eq(ip));
        }
        if who.is_empty() {
            return Ok(0);
        }

        Rating::find()
            .filter(who)
            .filter(rating::Column::CreatedAt.gte(since))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Average and count of public ratings.
    pub async fn summary(&self) -> AppResult<RatingSummary> {
        let stars: Vec<i16> = Rating::find()
            .select_only()
            .column(rating::Column::Stars)
            .filter(rating::Column::IsPublic.eq(true))
            .filter(rating::Column::IsDeleted.eq(false))
            .into_tuple()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(RatingSummary::from_stars(&stars))
    }
}
