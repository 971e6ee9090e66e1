//! Test utilities for database operations.
//!
//! Tests run against a private in-memory `SQLite` database with every
//! migration applied, so constraints behave as they do in production.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, DbErr, Set};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tracing::info;

use crate::entities::{quote, task_request, user};
use crate::migrations::Migrator;

/// A migrated throwaway database.
pub struct TestDatabase {
    /// Database connection.
    pub conn: Arc<DatabaseConnection>,
}

impl TestDatabase {
    /// Create a fresh in-memory database and run all migrations.
    ///
    /// The pool holds a single connection: every `sqlite::memory:`
    /// connection would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self, DbErr> {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);

        let conn = Database::connect(opt).await?;
        Migrator::up(&conn, None).await?;

        info!("Created in-memory test database");

        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    /// Connect to an external database (e.g. `TEST_DATABASE_URL`) and migrate it.
    pub async fn with_url(url: &str) -> Result<Self, DbErr> {
        let conn = Database::connect(url).await?;
        Migrator::up(&conn, None).await?;

        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    /// Get the database connection.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Shared handle for building repositories and services.
    #[must_use]
    pub fn shared(&self) -> Arc<DatabaseConnection> {
        Arc::clone(&self.conn)
    }

    /// Insert an active user with the given role.
    pub async fn seed_user(&self, email: &str, role: user::UserRole) -> Result<user::Model, DbErr> {
        user::ActiveModel {
            name: Set(email.split('@').next().unwrap_or(email).to_string()),
            email: Set(email.to_lowercase()),
            phone: Set(None),
            password_hash: Set("not-a-real-hash".to_string()),
            role: Set(role),
            status: Set(user::UserStatus::Active),
            token: Set(None),
            deleted_at: Set(None),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(self.connection())
        .await
    }

    /// Insert a submitted task for `client_id`.
    pub async fn seed_task(&self, client_id: i32, title: &str) -> Result<task_request::Model, DbErr> {
        task_request::ActiveModel {
            client_id: Set(client_id),
            title: Set(title.to_string()),
            category: Set(None),
            description: Set(None),
            admin_notes: Set(None),
            deadline_at: Set(None),
            client_budget: Set(None),
            priority: Set("normal".to_string()),
            status: Set(task_request::TaskStatus::Submitted),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(self.connection())
        .await
    }

    /// Insert a quote on `task_id`.
    pub async fn seed_quote(
        &self,
        task_id: i32,
        price: f64,
        pay_option: quote::PayOption,
        status: quote::QuoteStatus,
    ) -> Result<quote::Model, DbErr> {
        quote::ActiveModel {
            task_id: Set(task_id),
            proposed_price: Set(price),
            currency: Set("UGX".to_string()),
            status: Set(status),
            pay_option: Set(pay_option),
            message: Set(None),
            valid_until: Set(None),
            client_counter_amount: Set(None),
            client_counter_currency: Set(None),
            client_counter_reason: Set(None),
            client_counter_status: Set(None),
            client_counter_at: Set(None),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .insert(self.connection())
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::invoice;

    #[tokio::test]
    async fn test_in_memory_is_migrated() {
        let db = TestDatabase::in_memory().await.unwrap();
        let client = db
            .seed_user("Client@Example.com", user::UserRole::Client)
            .await
            .unwrap();
        assert_eq!(client.email, "client@example.com");

        let task = db.seed_task(client.id, "Logo").await.unwrap();
        assert_eq!(task.status, task_request::TaskStatus::Submitted);
    }

    #[tokio::test]
    async fn test_second_unpaid_invoice_is_rejected() {
        let db = TestDatabase::in_memory().await.unwrap();
        let client = db.seed_user("c@example.com", user::UserRole::Client).await.unwrap();
        let task = db.seed_task(client.id, "Report").await.unwrap();

        let unpaid = || invoice::ActiveModel {
            task_id: Set(task.id),
            amount: Set(100.0),
            currency: Set("UGX".to_string()),
            status: Set(invoice::InvoiceStatus::Unpaid),
            issued_at: Set(Utc::now().into()),
            ..Default::default()
        };

        unpaid().insert(db.connection()).await.unwrap();
        let err = unpaid().insert(db.connection()).await.unwrap_err();
        assert!(matches!(crate::db_error(err), taskdesk_common::AppError::Conflict(_)));

        // A paid invoice does not count against the limit.
        let mut paid = unpaid();
        paid.status = Set(invoice::InvoiceStatus::Paid);
        paid.insert(db.connection()).await.unwrap();
    }
}
