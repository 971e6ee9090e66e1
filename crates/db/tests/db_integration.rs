//! Database integration tests.
//!
//! These run against a migrated in-memory `SQLite` database. Set
//! `TEST_DATABASE_URL` and run the ignored tests to repeat them against
//! `PostgreSQL`:
//!   `cargo test --test db_integration -- --ignored`

#![allow(clippy::unwrap_used)]

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, Set};
use taskdesk_common::AppError;
use taskdesk_db::entities::{invoice, quote, rating, subscriber, user};
use taskdesk_db::repositories::{InvoiceRepository, RatingRepository, SubscriberRepository};
use taskdesk_db::test_utils::TestDatabase;

async fn unpaid_invoice(db: &TestDatabase, task_id: i32) -> invoice::Model {
    invoice::ActiveModel {
        task_id: Set(task_id),
        amount: Set(250.0),
        currency: Set("UGX".to_string()),
        status: Set(invoice::InvoiceStatus::Unpaid),
        issued_at: Set(Utc::now().into()),
        ..Default::default()
    }
    .insert(db.connection())
    .await
    .unwrap()
}

#[tokio::test]
async fn test_mark_paid_happens_once() {
    let db = TestDatabase::in_memory().await.unwrap();
    let client = db.seed_user("c@example.com", user::UserRole::Client).await.unwrap();
    let task = db.seed_task(client.id, "Translate brochure").await.unwrap();
    let inv = unpaid_invoice(&db, task.id).await;
    let repo = InvoiceRepository::new(db.shared());

    let now = Utc::now().into();
    assert!(repo.mark_paid_if_unpaid(inv.id, now).await.unwrap());
    assert!(!repo.mark_paid_if_unpaid(inv.id, now).await.unwrap());

    // A late failure callback must not reopen a paid invoice
    assert!(!repo.mark_unpaid_if_open(inv.id).await.unwrap());

    let stored = repo.get_by_id(inv.id).await.unwrap();
    assert_eq!(stored.status, invoice::InvoiceStatus::Paid);
    assert!(stored.paid_at.is_some());
    assert!(repo.find_unpaid_for_task(task.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_gateway_callbacks_leave_closed_invoices_alone() {
    let db = TestDatabase::in_memory().await.unwrap();
    let client = db.seed_user("c@example.com", user::UserRole::Client).await.unwrap();
    let task = db.seed_task(client.id, "Poster").await.unwrap();
    let repo = InvoiceRepository::new(db.shared());

    for closed in [invoice::InvoiceStatus::Void, invoice::InvoiceStatus::Refunded] {
        let inv = unpaid_invoice(&db, task.id).await;
        let mut active: invoice::ActiveModel = inv.into();
        active.status = Set(closed);
        let inv = active.update(db.connection()).await.unwrap();

        assert!(!repo.mark_unpaid_if_open(inv.id).await.unwrap());
        assert!(!repo.mark_paid_if_unpaid(inv.id, Utc::now().into()).await.unwrap());

        let stored = repo.get_by_id(inv.id).await.unwrap();
        assert_eq!(stored.status, closed);
        assert!(stored.paid_at.is_none());
    }
    assert!(repo.find_unpaid_for_task(task.id).await.unwrap().is_none());

    let open = unpaid_invoice(&db, task.id).await;
    assert!(repo.mark_unpaid_if_open(open.id).await.unwrap());
    assert_eq!(
        repo.get_by_id(open.id).await.unwrap().status,
        invoice::InvoiceStatus::Unpaid
    );
}

#[tokio::test]
async fn test_paid_invoice_frees_the_unpaid_slot() {
    let db = TestDatabase::in_memory().await.unwrap();
    let client = db.seed_user("c@example.com", user::UserRole::Client).await.unwrap();
    let task = db.seed_task(client.id, "Data entry").await.unwrap();
    let repo = InvoiceRepository::new(db.shared());

    let first = unpaid_invoice(&db, task.id).await;
    repo.mark_paid_if_unpaid(first.id, Utc::now().into())
        .await
        .unwrap();
    let second = unpaid_invoice(&db, task.id).await;

    let all = repo.find_by_task(task.id).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, second.id);
    assert_eq!(
        repo.find_unpaid_for_task(task.id).await.unwrap().map(|i| i.id),
        Some(second.id)
    );
}

#[tokio::test]
async fn test_quote_defaults_survive_round_trip() {
    let db = TestDatabase::in_memory().await.unwrap();
    let client = db.seed_user("c@example.com", user::UserRole::Client).await.unwrap();
    let task = db.seed_task(client.id, "Logo").await.unwrap();

    let q = db
        .seed_quote(task.id, 120.5, quote::PayOption::PayOnDelivery, quote::QuoteStatus::Sent)
        .await
        .unwrap();
    assert_eq!(q.currency, "UGX");
    assert!(q.client_counter_status.is_none());
}

#[tokio::test]
async fn test_duplicate_subscriber_is_conflict() {
    let db = TestDatabase::in_memory().await.unwrap();
    let repo = SubscriberRepository::new(db.shared());

    let row = |token: &str| subscriber::ActiveModel {
        email: Set("fan@example.com".to_string()),
        name: Set(None),
        source: Set(Some("footer".to_string())),
        token: Set(token.to_string()),
        is_active: Set(true),
        unsubscribed_at: Set(None),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    };

    repo.create(row("tok-1")).await.unwrap();
    let err = repo.create(row("tok-2")).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let found = repo.find_by_token("tok-1").await.unwrap().unwrap();
    assert_eq!(found.email, "fan@example.com");
    assert_eq!(repo.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_recent_ratings_by_user_or_ip() {
    let db = TestDatabase::in_memory().await.unwrap();
    let repo = RatingRepository::new(db.shared());
    let now = Utc::now();

    for (stars, ip, public) in [(5, "10.0.0.1", true), (2, "10.0.0.2", true), (1, "10.0.0.3", false)] {
        repo.create(rating::ActiveModel {
            user_id: Set(None),
            stars: Set(stars),
            comment: Set(None),
            is_public: Set(public),
            is_deleted: Set(false),
            ip: Set(Some(ip.to_string())),
            user_agent: Set(None),
            created_at: Set(now.into()),
            ..Default::default()
        })
        .await
        .unwrap();
    }

    let since = (now - Duration::seconds(30)).into();
    assert_eq!(repo.count_recent(None, Some("10.0.0.1"), since).await.unwrap(), 1);
    assert_eq!(repo.count_recent(None, Some("10.9.9.9"), since).await.unwrap(), 0);
    assert_eq!(repo.count_recent(None, None, since).await.unwrap(), 0);

    let summary = repo.summary().await.unwrap();
    assert_eq!(summary.count, 2);
    assert!((summary.avg - 3.5).abs() < f64::EPSILON);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL pointing at PostgreSQL"]
async fn test_migrations_on_external_database() {
    let url = std::env::var("TEST_DATABASE_URL").unwrap();
    let db = TestDatabase::with_url(&url).await.unwrap();
    let client = db
        .seed_user(&format!("c{}@example.com", Utc::now().timestamp_micros()), user::UserRole::Client)
        .await
        .unwrap();
    let task = db.seed_task(client.id, "Smoke").await.unwrap();
    let inv = unpaid_invoice(&db, task.id).await;

    let repo = InvoiceRepository::new(db.shared());
    assert!(repo.mark_paid_if_unpaid(inv.id, Utc::now().into()).await.unwrap());
}
