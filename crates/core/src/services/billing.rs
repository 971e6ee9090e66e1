//! Invoice issuing shared by the task, quote, assignment and meeting flows.
//!
//! The helpers here take any [`ConnectionTrait`] so callers can run them inside
//! their own transaction.

use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use taskdesk_common::{AppError, AppResult};
use taskdesk_db::entities::{Invoice, Quote, invoice, quote, task_request, user};
use taskdesk_db::repositories::UserRepository;

use super::notification::{DeliveryOutcome, NotificationService};
use crate::input::now;

/// Result of asking for an invoice on a task.
#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceIssue {
    /// A new unpaid invoice was inserted.
    Created(invoice::Model),
    /// The task already had an unpaid invoice; it was left untouched.
    Existing(invoice::Model),
}

impl InvoiceIssue {
    /// The invoice, whichever way it was obtained.
    #[must_use]
    pub const fn invoice(&self) -> &invoice::Model {
        match self {
            Self::Created(invoice) | Self::Existing(invoice) => invoice,
        }
    }

    /// The invoice if this call created it.
    #[must_use]
    pub fn created(self) -> Option<invoice::Model> {
        match self {
            Self::Created(invoice) => Some(invoice),
            Self::Existing(_) => None,
        }
    }
}

/// The unpaid invoice of a task, if any.
pub(crate) async fn find_unpaid_in<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
) -> AppResult<Option<invoice::Model>> {
    Invoice::find()
        .filter(invoice::Column::TaskId.eq(task_id))
        .filter(invoice::Column::Status.eq(invoice::InvoiceStatus::Unpaid))
        .one(conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
}

/// Most recently created accepted quote of a task. Ties go to the highest id.
pub(crate) async fn latest_accepted_quote_in<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
) -> AppResult<Option<quote::Model>> {
    Quote::find()
        .filter(quote::Column::TaskId.eq(task_id))
        .filter(quote::Column::Status.eq(quote::QuoteStatus::Accepted))
        .order_by_desc(quote::Column::CreatedAt)
        .order_by_desc(quote::Column::Id)
        .one(conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
}

/// Issue an unpaid invoice unless the task already has one.
///
/// The insert is `ON CONFLICT DO NOTHING` against the one-unpaid-invoice
/// index, so a concurrent issuer never aborts the surrounding transaction.
pub(crate) async fn issue_invoice_in<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
    amount: f64,
    currency: &str,
) -> AppResult<InvoiceIssue> {
    if let Some(existing) = find_unpaid_in(conn, task_id).await? {
        return Ok(InvoiceIssue::Existing(existing));
    }

    let model = invoice::ActiveModel {
        task_id: Set(task_id),
        amount: Set(round_money(amount)),
        currency: Set(currency.to_uppercase()),
        status: Set(invoice::InvoiceStatus::Unpaid),
        issued_at: Set(now()),
        paid_at: Set(None),
        gateway: Set(None),
        gateway_status: Set(None),
        gateway_meta: Set(None),
        pesapal_tracking_id: Set(None),
        pesapal_merchant_ref: Set(None),
        ..Default::default()
    };

    let inserted = Invoice::insert(model)
        .on_conflict(OnConflict::new().do_nothing().to_owned())
        .exec_without_returning(conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    let unpaid = find_unpaid_in(conn, task_id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("Unpaid invoice for task {task_id} vanished")))?;

    if inserted == 0 {
        tracing::debug!(task_id, invoice_id = unpaid.id, "Lost invoice race, using existing");
        Ok(InvoiceIssue::Existing(unpaid))
    } else {
        tracing::info!(
            task_id,
            invoice_id = unpaid.id,
            amount = unpaid.amount,
            currency = %unpaid.currency,
            "Invoice issued"
        );
        Ok(InvoiceIssue::Created(unpaid))
    }
}

/// Bill a pay-on-delivery task when it enters review.
///
/// Idempotent: returns the invoice only when this call created it.
pub(crate) async fn ensure_review_invoice_in<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
) -> AppResult<Option<invoice::Model>> {
    if find_unpaid_in(conn, task_id).await?.is_some() {
        return Ok(None);
    }

    let Some(quote) = latest_accepted_quote_in(conn, task_id).await? else {
        tracing::debug!(task_id, "No accepted quote; review invoice not needed");
        return Ok(None);
    };
    if quote.pay_option != quote::PayOption::PayOnDelivery {
        return Ok(None);
    }

    let issue = issue_invoice_in(conn, task_id, quote.agreed_price(), &quote.agreed_currency()).await?;
    Ok(issue.created())
}

/// Email the client about a freshly issued invoice.
pub(crate) async fn notify_invoice(
    notifications: &NotificationService,
    users: &UserRepository,
    task: &task_request::Model,
    invoice: &invoice::Model,
) -> DeliveryOutcome {
    match users.find_by_id(task.client_id).await {
        Ok(Some(client)) => notifications.invoice_created(&client, task, invoice).await,
        Ok(None) => DeliveryOutcome::Skipped("client not found".to_string()),
        Err(e) => {
            tracing::error!(task_id = task.id, error = %e, "Could not load client for invoice email");
            DeliveryOutcome::Failed(e.public_message())
        }
    }
}

/// Load the client of a task for an email, logging rather than failing.
pub(crate) async fn task_client(
    users: &UserRepository,
    task: &task_request::Model,
) -> Option<user::Model> {
    match users.find_by_id(task.client_id).await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(task_id = task.id, error = %e, "Could not load task client");
            None
        }
    }
}

/// Round to two decimals, the precision the gateway accepts.
#[must_use]
pub fn round_money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::TransactionTrait;
    use taskdesk_db::test_utils::TestDatabase;

    async fn setup() -> (TestDatabase, task_request::Model) {
        let db = TestDatabase::in_memory().await.unwrap();
        let client = db.seed_user("client@example.com", user::UserRole::Client).await.unwrap();
        let task = db.seed_task(client.id, "Brand kit").await.unwrap();
        (db, task)
    }

    #[tokio::test]
    async fn test_ensure_review_invoice_is_idempotent() {
        let (db, task) = setup().await;
        db.seed_quote(task.id, 500.0, quote::PayOption::PayOnDelivery, quote::QuoteStatus::Accepted)
            .await
            .unwrap();

        let first = ensure_review_invoice_in(db.connection(), task.id).await.unwrap();
        let second = ensure_review_invoice_in(db.connection(), task.id).await.unwrap();

        let invoice = first.unwrap();
        assert_eq!(invoice.amount, 500.0);
        assert_eq!(invoice.status, invoice::InvoiceStatus::Unpaid);
        assert!(second.is_none());

        let all = Invoice::find().all(db.connection()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_pay_now_quote_is_not_billed_on_review() {
        let (db, task) = setup().await;
        db.seed_quote(task.id, 300.0, quote::PayOption::PayNow, quote::QuoteStatus::Accepted)
            .await
            .unwrap();

        assert!(ensure_review_invoice_in(db.connection(), task.id).await.unwrap().is_none());
        assert!(find_unpaid_in(db.connection(), task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_accepted_quote_wins() {
        let (db, task) = setup().await;
        db.seed_quote(task.id, 100.0, quote::PayOption::PayOnDelivery, quote::QuoteStatus::Accepted)
            .await
            .unwrap();
        db.seed_quote(task.id, 900.0, quote::PayOption::PayOnDelivery, quote::QuoteStatus::Declined)
            .await
            .unwrap();
        let latest = db
            .seed_quote(task.id, 250.0, quote::PayOption::PayOnDelivery, quote::QuoteStatus::Accepted)
            .await
            .unwrap();

        let found = latest_accepted_quote_in(db.connection(), task.id).await.unwrap().unwrap();
        assert_eq!(found.id, latest.id);

        let invoice = ensure_review_invoice_in(db.connection(), task.id).await.unwrap().unwrap();
        assert_eq!(invoice.amount, 250.0);
    }

    #[tokio::test]
    async fn test_issue_inside_transaction_keeps_existing() {
        let (db, task) = setup().await;

        let txn = db.connection().begin().await.unwrap();
        let first = issue_invoice_in(&txn, task.id, 120.456, "ugx").await.unwrap();
        let second = issue_invoice_in(&txn, task.id, 999.0, "USD").await.unwrap();
        txn.commit().await.unwrap();

        let InvoiceIssue::Created(created) = first else {
            panic!("expected a new invoice");
        };
        assert_eq!(created.amount, 120.46);
        assert_eq!(created.currency, "UGX");
        assert_eq!(second, InvoiceIssue::Existing(created));
    }

    #[tokio::test]
    async fn test_concurrent_review_invoices_yield_one() {
        let (db, task) = setup().await;
        db.seed_quote(task.id, 500.0, quote::PayOption::PayOnDelivery, quote::QuoteStatus::Accepted)
            .await
            .unwrap();

        let run = || async {
            let txn = db.connection().begin().await.unwrap();
            let created = ensure_review_invoice_in(&txn, task.id).await.unwrap();
            txn.commit().await.unwrap();
            created
        };
        let (a, b) = tokio::join!(run(), run());

        assert_eq!(usize::from(a.is_some()) + usize::from(b.is_some()), 1);
        let all = Invoice::find().all(db.connection()).await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
