//! Quote service.
//!
//! Admins quote tasks, clients accept, decline or counter. A quote carries at
//! most one pending counter-offer: the counter is written with a conditional
//! update so two concurrent counters cannot both land.

use std::sync::Arc;

use sea_orm::sea_query::{Condition, Expr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Deserialize;
use taskdesk_common::{AppError, AppResult};
use taskdesk_db::entities::{Quote, invoice, quote, task_request, user};
use taskdesk_db::repositories::{QuoteRepository, TaskRepository, UserRepository};
use validator::Validate;

use super::billing::{InvoiceIssue, issue_invoice_in, notify_invoice, task_client};
use super::notification::{DeliveryOutcome, NotificationService};
use super::task::{find_task_in, transition_in};
use crate::input::{currency_or, non_empty, now, parse_amount, parse_optional_amount, parse_optional_datetime};

use quote::{CounterStatus, PayOption, QuoteStatus};
use task_request::TaskStatus;

/// Input for a new quote.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateQuoteInput {
    pub price: String,

    #[validate(length(max = 8))]
    pub currency: Option<String>,

    /// `pay_now` or `pay_on_delivery`
    pub pay_option: Option<String>,

    #[validate(length(max = 5000))]
    pub message: Option<String>,

    pub valid_until: Option<String>,
}

/// Input for declining a quote, optionally with a counter-offer.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct DeclineQuoteInput {
    /// When present the decline becomes a counter-offer.
    pub counter_amount: Option<String>,

    #[validate(length(max = 8))]
    pub counter_currency: Option<String>,

    #[validate(length(max = 2000))]
    pub reason: Option<String>,
}

/// A freshly created quote.
#[derive(Debug, Clone)]
pub struct QuoteCreated {
    pub quote: quote::Model,
    pub notification: DeliveryOutcome,
}

/// Result of accepting a quote or a counter-offer.
#[derive(Debug, Clone)]
pub struct QuoteAccepted {
    pub quote: quote::Model,
    pub task: task_request::Model,
    /// Set for pay-now quotes.
    pub invoice: Option<InvoiceIssue>,
    pub notification: Option<DeliveryOutcome>,
}

/// Result of declining a quote.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclineOutcome {
    Declined(quote::Model),
    Countered(quote::Model),
}

impl DeclineOutcome {
    #[must_use]
    pub const fn quote(&self) -> &quote::Model {
        match self {
            Self::Declined(quote) | Self::Countered(quote) => quote,
        }
    }
}

/// Quote service for business logic.
#[derive(Clone)]
pub struct QuoteService {
    db: Arc<DatabaseConnection>,
    quote_repo: QuoteRepository,
    task_repo: TaskRepository,
    user_repo: UserRepository,
    notifications: NotificationService,
    default_currency: String,
}

impl QuoteService {
    /// Create a new quote service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        notifications: NotificationService,
        default_currency: String,
    ) -> Self {
        Self {
            quote_repo: QuoteRepository::new(Arc::clone(&db)),
            task_repo: TaskRepository::new(Arc::clone(&db)),
            user_repo: UserRepository::new(Arc::clone(&db)),
            db,
            notifications,
            default_currency,
        }
    }

    /// Quotes of a task, newest first.
    pub async fn task_quotes(&self, task_id: i32) -> AppResult<Vec<quote::Model>> {
        self.quote_repo.find_by_task(task_id).await
    }

    /// Quote a task and email the client.
    pub async fn create_quote(
        &self,
        admin: &user::Model,
        task_id: i32,
        input: CreateQuoteInput,
    ) -> AppResult<QuoteCreated> {
        require_admin(admin)?;
        input.validate()?;

        let price = parse_amount(&input.price)?;
        let valid_until = parse_optional_datetime(input.valid_until.as_deref())?;

        let txn = self.begin().await?;
        let task = find_task_in(&txn, task_id).await?;

        let quote = quote::ActiveModel {
            task_id: Set(task.id),
            proposed_price: Set(price),
            currency: Set(currency_or(input.currency.as_deref(), &self.default_currency)),
            status: Set(QuoteStatus::Pending),
            pay_option: Set(PayOption::parse_or_default(input.pay_option.as_deref())),
            message: Set(non_empty(input.message)),
            valid_until: Set(valid_until),
            client_counter_amount: Set(None),
            client_counter_currency: Set(None),
            client_counter_reason: Set(None),
            client_counter_status: Set(None),
            client_counter_at: Set(None),
            created_at: Set(now()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let (task, _) = transition_in(&txn, task, TaskStatus::Quoted).await?;
        self.commit(txn).await?;

        tracing::info!(
            quote_id = quote.id,
            task_id = task.id,
            price = quote.proposed_price,
            currency = %quote.currency,
            "Quote created"
        );

        let notification = match task_client(&self.user_repo, &task).await {
            Some(client) => self.notifications.quote_created(&client, &task, &quote).await,
            None => DeliveryOutcome::Skipped("client not found".to_string()),
        };

        Ok(QuoteCreated {
            quote,
            notification,
        })
    }

    /// Accept a quote as its client or an admin.
    ///
    /// A pay-now quote is invoiced at its proposed price right away. If the
    /// task already has an unpaid invoice it is kept and reported as existing.
    pub async fn accept_quote(&self, actor: &user::Model, quote_id: i32) -> AppResult<QuoteAccepted> {
        let txn = self.begin().await?;
        let quote = find_quote_in(&txn, quote_id).await?;
        let task = find_task_in(&txn, quote.task_id).await?;
        require_owner_or_admin(actor, &task)?;

        if !matches!(
            quote.status,
            QuoteStatus::Sent | QuoteStatus::Pending | QuoteStatus::Countered
        ) {
            return Err(AppError::Validation(
                "This quote can no longer be accepted.".to_string(),
            ));
        }

        // A pending counter is decided by an admin. Accepting the quote
        // itself bills the proposed price and rejects the counter.
        let counter_pending = quote.has_pending_counter();
        if counter_pending && !actor.is_admin() {
            return Err(AppError::Validation(
                "Your counter-offer is awaiting review.".to_string(),
            ));
        }
        let amount = quote.proposed_price;
        let currency = quote.currency.clone();

        let mut active: quote::ActiveModel = quote.into();
        active.status = Set(QuoteStatus::Accepted);
        if counter_pending {
            active.client_counter_status = Set(Some(CounterStatus::Rejected));
        }
        let quote = active
            .update(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        self.finish_acceptance(txn, quote, task, amount, &currency)
            .await
    }

    /// Decline a quote, or counter it when an amount is given.
    pub async fn decline_quote(
        &self,
        actor: &user::Model,
        quote_id: i32,
        input: DeclineQuoteInput,
    ) -> AppResult<DeclineOutcome> {
        input.validate()?;
        let counter_amount = parse_optional_amount(input.counter_amount.as_deref())?;

        let quote = self.quote_repo.get_by_id(quote_id).await?;
        let task = self.task_repo.get_by_id(quote.task_id).await?;
        require_owner_or_admin(actor, &task)?;

        if !matches!(quote.status, QuoteStatus::Sent | QuoteStatus::Pending) {
            return Err(AppError::Validation(
                "This quote can no longer be declined.".to_string(),
            ));
        }
        if quote.has_pending_counter() {
            return Err(AppError::Validation(
                "A counter-offer is already pending on this quote.".to_string(),
            ));
        }

        let open = Condition::all()
            .add(quote::Column::Id.eq(quote.id))
            .add(quote::Column::Status.is_in([QuoteStatus::Sent, QuoteStatus::Pending]))
            .add(
                Condition::any()
                    .add(quote::Column::ClientCounterStatus.is_null())
                    .add(quote::Column::ClientCounterStatus.ne(CounterStatus::Pending)),
            );

        let Some(amount) = counter_amount else {
            let result = Quote::update_many()
                .col_expr(quote::Column::Status, Expr::value(QuoteStatus::Declined))
                .filter(open)
                .exec(self.db.as_ref())
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            if result.rows_affected == 0 {
                return Err(AppError::Validation(
                    "This quote can no longer be declined.".to_string(),
                ));
            }
            tracing::info!(quote_id = quote.id, actor_id = actor.id, "Quote declined");
            return Ok(DeclineOutcome::Declined(self.quote_repo.get_by_id(quote.id).await?));
        };

        let currency = currency_or(input.counter_currency.as_deref(), &quote.currency);
        let result = Quote::update_many()
            .col_expr(quote::Column::Status, Expr::value(QuoteStatus::Countered))
            .col_expr(quote::Column::ClientCounterAmount, Expr::value(Some(amount)))
            .col_expr(quote::Column::ClientCounterCurrency, Expr::value(Some(currency)))
            .col_expr(
                quote::Column::ClientCounterReason,
                Expr::value(non_empty(input.reason)),
            )
            .col_expr(
                quote::Column::ClientCounterStatus,
                Expr::value(CounterStatus::Pending),
            )
            .col_expr(quote::Column::ClientCounterAt, Expr::value(Some(now())))
            .filter(open)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            tracing::warn!(quote_id = quote.id, "Counter-offer lost to a concurrent change");
            return Err(AppError::Validation(
                "A counter-offer is already pending on this quote.".to_string(),
            ));
        }

        tracing::info!(quote_id = quote.id, amount, "Counter-offer submitted");
        Ok(DeclineOutcome::Countered(self.quote_repo.get_by_id(quote.id).await?))
    }

    /// Accept the client's pending counter-offer.
    pub async fn admin_accept_counter(
        &self,
        admin: &user::Model,
        quote_id: i32,
    ) -> AppResult<QuoteAccepted> {
        require_admin(admin)?;

        let txn = self.begin().await?;
        let quote = find_quote_in(&txn, quote_id).await?;
        let amount = match quote.client_counter_amount {
            Some(amount) if quote.status == QuoteStatus::Countered && quote.has_pending_counter() => {
                amount
            }
            _ => {
                return Err(AppError::Validation(
                    "There is no pending counter-offer to accept.".to_string(),
                ));
            }
        };
        let currency = quote
            .client_counter_currency
            .clone()
            .unwrap_or_else(|| quote.currency.clone());
        let task = find_task_in(&txn, quote.task_id).await?;

        let mut active: quote::ActiveModel = quote.into();
        active.status = Set(QuoteStatus::Accepted);
        active.client_counter_status = Set(Some(CounterStatus::Accepted));
        let quote = active
            .update(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        self.finish_acceptance(txn, quote, task, amount, &currency)
            .await
    }

    /// Reject the client's pending counter-offer. The original price stands.
    pub async fn admin_reject_counter(
        &self,
        admin: &user::Model,
        quote_id: i32,
    ) -> AppResult<quote::Model> {
        require_admin(admin)?;

        let quote = self.quote_repo.get_by_id(quote_id).await?;
        if !matches!(quote.status, QuoteStatus::Countered | QuoteStatus::Sent)
            || !quote.has_pending_counter()
        {
            return Err(AppError::Validation(
                "There is no pending counter-offer to reject.".to_string(),
            ));
        }

        let result = Quote::update_many()
            .col_expr(quote::Column::Status, Expr::value(QuoteStatus::Sent))
            .col_expr(
                quote::Column::ClientCounterStatus,
                Expr::value(CounterStatus::Rejected),
            )
            .filter(quote::Column::Id.eq(quote.id))
            .filter(quote::Column::ClientCounterStatus.eq(CounterStatus::Pending))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        if result.rows_affected == 0 {
            return Err(AppError::Validation(
                "There is no pending counter-offer to reject.".to_string(),
            ));
        }

        tracing::info!(quote_id = quote.id, admin_id = admin.id, "Counter-offer rejected");
        self.quote_repo.get_by_id(quote.id).await
    }

    /// Move the task to in progress, invoice pay-now quotes, commit and notify.
    async fn finish_acceptance(
        &self,
        txn: sea_orm::DatabaseTransaction,
        quote: quote::Model,
        task: task_request::Model,
        amount: f64,
        currency: &str,
    ) -> AppResult<QuoteAccepted> {
        let (task, _) = transition_in(&txn, task, TaskStatus::InProgress).await?;

        let invoice = if quote.pay_option == PayOption::PayNow {
            let issue = issue_invoice_in(&txn, task.id, amount, currency).await?;
            if let InvoiceIssue::Existing(existing) = &issue {
                tracing::warn!(
                    task_id = task.id,
                    invoice_id = existing.id,
                    "Task already has an unpaid invoice; keeping it"
                );
            }
            Some(issue)
        } else {
            None
        };

        self.commit(txn).await?;
        tracing::info!(quote_id = quote.id, task_id = task.id, "Quote accepted");

        let notification = match &invoice {
            Some(InvoiceIssue::Created(invoice)) => Some(self.notify_invoice(&task, invoice).await),
            _ => None,
        };

        Ok(QuoteAccepted {
            quote,
            task,
            invoice,
            notification,
        })
    }

    async fn notify_invoice(
        &self,
        task: &task_request::Model,
        invoice: &invoice::Model,
    ) -> DeliveryOutcome {
        notify_invoice(&self.notifications, &self.user_repo, task, invoice).await
    }

    async fn begin(&self) -> AppResult<sea_orm::DatabaseTransaction> {
        self.db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn commit(&self, txn: sea_orm::DatabaseTransaction) -> AppResult<()> {
        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

async fn find_quote_in<C: sea_orm::ConnectionTrait>(conn: &C, quote_id: i32) -> AppResult<quote::Model> {
    Quote::find_by_id(quote_id)
        .one(conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("Quote: {quote_id}")))
}

fn require_admin(actor: &user::Model) -> AppResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin access required".to_string()))
    }
}

fn require_owner_or_admin(actor: &user::Model, task: &task_request::Model) -> AppResult<()> {
    if actor.is_admin() || task.client_id == actor.id {
        Ok(())
    } else {
        Err(AppError::Forbidden("Not your task".to_string()))
    }
}
