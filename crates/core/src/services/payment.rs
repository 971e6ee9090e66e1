//! Payment reconciliation with the Pesapal gateway.
//!
//! Checkout submits an order and hands back the gateway's redirect. The
//! payer's return and the gateway's IPN both land in [`PaymentService::sync_invoice`],
//! which is safe to run any number of times for the same payment.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use sea_orm::{DatabaseConnection, Set};
use serde::{Deserialize, Serialize};
use taskdesk_common::config::PaymentsConfig;
use taskdesk_common::{AppError, AppResult, TtlCache};
use taskdesk_db::entities::{invoice, user};
use taskdesk_db::repositories::{InvoiceRepository, TaskRepository, UserRepository};
use thiserror::Error;

use super::billing::{round_money, task_client};
use super::notification::{DeliveryOutcome, NotificationService};
use crate::input::now;

const SANDBOX_BASE: &str = "https://cybqa.pesapal.com/pesapalv3/api";
const PRODUCTION_BASE: &str = "https://pay.pesapal.com/v3/api";
const GATEWAY_NAME: &str = "pesapal";
const MAX_DESCRIPTION_CHARS: usize = 100;

/// Errors talking to the payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Gateway rejected the request: {0}")]
    Rejected(String),

    #[error("Gateway response is missing {0}")]
    MissingField(&'static str),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        Self::ExternalService(err.to_string())
    }
}

/// An order to submit for payment.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutOrder {
    pub merchant_ref: String,
    pub amount: f64,
    pub currency: String,
    pub description: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// The gateway's answer to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub tracking_id: Option<String>,
    pub redirect_url: String,
}

/// A transaction status lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionStatus {
    /// e.g. `COMPLETED`, `PENDING`, `FAILED`, `REVERSED`
    pub status_description: String,
    pub raw: serde_json::Value,
}

/// A hosted payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Register an order and get the page the payer should be sent to.
    async fn submit_order(&self, order: CheckoutOrder) -> Result<CheckoutSession, GatewayError>;

    /// Look up the current state of a transaction.
    async fn transaction_status(&self, tracking_id: &str) -> Result<TransactionStatus, GatewayError>;
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    consumer_key: &'a str,
    consumer_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct BillingAddress<'a> {
    email_address: Option<&'a str>,
    phone_number: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    id: &'a str,
    currency: String,
    amount: f64,
    description: String,
    callback_url: &'a str,
    cancellation_url: &'a str,
    notification_id: &'a str,
    redirect_mode: &'static str,
    billing_address: BillingAddress<'a>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order_tracking_id: Option<String>,
    redirect_url: Option<String>,
    status_message: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Pesapal v3 client.
pub struct PesapalGateway {
    client: Client,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    use_sandbox: bool,
    ipn_id: String,
    callback_url: String,
    cancellation_url: String,
    tokens: Arc<TtlCache<String, String>>,
}

impl PesapalGateway {
    /// Build a gateway client from configuration.
    ///
    /// `callback_url` is the resolved return URL.
    pub fn new(
        config: &PaymentsConfig,
        callback_url: String,
        tokens: Arc<TtlCache<String, String>>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let base_url = if config.use_sandbox {
            SANDBOX_BASE
        } else {
            PRODUCTION_BASE
        };

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            use_sandbox: config.use_sandbox,
            ipn_id: config.ipn_id.clone(),
            cancellation_url: config
                .cancellation_url
                .clone()
                .unwrap_or_else(|| callback_url.clone()),
            callback_url,
            tokens,
        })
    }

    /// Token cache for the given settings.
    #[must_use]
    pub fn token_cache(config: &PaymentsConfig) -> Arc<TtlCache<String, String>> {
        Arc::new(TtlCache::with_refresh_margin(
            Duration::from_secs(config.token_ttl_secs),
            Duration::from_secs(config.token_refresh_margin_secs),
        ))
    }

    fn cache_key(&self) -> String {
        format!("{}|{}", self.consumer_key, u8::from(self.use_sandbox))
    }

    async fn token(&self) -> Result<String, GatewayError> {
        let key = self.cache_key();
        if let Some(token) = self.tokens.get(&key) {
            return Ok(token);
        }

        let response = self
            .client
            .post(format!("{}/Auth/RequestToken", self.base_url))
            .header("Accept", "application/json")
            .json(&TokenRequest {
                consumer_key: &self.consumer_key,
                consumer_secret: &self.consumer_secret,
            })
            .send()
            .await?;
        let body: TokenResponse = checked(response).await?.json().await?;

        if let Some(error) = body.error.filter(|e| !e.is_null()) {
            return Err(GatewayError::Rejected(error.to_string()));
        }
        let token = body.token.ok_or(GatewayError::MissingField("token"))?;
        tracing::debug!(sandbox = self.use_sandbox, "Fetched gateway token");
        self.tokens.insert(key, token.clone());
        Ok(token)
    }
}

#[async_trait]
impl PaymentGateway for PesapalGateway {
    async fn submit_order(&self, order: CheckoutOrder) -> Result<CheckoutSession, GatewayError> {
        let token = self.token().await?;
        let payload = OrderRequest {
            id: &order.merchant_ref,
            currency: order.currency.to_uppercase(),
            amount: round_money(order.amount),
            description: truncate_chars(&order.description, MAX_DESCRIPTION_CHARS),
            callback_url: &self.callback_url,
            cancellation_url: &self.cancellation_url,
            notification_id: &self.ipn_id,
            redirect_mode: "TOP_WINDOW",
            billing_address: BillingAddress {
                email_address: order.email.as_deref().filter(|s| !s.is_empty()),
                phone_number: order.phone.as_deref().filter(|s| !s.is_empty()),
            },
        };

        let response = self
            .client
            .post(format!("{}/Transactions/SubmitOrderRequest", self.base_url))
            .bearer_auth(&token)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await?;
        tracing::info!(status = response.status().as_u16(), merchant_ref = %order.merchant_ref, "SubmitOrderRequest");
        let body: OrderResponse = checked(response).await?.json().await?;

        match body.redirect_url.filter(|u| !u.is_empty()) {
            Some(redirect_url) => Ok(CheckoutSession {
                tracking_id: body.order_tracking_id,
                redirect_url,
            }),
            None => Err(GatewayError::Rejected(
                body.status_message
                    .or_else(|| body.error.filter(|e| !e.is_null()).map(|e| e.to_string()))
                    .unwrap_or_else(|| "Failed to create payment session".to_string()),
            )),
        }
    }

    async fn transaction_status(&self, tracking_id: &str) -> Result<TransactionStatus, GatewayError> {
        let token = self.token().await?;
        let response = self
            .client
            .get(format!("{}/Transactions/GetTransactionStatus", self.base_url))
            .query(&[("orderTrackingId", tracking_id)])
            .bearer_auth(&token)
            .header("Accept", "application/json")
            .send()
            .await?;
        let raw: serde_json::Value = checked(response).await?.json().await?;

        let status_description = raw
            .get("payment_status_description")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_uppercase();
        Ok(TransactionStatus {
            status_description,
            raw,
        })
    }
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!(status = status.as_u16(), body = %body, "Gateway error response");
    Err(GatewayError::Status {
        status: status.as_u16(),
        body,
    })
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Merchant reference for a new checkout attempt.
///
/// The gateway refuses reused ids, so anything past the first attempt gets a
/// timestamp suffix.
#[must_use]
pub fn merchant_ref_for(invoice: &invoice::Model, unix_ts: i64) -> String {
    let base = format!("INV-{}", invoice.id);
    let current = invoice.pesapal_merchant_ref.as_deref().unwrap_or(&base);
    if invoice.pesapal_tracking_id.is_some() || current == base {
        format!("{base}-{unix_ts}")
    } else {
        current.to_string()
    }
}

/// Which field of a gateway transaction disagrees with the invoice, if any.
///
/// Fields the gateway leaves out are not compared, except the merchant
/// reference once checkout has recorded one.
fn payload_mismatch(invoice: &invoice::Model, raw: &serde_json::Value) -> Option<&'static str> {
    if let Some(expected) = invoice.pesapal_merchant_ref.as_deref() {
        let reported = raw.get("merchant_reference").and_then(serde_json::Value::as_str);
        if reported != Some(expected) {
            return Some("merchant_reference");
        }
    }
    if let Some(amount) = raw.get("amount").and_then(serde_json::Value::as_f64) {
        if (round_money(amount) - round_money(invoice.amount)).abs() > 0.001 {
            return Some("amount");
        }
    }
    if let Some(currency) = raw.get("currency").and_then(serde_json::Value::as_str) {
        if !currency.eq_ignore_ascii_case(&invoice.currency) {
            return Some("currency");
        }
    }
    None
}

/// Result of starting a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    AlreadyPaid { task_id: i32 },
    Redirect(String),
}

/// Result of reconciling an invoice with the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub invoice: invoice::Model,
    /// Uppercased status description.
    pub status: String,
    /// This sync performed the transition to paid.
    pub became_paid: bool,
    /// Receipt email, sent only by the sync that marked the invoice paid.
    pub receipt: Option<DeliveryOutcome>,
}

impl SyncOutcome {
    /// Status reported when a transaction does not belong to the invoice.
    pub const MISMATCH: &'static str = "MISMATCH";

    fn mismatch(invoice: invoice::Model) -> Self {
        Self {
            invoice,
            status: Self::MISMATCH.to_string(),
            became_paid: false,
            receipt: None,
        }
    }
}

/// Result of the payer coming back from the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReturn {
    pub invoice: invoice::Model,
    /// `None` when the gateway could not be reached.
    pub sync: Option<SyncOutcome>,
}

impl PaymentReturn {
    /// Flash level and message for the payer.
    #[must_use]
    pub fn message(&self) -> (&'static str, &'static str) {
        let Some(sync) = &self.sync else {
            return (
                "warning",
                "We couldn't verify the payment at the moment. Please refresh in a moment.",
            );
        };
        match sync.status.as_str() {
            "COMPLETED" => ("success", "Payment successful."),
            "FAILED" | "REVERSED" => ("danger", "Payment failed or reversed."),
            SyncOutcome::MISMATCH => (
                "warning",
                "We couldn't match this payment to your invoice. Please contact support.",
            ),
            _ => (
                "info",
                "Payment is still pending. We'll update this page when it clears.",
            ),
        }
    }
}

/// Payment service for business logic.
#[derive(Clone)]
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    invoice_repo: InvoiceRepository,
    task_repo: TaskRepository,
    user_repo: UserRepository,
    notifications: NotificationService,
}

impl PaymentService {
    /// Create a new payment service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        notifications: NotificationService,
    ) -> Self {
        Self {
            gateway,
            invoice_repo: InvoiceRepository::new(Arc::clone(&db)),
            task_repo: TaskRepository::new(Arc::clone(&db)),
            user_repo: UserRepository::new(db),
            notifications,
        }
    }

    /// Send the payer to the gateway for an invoice.
    pub async fn start_checkout(
        &self,
        actor: &user::Model,
        invoice_id: i32,
    ) -> AppResult<CheckoutOutcome> {
        let invoice = self.invoice_repo.get_by_id(invoice_id).await?;
        let task = self.task_repo.get_by_id(invoice.task_id).await?;
        if !(actor.is_admin() || task.client_id == actor.id) {
            return Err(AppError::Forbidden(
                "You are not allowed to pay this invoice.".to_string(),
            ));
        }
        if invoice.is_paid() {
            return Ok(CheckoutOutcome::AlreadyPaid { task_id: task.id });
        }

        let merchant_ref = merchant_ref_for(&invoice, Utc::now().timestamp());
        let client = task_client(&self.user_repo, &task).await;
        let order = CheckoutOrder {
            merchant_ref: merchant_ref.clone(),
            amount: invoice.amount,
            currency: invoice.currency.clone(),
            description: format!("Task #{} invoice #{}", task.id, invoice.id),
            email: client.as_ref().map(|c| c.email.clone()),
            phone: client.and_then(|c| c.phone),
        };

        let session = self.gateway.submit_order(order).await.map_err(|e| {
            tracing::error!(invoice_id, error = %e, "Checkout failed");
            AppError::from(e)
        })?;

        let mut active: invoice::ActiveModel = invoice.into();
        active.pesapal_merchant_ref = Set(Some(merchant_ref.clone()));
        active.pesapal_tracking_id = Set(session.tracking_id.clone());
        active.gateway = Set(Some(GATEWAY_NAME.to_string()));
        active.gateway_status = Set(Some("PENDING".to_string()));
        self.invoice_repo.update(active).await?;

        tracing::info!(
            invoice_id,
            merchant_ref = %merchant_ref,
            tracking_id = ?session.tracking_id,
            "Checkout started"
        );
        Ok(CheckoutOutcome::Redirect(session.redirect_url))
    }

    /// Reconcile an invoice with the gateway's view of a transaction.
    ///
    /// The transaction must belong to the invoice: a tracking id other than
    /// the one recorded at checkout is ignored, and a gateway payload naming
    /// another merchant reference or amount only has its metadata recorded.
    pub async fn sync_invoice(
        &self,
        invoice: invoice::Model,
        tracking_id: &str,
    ) -> AppResult<SyncOutcome> {
        let invoice_id = invoice.id;
        if let Some(stored) = invoice.pesapal_tracking_id.as_deref() {
            if stored != tracking_id {
                tracing::warn!(
                    invoice_id,
                    tracking_id,
                    stored_tracking_id = stored,
                    "Tracking id does not belong to invoice"
                );
                return Ok(SyncOutcome::mismatch(invoice));
            }
        }

        let status = self.gateway.transaction_status(tracking_id).await.map_err(|e| {
            tracing::warn!(invoice_id, tracking_id, error = %e, "Transaction status lookup failed");
            AppError::from(e)
        })?;
        let description = status.status_description.to_uppercase();

        if let Some(field) = payload_mismatch(&invoice, &status.raw) {
            tracing::warn!(
                invoice_id,
                tracking_id,
                field,
                status = %description,
                "Gateway transaction does not match invoice"
            );
            let mut active: invoice::ActiveModel = invoice.into();
            active.gateway_meta = Set(Some(status.raw));
            let invoice = self.invoice_repo.update(active).await?;
            return Ok(SyncOutcome::mismatch(invoice));
        }

        let mut active: invoice::ActiveModel = invoice.into();
        active.gateway_meta = Set(Some(status.raw));
        active.gateway_status = Set(Some(description.clone()));
        active.pesapal_tracking_id = Set(Some(tracking_id.to_string()));
        self.invoice_repo.update(active).await?;

        let mut became_paid = false;
        match description.as_str() {
            "COMPLETED" => {
                became_paid = self.invoice_repo.mark_paid_if_unpaid(invoice_id, now()).await?;
            }
            "FAILED" | "REVERSED" => {
                self.invoice_repo.mark_unpaid_if_open(invoice_id).await?;
            }
            _ => {}
        }

        let invoice = self.invoice_repo.get_by_id(invoice_id).await?;
        tracing::info!(
            invoice_id,
            tracking_id,
            status = %description,
            became_paid,
            "Invoice synced"
        );

        let receipt = if became_paid {
            Some(self.send_receipt(&invoice).await)
        } else {
            None
        };

        Ok(SyncOutcome {
            invoice,
            status: description,
            became_paid,
            receipt,
        })
    }

    /// The payer returned from the gateway.
    ///
    /// `None` means no invoice matched.
    pub async fn handle_return(
        &self,
        tracking_id: Option<&str>,
        merchant_ref: Option<&str>,
    ) -> AppResult<Option<PaymentReturn>> {
        let Some(invoice) = self.lookup(tracking_id, merchant_ref).await? else {
            tracing::warn!(?tracking_id, ?merchant_ref, "Payment return matched no invoice");
            return Ok(None);
        };
        let Some(tracking) = tracking_id
            .map(str::to_string)
            .or_else(|| invoice.pesapal_tracking_id.clone())
        else {
            return Ok(Some(PaymentReturn { invoice, sync: None }));
        };

        match self.sync_invoice(invoice.clone(), &tracking).await {
            Ok(sync) => Ok(Some(PaymentReturn {
                invoice: sync.invoice.clone(),
                sync: Some(sync),
            })),
            Err(AppError::ExternalService(_)) => Ok(Some(PaymentReturn { invoice, sync: None })),
            Err(e) => Err(e),
        }
    }

    /// Gateway notification. Never fails; problems are logged.
    pub async fn handle_ipn(
        &self,
        tracking_id: Option<&str>,
        merchant_ref: Option<&str>,
    ) -> Option<SyncOutcome> {
        let Some(tracking) = tracking_id.filter(|t| !t.is_empty()) else {
            tracing::warn!(?merchant_ref, "IPN without tracking id");
            return None;
        };

        let invoice = match self.lookup(Some(tracking), merchant_ref).await {
            Ok(Some(invoice)) => invoice,
            Ok(None) => {
                tracing::warn!(tracking_id = tracking, ?merchant_ref, "IPN matched no invoice");
                return None;
            }
            Err(e) => {
                tracing::error!(tracking_id = tracking, error = %e, "IPN lookup failed");
                return None;
            }
        };

        match self.sync_invoice(invoice, tracking).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(tracking_id = tracking, error = %e, "IPN sync failed");
                None
            }
        }
    }

    async fn lookup(
        &self,
        tracking_id: Option<&str>,
        merchant_ref: Option<&str>,
    ) -> AppResult<Option<invoice::Model>> {
        if let Some(merchant_ref) = merchant_ref.filter(|r| !r.is_empty()) {
            if let Some(invoice) = self.invoice_repo.find_by_merchant_ref(merchant_ref).await? {
                return Ok(Some(invoice));
            }
        }
        match tracking_id.filter(|t| !t.is_empty()) {
            Some(tracking_id) => self.invoice_repo.find_by_tracking_id(tracking_id).await,
            None => Ok(None),
        }
    }

    async fn send_receipt(&self, invoice: &invoice::Model) -> DeliveryOutcome {
        let task = match self.task_repo.get_by_id(invoice.task_id).await {
            Ok(task) => task,
            Err(e) => {
                tracing::error!(invoice_id = invoice.id, error = %e, "Could not load task for receipt");
                return DeliveryOutcome::Failed(e.public_message());
            }
        };
        match task_client(&self.user_repo, &task).await {
            Some(client) => {
                self.notifications
                    .payment_received(&client, &task, invoice)
                    .await
            }
            None => DeliveryOutcome::Skipped("client not found".to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::billing::issue_invoice_in;
    use crate::services::notification::RecordingMailer;
    use std::sync::Mutex;
    use taskdesk_db::test_utils::TestDatabase;

    #[derive(Default)]
    struct FakeGateway {
        statuses: Mutex<Vec<String>>,
        orders: Mutex<Vec<CheckoutOrder>>,
        fail_orders: bool,
        reported_amount: Option<f64>,
    }

    impl FakeGateway {
        fn with_statuses(statuses: &[&str]) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().rev().map(ToString::to_string).collect()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn submit_order(&self, order: CheckoutOrder) -> Result<CheckoutSession, GatewayError> {
            if self.fail_orders {
                return Err(GatewayError::Rejected("duplicate id".to_string()));
            }
            let tracking_id = format!("trk-{}", order.merchant_ref);
            self.orders.lock().unwrap().push(order);
            Ok(CheckoutSession {
                redirect_url: format!("https://pay.example.com/{tracking_id}"),
                tracking_id: Some(tracking_id),
            })
        }

        async fn transaction_status(&self, tracking_id: &str) -> Result<TransactionStatus, GatewayError> {
            let status = self
                .statuses
                .lock()
                .unwrap()
                .pop()
                .ok_or(GatewayError::MissingField("payment_status_description"))?;
            let mut raw = serde_json::json!({
                "payment_status_description": status.to_lowercase(),
                "merchant_reference": tracking_id.strip_prefix("trk-").unwrap_or(tracking_id),
            });
            if let Some(amount) = self.reported_amount {
                raw["amount"] = serde_json::json!(amount);
            }
            Ok(TransactionStatus {
                raw,
                status_description: status,
            })
        }
    }

    struct Harness {
        db: TestDatabase,
        mailer: Arc<RecordingMailer>,
        gateway: Arc<FakeGateway>,
        service: PaymentService,
        client: user::Model,
        invoice: invoice::Model,
    }

    async fn harness(gateway: FakeGateway) -> Harness {
        let db = TestDatabase::in_memory().await.unwrap();
        let client = db.seed_user("client@example.com", user::UserRole::Client).await.unwrap();
        let task = db.seed_task(client.id, "Website").await.unwrap();
        let invoice = issue_invoice_in(db.connection(), task.id, 300.0, "UGX")
            .await
            .unwrap()
            .invoice()
            .clone();
        let mailer = Arc::new(RecordingMailer::new());
        let notifications = NotificationService::new(
            mailer.clone(),
            Some("no-reply@taskdesk.test".to_string()),
            false,
            "https://taskdesk.test".to_string(),
        );
        let gateway = Arc::new(gateway);
        let service = PaymentService::new(db.shared(), gateway.clone(), notifications);
        Harness {
            db,
            mailer,
            gateway,
            service,
            client,
            invoice,
        }
    }

    fn invoice_with(id: i32, merchant_ref: Option<&str>, tracking: Option<&str>) -> invoice::Model {
        invoice::Model {
            id,
            task_id: 1,
            amount: 10.0,
            currency: "UGX".to_string(),
            status: invoice::InvoiceStatus::Unpaid,
            issued_at: now(),
            paid_at: None,
            gateway: None,
            gateway_status: None,
            gateway_meta: None,
            pesapal_tracking_id: tracking.map(ToString::to_string),
            pesapal_merchant_ref: merchant_ref.map(ToString::to_string),
        }
    }

    #[test]
    fn test_merchant_ref_generation() {
        let ts = 1_700_000_000;
        assert_eq!(merchant_ref_for(&invoice_with(5, None, None), ts), "INV-5-1700000000");
        assert_eq!(merchant_ref_for(&invoice_with(5, Some("INV-5"), None), ts), "INV-5-1700000000");
        assert_eq!(
            merchant_ref_for(&invoice_with(5, Some("INV-5-1600000000"), Some("trk")), ts),
            "INV-5-1700000000"
        );
        assert_eq!(
            merchant_ref_for(&invoice_with(5, Some("INV-5-1600000000"), None), ts),
            "INV-5-1600000000"
        );
    }

    #[test]
    fn test_description_truncation() {
        let long = "x".repeat(150);
        assert_eq!(truncate_chars(&long, MAX_DESCRIPTION_CHARS).len(), 100);
        assert_eq!(truncate_chars("short", MAX_DESCRIPTION_CHARS), "short");
    }

    #[test]
    fn test_gateway_error_maps_to_external_service() {
        let err: AppError = GatewayError::MissingField("token").into();
        assert!(matches!(err, AppError::ExternalService(_)));
    }

    #[tokio::test]
    async fn test_start_checkout_records_pending_session() {
        let h = harness(FakeGateway::default()).await;

        let outcome = h.service.start_checkout(&h.client, h.invoice.id).await.unwrap();
        let CheckoutOutcome::Redirect(url) = outcome else {
            panic!("expected a redirect");
        };
        assert!(url.starts_with("https://pay.example.com/trk-INV-"));

        let order = h.gateway.orders.lock().unwrap()[0].clone();
        assert!(order.merchant_ref.starts_with(&format!("INV-{}-", h.invoice.id)));
        assert_eq!(order.description, format!("Task #{} invoice #{}", h.invoice.task_id, h.invoice.id));
        assert_eq!(order.email.as_deref(), Some("client@example.com"));

        let stored = h.service.invoice_repo.get_by_id(h.invoice.id).await.unwrap();
        assert_eq!(stored.gateway.as_deref(), Some("pesapal"));
        assert_eq!(stored.gateway_status.as_deref(), Some("PENDING"));
        assert_eq!(stored.pesapal_merchant_ref, Some(order.merchant_ref.clone()));
        assert_eq!(stored.pesapal_tracking_id, Some(format!("trk-{}", order.merchant_ref)));
    }

    #[tokio::test]
    async fn test_checkout_failure_leaves_invoice_untouched() {
        let h = harness(FakeGateway {
            fail_orders: true,
            ..FakeGateway::default()
        })
        .await;

        let err = h.service.start_checkout(&h.client, h.invoice.id).await.unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
        let stored = h.service.invoice_repo.get_by_id(h.invoice.id).await.unwrap();
        assert_eq!(stored, h.invoice);
    }

    #[tokio::test]
    async fn test_checkout_rejects_other_users() {
        let h = harness(FakeGateway::default()).await;
        let stranger = h.db.seed_user("x@example.com", user::UserRole::Client).await.unwrap();
        let err = h.service.start_checkout(&stranger, h.invoice.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_completed_twice_sends_one_receipt() {
        let h = harness(FakeGateway::with_statuses(&["COMPLETED", "COMPLETED"])).await;

        let first = h.service.sync_invoice(h.invoice.clone(), "trk-1").await.unwrap();
        assert!(first.became_paid);
        assert_eq!(first.receipt, Some(DeliveryOutcome::Sent));
        assert!(first.invoice.is_paid());
        assert!(first.invoice.paid_at.is_some());

        let second = h.service.sync_invoice(first.invoice.clone(), "trk-1").await.unwrap();
        assert!(!second.became_paid);
        assert!(second.receipt.is_none());
        assert!(second.invoice.is_paid());
        assert_eq!(second.invoice.paid_at, first.invoice.paid_at);

        assert_eq!(h.mailer.sent_with_subject("Payment received").len(), 1);
    }

    #[tokio::test]
    async fn test_failed_and_late_completed() {
        let h = harness(FakeGateway::with_statuses(&["FAILED", "PENDING", "COMPLETED", "REVERSED"])).await;

        let failed = h.service.sync_invoice(h.invoice.clone(), "trk-9").await.unwrap();
        assert_eq!(failed.status, "FAILED");
        assert_eq!(failed.invoice.status, invoice::InvoiceStatus::Unpaid);
        assert_eq!(failed.invoice.gateway_status.as_deref(), Some("FAILED"));
        assert_eq!(failed.invoice.pesapal_tracking_id.as_deref(), Some("trk-9"));

        let pending = h.service.sync_invoice(failed.invoice, "trk-9").await.unwrap();
        assert_eq!(pending.invoice.status, invoice::InvoiceStatus::Unpaid);
        assert_eq!(pending.invoice.gateway_meta.as_ref().unwrap()["payment_status_description"], "pending");

        let paid = h.service.sync_invoice(pending.invoice.clone(), "trk-9").await.unwrap();
        assert!(paid.became_paid);

        let reversed = h.service.sync_invoice(paid.invoice, "trk-9").await.unwrap();
        assert!(reversed.invoice.is_paid());
        assert_eq!(h.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_ipn_matches_by_tracking_id_and_never_fails() {
        let h = harness(FakeGateway::with_statuses(&["COMPLETED"])).await;
        h.service.start_checkout(&h.client, h.invoice.id).await.unwrap();
        let stored = h.service.invoice_repo.get_by_id(h.invoice.id).await.unwrap();
        let tracking = stored.pesapal_tracking_id.clone().unwrap();

        let outcome = h.service.handle_ipn(Some(&tracking), Some("unknown-ref")).await.unwrap();
        assert!(outcome.became_paid);

        assert!(h.service.handle_ipn(Some("nope"), None).await.is_none());
        assert!(h.service.handle_ipn(None, stored.pesapal_merchant_ref.as_deref()).await.is_none());
        // Status queue is empty now; the lookup error is swallowed.
        assert!(h.service.handle_ipn(Some(&tracking), None).await.is_none());
    }

    #[tokio::test]
    async fn test_return_reports_unverified_payment() {
        let h = harness(FakeGateway::default()).await;
        h.service.start_checkout(&h.client, h.invoice.id).await.unwrap();
        let stored = h.service.invoice_repo.get_by_id(h.invoice.id).await.unwrap();

        let returned = h
            .service
            .handle_return(None, stored.pesapal_merchant_ref.as_deref())
            .await
            .unwrap()
            .unwrap();
        assert!(returned.sync.is_none());
        assert_eq!(returned.message().0, "warning");

        assert!(h.service.handle_return(Some("x"), Some("y")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_foreign_tracking_id_cannot_settle_invoice() {
        let h = harness(FakeGateway::with_statuses(&["COMPLETED", "COMPLETED"])).await;
        let task = h.db.seed_task(h.client.id, "Annual report").await.unwrap();
        let big = issue_invoice_in(h.db.connection(), task.id, 5000.0, "UGX")
            .await
            .unwrap()
            .invoice()
            .clone();

        h.service.start_checkout(&h.client, h.invoice.id).await.unwrap();
        h.service.start_checkout(&h.client, big.id).await.unwrap();
        let cheap = h.service.invoice_repo.get_by_id(h.invoice.id).await.unwrap();
        let big = h.service.invoice_repo.get_by_id(big.id).await.unwrap();

        let returned = h
            .service
            .handle_return(
                cheap.pesapal_tracking_id.as_deref(),
                big.pesapal_merchant_ref.as_deref(),
            )
            .await
            .unwrap()
            .unwrap();
        let sync = returned.sync.as_ref().unwrap();
        assert_eq!(sync.status, SyncOutcome::MISMATCH);
        assert!(!sync.became_paid);
        assert_eq!(returned.message().0, "warning");

        let stored = h.service.invoice_repo.get_by_id(big.id).await.unwrap();
        assert!(!stored.is_paid());
        assert_eq!(stored.pesapal_tracking_id, big.pesapal_tracking_id);
        assert_eq!(stored.gateway_status.as_deref(), Some("PENDING"));

        // The same tracking id still settles its own invoice
        let own = h
            .service
            .handle_ipn(cheap.pesapal_tracking_id.as_deref(), None)
            .await
            .unwrap();
        assert!(own.became_paid);
        assert_eq!(own.invoice.id, cheap.id);
        assert_eq!(h.mailer.sent_with_subject("Payment received").len(), 1);
    }

    #[tokio::test]
    async fn test_gateway_amount_must_match_invoice() {
        let h = harness(FakeGateway {
            reported_amount: Some(1.0),
            ..FakeGateway::with_statuses(&["COMPLETED"])
        })
        .await;
        h.service.start_checkout(&h.client, h.invoice.id).await.unwrap();
        let started = h.service.invoice_repo.get_by_id(h.invoice.id).await.unwrap();
        let tracking = started.pesapal_tracking_id.clone().unwrap();

        let outcome = h.service.sync_invoice(started, &tracking).await.unwrap();
        assert_eq!(outcome.status, SyncOutcome::MISMATCH);
        assert!(!outcome.invoice.is_paid());
        assert_eq!(outcome.invoice.gateway_status.as_deref(), Some("PENDING"));
        assert_eq!(outcome.invoice.gateway_meta.as_ref().unwrap()["amount"], 1.0);
        assert!(h.mailer.sent().is_empty());
    }

    #[test]
    fn test_payload_mismatch_fields() {
        let invoice = invoice_with(7, Some("INV-7-1"), Some("trk"));
        let ok = serde_json::json!({ "merchant_reference": "INV-7-1", "amount": 10.0, "currency": "ugx" });
        assert_eq!(payload_mismatch(&invoice, &ok), None);
        assert_eq!(
            payload_mismatch(&invoice, &serde_json::json!({ "merchant_reference": "INV-8-1" })),
            Some("merchant_reference")
        );
        assert_eq!(
            payload_mismatch(&invoice, &serde_json::json!({})),
            Some("merchant_reference")
        );
        assert_eq!(
            payload_mismatch(&invoice, &serde_json::json!({ "merchant_reference": "INV-7-1", "amount": 9.99 })),
            Some("amount")
        );
        assert_eq!(
            payload_mismatch(&invoice, &serde_json::json!({ "merchant_reference": "INV-7-1", "currency": "KES" })),
            Some("currency")
        );
    }
}
