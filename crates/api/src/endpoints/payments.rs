//! Payment gateway callbacks.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{RawQuery, State},
    http::{HeaderMap, header},
    response::Response,
    routing::get,
};
use serde_json::{Value, json};

use super::client::{pay_invoice, task_path};
use crate::{
    extractors::header_str,
    middleware::AppState,
    response::{FormError, flash_redirect},
};

/// Transaction identifiers as the gateway sends them.
///
/// The gateway is inconsistent about casing, so every known spelling is
/// accepted. The first value seen wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayParams {
    pub tracking_id: Option<String>,
    pub merchant_ref: Option<String>,
}

impl GatewayParams {
    fn absorb(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        let slot = match key {
            "OrderTrackingId" | "orderTrackingId" | "tracking" => &mut self.tracking_id,
            "OrderMerchantReference" | "orderMerchantReference" | "merchant_ref" => {
                &mut self.merchant_ref
            }
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }

    /// Read a `key=value&...` string.
    pub fn absorb_query(&mut self, query: &str) {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            self.absorb(&key, &value);
        }
    }

    /// Read a notification body, JSON or form encoded.
    pub fn absorb_body(&mut self, content_type: Option<&str>, body: &[u8]) {
        if body.is_empty() {
            return;
        }
        let is_json = content_type.is_some_and(|ct| ct.starts_with("application/json"));
        if is_json {
            if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
                for (key, value) in &map {
                    if let Some(value) = value.as_str() {
                        self.absorb(key, value);
                    }
                }
            }
        } else {
            for (key, value) in url::form_urlencoded::parse(body) {
                self.absorb(&key, &value);
            }
        }
    }
}

/// Instant payment notification. Always acknowledged.
async fn ipn(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let mut params = GatewayParams::default();
    if let Some(query) = query.as_deref() {
        params.absorb_query(query);
    }
    params.absorb_body(header_str(&headers, header::CONTENT_TYPE.as_str()), &body);

    tracing::info!(
        tracking_id = ?params.tracking_id,
        merchant_ref = ?params.merchant_ref,
        "IPN received"
    );
    let _ = state
        .payment_service
        .handle_ipn(params.tracking_id.as_deref(), params.merchant_ref.as_deref())
        .await;

    Json(json!({ "ok": true }))
}

/// The payer coming back from the hosted checkout.
async fn payment_return(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Response, FormError> {
    let mut params = GatewayParams::default();
    if let Some(query) = query.as_deref() {
        params.absorb_query(query);
    }

    let returned = state
        .payment_service
        .handle_return(params.tracking_id.as_deref(), params.merchant_ref.as_deref())
        .await
        .map_err(|error| FormError {
            error,
            back: "/".to_string(),
        })?;

    Ok(match returned {
        Some(returned) => {
            let (level, message) = returned.message();
            flash_redirect(&task_path(returned.invoice.task_id), level, message)
        }
        None => flash_redirect(
            "/",
            "warning",
            "We couldn't match this payment to an invoice.",
        ),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ipn/pesapal", get(ipn).post(ipn))
        .route("/payments/return", get(payment_return))
        // Pay links in invoice emails
        .route("/payments/pay/{id}", get(pay_invoice))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_accept_every_spelling() {
        let mut params = GatewayParams::default();
        params.absorb_query("orderTrackingId=abc&OrderMerchantReference=INV-1-2");
        assert_eq!(params.tracking_id.as_deref(), Some("abc"));
        assert_eq!(params.merchant_ref.as_deref(), Some("INV-1-2"));

        let mut params = GatewayParams::default();
        params.absorb_query("tracking=t1&merchant_ref=m1");
        assert_eq!(
            params,
            GatewayParams {
                tracking_id: Some("t1".to_string()),
                merchant_ref: Some("m1".to_string()),
            }
        );
    }

    #[test]
    fn test_params_from_bodies() {
        let mut params = GatewayParams::default();
        params.absorb_body(
            Some("application/json"),
            br#"{"OrderTrackingId":"j1","OrderNotificationType":"IPNCHANGE"}"#,
        );
        assert_eq!(params.tracking_id.as_deref(), Some("j1"));

        let mut params = GatewayParams::default();
        params.absorb_body(
            Some("application/x-www-form-urlencoded"),
            b"OrderTrackingId=f1&OrderMerchantReference=r%201",
        );
        assert_eq!(params.tracking_id.as_deref(), Some("f1"));
        assert_eq!(params.merchant_ref.as_deref(), Some("r 1"));
    }

    #[test]
    fn test_query_wins_over_body_and_blanks_ignored() {
        let mut params = GatewayParams::default();
        params.absorb_query("OrderTrackingId=&orderTrackingId=q1");
        params.absorb_body(None, b"OrderTrackingId=b1");
        assert_eq!(params.tracking_id.as_deref(), Some("q1"));
        assert!(params.merchant_ref.is_none());
    }
}
