//! Stripe REST adapter for the `PaymentGateway` port.
//!
//! Form-encoded requests over `reqwest` with basic auth. The client has a
//! short timeout and never retries: callers sit inside a webhook budget or
//! a subscriber request, and both prefer a fast failure.
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key, catalog)
//!     .with_redirect_urls(success_url, cancel_url)
//!     .with_timeout(Duration::from_secs(5));
//! let gateway = StripePaymentGateway::new(config)?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::domain::billing::{Plan, PriceCatalog, ProviderStatus};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    CheckoutRequest, CheckoutSession, GatewaySubscription, PaymentError, PaymentErrorCode,
    PaymentGateway, RefundReceipt, RefundRequest,
};

const DEFAULT_BASE_URL: &str = "https://api.stripe.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,
    api_base_url: String,
    success_url: String,
    cancel_url: String,
    timeout: Duration,
    catalog: PriceCatalog,
}

impl StripeConfig {
    pub fn new(api_key: SecretString, catalog: PriceCatalog) -> Self {
        Self {
            api_key,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            success_url: "http://localhost:3000/billing/success".to_string(),
            cancel_url: "http://localhost:3000/billing/cancel".to_string(),
            timeout: DEFAULT_TIMEOUT,
            catalog,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_redirect_urls(
        mut self,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        self.success_url = success_url.into();
        self.cancel_url = cancel_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Stripe implementation of [`PaymentGateway`].
pub struct StripePaymentGateway {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripePaymentGateway {
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::provider(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base_url, path)
    }

    fn price_id(&self, plan: Plan) -> Result<&str, PaymentError> {
        self.config.catalog.price_for(plan).ok_or_else(|| {
            PaymentError::invalid_request(format!("No Stripe price configured for plan {}", plan))
        })
    }

    /// Send `request` with credentials and decode a successful body as `T`.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<T, PaymentError> {
        let response = request
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PaymentError::timeout(format!("Stripe {} timed out", operation))
                } else {
                    PaymentError::network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = error_from_response(status, &body);
            tracing::warn!(
                operation = operation,
                status = status.as_u16(),
                code = ?error.code,
                provider_code = error.provider_code.as_deref().unwrap_or(""),
                "Stripe request failed"
            );
            return Err(error);
        }

        response.json::<T>().await.map_err(|e| {
            PaymentError::provider(format!("Failed to parse Stripe {} response: {}", operation, e))
        })
    }

    async fn fetch_subscription(&self, subscription_id: &str) -> Result<StripeSubscription, PaymentError> {
        self.send(
            self.http_client
                .get(self.url(&format!("subscriptions/{}", subscription_id))),
            "retrieve_subscription",
        )
        .await
    }

    /// Payment intent behind an invoice, charge or payment intent reference.
    async fn refund_target(&self, reference: &str) -> Result<(&'static str, String), PaymentError> {
        if reference.starts_with("pi_") {
            return Ok(("payment_intent", reference.to_string()));
        }
        if reference.starts_with("ch_") {
            return Ok(("charge", reference.to_string()));
        }
        let invoice: StripeInvoice = self
            .send(
                self.http_client.get(self.url(&format!("invoices/{}", reference))),
                "retrieve_invoice",
            )
            .await?;
        if let Some(intent) = invoice.payment_intent {
            return Ok(("payment_intent", intent));
        }
        invoice
            .charge
            .map(|charge| ("charge", charge))
            .ok_or_else(|| {
                PaymentError::invalid_request(format!("Invoice {} has no payment to refund", reference))
            })
    }
}

#[async_trait]
impl PaymentGateway for StripePaymentGateway {
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<GatewaySubscription, PaymentError> {
        Ok(self.fetch_subscription(subscription_id).await?.into())
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let price_id = self.price_id(request.plan)?.to_string();
        let user_id = request.user_id.to_string();
        let plan = request.plan.as_str().to_string();

        let mut params = vec![
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", self.config.success_url.clone()),
            ("cancel_url", self.config.cancel_url.clone()),
            ("client_reference_id", user_id.clone()),
            ("metadata[user_id]", user_id.clone()),
            ("metadata[plan]", plan.clone()),
            ("subscription_data[metadata][user_id]", user_id),
            ("subscription_data[metadata][plan]", plan),
        ];
        if let Some(customer_id) = &request.customer_id {
            params.push(("customer", customer_id.to_string()));
        }

        let session: StripeCheckoutSession = self
            .send(
                self.http_client.post(self.url("checkout/sessions")).form(&params),
                "create_checkout_session",
            )
            .await?;

        let url = session.url.ok_or_else(|| {
            PaymentError::provider(format!("Checkout session {} has no URL", session.id))
        })?;
        Ok(CheckoutSession {
            id: session.id,
            url,
            expires_at: session.expires_at,
        })
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<GatewaySubscription, PaymentError> {
        let subscription: StripeSubscription = self
            .send(
                self.http_client
                    .post(self.url(&format!("subscriptions/{}", subscription_id)))
                    .form(&[("cancel_at_period_end", cancel.to_string())]),
                "set_cancel_at_period_end",
            )
            .await?;
        Ok(subscription.into())
    }

    async fn cancel_immediately(&self, subscription_id: &str) -> Result<(), PaymentError> {
        let _: StripeSubscription = self
            .send(
                self.http_client
                    .delete(self.url(&format!("subscriptions/{}", subscription_id))),
                "cancel_immediately",
            )
            .await?;
        Ok(())
    }

    async fn change_plan(
        &self,
        subscription_id: &str,
        plan: Plan,
    ) -> Result<GatewaySubscription, PaymentError> {
        let price_id = self.price_id(plan)?.to_string();
        let current = self.fetch_subscription(subscription_id).await?;
        let item_id = current
            .items
            .data
            .first()
            .map(|item| item.id.clone())
            .ok_or_else(|| {
                PaymentError::invalid_request(format!(
                    "Subscription {} has no items",
                    subscription_id
                ))
            })?;

        let subscription: StripeSubscription = self
            .send(
                self.http_client
                    .post(self.url(&format!("subscriptions/{}", subscription_id)))
                    .form(&[
                        ("items[0][id]", item_id),
                        ("items[0][price]", price_id),
                        ("proration_behavior", "create_prorations".to_string()),
                        ("metadata[plan]", plan.as_str().to_string()),
                    ]),
                "change_plan",
            )
            .await?;
        Ok(subscription.into())
    }

    async fn refund(&self, request: &RefundRequest) -> Result<RefundReceipt, PaymentError> {
        let (target_field, target) = self.refund_target(&request.payment_reference).await?;

        let refund: StripeRefund = self
            .send(
                self.http_client
                    .post(self.url("refunds"))
                    .header("Idempotency-Key", request.idempotency_key.as_str())
                    .form(&[
                        (target_field, target),
                        ("amount", request.amount.to_string()),
                        ("reason", "requested_by_customer".to_string()),
                        ("metadata[reason]", request.reason.clone()),
                    ]),
                "refund",
            )
            .await?;

        Ok(RefundReceipt {
            id: refund.id,
            amount: refund.amount,
            status: refund.status.unwrap_or_else(|| "pending".to_string()),
        })
    }
}

/// Map a non-2xx response to a [`PaymentError`].
fn error_from_response(status: reqwest::StatusCode, body: &str) -> PaymentError {
    let detail = serde_json::from_str::<StripeErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_default();
    let message = detail
        .message
        .unwrap_or_else(|| format!("Stripe returned {}", status.as_u16()));

    let error = match status.as_u16() {
        401 | 403 => PaymentError::authentication(message),
        404 => PaymentError::new(PaymentErrorCode::NotFound, message),
        400 | 402 => PaymentError::invalid_request(message),
        429 => PaymentError::new(PaymentErrorCode::RateLimitExceeded, message),
        _ => PaymentError::provider(message),
    };
    match detail.code {
        Some(code) => error.with_provider_code(code),
        None => error,
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Wire types
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct StripeSubscription {
    id: String,
    #[serde(default)]
    customer: Option<String>,
    status: String,
    #[serde(default)]
    cancel_at_period_end: bool,
    #[serde(default)]
    current_period_start: Option<i64>,
    #[serde(default)]
    current_period_end: Option<i64>,
    #[serde(default)]
    items: StripeList<StripeSubscriptionItem>,
}

impl From<StripeSubscription> for GatewaySubscription {
    fn from(sub: StripeSubscription) -> Self {
        GatewaySubscription {
            price_id: sub.items.data.first().map(|item| item.price.id.clone()),
            id: sub.id,
            customer_id: sub.customer,
            status: ProviderStatus::parse(&sub.status),
            cancel_at_period_end: sub.cancel_at_period_end,
            current_period_start: sub.current_period_start.and_then(Timestamp::try_from_unix_secs),
            current_period_end: sub.current_period_end.and_then(Timestamp::try_from_unix_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

impl<T> Default for StripeList<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionItem {
    id: String,
    price: StripePrice,
}

#[derive(Debug, Deserialize)]
struct StripePrice {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StripeInvoice {
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    charge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    amount: i64,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Form, Json, Router};
    use serde_json::{json, Value};

    use crate::domain::foundation::{CustomerId, UserId};

    type Captured = Arc<Mutex<Vec<(String, HashMap<String, String>)>>>;

    fn catalog() -> PriceCatalog {
        PriceCatalog::new()
            .with_price(Plan::Monthly, "price_m")
            .with_price(Plan::Premium, "price_p")
    }

    fn subscription_json(id: &str, price: &str) -> Value {
        json!({
            "id": id,
            "customer": "cus_1",
            "status": "active",
            "cancel_at_period_end": false,
            "current_period_start": 1_700_000_000,
            "current_period_end": 1_702_592_000,
            "items": { "data": [ { "id": "si_1", "price": { "id": price } } ] }
        })
    }

    /// Stands up a fake Stripe API on a random local port.
    async fn fake_stripe() -> (String, Captured) {
        let captured: Captured = Arc::default();

        async fn checkout(
            State(captured): State<Captured>,
            Form(form): Form<HashMap<String, String>>,
        ) -> Json<Value> {
            captured.lock().unwrap().push(("checkout".into(), form));
            Json(json!({
                "id": "cs_test_1",
                "url": "https://checkout.stripe.com/c/pay/cs_test_1",
                "expires_at": 1_700_086_400
            }))
        }

        async fn get_subscription(Path(id): Path<String>) -> (StatusCode, Json<Value>) {
            if id == "sub_missing" {
                return (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": { "message": "No such subscription", "code": "resource_missing" } })),
                );
            }
            (StatusCode::OK, Json(subscription_json(&id, "price_m")))
        }

        async fn update_subscription(
            State(captured): State<Captured>,
            Path(id): Path<String>,
            Form(form): Form<HashMap<String, String>>,
        ) -> Json<Value> {
            let price = form.get("items[0][price]").cloned().unwrap_or_else(|| "price_m".into());
            let cancel = form.get("cancel_at_period_end").map(|v| v == "true").unwrap_or(false);
            captured.lock().unwrap().push(("update".into(), form));
            let mut body = subscription_json(&id, &price);
            body["cancel_at_period_end"] = json!(cancel);
            Json(body)
        }

        async fn invoice(Path(id): Path<String>) -> Json<Value> {
            Json(json!({ "id": id, "payment_intent": "pi_1" }))
        }

        async fn refund(
            State(captured): State<Captured>,
            headers: HeaderMap,
            Form(mut form): Form<HashMap<String, String>>,
        ) -> Json<Value> {
            let key = headers
                .get("idempotency-key")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            form.insert("idempotency_key".into(), key);
            let amount: i64 = form.get("amount").and_then(|a| a.parse().ok()).unwrap_or(0);
            captured.lock().unwrap().push(("refund".into(), form));
            Json(json!({ "id": "re_1", "amount": amount, "status": "succeeded" }))
        }

        let app = Router::new()
            .route("/v1/checkout/sessions", post(checkout))
            .route(
                "/v1/subscriptions/:id",
                get(get_subscription).post(update_subscription),
            )
            .route("/v1/invoices/:id", get(invoice))
            .route("/v1/refunds", post(refund))
            .with_state(captured.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), captured)
    }

    async fn gateway() -> (StripePaymentGateway, Captured) {
        let (base_url, captured) = fake_stripe().await;
        let config = StripeConfig::new(SecretString::new("sk_test_123".into()), catalog())
            .with_base_url(base_url)
            .with_redirect_urls("https://app.test/ok", "https://app.test/cancel");
        (StripePaymentGateway::new(config).unwrap(), captured)
    }

    #[tokio::test]
    async fn checkout_carries_user_and_plan_metadata() {
        let (gateway, captured) = gateway().await;
        let session = gateway
            .create_checkout_session(&CheckoutRequest {
                user_id: UserId::new("user-1").unwrap(),
                plan: Plan::Monthly,
                customer_id: Some(CustomerId::new("cus_9").unwrap()),
            })
            .await
            .unwrap();

        assert_eq!(session.id, "cs_test_1");
        assert!(session.url.starts_with("https://checkout.stripe.com/"));

        let calls = captured.lock().unwrap();
        let form = &calls[0].1;
        assert_eq!(form["mode"], "subscription");
        assert_eq!(form["line_items[0][price]"], "price_m");
        assert_eq!(form["metadata[user_id]"], "user-1");
        assert_eq!(form["metadata[plan]"], "monthly");
        assert_eq!(form["customer"], "cus_9");
        assert_eq!(form["success_url"], "https://app.test/ok");
    }

    #[tokio::test]
    async fn checkout_for_unpriced_plan_fails_locally() {
        let (gateway, captured) = gateway().await;
        let err = gateway
            .create_checkout_session(&CheckoutRequest {
                user_id: UserId::new("user-1").unwrap(),
                plan: Plan::Annual,
                customer_id: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::InvalidRequest);
        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retrieve_maps_subscription_fields() {
        let (gateway, _) = gateway().await;
        let sub = gateway.retrieve_subscription("sub_1").await.unwrap();
        assert_eq!(sub.status, ProviderStatus::Active);
        assert_eq!(sub.price_id.as_deref(), Some("price_m"));
        assert_eq!(sub.current_period_end, Some(Timestamp::from_unix_secs(1_702_592_000)));
    }

    #[tokio::test]
    async fn missing_subscription_is_not_found_with_provider_code() {
        let (gateway, _) = gateway().await;
        let err = gateway.retrieve_subscription("sub_missing").await.unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::NotFound);
        assert_eq!(err.provider_code.as_deref(), Some("resource_missing"));
    }

    #[tokio::test]
    async fn change_plan_swaps_existing_item() {
        let (gateway, captured) = gateway().await;
        let sub = gateway.change_plan("sub_1", Plan::Premium).await.unwrap();
        assert_eq!(sub.price_id.as_deref(), Some("price_p"));

        let calls = captured.lock().unwrap();
        let form = &calls[0].1;
        assert_eq!(form["items[0][id]"], "si_1");
        assert_eq!(form["items[0][price]"], "price_p");
        assert_eq!(form["proration_behavior"], "create_prorations");
    }

    #[tokio::test]
    async fn cancel_at_period_end_is_sent_as_flag() {
        let (gateway, captured) = gateway().await;
        let sub = gateway.set_cancel_at_period_end("sub_1", true).await.unwrap();
        assert!(sub.cancel_at_period_end);
        assert_eq!(captured.lock().unwrap()[0].1["cancel_at_period_end"], "true");
    }

    #[tokio::test]
    async fn refund_of_invoice_goes_through_payment_intent() {
        let (gateway, captured) = gateway().await;
        let receipt = gateway
            .refund(&RefundRequest {
                payment_reference: "in_1".into(),
                amount: 700,
                reason: "changed my mind".into(),
                idempotency_key: "refund-abc".into(),
            })
            .await
            .unwrap();

        assert_eq!(receipt.id, "re_1");
        assert_eq!(receipt.amount, 700);
        let calls = captured.lock().unwrap();
        let form = &calls[0].1;
        assert_eq!(form["payment_intent"], "pi_1");
        assert_eq!(form["metadata[reason]"], "changed my mind");
        assert_eq!(form["idempotency_key"], "refund-abc");
    }

    #[test]
    fn error_mapping_by_status() {
        let body = r#"{"error":{"message":"Your card was declined.","code":"card_declined"}}"#;
        let err = error_from_response(reqwest::StatusCode::PAYMENT_REQUIRED, body);
        assert_eq!(err.code, PaymentErrorCode::InvalidRequest);
        assert_eq!(err.message, "Your card was declined.");
        assert_eq!(err.provider_code.as_deref(), Some("card_declined"));

        let err = error_from_response(reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert_eq!(err.code, PaymentErrorCode::RateLimitExceeded);

        let err = error_from_response(reqwest::StatusCode::UNAUTHORIZED, "not json");
        assert_eq!(err.code, PaymentErrorCode::AuthenticationError);
    }
}
