//! Shared harness: the full router over in-memory stores, the mock gateway
//! and the mock session validator.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use serde_json::{json, Value};
use tower::ServiceExt;

use subscription_billing::adapters::auth::MockSessionValidator;
use subscription_billing::adapters::http::{app_router, BillingAppState, BillingPorts, SIGNATURE_HEADER};
use subscription_billing::adapters::memory::{
    InMemoryDeadLetterStore, InMemoryPaymentLedger, InMemorySubscriptionRepository,
    InMemoryUserDirectory,
};
use subscription_billing::adapters::stripe::{mock_price_id, MockPaymentGateway};
use subscription_billing::domain::billing::{sign_payload, Plan, PriceCatalog, WebhookVerifier};
use subscription_billing::domain::foundation::{Timestamp, UserId};

pub const WEBHOOK_SECRET: &str = "whsec_integration";
pub const USER_TOKEN: &str = "user-token";
pub const ADMIN_TOKEN: &str = "admin-token";
pub const USER_ID: &str = "user-1";

pub struct Harness {
    pub app: Router,
    pub subscriptions: Arc<InMemorySubscriptionRepository>,
    pub ledger: Arc<InMemoryPaymentLedger>,
    pub directory: Arc<InMemoryUserDirectory>,
    pub dead_letters: Arc<InMemoryDeadLetterStore>,
    pub gateway: MockPaymentGateway,
}

impl Harness {
    pub fn new() -> Self {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let directory = Arc::new(InMemoryUserDirectory::new());
        let dead_letters = Arc::new(InMemoryDeadLetterStore::new());
        let gateway = MockPaymentGateway::new();

        let catalog = Plan::ALL
            .into_iter()
            .fold(PriceCatalog::new(), |c, plan| c.with_price(plan, mock_price_id(plan)));
        let state = BillingAppState::new(
            BillingPorts {
                subscriptions: subscriptions.clone(),
                ledger: ledger.clone(),
                directory: directory.clone(),
                gateway: Arc::new(gateway.clone()),
                dead_letters: dead_letters.clone(),
            },
            catalog,
            WebhookVerifier::new(SecretString::new(WEBHOOK_SECRET.to_string())),
            Duration::from_secs(5),
        );
        let validator = Arc::new(
            MockSessionValidator::new()
                .with_test_user(USER_TOKEN, USER_ID)
                .with_admin(ADMIN_TOKEN, "ops-1"),
        );

        Self {
            app: app_router(state, validator, Duration::from_secs(10)),
            subscriptions,
            ledger,
            directory,
            dead_letters,
            gateway,
        }
    }

    pub fn user_id(&self) -> UserId {
        UserId::new(USER_ID).unwrap()
    }

    /// Sends a JSON request and returns the status and decoded body
    /// (`Value::Null` when the body is not JSON).
    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    /// Posts `event` to the notification endpoint with a fresh valid signature.
    pub async fn deliver(&self, event: &Value) -> (StatusCode, Value) {
        let payload = serde_json::to_vec(event).unwrap();
        let signature = sign_payload(WEBHOOK_SECRET, Timestamp::now().as_unix_secs(), &payload);
        self.deliver_raw(payload, Some(signature)).await
    }

    pub async fn deliver_raw(&self, payload: Vec<u8>, signature: Option<String>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("POST").uri("/webhooks/payment");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        self.send(builder.body(Body::from(payload)).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// Delivers a completed checkout for [`USER_ID`] on `plan`.
    pub async fn subscribe(&self, plan: &str) {
        let (status, _) = self.deliver(&checkout_event("evt_checkout", plan)).await;
        assert_eq!(status, StatusCode::OK);
    }
}

pub fn checkout_event(event_id: &str, plan: &str) -> Value {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "created": Timestamp::now().as_unix_secs(),
        "data": { "object": {
            "id": "cs_1",
            "customer": "cus_1",
            "subscription": "sub_1",
            "metadata": { "user_id": USER_ID, "plan": plan },
            "amount_total": 999,
            "currency": "usd",
            "invoice": "in_1"
        }}
    })
}
