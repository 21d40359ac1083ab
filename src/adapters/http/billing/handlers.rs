//! HTTP handlers for billing endpoints.
//!
//! These handlers connect axum routes to the application layer's command
//! and query handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Json, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::application::{
    BillingEventApplier, CancelSubscriptionCommand, CancelSubscriptionHandler, ChangePlanCommand,
    ChangePlanHandler, EntitlementSync, ExpireCancellationsHandler, GetRefundEligibilityHandler,
    GetRefundEligibilityQuery, GetSubscriptionHandler, GetSubscriptionQuery, ListPaymentsHandler,
    ListPaymentsQuery, ProcessWebhookCommand, ProcessWebhookHandler,
    ReactivateSubscriptionCommand, ReactivateSubscriptionHandler, ReplayDeadLettersCommand,
    ReplayDeadLettersHandler, RequestRefundCommand, RequestRefundHandler, StartCheckoutCommand,
    StartCheckoutHandler,
};
use crate::domain::billing::{PriceCatalog, WebhookVerifier};
use crate::ports::{
    DeadLetterStore, PaymentGateway, PaymentLedger, SubscriptionRepository, UserDirectory,
};

use super::super::error::{ApiError, ErrorResponse};
use super::super::middleware::{RequireAdmin, RequireAuth};
use super::dto::{
    CancelResponse, ChangePlanRequest, ChangePlanResponse, CheckoutRequest, CheckoutResponse,
    PaymentsResponse, RefundRequest, RefundResponse, ReplayParams, ReplayResponse,
    SubscriptionResponse, WebhookAck,
};

/// Header carrying `t=<unix>,v1=<hex>`.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Storage and collaborator ports the billing endpoints run on.
#[derive(Clone)]
pub struct BillingPorts {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub ledger: Arc<dyn PaymentLedger>,
    pub directory: Arc<dyn UserDirectory>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub dead_letters: Arc<dyn DeadLetterStore>,
}

/// Shared application state.
///
/// Cloned for each request; everything inside is Arc-wrapped.
#[derive(Clone)]
pub struct BillingAppState {
    ports: BillingPorts,
    entitlements: Arc<EntitlementSync>,
    applier: Arc<BillingEventApplier>,
    webhooks: Arc<ProcessWebhookHandler>,
}

impl BillingAppState {
    pub fn new(
        ports: BillingPorts,
        catalog: PriceCatalog,
        verifier: WebhookVerifier,
        webhook_budget: Duration,
    ) -> Self {
        let entitlements = Arc::new(EntitlementSync::new(ports.directory.clone()));
        let applier = Arc::new(BillingEventApplier::new(
            ports.subscriptions.clone(),
            ports.ledger.clone(),
            ports.directory.clone(),
            ports.gateway.clone(),
            catalog,
        ));
        let webhooks = Arc::new(ProcessWebhookHandler::new(
            verifier,
            applier.clone(),
            ports.dead_letters.clone(),
            webhook_budget,
        ));
        Self {
            ports,
            entitlements,
            applier,
            webhooks,
        }
    }

    pub fn get_subscription_handler(&self) -> GetSubscriptionHandler {
        GetSubscriptionHandler::new(self.ports.subscriptions.clone())
    }

    pub fn start_checkout_handler(&self) -> StartCheckoutHandler {
        StartCheckoutHandler::new(self.ports.subscriptions.clone(), self.ports.gateway.clone())
    }

    pub fn cancel_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(
            self.ports.subscriptions.clone(),
            self.ports.gateway.clone(),
            self.entitlements.clone(),
        )
    }

    pub fn reactivate_handler(&self) -> ReactivateSubscriptionHandler {
        ReactivateSubscriptionHandler::new(
            self.ports.subscriptions.clone(),
            self.ports.gateway.clone(),
            self.entitlements.clone(),
        )
    }

    pub fn change_plan_handler(&self) -> ChangePlanHandler {
        ChangePlanHandler::new(
            self.ports.subscriptions.clone(),
            self.ports.gateway.clone(),
            self.entitlements.clone(),
        )
    }

    pub fn refund_eligibility_handler(&self) -> GetRefundEligibilityHandler {
        GetRefundEligibilityHandler::new(self.ports.subscriptions.clone())
    }

    pub fn refund_handler(&self) -> RequestRefundHandler {
        RequestRefundHandler::new(
            self.ports.subscriptions.clone(),
            self.ports.gateway.clone(),
            self.entitlements.clone(),
        )
    }

    pub fn list_payments_handler(&self) -> ListPaymentsHandler {
        ListPaymentsHandler::new(self.ports.ledger.clone())
    }

    pub fn replay_handler(&self) -> ReplayDeadLettersHandler {
        ReplayDeadLettersHandler::new(self.ports.dead_letters.clone(), self.applier.clone())
    }

    /// Handler for the background expiry sweep.
    pub fn expire_cancellations_handler(&self, batch_size: u32) -> ExpireCancellationsHandler {
        ExpireCancellationsHandler::new(
            self.ports.subscriptions.clone(),
            self.entitlements.clone(),
            batch_size,
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /subscription/current
pub async fn get_current_subscription(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .get_subscription_handler()
        .handle(GetSubscriptionQuery { user_id: user.id })
        .await?;
    Ok(Json(SubscriptionResponse::from(view)))
}

/// GET /subscription/refund/eligibility
pub async fn get_refund_eligibility(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let eligibility = state
        .refund_eligibility_handler()
        .handle(GetRefundEligibilityQuery { user_id: user.id })
        .await?;
    Ok(Json(eligibility))
}

/// GET /subscription/payments
pub async fn list_payments(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let payments = state
        .list_payments_handler()
        .handle(ListPaymentsQuery { user_id: user.id })
        .await?;
    Ok(Json(PaymentsResponse { payments }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /subscription/checkout
pub async fn start_checkout(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .start_checkout_handler()
        .handle(StartCheckoutCommand {
            user_id: user.id,
            plan: request.plan,
        })
        .await?;
    Ok(Json(CheckoutResponse::from(session)))
}

/// DELETE /subscription/cancel
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .cancel_handler()
        .handle(CancelSubscriptionCommand { user_id: user.id })
        .await?;
    Ok(Json(CancelResponse::from(result)))
}

/// POST /subscription/reactivate
pub async fn reactivate_subscription(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = state
        .reactivate_handler()
        .handle(ReactivateSubscriptionCommand { user_id: user.id })
        .await?;
    Ok(Json(subscription))
}

/// PUT /subscription/change-plan
pub async fn change_plan(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<ChangePlanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .change_plan_handler()
        .handle(ChangePlanCommand {
            user_id: user.id,
            new_plan: request.new_plan,
        })
        .await?;
    Ok(Json(ChangePlanResponse::from(result)))
}

/// POST /subscription/refund
pub async fn request_refund(
    State(state): State<BillingAppState>,
    RequireAuth(user): RequireAuth,
    body: Option<Json<RefundRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let result = state
        .refund_handler()
        .handle(RequestRefundCommand {
            user_id: user.id,
            reason: request.reason,
        })
        .await?;
    Ok(Json(RefundResponse::from(result)))
}

/// POST /admin/billing/dead-letters/replay
pub async fn replay_dead_letters(
    State(state): State<BillingAppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(params): Query<ReplayParams>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(admin_id = %admin.id, limit = params.limit, "Dead-letter replay requested");
    let report = state
        .replay_handler()
        .handle(ReplayDeadLettersCommand {
            limit: params.limit,
        })
        .await?;
    Ok(Json(ReplayResponse::from(report)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Gateway Notifications
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/payment
///
/// Only verification failures get a non-2xx status.
pub async fn handle_payment_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cmd = ProcessWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    match state.webhooks.handle(cmd).await {
        Ok(receipt) => (StatusCode::OK, Json(WebhookAck::received(receipt.ignored()))).into_response(),
        Err(err) => {
            let body = ErrorResponse::new(err.kind().to_ascii_uppercase(), err.to_string());
            (err.status_code(), Json(body)).into_response()
        }
    }
}
