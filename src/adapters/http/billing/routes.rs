//! Axum router configuration for billing endpoints.

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use super::super::middleware::{auth_middleware, AuthState};
use super::handlers::{
    cancel_subscription, change_plan, get_current_subscription, get_refund_eligibility,
    handle_payment_webhook, list_payments, reactivate_subscription, replay_dead_letters,
    request_refund, start_checkout, BillingAppState,
};

/// Subscriber routes (bearer token required).
///
/// - `GET /current` - Current subscription
/// - `POST /checkout` - Open a hosted checkout
/// - `DELETE /cancel` - Cancel at period end
/// - `POST /reactivate` - Undo a pending cancellation
/// - `PUT /change-plan` - Switch plan with proration
/// - `GET /refund/eligibility` - Refund window
/// - `POST /refund` - Request a refund
/// - `GET /payments` - Payment history, newest first
pub fn subscription_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/current", get(get_current_subscription))
        .route("/checkout", post(start_checkout))
        .route("/cancel", delete(cancel_subscription))
        .route("/reactivate", post(reactivate_subscription))
        .route("/change-plan", put(change_plan))
        .route("/refund/eligibility", get(get_refund_eligibility))
        .route("/refund", post(request_refund))
        .route("/payments", get(list_payments))
}

/// Operator routes (admin role required).
pub fn admin_routes() -> Router<BillingAppState> {
    Router::new().route("/dead-letters/replay", post(replay_dead_letters))
}

/// Gateway notification routes.
///
/// Separate from the subscriber routes because they are verified by
/// signature, not by bearer token.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/payment", post(handle_payment_webhook))
}

/// Combines all billing routes.
///
/// ```ignore
/// let app = billing_router(validator).with_state(state);
/// ```
pub fn billing_router(validator: AuthState) -> Router<BillingAppState> {
    let authenticated = Router::new()
        .nest("/subscription", subscription_routes())
        .nest("/admin/billing", admin_routes())
        .route_layer(middleware::from_fn_with_state(validator, auth_middleware));

    Router::new()
        .merge(authenticated)
        .nest("/webhooks", webhook_routes())
}
