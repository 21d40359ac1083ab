//! Subscriber API over HTTP against in-memory stores and the mock gateway.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{Harness, USER_TOKEN};
use subscription_billing::domain::billing::EntitlementLevel;
use subscription_billing::ports::PaymentError;

#[tokio::test]
async fn requests_without_valid_token_are_401() {
    let h = Harness::new();
    let (status, body) = h.call("GET", "/subscription/current", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");

    let (status, _) = h.call("GET", "/subscription/current", Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn no_subscription_is_404() {
    let h = Harness::new();
    let (status, body) = h.call("GET", "/subscription/current", Some(USER_TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "SUBSCRIPTION_NOT_FOUND");

    let (status, _) = h
        .call("GET", "/subscription/refund/eligibility", Some(USER_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn checkout_returns_hosted_url() {
    let h = Harness::new();
    let (status, body) = h
        .call("POST", "/subscription/checkout", Some(USER_TOKEN), Some(json!({ "plan": "annual" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["url"].as_str().unwrap().starts_with("https://"));
    assert!(body["sessionId"].as_str().unwrap().starts_with("cs_"));
    assert_eq!(h.gateway.calls()[0].args, vec!["user-1".to_string(), "annual".to_string()]);
}

#[tokio::test]
async fn checkout_rejects_unknown_plan_and_live_subscribers() {
    let h = Harness::new();
    let (status, body) = h
        .call("POST", "/subscription/checkout", Some(USER_TOKEN), Some(json!({ "plan": "gold" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_PLAN");

    h.subscribe("monthly").await;
    let (status, body) = h
        .call("POST", "/subscription/checkout", Some(USER_TOKEN), Some(json!({ "plan": "annual" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "SUBSCRIPTION_EXISTS");
}

#[tokio::test]
async fn current_subscription_reports_derived_fields() {
    let h = Harness::new();
    h.subscribe("monthly").await;

    let (status, body) = h.call("GET", "/subscription/current", Some(USER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan"], "monthly");
    assert_eq!(body["status"], "active");
    assert_eq!(body["isActive"], true);
    assert_eq!(body["lifecycle"], "active");
    assert_eq!(body["entitlement"], "premium");
}

#[tokio::test]
async fn cancel_then_reactivate() {
    let h = Harness::new();
    h.subscribe("monthly").await;

    let (status, body) = h.call("DELETE", "/subscription/cancel", Some(USER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelationType"], "end_of_period");
    assert!(body["endDate"].is_string());
    assert!(h.gateway.subscription("sub_1").unwrap().cancel_at_period_end);

    let (_, current) = h.call("GET", "/subscription/current", Some(USER_TOKEN), None).await;
    assert_eq!(current["lifecycle"], "cancel_pending");
    assert_eq!(current["isActive"], true);

    let (status, _) = h.call("DELETE", "/subscription/cancel", Some(USER_TOKEN), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = h
        .call("POST", "/subscription/reactivate", Some(USER_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    assert_eq!(body["cancelationType"], "none");
    assert!(!h.gateway.subscription("sub_1").unwrap().cancel_at_period_end);
}

#[tokio::test]
async fn gateway_failure_is_502_without_details() {
    let h = Harness::new();
    h.subscribe("monthly").await;
    h.gateway
        .set_method_error("set_cancel_at_period_end", PaymentError::network("connection reset by peer"));

    let (status, body) = h.call("DELETE", "/subscription/cancel", Some(USER_TOKEN), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "GATEWAY_ERROR");
    assert!(!body["message"].as_str().unwrap().contains("reset"));

    let (_, current) = h.call("GET", "/subscription/current", Some(USER_TOKEN), None).await;
    assert_eq!(current["lifecycle"], "active");
}

#[tokio::test]
async fn upgrade_reports_proration() {
    let h = Harness::new();
    h.subscribe("monthly").await;

    let (status, body) = h
        .call("PUT", "/subscription/change-plan", Some(USER_TOKEN), Some(json!({ "newPlan": "annual" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscription"]["plan"], "annual");
    // just started, so nearly the full price difference (9999 - 999)
    let proration = body["prorationAmount"].as_i64().unwrap();
    assert!(proration > 8_900 && proration <= 9_000, "{}", proration);
    assert!(h.gateway.was_called("change_plan"));
}

#[tokio::test]
async fn change_plan_validation() {
    let h = Harness::new();
    h.subscribe("monthly").await;

    let (status, body) = h
        .call("PUT", "/subscription/change-plan", Some(USER_TOKEN), Some(json!({ "newPlan": "gold" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_PLAN");

    let (status, body) = h
        .call("PUT", "/subscription/change-plan", Some(USER_TOKEN), Some(json!({ "newPlan": "monthly" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_FAILED");
    assert!(!h.gateway.was_called("change_plan"));
}

#[tokio::test]
async fn refund_inside_window_revokes_access() {
    let h = Harness::new();
    h.subscribe("monthly").await;

    let (status, eligibility) = h
        .call("GET", "/subscription/refund/eligibility", Some(USER_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(eligibility["eligible"], true);
    assert_eq!(eligibility["daysSinceStart"], 0);
    assert_eq!(eligibility["daysRemainingForRefund"], 7);

    let (status, body) = h
        .call("POST", "/subscription/refund", Some(USER_TOKEN), Some(json!({ "reason": "not for me" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let amount = body["amount"].as_i64().unwrap();
    assert!(amount > 990 && amount <= 999, "{}", amount);
    assert_eq!(body["subscription"]["refundStatus"], "processed");
    assert_eq!(body["subscription"]["isActive"], false);
    assert_eq!(h.directory.entitlement(&h.user_id()).await, Some(EntitlementLevel::Free));
    assert!(h.gateway.was_called("cancel_immediately"));

    let (status, _) = h
        .call("POST", "/subscription/refund", Some(USER_TOKEN), Some(json!({})))
        .await;
    assert!(status.is_client_error());
    assert_eq!(h.gateway.call_count("refund"), 1);
}

#[tokio::test]
async fn refund_gateway_failure_is_502_and_can_be_retried() {
    let h = Harness::new();
    h.subscribe("monthly").await;
    h.gateway.set_method_error("refund", PaymentError::provider("card_declined"));

    let (status, _) = h.call("POST", "/subscription/refund", Some(USER_TOKEN), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    h.gateway.clear_errors();
    let (status, _) = h.call("POST", "/subscription/refund", Some(USER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn payments_are_listed_for_the_caller() {
    let h = Harness::new();
    h.subscribe("monthly").await;

    let (status, body) = h.call("GET", "/subscription/payments", Some(USER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    let payments = body["payments"].as_array().unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0]["transactionId"], "in_1");
    assert_eq!(payments[0]["amount"], 999);
}

#[tokio::test]
async fn health_is_public() {
    let h = Harness::new();
    let (status, body) = h.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
