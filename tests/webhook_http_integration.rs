//! Notification endpoint over HTTP: verification statuses, acknowledgement
//! bodies, dead-lettering and operator replay.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{checkout_event, Harness, ADMIN_TOKEN, USER_TOKEN, WEBHOOK_SECRET};
use subscription_billing::domain::billing::{sign_payload, EntitlementLevel};
use subscription_billing::domain::foundation::Timestamp;
use subscription_billing::ports::SubscriptionRepository;

#[tokio::test]
async fn verified_checkout_grants_access() {
    let h = Harness::new();

    let (status, body) = h.deliver(&checkout_event("evt_1", "monthly")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));

    let sub = h.subscriptions.find_by_user_id(&h.user_id()).await.unwrap().unwrap();
    assert!(sub.is_active);
    assert_eq!(h.directory.entitlement(&h.user_id()).await, Some(EntitlementLevel::Premium));
    assert_eq!(h.ledger.entries().await.len(), 1);
}

#[tokio::test]
async fn redelivered_event_is_acknowledged_as_ignored() {
    let h = Harness::new();
    let event = checkout_event("evt_1", "monthly");
    h.deliver(&event).await;

    let (status, body) = h.deliver(&event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ignored"], true);
    assert_eq!(h.ledger.entries().await.len(), 1);
    assert_eq!(h.directory.pushes().await.len(), 1);
}

#[tokio::test]
async fn missing_signature_header_is_400() {
    let h = Harness::new();
    let payload = serde_json::to_vec(&checkout_event("evt_1", "monthly")).unwrap();

    let (status, _) = h.deliver_raw(payload, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.subscriptions.count().await, 0);
}

#[tokio::test]
async fn malformed_signature_header_is_400() {
    let h = Harness::new();
    let payload = serde_json::to_vec(&checkout_event("evt_1", "monthly")).unwrap();

    let (status, _) = h.deliver_raw(payload, Some("garbage".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrong_secret_is_401_and_mutates_nothing() {
    let h = Harness::new();
    let payload = serde_json::to_vec(&checkout_event("evt_1", "monthly")).unwrap();
    let signature = sign_payload("whsec_other", Timestamp::now().as_unix_secs(), &payload);

    let (status, body) = h.deliver_raw(payload, Some(signature)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "SIGNATURE_ERROR");
    assert_eq!(h.subscriptions.count().await, 0);
    assert!(h.directory.pushes().await.is_empty());
    assert!(h.ledger.entries().await.is_empty());
}

#[tokio::test]
async fn stale_signature_is_401() {
    let h = Harness::new();
    let payload = serde_json::to_vec(&checkout_event("evt_1", "monthly")).unwrap();
    let ten_minutes_ago = Timestamp::now().as_unix_secs() - 600;
    let signature = sign_payload(WEBHOOK_SECRET, ten_minutes_ago, &payload);

    let (status, _) = h.deliver_raw(payload, Some(signature)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn verified_but_unparsable_body_is_400() {
    let h = Harness::new();
    let payload = b"{not json".to_vec();
    let signature = sign_payload(WEBHOOK_SECRET, Timestamp::now().as_unix_secs(), &payload);

    let (status, _) = h.deliver_raw(payload, Some(signature)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unrecognized_event_is_ignored() {
    let h = Harness::new();
    let (status, body) = h
        .deliver(&json!({ "id": "evt_x", "type": "customer.created", "data": { "object": {} } }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true, "ignored": true }));
}

#[tokio::test]
async fn unknown_customer_is_acknowledged_without_changes() {
    let h = Harness::new();
    let (status, body) = h
        .deliver(&json!({
            "id": "evt_upd",
            "type": "customer.subscription.updated",
            "created": Timestamp::now().as_unix_secs(),
            "data": { "object": {
                "id": "sub_9", "customer": "cus_unknown", "status": "active",
                "cancel_at_period_end": false
            }}
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ignored"], true);
    assert!(h.dead_letters.entries().await.is_empty());
}

#[tokio::test]
async fn deletion_revokes_access() {
    let h = Harness::new();
    h.subscribe("monthly").await;

    let (status, _) = h
        .deliver(&json!({
            "id": "evt_del",
            "type": "customer.subscription.deleted",
            "created": Timestamp::now().as_unix_secs() + 1,
            "data": { "object": {
                "id": "sub_1", "customer": "cus_1", "status": "canceled",
                "cancel_at_period_end": false
            }}
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.directory.entitlement(&h.user_id()).await, Some(EntitlementLevel::Free));

    let (status, body) = h.call("GET", "/subscription/current", Some(USER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isActive"], false);
    assert_eq!(body["cancelationType"], "immediate");
}

#[tokio::test]
async fn storage_failure_is_acknowledged_parked_and_replayable() {
    let h = Harness::new();
    h.subscriptions.fail_writes(true);

    let (status, body) = h.deliver(&checkout_event("evt_1", "annual")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    let parked = h.dead_letters.entries().await;
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].event_id, "evt_1");

    h.subscriptions.fail_writes(false);
    let (status, body) = h
        .call("POST", "/admin/billing/dead-letters/replay", Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "replayed": 1, "failed": 0 }));

    let sub = h.subscriptions.find_by_user_id(&h.user_id()).await.unwrap().unwrap();
    assert!(sub.is_active);
    assert_eq!(h.directory.entitlement(&h.user_id()).await, Some(EntitlementLevel::Premium));
    assert!(h.dead_letters.entries().await[0].replayed_at.is_some());
}

#[tokio::test]
async fn replay_requires_admin() {
    let h = Harness::new();

    let (status, body) = h
        .call("POST", "/admin/billing/dead-letters/replay", Some(USER_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "FORBIDDEN");

    let (status, _) = h.call("POST", "/admin/billing/dead-letters/replay", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
