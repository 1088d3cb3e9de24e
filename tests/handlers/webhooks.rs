//! Webhook endpoint tests: signature gate, audit trail, and reconciliation

#[path = "../common/mod.rs"]
mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use serde_json::Value;
use skillpay::error::msg;
use tower::ServiceExt;

async fn post_webhook(app: Router, body: Vec<u8>, signature: Option<String>) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method("POST")
        .uri("/webhook/lemonsqueezy")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        request = request.header("x-signature", signature);
    }

    let response = app
        .oneshot(request.body(Body::from(body)).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// POST a correctly signed delivery.
async fn deliver(state: &AppState, body: Vec<u8>) -> (StatusCode, Value) {
    let signature = sign_payload(&body, TEST_WEBHOOK_SECRET);
    post_webhook(test_app(state.clone()), body, Some(signature)).await
}

// ============ Signature gate ============

#[tokio::test]
async fn test_missing_secret_is_configuration_error() {
    let state = create_test_app_state_with(&test_config(None, CustomerIdConflictPolicy::Keep));
    let body = SubscriptionPayload::new("subscription_created", "sub_1", "active").to_bytes();
    let signature = sign_payload(&body, TEST_WEBHOOK_SECRET);

    let (status, json) = post_webhook(test_app(state.clone()), body, Some(signature)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], msg::MISSING_CONFIGURATION);
    let conn = state.db.get().unwrap();
    assert_eq!(count_webhook_events(&conn), 0, "nothing is audited without a secret");
}

#[tokio::test]
async fn test_missing_signature_rejected_without_audit() {
    let state = create_test_app_state();
    let body = SubscriptionPayload::new("subscription_created", "sub_1", "active").to_bytes();

    let (status, json) = post_webhook(test_app(state.clone()), body, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], msg::MISSING_SIGNATURE);
    let conn = state.db.get().unwrap();
    assert_eq!(count_webhook_events(&conn), 0);
}

#[tokio::test]
async fn test_invalid_signature_rejected_without_audit() {
    let state = create_test_app_state();
    let body = SubscriptionPayload::new("subscription_created", "sub_1", "active").to_bytes();
    let wrong = sign_payload(&body, "some_other_secret");

    let (status, json) = post_webhook(test_app(state.clone()), body, Some(wrong)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], msg::INVALID_SIGNATURE);
    let conn = state.db.get().unwrap();
    assert_eq!(count_webhook_events(&conn), 0);
}

#[tokio::test]
async fn test_signature_over_different_body_rejected() {
    let state = create_test_app_state();
    let signed = SubscriptionPayload::new("subscription_created", "sub_1", "active").to_bytes();
    let signature = sign_payload(&signed, TEST_WEBHOOK_SECRET);
    let tampered = SubscriptionPayload::new("subscription_created", "sub_1", "active")
        .price(1)
        .to_bytes();

    let (status, _) = post_webhook(test_app(state.clone()), tampered, Some(signature)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_hex_signature_rejected() {
    let state = create_test_app_state();
    let body = SubscriptionPayload::new("subscription_created", "sub_1", "active").to_bytes();

    let (status, _) =
        post_webhook(test_app(state), body, Some("not-a-hex-digest".to_string())).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============ Audit trail ============

#[tokio::test]
async fn test_signed_invalid_payload_is_audited() {
    let state = create_test_app_state();
    let body = br#"{"meta":{"event_name":"subscription_created"},"data":{"id":"sub_1","type":"subscriptions","attributes":{"status":"active"}}}"#.to_vec();

    let (status, json) = deliver(&state, body.clone()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], msg::WEBHOOK_PROCESSING_FAILED);

    let conn = state.db.get().unwrap();
    let events = all_webhook_events(&conn);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_name, "subscription_created");
    assert_eq!(events[0].body.as_bytes(), body.as_slice(), "body stored verbatim");
    assert!(events[0].processed);
    let error = events[0].processing_error.as_deref().unwrap();
    assert!(error.starts_with("Invalid webhook payload"), "got: {}", error);
}

#[tokio::test]
async fn test_unparseable_body_audited_as_unknown() {
    let state = create_test_app_state();

    let (status, _) = deliver(&state, b"not json at all".to_vec()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let conn = state.db.get().unwrap();
    let events = all_webhook_events(&conn);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_name, "unknown");
    assert!(events[0].processing_error.is_some());
}

#[tokio::test]
async fn test_unhandled_event_name_is_acknowledged() {
    let state = create_test_app_state();
    let body = order_payload("affiliate_activated", "ord_1", 4242, None);

    let (status, json) = deliver(&state, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    let conn = state.db.get().unwrap();
    let events = all_webhook_events(&conn);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_name, "affiliate_activated");
    assert!(events[0].processed);
    assert!(events[0].processing_error.is_none());
}

// ============ Reconciliation ============

#[tokio::test]
async fn test_subscription_created_grants_premium() {
    let state = create_test_app_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_user(&conn, "ada@example.com")
    };
    let body = SubscriptionPayload::new("subscription_created", "sub_1", "active")
        .user(&user.id)
        .to_bytes();

    let (status, json) = deliver(&state, body).await;
    assert_eq!(status, StatusCode::OK, "body: {}", json);

    let conn = state.db.get().unwrap();
    let user = get_user(&conn, &user.id);
    assert_eq!(user.role, UserRole::Premium);
    assert_eq!(user.subscription_status.as_deref(), Some("active"));
    assert_eq!(user.plan_name.as_deref(), Some("IELTS Prep"));
    assert_eq!(user.lemon_squeezy_customer_id.as_deref(), Some("4242"));

    let sub = queries::get_subscription_by_ls_id(&conn, "sub_1")
        .unwrap()
        .expect("subscription row created");
    assert_eq!(sub.user_id, user.id);
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.price, "1299");
    assert_eq!(sub.subscription_item_id, Some(9001));

    let plan = queries::get_plan_by_variant_id(&conn, 20).unwrap().unwrap();
    assert_eq!(sub.plan_id, plan.id);
    assert_eq!(plan.interval, "month");

    let events = all_webhook_events(&conn);
    assert_eq!(events.len(), 1);
    assert!(events[0].processed);
    assert!(events[0].processing_error.is_none());
}

#[tokio::test]
async fn test_redelivery_keeps_one_subscription_and_two_audit_rows() {
    let state = create_test_app_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_user(&conn, "ada@example.com")
    };
    let body = SubscriptionPayload::new("subscription_created", "sub_1", "active")
        .user(&user.id)
        .to_bytes();

    let (first, _) = deliver(&state, body.clone()).await;
    let (second, _) = deliver(&state, body).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);

    let conn = state.db.get().unwrap();
    let subs = queries::list_subscriptions_for_user(&conn, &user.id).unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(count_webhook_events(&conn), 2);
    assert_eq!(get_user(&conn, &user.id).role, UserRole::Premium);
}

#[tokio::test]
async fn test_cancellation_reverts_role() {
    let state = create_test_app_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_user(&conn, "ada@example.com")
    };

    let created = SubscriptionPayload::new("subscription_created", "sub_1", "active")
        .user(&user.id)
        .updated_at("2026-10-01T00:00:00Z")
        .to_bytes();
    let cancelled = SubscriptionPayload::new("subscription_cancelled", "sub_1", "cancelled")
        .updated_at("2026-10-02T00:00:00Z")
        .partial()
        .to_bytes();

    deliver(&state, created).await;
    let (status, _) = deliver(&state, cancelled).await;
    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    let user = get_user(&conn, &user.id);
    assert_eq!(user.role, UserRole::User);
    assert_eq!(user.subscription_status.as_deref(), Some("cancelled"));
    let sub = queries::get_subscription_by_ls_id(&conn, "sub_1").unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Cancelled);
}

#[tokio::test]
async fn test_paused_keeps_current_role() {
    let state = create_test_app_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_user(&conn, "ada@example.com")
    };

    let created = SubscriptionPayload::new("subscription_created", "sub_1", "active")
        .user(&user.id)
        .updated_at("2026-10-01T00:00:00Z")
        .to_bytes();
    let paused = SubscriptionPayload::new("subscription_paused", "sub_1", "paused")
        .updated_at("2026-10-02T00:00:00Z")
        .partial()
        .to_bytes();

    deliver(&state, created).await;
    deliver(&state, paused).await;

    let conn = state.db.get().unwrap();
    let user = get_user(&conn, &user.id);
    assert_eq!(user.role, UserRole::Premium);
    assert_eq!(user.subscription_status.as_deref(), Some("paused"));
}

#[tokio::test]
async fn test_status_only_event_applies_pause_and_timing() {
    let state = create_test_app_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_user(&conn, "ada@example.com")
    };

    let created = SubscriptionPayload::new("subscription_created", "sub_1", "active")
        .user(&user.id)
        .updated_at("2026-10-01T00:00:00Z")
        .to_bytes();
    let paused = SubscriptionPayload::new("subscription_paused", "sub_1", "paused")
        .updated_at("2026-10-02T00:00:00Z")
        .pause(serde_json::json!({ "mode": "void", "resumes_at": null }))
        .ends_at("2026-12-01T00:00:00Z")
        .partial()
        .to_bytes();

    deliver(&state, created).await;
    {
        let conn = state.db.get().unwrap();
        let sub = queries::get_subscription_by_ls_id(&conn, "sub_1").unwrap().unwrap();
        assert!(!sub.is_paused);
        assert_eq!(sub.ends_at, None);
    }
    let (status, _) = deliver(&state, paused).await;
    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    let sub = queries::get_subscription_by_ls_id(&conn, "sub_1").unwrap().unwrap();
    let ends_at = chrono::DateTime::parse_from_rfc3339("2026-12-01T00:00:00Z")
        .unwrap()
        .timestamp();
    assert_eq!(sub.status, SubscriptionStatus::Paused);
    assert!(sub.is_paused, "pause object must reach the row");
    assert_eq!(sub.ends_at, Some(ends_at));
    assert_eq!(sub.price, "1299", "price is untouched without plan data");
}

#[tokio::test]
async fn test_plan_price_follows_latest_event() {
    let state = create_test_app_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_user(&conn, "ada@example.com")
    };

    let first = SubscriptionPayload::new("subscription_created", "sub_1", "active")
        .user(&user.id)
        .updated_at("2026-10-01T00:00:00Z")
        .to_bytes();
    let repriced = SubscriptionPayload::new("subscription_updated", "sub_1", "active")
        .user(&user.id)
        .updated_at("2026-10-02T00:00:00Z")
        .price(1999)
        .to_bytes();

    deliver(&state, first).await;
    deliver(&state, repriced).await;

    let conn = state.db.get().unwrap();
    let plan = queries::get_plan_by_variant_id(&conn, 20).unwrap().unwrap();
    assert_eq!(plan.price, "1999");
    let sub = queries::get_subscription_by_ls_id(&conn, "sub_1").unwrap().unwrap();
    assert_eq!(sub.price, "1999");
    assert_eq!(sub.plan_id, plan.id);
}

#[tokio::test]
async fn test_status_event_for_unknown_subscription_still_updates_user() {
    let state = create_test_app_state();
    let user = {
        let conn = state.db.get().unwrap();
        let user = create_test_user(&conn, "ada@example.com");
        queries::set_user_customer_id(&conn, &user.id, "4242").unwrap();
        user
    };
    let body = SubscriptionPayload::new("subscription_updated", "sub_unknown", "active")
        .partial()
        .to_bytes();

    let (status, _) = deliver(&state, body).await;
    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    assert!(
        queries::get_subscription_by_ls_id(&conn, "sub_unknown")
            .unwrap()
            .is_none(),
        "status-only events never create rows"
    );
    let user = get_user(&conn, &user.id);
    assert_eq!(user.role, UserRole::Premium);
    assert_eq!(user.subscription_status.as_deref(), Some("active"));
}

#[tokio::test]
async fn test_stale_event_does_not_regress_state() {
    let state = create_test_app_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_user(&conn, "ada@example.com")
    };

    let cancelled = SubscriptionPayload::new("subscription_cancelled", "sub_1", "cancelled")
        .user(&user.id)
        .updated_at("2026-10-05T00:00:00Z")
        .to_bytes();
    let late_created = SubscriptionPayload::new("subscription_created", "sub_1", "active")
        .user(&user.id)
        .updated_at("2026-10-01T00:00:00Z")
        .to_bytes();

    deliver(&state, cancelled).await;
    let (status, _) = deliver(&state, late_created).await;
    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    let sub = queries::get_subscription_by_ls_id(&conn, "sub_1").unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Cancelled);
    assert_eq!(get_user(&conn, &user.id).role, UserRole::User);
}

#[tokio::test]
async fn test_payment_events_do_not_mutate_subscription() {
    let state = create_test_app_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_user(&conn, "ada@example.com")
    };

    let created = SubscriptionPayload::new("subscription_created", "sub_1", "active")
        .user(&user.id)
        .to_bytes();
    let failed_payment =
        SubscriptionPayload::new("subscription_payment_failed", "sub_1", "past_due")
            .user(&user.id)
            .updated_at("2026-10-20T00:00:00Z")
            .to_bytes();

    deliver(&state, created).await;
    let (status, _) = deliver(&state, failed_payment).await;
    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    let sub = queries::get_subscription_by_ls_id(&conn, "sub_1").unwrap().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    let user = get_user(&conn, &user.id);
    assert_eq!(user.subscription_status.as_deref(), Some("active"));

    let events = all_webhook_events(&conn);
    assert_eq!(events.len(), 2);
    let payment = &events[1];
    assert_eq!(payment.event_name, "subscription_payment_failed");
    assert!(payment.processed);
    assert!(payment.processing_error.is_none());
}

#[tokio::test]
async fn test_failed_user_update_rolls_back_plan_and_subscription() {
    let state = create_test_app_state();
    let user = {
        let conn = state.db.get().unwrap();
        let user = create_test_user(&conn, "ada@example.com");
        // Same id as the payload, so linking writes nothing.
        queries::set_user_customer_id(&conn, &user.id, "4242").unwrap();
        conn.execute_batch(
            "CREATE TRIGGER block_user_updates BEFORE UPDATE ON users
             BEGIN SELECT RAISE(ABORT, 'user writes disabled'); END;",
        )
        .unwrap();
        user
    };
    let body = SubscriptionPayload::new("subscription_created", "sub_1", "active")
        .user(&user.id)
        .to_bytes();

    let (status, json) = deliver(&state, body).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], msg::WEBHOOK_PROCESSING_FAILED);

    let conn = state.db.get().unwrap();
    assert!(queries::get_plan_by_variant_id(&conn, 20).unwrap().is_none());
    assert!(queries::get_subscription_by_ls_id(&conn, "sub_1").unwrap().is_none());
    let plans: i64 = conn
        .query_row("SELECT COUNT(*) FROM plans", [], |row| row.get(0))
        .unwrap();
    let subscriptions: i64 = conn
        .query_row("SELECT COUNT(*) FROM subscriptions", [], |row| row.get(0))
        .unwrap();
    assert_eq!((plans, subscriptions), (0, 0));
    assert_eq!(get_user(&conn, &user.id).role, UserRole::User);

    let events = all_webhook_events(&conn);
    assert_eq!(events.len(), 1);
    assert!(events[0].processed);
    let error = events[0].processing_error.as_deref().unwrap();
    assert!(error.contains("user writes disabled"), "got: {}", error);
}

// ============ Customer-id linking ============

#[tokio::test]
async fn test_order_created_links_customer_id() {
    let state = create_test_app_state();
    let user = {
        let conn = state.db.get().unwrap();
        create_test_user(&conn, "ada@example.com")
    };

    let (status, _) = deliver(&state, order_payload("order_created", "ord_1", 4242, Some(&user.id))).await;
    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    assert_eq!(
        get_user(&conn, &user.id).lemon_squeezy_customer_id.as_deref(),
        Some("4242")
    );
}

#[tokio::test]
async fn test_conflicting_customer_id_kept_by_default() {
    let state = create_test_app_state();
    let user = {
        let conn = state.db.get().unwrap();
        let user = create_test_user(&conn, "ada@example.com");
        queries::set_user_customer_id(&conn, &user.id, "1111").unwrap();
        user
    };
    let body = SubscriptionPayload::new("subscription_created", "sub_1", "active")
        .user(&user.id)
        .customer(2222)
        .to_bytes();

    let (status, _) = deliver(&state, body).await;
    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    let user = get_user(&conn, &user.id);
    assert_eq!(user.lemon_squeezy_customer_id.as_deref(), Some("1111"));
    assert_eq!(user.role, UserRole::Premium);
}

#[tokio::test]
async fn test_conflicting_customer_id_rejected_rolls_back() {
    let state =
        create_test_app_state_with(&test_config(Some(TEST_WEBHOOK_SECRET), CustomerIdConflictPolicy::Reject));
    let user = {
        let conn = state.db.get().unwrap();
        let user = create_test_user(&conn, "ada@example.com");
        queries::set_user_customer_id(&conn, &user.id, "1111").unwrap();
        user
    };
    let body = SubscriptionPayload::new("subscription_created", "sub_1", "active")
        .user(&user.id)
        .customer(2222)
        .to_bytes();

    let (status, json) = deliver(&state, body).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], msg::WEBHOOK_PROCESSING_FAILED);

    let conn = state.db.get().unwrap();
    assert!(queries::get_subscription_by_ls_id(&conn, "sub_1").unwrap().is_none());
    assert!(queries::get_plan_by_variant_id(&conn, 20).unwrap().is_none());
    let user = get_user(&conn, &user.id);
    assert_eq!(user.role, UserRole::User);
    assert_eq!(user.lemon_squeezy_customer_id.as_deref(), Some("1111"));

    let events = all_webhook_events(&conn);
    assert_eq!(events.len(), 1);
    let error = events[0].processing_error.as_deref().unwrap();
    assert!(error.contains("customer id mismatch"), "got: {}", error);
}

#[tokio::test]
async fn test_conflicting_customer_id_overwritten_when_configured() {
    let state = create_test_app_state_with(&test_config(
        Some(TEST_WEBHOOK_SECRET),
        CustomerIdConflictPolicy::Overwrite,
    ));
    let user = {
        let conn = state.db.get().unwrap();
        let user = create_test_user(&conn, "ada@example.com");
        queries::set_user_customer_id(&conn, &user.id, "1111").unwrap();
        user
    };
    let body = order_payload("order_created", "ord_1", 2222, Some(&user.id));

    let (status, _) = deliver(&state, body).await;
    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    assert_eq!(
        get_user(&conn, &user.id).lemon_squeezy_customer_id.as_deref(),
        Some("2222")
    );
}

#[tokio::test]
async fn test_event_for_unknown_user_is_recorded_as_failure() {
    let state = create_test_app_state();
    let body = SubscriptionPayload::new("subscription_created", "sub_1", "active")
        .user("no-such-user")
        .to_bytes();

    let (status, _) = deliver(&state, body).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let conn = state.db.get().unwrap();
    let events = all_webhook_events(&conn);
    assert!(events[0].processed);
    assert!(events[0].processing_error.is_some());
}
