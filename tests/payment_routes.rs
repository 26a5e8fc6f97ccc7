mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use checkout_api::{
    config::CallbackPolicy,
    entity::{AuditLogs, audit_logs::Column as AuditCol},
    gateways::stripe::{SIGNATURE_HEADER, sign_payload},
    models::PaymentStatus,
    services::{cart_service, payment_intent_service},
};
use chrono::Utc;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::{Value, json};

fn completed_session(cart_code: &str, session_id: &str) -> Value {
    json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": session_id,
            "object": "checkout.session",
            "amount_total": 3000,
            "currency": "usd",
            "customer_email": "a@b.com",
            "metadata": { "cart_code": cart_code }
        }}
    })
}

fn webhook_request(body: &[u8], signature: &str) -> anyhow::Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri("/api/payments/card/webhook")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(body.to_vec()))?)
}

#[tokio::test]
async fn signed_checkout_webhook_fulfills_cart() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    common::seed_two_item_cart(&state, "ABC123").await?;
    let app = common::app(&state);

    let body = serde_json::to_vec(&completed_session("ABC123", "cs_test_1"))?;
    let signature = sign_payload(common::WEBHOOK_SECRET, Utc::now().timestamp(), &body)?;
    let (status, _) = common::send(&app, webhook_request(&body, &signature)?).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(common::order_count(&state).await?, 1);
    assert!(cart_service::find_cart(&state.orm, "ABC123").await?.is_none());

    // Replays are acknowledged without a second order.
    let (status, _) = common::send(&app, webhook_request(&body, &signature)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(common::order_count(&state).await?, 1);
    Ok(())
}

#[tokio::test]
async fn tampered_webhook_is_rejected_without_state_change() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    common::seed_two_item_cart(&state, "ABC123").await?;
    let app = common::app(&state);

    let body = serde_json::to_vec(&completed_session("ABC123", "cs_test_1"))?;
    let signature = sign_payload(common::WEBHOOK_SECRET, Utc::now().timestamp(), &body)?;
    let mut tampered = body.clone();
    tampered.extend_from_slice(b" ");

    let (status, body) = common::send(&app, webhook_request(&tampered, &signature)?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = common::send(&app, webhook_request(&tampered, "garbage")?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(common::order_count(&state).await?, 0);
    assert!(cart_service::find_cart(&state.orm, "ABC123").await?.is_some());
    Ok(())
}

#[tokio::test]
async fn unrelated_webhook_events_are_acknowledged() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    common::seed_two_item_cart(&state, "ABC123").await?;
    let app = common::app(&state);

    let event = json!({ "id": "evt_2", "type": "payment_intent.created", "data": { "object": {} } });
    let body = serde_json::to_vec(&event)?;
    let signature = sign_payload(common::WEBHOOK_SECRET, Utc::now().timestamp(), &body)?;
    let (status, _) = common::send(&app, webhook_request(&body, &signature)?).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(common::order_count(&state).await?, 0);
    Ok(())
}

#[tokio::test]
async fn successful_push_callback_fulfills_once() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    common::seed_two_item_cart(&state, "XYZ").await?;
    payment_intent_service::upsert(&state.orm, "XYZ", "a@b.com").await?;
    let app = common::app(&state);

    let callback = common::stk_callback("XYZ", 0);
    let (status, body) = common::post_json(&app, "/api/payments/push/callback", &callback).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Callback received");

    assert_eq!(
        payment_intent_service::get_status(&state.orm, "XYZ").await?,
        PaymentStatus::Paid
    );
    assert!(cart_service::find_cart(&state.orm, "XYZ").await?.is_none());
    assert_eq!(common::order_count(&state).await?, 1);

    let order = checkout_api::entity::Orders::find()
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("order missing"))?;
    assert_eq!(order.currency, "KES");
    assert_eq!(order.amount, 350_000);
    assert!(order.external_ref.starts_with("push_"));

    let (status, _) = common::post_json(&app, "/api/payments/push/callback", &callback).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(common::order_count(&state).await?, 1);
    Ok(())
}

#[tokio::test]
async fn failed_push_callback_declines_and_keeps_cart() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    common::seed_two_item_cart(&state, "XYZ").await?;
    payment_intent_service::upsert(&state.orm, "XYZ", "a@b.com").await?;
    let app = common::app(&state);

    let callback = common::stk_callback("XYZ", 1032);
    let (status, _) = common::post_json(&app, "/api/payments/push/callback", &callback).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        payment_intent_service::get_status(&state.orm, "XYZ").await?,
        PaymentStatus::Declined
    );
    assert!(cart_service::find_cart(&state.orm, "XYZ").await?.is_some());
    assert_eq!(common::order_count(&state).await?, 0);
    Ok(())
}

#[tokio::test]
async fn malformed_callback_is_acknowledged_and_audited() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let app = common::app(&state);

    let (status, _) =
        common::post_json(&app, "/api/payments/push/callback", &json!({ "Body": {} })).await?;
    assert_eq!(status, StatusCode::OK);

    let failures = AuditLogs::find()
        .filter(AuditCol::Action.eq("callback_failed"))
        .count(&state.orm)
        .await?;
    assert_eq!(failures, 1);
    Ok(())
}

#[tokio::test]
async fn surface_policy_reports_failures_but_not_replays() -> anyhow::Result<()> {
    let mut config = common::test_config("http://127.0.0.1:9", "http://127.0.0.1:9");
    config.callback_policy = CallbackPolicy::Surface;
    let state = common::setup_state_with(config).await?;
    let app = common::app(&state);

    let (status, _) =
        common::post_json(&app, "/api/payments/push/callback", &json!({ "Body": {} })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown cart reads as an already reconciled delivery.
    let (status, _) = common::post_json(
        &app,
        "/api/payments/push/callback",
        &common::stk_callback("GONE", 0),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn surface_policy_reports_paid_callback_without_intent() -> anyhow::Result<()> {
    let mut config = common::test_config("http://127.0.0.1:9", "http://127.0.0.1:9");
    config.callback_policy = CallbackPolicy::Surface;
    let state = common::setup_state_with(config).await?;
    common::seed_two_item_cart(&state, "NOINTENT").await?;
    let app = common::app(&state);

    let (status, body) = common::post_json(
        &app,
        "/api/payments/push/callback",
        &common::stk_callback("NOINTENT", 0),
    )
    .await?;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
    assert!(cart_service::find_cart(&state.orm, "NOINTENT").await?.is_some());
    assert_eq!(common::order_count(&state).await?, 0);
    let failures = AuditLogs::find()
        .filter(AuditCol::Action.eq("callback_failed"))
        .count(&state.orm)
        .await?;
    assert_eq!(failures, 1);
    Ok(())
}

#[tokio::test]
async fn push_order_records_the_whole_shillings_charged() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let penny = common::create_product(&state, "Penny sweet", 1).await?;
    common::create_cart(&state, "PENNY", &[(penny, 1)]).await?;
    payment_intent_service::upsert(&state.orm, "PENNY", "a@b.com").await?;
    let app = common::app(&state);

    let (status, _) = common::post_json(
        &app,
        "/api/payments/push/callback",
        &common::stk_callback("PENNY", 0),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let order = checkout_api::entity::Orders::find()
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("order missing"))?;
    assert_eq!(order.amount, 100);
    assert_eq!(order.currency, "KES");
    Ok(())
}

#[tokio::test]
async fn card_checkout_with_missing_field_is_json_bad_request() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    common::seed_two_item_cart(&state, "ABC123").await?;
    let app = common::app(&state);

    let (status, body) = common::post_json(
        &app,
        "/api/payments/card/checkout",
        &json!({ "cart_code": "ABC123" }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "cart_code and email are required");

    let (status, body) = common::post_json(
        &app,
        "/api/payments/card/checkout",
        &json!({ "cart_code": "  ", "email": "a@b.com" }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "cart_code and email are required");
    Ok(())
}

#[tokio::test]
async fn payment_status_reports_intent_or_not_found() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let app = common::app(&state);

    let (status, body) = common::get(&app, "/api/payments/status?cart_code=NOPE").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "NotFound");

    let (status, body) = common::get(&app, "/api/payments/status").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "NotFound");

    payment_intent_service::upsert(&state.orm, "XYZ", "a@b.com").await?;
    let (status, body) = common::get(&app, "/api/payments/status?cart_code=XYZ").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Pending");
    Ok(())
}
