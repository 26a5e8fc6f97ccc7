mod common;

use axum::http::StatusCode;
use checkout_api::{
    models::{PaymentConfirmation, PaymentOutcome},
    services::fulfillment_service,
};

async fn fulfill(
    state: &checkout_api::state::AppState,
    cart_code: &str,
    email: &str,
) -> anyhow::Result<uuid::Uuid> {
    let confirmation = PaymentConfirmation {
        cart_code: cart_code.to_string(),
        external_ref: format!("cs_{cart_code}"),
        amount: 2500,
        currency: "usd".to_string(),
        email: email.to_string(),
        outcome: PaymentOutcome::Paid,
    };
    let order = fulfillment_service::fulfill(&state.orm, &confirmation).await?;
    Ok(order.order.id)
}

#[tokio::test]
async fn orders_are_listed_per_customer_with_paging() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    for code in ["A1", "A2", "A3"] {
        common::seed_two_item_cart(&state, code).await?;
        fulfill(&state, code, "a@b.com").await?;
    }
    common::seed_two_item_cart(&state, "B1").await?;
    fulfill(&state, "B1", "other@b.com").await?;
    let app = common::app(&state);

    let (status, body) = common::get(&app, "/api/orders?email=a@b.com&page=1&per_page=2").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 3);
    assert_eq!(body["meta"]["per_page"], 2);
    let items = body["data"]["items"]
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("items missing"))?;
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|order| order["customer_email"] == "a@b.com"));

    let (status, body) = common::get(&app, "/api/orders?email=a@b.com&page=2&per_page=2").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn listing_without_email_is_bad_request() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let app = common::app(&state);

    let (status, _) = common::get(&app, "/api/orders?email=").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn order_detail_includes_snapshot_items() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    common::seed_two_item_cart(&state, "ABC123").await?;
    let id = fulfill(&state, "ABC123", "a@b.com").await?;
    let app = common::app(&state);

    let (status, body) = common::get(&app, &format!("/api/orders/{id}")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["order"]["amount"], 2500);
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(2));

    let (status, _) = common::get(&app, &format!("/api/orders/{}", uuid::Uuid::new_v4())).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn cart_routes_add_and_view_lines() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let product = common::create_product(&state, "Notebook", 500).await?;
    let app = common::app(&state);

    let (status, body) = common::post_json(
        &app,
        "/api/cart",
        &serde_json::json!({ "cart_code": "NEW1", "product_id": product, "quantity": 3 }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1500);

    let (status, body) = common::get(&app, "/api/cart/NEW1").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"][0]["quantity"], 3);

    let (status, _) = common::post_json(
        &app,
        "/api/cart",
        &serde_json::json!({ "cart_code": "NEW1", "product_id": product, "quantity": 0 }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = common::get(&app, "/api/cart/UNKNOWN").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
