#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use checkout_api::{
    config::{AppConfig, CallbackPolicy, MpesaConfig, StripeConfig},
    db::run_migrations,
    dto::cart::AddToCartRequest,
    entity::{Orders, products::ActiveModel as ProductActive},
    routes::create_app,
    services::cart_service,
    state::AppState,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, EntityTrait, PaginatorTrait, Set};
use secrecy::Secret;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test123secret456";

pub fn test_config(stripe_base: &str, mpesa_base: &str) -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        stripe: StripeConfig {
            secret_key: Secret::new("sk_test_xxx".to_string()),
            webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
            api_base_url: stripe_base.to_string(),
            success_url: "http://localhost/success".to_string(),
            cancel_url: "http://localhost/failed".to_string(),
            currency: "usd".to_string(),
            service_fee: 500,
            service_fee_label: "VAT Fee".to_string(),
            webhook_tolerance_secs: 300,
        },
        mpesa: MpesaConfig {
            consumer_key: "consumer".to_string(),
            consumer_secret: Secret::new("consumer_secret".to_string()),
            shortcode: "174379".to_string(),
            passkey: Secret::new("passkey".to_string()),
            callback_url: "http://localhost/api/payments/push/callback".to_string(),
            api_base_url: mpesa_base.to_string(),
            usd_to_kes_rate: 140,
        },
        callback_policy: CallbackPolicy::Acknowledge,
    }
}

pub async fn setup_state() -> anyhow::Result<AppState> {
    setup_state_with(test_config("http://127.0.0.1:9", "http://127.0.0.1:9")).await
}

/// One pooled connection so every query sees the same in-memory database.
pub async fn setup_state_with(config: AppConfig) -> anyhow::Result<AppState> {
    let mut opts = ConnectOptions::new(config.database_url.clone());
    opts.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let orm = Database::connect(opts).await?;
    run_migrations(&orm).await?;
    Ok(AppState::new(orm, config))
}

pub async fn create_product(state: &AppState, name: &str, price: i64) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(None),
        price: Set(price),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(product.id)
}

pub async fn create_cart(
    state: &AppState,
    cart_code: &str,
    lines: &[(Uuid, i32)],
) -> anyhow::Result<()> {
    for (product_id, quantity) in lines {
        cart_service::add_item(
            state,
            AddToCartRequest {
                cart_code: cart_code.to_string(),
                product_id: *product_id,
                quantity: *quantity,
            },
        )
        .await?;
    }
    Ok(())
}

/// productX qty 2 @ 10.00 and productY qty 1 @ 5.00.
pub async fn seed_two_item_cart(state: &AppState, cart_code: &str) -> anyhow::Result<(Uuid, Uuid)> {
    let x = create_product(state, &format!("productX-{cart_code}"), 1000).await?;
    let y = create_product(state, &format!("productY-{cart_code}"), 500).await?;
    create_cart(state, cart_code, &[(x, 2), (y, 1)]).await?;
    Ok((x, y))
}

pub async fn order_count(state: &AppState) -> anyhow::Result<u64> {
    Ok(Orders::find().count(&state.orm).await?)
}

pub fn app(state: &AppState) -> Router {
    create_app(state.clone())
}

pub async fn send(app: &Router, request: Request<Body>) -> anyhow::Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

pub async fn post_json(app: &Router, uri: &str, payload: &Value) -> anyhow::Result<(StatusCode, Value)> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(payload)?))?;
    send(app, request).await
}

pub async fn get(app: &Router, uri: &str) -> anyhow::Result<(StatusCode, Value)> {
    let request = Request::builder().method("GET").uri(uri).body(Body::empty())?;
    send(app, request).await
}

pub fn stk_callback(cart_code: &str, result_code: i64) -> Value {
    serde_json::json!({
        "Body": { "stkCallback": {
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_191220191020363925",
            "ResultCode": result_code,
            "ResultDesc": "processed",
            "AccountReference": cart_code,
            "CallbackMetadata": { "Item": [
                { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" }
            ]}
        }}
    })
}
