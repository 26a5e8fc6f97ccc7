use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::Value;

use crate::{
    audit,
    config::CallbackPolicy,
    dto::payments::{
        CallbackAck, CardCheckoutRequest, PaymentStatusQuery, PaymentStatusResponse,
        PushPaymentRequest,
    },
    error::{AppError, AppResult},
    gateways::stripe::SIGNATURE_HEADER,
    services::{card_payment_service, non_blank, payment_intent_service, push_payment_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/card/checkout", post(card_checkout))
        .route("/card/webhook", post(card_webhook))
        .route("/push/initiate", post(push_initiate))
        .route("/push/callback", post(push_callback))
        .route("/status", get(payment_status))
}

#[utoipa::path(
    post,
    path = "/api/payments/card/checkout",
    request_body = CardCheckoutRequest,
    responses(
        (status = 200, description = "Hosted checkout session from the card provider"),
        (status = 400, description = "Missing fields or provider rejected the session"),
        (status = 404, description = "Unknown cart"),
    ),
    tag = "Payments"
)]
pub async fn card_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CardCheckoutRequest>,
) -> AppResult<Json<Value>> {
    let session = card_payment_service::create_checkout(&state, payload).await?;
    Ok(Json(serde_json::json!({ "data": session })))
}

#[utoipa::path(
    post,
    path = "/api/payments/card/webhook",
    request_body(content = String, description = "Raw signed event body"),
    responses(
        (status = 200, description = "Event accepted"),
        (status = 400, description = "Invalid payload or signature"),
    ),
    tag = "Payments"
)]
pub async fn card_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let event = match state.stripe.verify_and_decode(&body, signature) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(error = %err, "webhook rejected");
            return AppError::from(err).into_response();
        }
    };

    match card_payment_service::handle_event(&state, event).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(err) => callback_failure(&state, "card", err, StatusCode::OK.into_response()).await,
    }
}

#[utoipa::path(
    post,
    path = "/api/payments/push/initiate",
    request_body = PushPaymentRequest,
    responses(
        (status = 200, description = "Provider acknowledgment, passed through with the provider status"),
        (status = 400, description = "Missing phone, cart_code or email"),
        (status = 404, description = "Invalid cart code"),
        (status = 500, description = "Credential exchange or provider failure"),
    ),
    tag = "Payments"
)]
pub async fn push_initiate(
    State(state): State<AppState>,
    Json(payload): Json<PushPaymentRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let (status, body) = push_payment_service::initiate(&state, payload).await?;
    Ok((status, Json(body)))
}

#[utoipa::path(
    post,
    path = "/api/payments/push/callback",
    responses(
        (status = 200, description = "Callback acknowledged", body = CallbackAck),
    ),
    tag = "Payments"
)]
pub async fn push_callback(State(state): State<AppState>, Json(payload): Json<Value>) -> Response {
    let ack = Json(CallbackAck::received()).into_response();
    match push_payment_service::handle_callback(&state, payload).await {
        Ok(_) => ack,
        Err(err) => callback_failure(&state, "push", err, ack).await,
    }
}

#[utoipa::path(
    get,
    path = "/api/payments/status",
    params(
        ("cart_code" = Option<String>, Query, description = "Cart code the payment was started for")
    ),
    responses(
        (status = 200, description = "Current payment status", body = PaymentStatusResponse),
        (status = 404, description = "No payment started for this cart", body = PaymentStatusResponse),
    ),
    tag = "Payments"
)]
pub async fn payment_status(
    State(state): State<AppState>,
    Query(query): Query<PaymentStatusQuery>,
) -> Response {
    let Some(cart_code) = non_blank(query.cart_code.as_deref()) else {
        return status_not_found();
    };
    match payment_intent_service::payment_status(&state, cart_code).await {
        Ok(status) => Json(status).into_response(),
        Err(AppError::NotFound(_)) => status_not_found(),
        Err(err) => err.into_response(),
    }
}

fn status_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(PaymentStatusResponse {
            status: "NotFound".to_string(),
        }),
    )
        .into_response()
}

/// Records a failed reconciliation and decides what the provider sees.
async fn callback_failure(
    state: &AppState,
    provider: &str,
    err: AppError,
    ack: Response,
) -> Response {
    if err.is_not_found() {
        tracing::warn!(provider, error = %err, "callback for an already reconciled or unknown cart");
    } else {
        tracing::error!(provider, error = %err, "callback processing failed");
    }

    audit::record(
        &state.orm,
        "callback_failed",
        Some("payments"),
        serde_json::json!({ "provider": provider, "error": err.to_string() }),
    )
    .await;

    match state.callback_policy() {
        CallbackPolicy::Surface if !err.is_not_found() => err.into_response(),
        _ => ack,
    }
}
