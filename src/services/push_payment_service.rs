use axum::http::StatusCode;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    audit,
    dto::payments::PushPaymentRequest,
    error::{AppError, AppResult},
    gateways::mpesa::{self, MpesaClient, PUSH_CURRENCY},
    models::{PaymentConfirmation, PaymentOutcome},
    services::{
        cart_service,
        fulfillment_service::{self, Reconciliation},
        non_blank, payment_intent_service,
    },
    state::AppState,
};

/// Starts an STK push for the cart and returns the provider's acknowledgment verbatim.
pub async fn initiate(
    state: &AppState,
    payload: PushPaymentRequest,
) -> AppResult<(StatusCode, Value)> {
    let (phone, cart_code, email) = match (
        non_blank(payload.phone.as_deref()),
        non_blank(payload.cart_code.as_deref()),
        non_blank(payload.email.as_deref()),
    ) {
        (Some(phone), Some(cart_code), Some(email)) => (phone, cart_code, email),
        _ => {
            return Err(AppError::InvalidRequest(
                "Phone, email and cart_code are required".to_string(),
            ));
        }
    };

    let cart = cart_service::load_cart(&state.orm, cart_code)
        .await
        .map_err(|err| match err {
            AppError::NotFound(_) => AppError::not_found("Invalid cart code"),
            other => other,
        })?;

    payment_intent_service::upsert(&state.orm, cart_code, email).await?;

    let amount = MpesaClient::whole_shillings(state.mpesa.convert_to_kes(cart.total));

    let access_token = state.mpesa.access_token().await.inspect_err(|err| {
        tracing::error!(error = %err, cart_code, "failed generating M-Pesa credentials");
    })?;
    let timestamp = MpesaClient::timestamp_now();
    let request = state
        .mpesa
        .stk_push_request(phone, cart_code, amount, &timestamp);

    let (status, body) = state.mpesa.stk_push(&access_token, &request).await?;

    audit::record(
        &state.orm,
        "push_initiated",
        Some("payment_intents"),
        serde_json::json!({
            "cart_code": cart_code,
            "amount": amount,
            "currency": PUSH_CURRENCY,
            "provider_status": status.as_u16(),
        }),
    )
    .await;

    Ok((status, body))
}

/// Reconciles an asynchronous push result against the intent and the cart.
pub async fn handle_callback(state: &AppState, payload: Value) -> AppResult<Reconciliation> {
    let callback = mpesa::parse_callback(payload)?;
    let cart_code = callback.account_reference.as_str();

    tracing::info!(
        cart_code,
        result_code = callback.result_code,
        result_desc = callback.result_desc.as_deref().unwrap_or("-"),
        checkout_request_id = callback.checkout_request_id.as_deref().unwrap_or("-"),
        "push callback received"
    );

    let confirmation = if callback.succeeded() {
        // A missing cart means the payment was already reconciled.
        let cart = cart_service::load_cart(&state.orm, cart_code).await?;
        let intent = payment_intent_service::find(&state.orm, cart_code)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "Paid callback for cart {cart_code} has no payment intent"
                ))
            })?;

        audit::record(
            &state.orm,
            "push_confirmed",
            Some("payment_intents"),
            serde_json::json!({
                "cart_code": cart_code,
                "receipt": callback.receipt_number(),
                "checkout_request_id": callback.checkout_request_id,
            }),
        )
        .await;

        PaymentConfirmation {
            cart_code: cart_code.to_string(),
            external_ref: format!("push_{}", Uuid::new_v4().simple()),
            amount: state.mpesa.charged_kes_minor(cart.total),
            currency: PUSH_CURRENCY.to_string(),
            email: intent.email,
            outcome: PaymentOutcome::Paid,
        }
    } else {
        PaymentConfirmation {
            cart_code: cart_code.to_string(),
            external_ref: callback.checkout_request_id.clone().unwrap_or_default(),
            amount: 0,
            currency: PUSH_CURRENCY.to_string(),
            email: String::new(),
            outcome: PaymentOutcome::Declined,
        }
    };

    fulfillment_service::reconcile(&state.orm, &confirmation).await
}
