use serde_json::Value;

use crate::{
    audit,
    dto::payments::CardCheckoutRequest,
    error::{AppError, AppResult},
    gateways::stripe::{CheckoutLineItem, CheckoutSession, StripeEvent},
    models::{PaymentConfirmation, PaymentOutcome},
    services::{
        cart_service,
        fulfillment_service::{self, Reconciliation},
        non_blank,
    },
    state::AppState,
};

#[derive(Debug)]
pub enum WebhookOutcome {
    Reconciled(Reconciliation),
    Ignored { kind: String },
}

/// Opens a hosted checkout session for the cart. Nothing is stored locally.
pub async fn create_checkout(state: &AppState, payload: CardCheckoutRequest) -> AppResult<Value> {
    let (cart_code, email) = match (
        non_blank(payload.cart_code.as_deref()),
        non_blank(payload.email.as_deref()),
    ) {
        (Some(cart_code), Some(email)) => (cart_code, email),
        _ => {
            return Err(AppError::InvalidRequest(
                "cart_code and email are required".to_string(),
            ));
        }
    };

    let cart = cart_service::load_cart(&state.orm, cart_code).await?;
    let items = cart
        .items
        .iter()
        .map(|line| CheckoutLineItem {
            name: line.product_name.clone(),
            unit_amount: line.unit_price,
            quantity: line.quantity,
        })
        .collect();
    let items = state.stripe.line_items_with_fee(items);

    state
        .stripe
        .create_checkout_session(cart_code, email, &items)
        .await
        .map_err(|err| match err {
            // Checkout initiation reports provider failures as client errors.
            AppError::Gateway { message, .. } => AppError::InvalidRequest(message),
            other => other,
        })
}

/// Routes a verified webhook event. Only completed checkouts are acted on.
pub async fn handle_event(state: &AppState, event: StripeEvent) -> AppResult<WebhookOutcome> {
    if !event.completes_checkout() {
        tracing::debug!(event_id = %event.id, kind = %event.kind, "webhook event ignored");
        return Ok(WebhookOutcome::Ignored { kind: event.kind });
    }

    let confirmation = confirmation_from_event(state, &event)?;
    tracing::info!(
        event_id = %event.id,
        cart_code = %confirmation.cart_code,
        session_id = %confirmation.external_ref,
        "checkout completed"
    );

    audit::record(
        &state.orm,
        "card_webhook_received",
        Some("payments"),
        serde_json::json!({
            "event_id": event.id,
            "kind": event.kind,
            "cart_code": confirmation.cart_code,
        }),
    )
    .await;

    let reconciliation = fulfillment_service::reconcile(&state.orm, &confirmation).await?;
    Ok(WebhookOutcome::Reconciled(reconciliation))
}

fn confirmation_from_event(state: &AppState, event: &StripeEvent) -> AppResult<PaymentConfirmation> {
    let session: CheckoutSession = serde_json::from_value(event.data.object.clone())
        .map_err(|e| AppError::Payload(e.to_string()))?;

    let cart_code = session
        .cart_code()
        .ok_or_else(|| AppError::Payload("checkout session has no cart_code metadata".to_string()))?
        .to_string();

    Ok(PaymentConfirmation {
        cart_code,
        email: session.email().unwrap_or_default().to_string(),
        amount: session.amount_total.unwrap_or_default(),
        currency: session
            .currency
            .clone()
            .unwrap_or_else(|| state.stripe.config().currency.clone()),
        external_ref: session.id,
        outcome: PaymentOutcome::Paid,
    })
}
