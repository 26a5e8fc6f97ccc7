//! Turns a confirmed payment into an order.
//!
//! Both payment providers normalize their callbacks into a [`PaymentConfirmation`]
//! and hand it to [`reconcile`]. The cart row is the only fulfillment marker: a cart
//! that no longer exists has already been turned into an order (or was never there),
//! so a replayed confirmation fails with `NotFound`.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, SqlErr, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::OrderWithItems,
    entity::{
        cart_items::{Column as CartItemCol, Entity as CartItems},
        carts::{Column as CartCol, Entity as Carts},
        order_items::ActiveModel as OrderItemActive,
        orders::ActiveModel as OrderActive,
    },
    error::{AppError, AppResult},
    models::{PaymentConfirmation, PaymentOutcome},
    services::{
        cart_service,
        order_service::{order_from_entity, order_item_from_entity},
        payment_intent_service,
    },
};

pub const ORDER_STATUS_PAID: &str = "Paid";

#[derive(Debug)]
pub enum Reconciliation {
    Fulfilled(OrderWithItems),
    Declined { cart_code: String },
}

pub async fn reconcile(
    conn: &DatabaseConnection,
    confirmation: &PaymentConfirmation,
) -> AppResult<Reconciliation> {
    match confirmation.outcome {
        PaymentOutcome::Paid => fulfill(conn, confirmation)
            .await
            .map(Reconciliation::Fulfilled),
        PaymentOutcome::Declined => {
            decline(conn, &confirmation.cart_code).await?;
            Ok(Reconciliation::Declined {
                cart_code: confirmation.cart_code.clone(),
            })
        }
    }
}

/// Converts the cart into a paid order and retires the cart, all in one transaction.
pub async fn fulfill(
    conn: &DatabaseConnection,
    confirmation: &PaymentConfirmation,
) -> AppResult<OrderWithItems> {
    let cart_code = confirmation.cart_code.as_str();
    let txn = conn.begin().await?;

    let cart = cart_service::find_cart(&txn, cart_code)
        .await?
        .ok_or_else(|| already_consumed(cart_code))?;
    let lines = cart_service::load_lines(&txn, cart.id).await?;

    // Claim the cart first; a concurrent delivery blocks here and then sees zero rows.
    claim_cart(&txn, cart_code, cart.id).await?;

    let now = Utc::now();
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        external_ref: Set(confirmation.external_ref.clone()),
        amount: Set(confirmation.amount),
        currency: Set(confirmation.currency.clone()),
        customer_email: Set(confirmation.email.clone()),
        status: Set(ORDER_STATUS_PAID.to_string()),
        created_at: Set(now.into()),
    }
    .insert(&txn)
    .await
    .map_err(|err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::Conflict(format!(
            "Order {} already exists",
            confirmation.external_ref
        )),
        _ => AppError::OrmError(err),
    })?;

    let mut items = Vec::with_capacity(lines.len());
    for line in &lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            created_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(item));
    }

    // Card checkouts never create an intent, so a missing one is fine here.
    match payment_intent_service::mark(&txn, cart_code, PaymentOutcome::Paid).await {
        Ok(()) => {}
        Err(AppError::NotFound(_)) => {
            tracing::debug!(cart_code, "no payment intent to mark paid");
        }
        Err(err) => return Err(err),
    }

    txn.commit().await?;

    tracing::info!(
        cart_code,
        order_id = %order.id,
        external_ref = %order.external_ref,
        amount = order.amount,
        currency = %order.currency,
        items = items.len(),
        "order fulfilled"
    );

    audit::record(
        conn,
        "order_fulfilled",
        Some("orders"),
        serde_json::json!({
            "order_id": order.id,
            "cart_code": cart_code,
            "external_ref": order.external_ref,
        }),
    )
    .await;

    Ok(OrderWithItems {
        order: order_from_entity(order),
        items,
    })
}

/// Deletes the cart and its lines. Fails with NotFound when another delivery
/// already removed the cart row.
pub async fn claim_cart<C: ConnectionTrait>(
    conn: &C,
    cart_code: &str,
    cart_id: Uuid,
) -> AppResult<()> {
    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart_id))
        .exec(conn)
        .await?;
    let claimed = Carts::delete_many()
        .filter(CartCol::Id.eq(cart_id))
        .exec(conn)
        .await?;
    if claimed.rows_affected == 0 {
        return Err(already_consumed(cart_code));
    }
    Ok(())
}

/// Marks the intent Declined while the cart still exists. A decline that arrives
/// after fulfillment is dropped so the intent stays Paid, including one that saw
/// the cart just before a concurrent fulfillment committed.
pub async fn decline(conn: &DatabaseConnection, cart_code: &str) -> AppResult<()> {
    if cart_service::find_cart(conn, cart_code).await?.is_none() {
        return Err(already_consumed(cart_code));
    }

    payment_intent_service::mark(conn, cart_code, PaymentOutcome::Declined).await?;

    audit::record(
        conn,
        "payment_declined",
        Some("payment_intents"),
        serde_json::json!({ "cart_code": cart_code }),
    )
    .await;

    Ok(())
}

fn already_consumed(cart_code: &str) -> AppError {
    AppError::not_found(format!("Cart {cart_code} not found"))
}
