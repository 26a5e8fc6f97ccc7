use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    prelude::DateTimeWithTimeZone,
    sea_query::{Expr, OnConflict},
};
use uuid::Uuid;

use crate::{
    dto::payments::PaymentStatusResponse,
    entity::payment_intents::{
        ActiveModel as IntentActive, Column as IntentCol, Entity as PaymentIntents,
        Model as IntentModel,
    },
    error::{AppError, AppResult},
    models::{PaymentIntent, PaymentOutcome, PaymentStatus},
    state::AppState,
};

/// Creates a Pending intent, or refreshes only the email of an existing one.
pub async fn upsert<C: ConnectionTrait>(
    conn: &C,
    cart_code: &str,
    email: &str,
) -> AppResult<PaymentIntent> {
    let now = Utc::now();
    let active = IntentActive {
        id: Set(Uuid::new_v4()),
        cart_code: Set(cart_code.to_string()),
        email: Set(email.to_string()),
        status: Set(PaymentStatus::Pending.as_str().to_string()),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };

    PaymentIntents::insert(active)
        .on_conflict(
            OnConflict::column(IntentCol::CartCode)
                .update_columns([IntentCol::Email, IntentCol::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    find(conn, cart_code)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("payment intent vanished after upsert")))
}

pub async fn find<C: ConnectionTrait>(conn: &C, cart_code: &str) -> AppResult<Option<PaymentIntent>> {
    PaymentIntents::find()
        .filter(IntentCol::CartCode.eq(cart_code))
        .one(conn)
        .await?
        .map(intent_from_entity)
        .transpose()
}

/// Moves an intent to a terminal status.
///
/// Paid is final: a Declined update only matches intents that are not yet Paid,
/// and an intent that is already Paid reads as NotFound.
pub async fn mark<C: ConnectionTrait>(
    conn: &C,
    cart_code: &str,
    outcome: PaymentOutcome,
) -> AppResult<()> {
    let status = PaymentStatus::from(outcome);
    let now: DateTimeWithTimeZone = Utc::now().into();
    let mut update = PaymentIntents::update_many()
        .col_expr(IntentCol::Status, Expr::value(status.as_str()))
        .col_expr(IntentCol::UpdatedAt, Expr::value(now))
        .filter(IntentCol::CartCode.eq(cart_code));
    if outcome == PaymentOutcome::Declined {
        update = update.filter(IntentCol::Status.ne(PaymentStatus::Paid.as_str()));
    }
    let result = update.exec(conn).await?;

    if result.rows_affected == 0 {
        return Err(AppError::not_found(format!(
            "No payment intent to update for cart {cart_code}"
        )));
    }

    tracing::info!(cart_code, status = %status, "payment intent updated");
    Ok(())
}

pub async fn get_status<C: ConnectionTrait>(conn: &C, cart_code: &str) -> AppResult<PaymentStatus> {
    find(conn, cart_code)
        .await?
        .map(|intent| intent.status)
        .ok_or_else(|| AppError::not_found(format!("Payment intent for cart {cart_code} not found")))
}

pub async fn payment_status(state: &AppState, cart_code: &str) -> AppResult<PaymentStatusResponse> {
    let status = get_status(&state.orm, cart_code).await?;
    Ok(PaymentStatusResponse {
        status: status.as_str().to_string(),
    })
}

fn intent_from_entity(model: IntentModel) -> AppResult<PaymentIntent> {
    let status = model
        .status
        .parse::<PaymentStatus>()
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    Ok(PaymentIntent {
        id: model.id,
        cart_code: model.cart_code,
        email: model.email,
        status,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}
