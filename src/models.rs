use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct CartLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: i64,
    pub quantity: i32,
}

impl CartLine {
    pub fn subtotal(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Cart {
    pub id: Uuid,
    pub cart_code: String,
    pub items: Vec<CartLine>,
    pub total: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Order {
    pub id: Uuid,
    pub external_ref: String,
    pub amount: i64,
    pub currency: String,
    pub customer_email: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a payment attempt for one cart code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Declined,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Declined => "Declined",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(PaymentStatus::Pending),
            "Paid" => Ok(PaymentStatus::Paid),
            "Declined" => Ok(PaymentStatus::Declined),
            other => Err(format!("unknown payment status `{other}`")),
        }
    }
}

/// Terminal result reported by a provider. Pending is never a valid target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentOutcome {
    Paid,
    Declined,
}

impl From<PaymentOutcome> for PaymentStatus {
    fn from(outcome: PaymentOutcome) -> Self {
        match outcome {
            PaymentOutcome::Paid => PaymentStatus::Paid,
            PaymentOutcome::Declined => PaymentStatus::Declined,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub cart_code: String,
    pub email: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Provider-agnostic confirmation handed to the fulfillment engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    pub cart_code: String,
    pub external_ref: String,
    /// Minor units of `currency`.
    pub amount: i64,
    pub currency: String,
    pub email: String,
    pub outcome: PaymentOutcome,
}
