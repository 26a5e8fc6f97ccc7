use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Fields are optional so that a missing one is reported as a 400 instead of a rejection.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CardCheckoutRequest {
    pub cart_code: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PushPaymentRequest {
    pub phone: Option<String>,
    pub cart_code: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PaymentStatusQuery {
    pub cart_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentStatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CallbackAck {
    pub message: String,
}

impl CallbackAck {
    pub fn received() -> Self {
        Self {
            message: "Callback received".to_string(),
        }
    }
}
