use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub cart_code: String,
    pub product_id: Uuid,
    pub quantity: i32,
}
