use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use crate::{
    dto::cart::AddToCartRequest,
    error::AppResult,
    models::Cart,
    response::ApiResponse,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(add_to_cart))
        .route("/{cart_code}", get(get_cart))
}

#[utoipa::path(
    post,
    path = "/api/cart",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Add or update a cart line, creating the cart on first use", body = ApiResponse<Cart>),
        (status = 400, description = "Bad request"),
    ),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let resp = cart_service::add_item(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/cart/{cart_code}",
    params(
        ("cart_code" = String, Path, description = "Cart code")
    ),
    responses(
        (status = 200, description = "Cart with its lines and total", body = ApiResponse<Cart>),
        (status = 404, description = "Cart not found"),
    ),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    Path(cart_code): Path<String>,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let resp = cart_service::get_cart(&state, &cart_code).await?;
    Ok(Json(resp))
}
