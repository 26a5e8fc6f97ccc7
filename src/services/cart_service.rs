use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, IntoActiveModel,
    JoinType, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::cart::AddToCartRequest,
    entity::{
        cart_items::{
            ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems,
            Relation as CartItemRel,
        },
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts, Model as CartModel},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    models::{Cart, CartLine},
    response::{ApiResponse, Meta},
    state::AppState,
};

#[derive(Debug, FromQueryResult)]
struct CartLineRow {
    product_id: Uuid,
    quantity: i32,
    name: String,
    price: i64,
}

pub async fn find_cart<C: ConnectionTrait>(conn: &C, cart_code: &str) -> AppResult<Option<CartModel>> {
    let cart = Carts::find()
        .filter(CartCol::CartCode.eq(cart_code))
        .one(conn)
        .await?;
    Ok(cart)
}

/// Cart lines joined with the current product name and price.
pub async fn load_lines<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> AppResult<Vec<CartLine>> {
    let rows = CartItems::find()
        .select_only()
        .column(CartItemCol::ProductId)
        .column(CartItemCol::Quantity)
        .column(ProdCol::Name)
        .column(ProdCol::Price)
        .join(JoinType::InnerJoin, CartItemRel::Products.def())
        .filter(CartItemCol::CartId.eq(cart_id))
        .order_by_asc(CartItemCol::CreatedAt)
        .into_model::<CartLineRow>()
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| CartLine {
            product_id: row.product_id,
            product_name: row.name,
            unit_price: row.price,
            quantity: row.quantity,
        })
        .collect())
}

/// Loads a cart with its lines, failing with NotFound when the code is unknown.
pub async fn load_cart<C: ConnectionTrait>(conn: &C, cart_code: &str) -> AppResult<Cart> {
    let cart = find_cart(conn, cart_code)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Cart {cart_code} not found")))?;
    let items = load_lines(conn, cart.id).await?;
    let total = cart_total(&items);

    Ok(Cart {
        id: cart.id,
        cart_code: cart.cart_code,
        items,
        total,
        created_at: cart.created_at.with_timezone(&Utc),
    })
}

pub fn cart_total(lines: &[CartLine]) -> i64 {
    lines.iter().map(CartLine::subtotal).sum()
}

pub async fn get_cart(state: &AppState, cart_code: &str) -> AppResult<ApiResponse<Cart>> {
    let cart = load_cart(&state.orm, cart_code).await?;
    Ok(ApiResponse::success("OK", cart, Some(Meta::empty())))
}

pub async fn add_item(state: &AppState, payload: AddToCartRequest) -> AppResult<ApiResponse<Cart>> {
    let cart_code = payload.cart_code.trim();
    if cart_code.is_empty() {
        return Err(AppError::InvalidRequest("cart_code is required".to_string()));
    }
    if payload.quantity <= 0 {
        return Err(AppError::InvalidRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let product = Products::find_by_id(payload.product_id).one(&state.orm).await?;
    if product.is_none() {
        return Err(AppError::InvalidRequest("product not found".to_string()));
    }

    let cart = match find_cart(&state.orm, cart_code).await? {
        Some(cart) => cart,
        None => {
            CartActive {
                id: Set(Uuid::new_v4()),
                cart_code: Set(cart_code.to_string()),
                created_at: Set(Utc::now().into()),
            }
            .insert(&state.orm)
            .await?
        }
    };

    let existing = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .filter(CartItemCol::ProductId.eq(payload.product_id))
        .one(&state.orm)
        .await?;

    match existing {
        Some(item) => {
            let mut active = item.into_active_model();
            active.quantity = Set(payload.quantity);
            active.update(&state.orm).await?;
        }
        None => {
            CartItemActive {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(payload.product_id),
                quantity: Set(payload.quantity),
                created_at: Set(Utc::now().into()),
            }
            .insert(&state.orm)
            .await?;
        }
    }

    audit::record(
        &state.orm,
        "cart_update",
        Some("cart_items"),
        serde_json::json!({
            "cart_code": cart_code,
            "product_id": payload.product_id,
            "quantity": payload.quantity,
        }),
    )
    .await;

    let cart = load_cart(&state.orm, cart_code).await?;
    Ok(ApiResponse::success("OK", cart, Some(Meta::empty())))
}
