use utoipa::{OpenApi, openapi::OpenApi as OpenApiSpec};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::AddToCartRequest,
        orders::{OrderList, OrderWithItems},
        payments::{
            CallbackAck, CardCheckoutRequest, PaymentStatusResponse, PushPaymentRequest,
        },
    },
    models::{Cart, CartLine, Order, OrderItem, PaymentStatus},
    response::{ApiResponse, Meta},
    routes::{cart, health::{self, HealthData}, orders, payments},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        cart::add_to_cart,
        cart::get_cart,
        orders::list_orders,
        orders::get_order,
        payments::card_checkout,
        payments::card_webhook,
        payments::push_initiate,
        payments::push_callback,
        payments::payment_status
    ),
    components(
        schemas(
            Cart,
            CartLine,
            Order,
            OrderItem,
            PaymentStatus,
            AddToCartRequest,
            CardCheckoutRequest,
            PushPaymentRequest,
            PaymentStatusResponse,
            CallbackAck,
            OrderList,
            OrderWithItems,
            Meta,
            HealthData,
            ApiResponse<HealthData>,
            ApiResponse<Cart>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Payments", description = "Checkout, provider callbacks and payment status"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
