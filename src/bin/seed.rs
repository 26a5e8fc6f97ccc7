use chrono::Utc;
use checkout_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{
        cart_items::ActiveModel as CartItemActive,
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts},
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
    },
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

const DEMO_CART: &str = "DEMO0000001";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    let products = seed_products(&orm).await?;
    seed_demo_cart(&orm, &products).await?;

    println!("Seed completed. Demo cart code: {DEMO_CART}");
    Ok(())
}

async fn seed_products(orm: &DatabaseConnection) -> anyhow::Result<Vec<Uuid>> {
    let products = vec![
        ("Axum Hoodie", "Warm hoodie for Rustaceans", 5500),
        ("Ferris Mug", "Coffee tastes better with Ferris", 1200),
        ("Rust Sticker Pack", "Decorate your laptop", 500),
        ("E-book: Async Rust", "Learn async Rust patterns", 2500),
    ];

    let mut ids = Vec::with_capacity(products.len());
    for (name, desc, price) in products {
        let existing = Products::find()
            .filter(ProdCol::Name.eq(name))
            .one(orm)
            .await?;
        let id = match existing {
            Some(product) => product.id,
            None => {
                ProductActive {
                    id: Set(Uuid::new_v4()),
                    name: Set(name.to_string()),
                    description: Set(Some(desc.to_string())),
                    price: Set(price),
                    created_at: Set(Utc::now().into()),
                }
                .insert(orm)
                .await?
                .id
            }
        };
        ids.push(id);
    }

    println!("Seeded products");
    Ok(ids)
}

async fn seed_demo_cart(orm: &DatabaseConnection, products: &[Uuid]) -> anyhow::Result<()> {
    let exists = Carts::find()
        .filter(CartCol::CartCode.eq(DEMO_CART))
        .one(orm)
        .await?
        .is_some();
    if exists {
        println!("Demo cart already present");
        return Ok(());
    }

    let cart = CartActive {
        id: Set(Uuid::new_v4()),
        cart_code: Set(DEMO_CART.to_string()),
        created_at: Set(Utc::now().into()),
    }
    .insert(orm)
    .await?;

    for (product_id, quantity) in products.iter().take(2).zip([2, 1]) {
        CartItemActive {
            id: Set(Uuid::new_v4()),
            cart_id: Set(cart.id),
            product_id: Set(*product_id),
            quantity: Set(quantity),
            created_at: Set(Utc::now().into()),
        }
        .insert(orm)
        .await?;
    }

    println!("Seeded demo cart");
    Ok(())
}
