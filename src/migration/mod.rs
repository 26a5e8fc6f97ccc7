use sea_orm_migration::prelude::*;

mod m20250101_000001_create_catalog_and_carts;
mod m20250101_000002_create_orders_and_intents;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_catalog_and_carts::Migration),
            Box::new(m20250101_000002_create_orders_and_intents::Migration),
        ]
    }
}
