pub mod audit_logs;
pub mod cart_items;
pub mod carts;
pub mod order_items;
pub mod orders;
pub mod payment_intents;
pub mod products;

pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use carts::Entity as Carts;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use payment_intents::Entity as PaymentIntents;
pub use products::Entity as Products;
