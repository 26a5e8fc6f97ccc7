pub mod mpesa;
pub mod stripe;
