use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    config::{AppConfig, CallbackPolicy},
    gateways::{mpesa::MpesaClient, stripe::StripeClient},
};

#[derive(Clone)]
pub struct AppState {
    pub orm: DatabaseConnection,
    pub stripe: StripeClient,
    pub mpesa: MpesaClient,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(orm: DatabaseConnection, config: AppConfig) -> Self {
        Self {
            orm,
            stripe: StripeClient::new(config.stripe.clone()),
            mpesa: MpesaClient::new(config.mpesa.clone()),
            config: Arc::new(config),
        }
    }

    pub fn callback_policy(&self) -> CallbackPolicy {
        self.config.callback_policy
    }
}
