use std::env;

use secrecy::{ExposeSecret, Secret};

/// What a provider callback endpoint tells the provider when reconciliation fails internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackPolicy {
    /// Log the failure and answer 200 so the provider stops retrying.
    Acknowledge,
    /// Answer 500 so the provider retries. Already-reconciled events are still acknowledged.
    Surface,
}

impl CallbackPolicy {
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "acknowledge" | "ack" => Ok(Self::Acknowledge),
            "surface" => Ok(Self::Surface),
            other => Err(anyhow::anyhow!("unknown CALLBACK_ERROR_POLICY `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
    pub success_url: String,
    pub cancel_url: String,
    pub currency: String,
    /// Flat fee appended to every checkout session, in minor units.
    pub service_fee: i64,
    pub service_fee_label: String,
    pub webhook_tolerance_secs: i64,
}

impl StripeConfig {
    pub fn webhook_secret_is_empty(&self) -> bool {
        self.webhook_secret.expose_secret().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: Secret<String>,
    pub shortcode: String,
    pub passkey: Secret<String>,
    pub callback_url: String,
    pub api_base_url: String,
    /// Fixed USD to KES rate applied to cart totals.
    pub usd_to_kes_rate: i64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub stripe: StripeConfig,
    pub mpesa: MpesaConfig,
    pub callback_policy: CallbackPolicy,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);

        let stripe = StripeConfig {
            secret_key: Secret::new(env::var("STRIPE_SECRET_KEY").unwrap_or_default()),
            webhook_secret: Secret::new(env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default()),
            api_base_url: var_or("STRIPE_API_BASE", "https://api.stripe.com"),
            success_url: var_or("STRIPE_SUCCESS_URL", "http://localhost:3000/success"),
            cancel_url: var_or("STRIPE_CANCEL_URL", "http://localhost:3000/failed"),
            currency: var_or("STRIPE_CURRENCY", "usd"),
            service_fee: parse_or("STRIPE_SERVICE_FEE", 500)?,
            service_fee_label: var_or("STRIPE_SERVICE_FEE_LABEL", "VAT Fee"),
            webhook_tolerance_secs: parse_or("STRIPE_WEBHOOK_TOLERANCE_SECS", 300)?,
        };

        let mpesa = MpesaConfig {
            consumer_key: env::var("MPESA_CONSUMER_KEY").unwrap_or_default(),
            consumer_secret: Secret::new(env::var("MPESA_CONSUMER_SECRET").unwrap_or_default()),
            shortcode: var_or("MPESA_SHORTCODE", "174379"),
            passkey: Secret::new(env::var("MPESA_PASSKEY").unwrap_or_default()),
            callback_url: var_or(
                "MPESA_CALLBACK_URL",
                "http://localhost:3000/api/payments/push/callback",
            ),
            api_base_url: var_or("MPESA_API_BASE", "https://sandbox.safaricom.co.ke"),
            usd_to_kes_rate: parse_or("MPESA_USD_TO_KES", 140)?,
        };

        let callback_policy = match env::var("CALLBACK_ERROR_POLICY") {
            Ok(value) => CallbackPolicy::parse(&value)?,
            Err(_) => CallbackPolicy::Acknowledge,
        };

        Ok(Self {
            port,
            database_url,
            host,
            stripe,
            mpesa,
            callback_policy,
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or(key: &str, default: i64) -> anyhow::Result<i64> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<i64>()
            .map_err(|e| anyhow::anyhow!("{key} must be an integer: {e}")),
        Err(_) => Ok(default),
    }
}
