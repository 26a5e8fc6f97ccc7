//! Card payment provider client.
//!
//! Creates hosted checkout sessions and verifies signed webhook deliveries.
//! The signature header has the form `t=<unix>,v1=<hex>` where the hex value is
//! `HMAC-SHA256(webhook_secret, "<t>.<raw body>")`.

use std::collections::HashMap;

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use crate::{
    config::StripeConfig,
    error::{AppError, AppResult},
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const EVENT_CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const EVENT_ASYNC_PAYMENT_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

/// One priced line on a hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLineItem {
    pub name: String,
    /// Minor units.
    pub unit_amount: i64,
    pub quantity: i32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("{0}")]
    Signature(String),
    #[error("{0}")]
    Payload(String),
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Signature(msg) => AppError::Signature(msg),
            WebhookError::Payload(msg) => AppError::Payload(msg),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: Value,
}

impl StripeEvent {
    pub fn completes_checkout(&self) -> bool {
        self.kind == EVENT_CHECKOUT_COMPLETED || self.kind == EVENT_ASYNC_PAYMENT_SUCCEEDED
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub customer_email: Option<String>,
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
}

impl CheckoutSession {
    pub fn cart_code(&self) -> Option<&str> {
        self.metadata
            .get("cart_code")
            .map(String::as_str)
            .filter(|code| !code.is_empty())
    }

    pub fn email(&self) -> Option<&str> {
        self.customer_email.as_deref().or_else(|| {
            self.customer_details
                .as_ref()
                .and_then(|details| details.email.as_deref())
        })
    }
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
    }

    /// Cart lines plus the flat service fee line.
    pub fn line_items_with_fee(&self, mut items: Vec<CheckoutLineItem>) -> Vec<CheckoutLineItem> {
        items.push(CheckoutLineItem {
            name: self.config.service_fee_label.clone(),
            unit_amount: self.config.service_fee,
            quantity: 1,
        });
        items
    }

    pub fn session_form(
        &self,
        cart_code: &str,
        email: &str,
        items: &[CheckoutLineItem],
    ) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("customer_email".to_string(), email.to_string()),
            ("success_url".to_string(), self.config.success_url.clone()),
            ("cancel_url".to_string(), self.config.cancel_url.clone()),
            ("metadata[cart_code]".to_string(), cart_code.to_string()),
        ];
        for (i, item) in items.iter().enumerate() {
            let prefix = format!("line_items[{i}]");
            form.push((
                format!("{prefix}[price_data][currency]"),
                self.config.currency.clone(),
            ));
            form.push((
                format!("{prefix}[price_data][product_data][name]"),
                item.name.clone(),
            ));
            form.push((
                format!("{prefix}[price_data][unit_amount]"),
                item.unit_amount.to_string(),
            ));
            form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        }
        form
    }

    /// Requests a hosted checkout session and returns the provider's JSON untouched.
    pub async fn create_checkout_session(
        &self,
        cart_code: &str,
        email: &str,
        items: &[CheckoutLineItem],
    ) -> AppResult<Value> {
        if !self.is_configured() {
            return Err(AppError::Gateway {
                message: "Card payments are not configured".to_string(),
                details: None,
            });
        }

        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(&self.session_form(cart_code, email, items))
            .send()
            .await
            .map_err(|e| AppError::gateway("Card provider unreachable", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::gateway("Card provider response unreadable", e))?;

        tracing::debug!(status = %status, "checkout session response");

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| body.clone());
            tracing::error!(status = %status, error = %message, cart_code, "checkout session rejected");
            return Err(AppError::Gateway {
                message,
                details: Some(body),
            });
        }

        let session: Value = serde_json::from_str(&body)
            .map_err(|e| AppError::gateway("Card provider returned invalid JSON", e))?;
        tracing::info!(
            cart_code,
            session_id = session["id"].as_str().unwrap_or("-"),
            "checkout session created"
        );
        Ok(session)
    }

    pub fn verify_and_decode(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<StripeEvent, WebhookError> {
        self.verify_and_decode_at(payload, signature_header, Utc::now().timestamp())
    }

    pub fn verify_and_decode_at(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
        now: i64,
    ) -> Result<StripeEvent, WebhookError> {
        let header = signature_header
            .ok_or_else(|| WebhookError::Signature("missing signature header".to_string()))?;
        let (timestamp, signatures) = parse_signature_header(header)?;

        let mac = signature_mac(self.config.webhook_secret.expose_secret(), timestamp, payload)?;

        let matched = signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
                .unwrap_or(false)
        });
        if !matched {
            return Err(WebhookError::Signature(
                "no signature matches the payload".to_string(),
            ));
        }

        if timestamp < now - self.config.webhook_tolerance_secs {
            return Err(WebhookError::Signature(
                "timestamp outside the tolerance zone".to_string(),
            ));
        }

        serde_json::from_slice(payload).map_err(|e| WebhookError::Payload(e.to_string()))
    }
}

fn parse_signature_header(header: &str) -> Result<(i64, Vec<&str>), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = value.parse::<i64>().ok();
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| WebhookError::Signature("unable to extract timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(WebhookError::Signature(
            "no v1 signature in header".to_string(),
        ));
    }
    Ok((timestamp, signatures))
}

fn signature_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::Signature("invalid webhook secret".to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Builds a signature header value the way the provider does.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, WebhookError> {
    let mac = signature_mac(secret, timestamp, payload)?;
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}
