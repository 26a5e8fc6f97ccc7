//! Mobile-money push payment client (STK push).

use axum::http::StatusCode;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{Duration, Utc};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::MpesaConfig,
    error::{AppError, AppResult},
};

/// Provider code for a completed payment.
pub const RESULT_CODE_SUCCESS: i64 = 0;
pub const PUSH_CURRENCY: &str = "KES";

/// The provider validates timestamps against East Africa Time.
const PROVIDER_UTC_OFFSET_HOURS: i64 = 3;

#[derive(Clone)]
pub struct MpesaClient {
    client: Client,
    config: MpesaConfig,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequest {
    pub business_short_code: String,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: String,
    pub amount: i64,
    pub party_a: String,
    pub party_b: String,
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

#[derive(Debug, Deserialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: StkCallbackBody,
}

#[derive(Debug, Deserialize)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkCallback {
    pub result_code: i64,
    pub result_desc: Option<String>,
    pub account_reference: String,
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: Option<String>,
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: Option<Value>,
}

impl StkCallback {
    pub fn succeeded(&self) -> bool {
        self.result_code == RESULT_CODE_SUCCESS
    }

    pub fn receipt_number(&self) -> Option<String> {
        self.callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == "MpesaReceiptNumber")
            .and_then(|item| item.value.as_ref())
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }
}

impl MpesaClient {
    pub fn new(config: MpesaConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &MpesaConfig {
        &self.config
    }

    /// Converts a USD minor-unit total into KES minor units at the fixed rate.
    pub fn convert_to_kes(&self, usd_minor: i64) -> i64 {
        usd_minor * self.config.usd_to_kes_rate
    }

    /// The provider only accepts whole shillings, and at least one.
    pub fn whole_shillings(kes_minor: i64) -> i64 {
        (kes_minor / 100).max(1)
    }

    /// What the customer is actually charged, back in KES minor units.
    pub fn charged_kes_minor(&self, usd_minor: i64) -> i64 {
        Self::whole_shillings(self.convert_to_kes(usd_minor)) * 100
    }

    pub fn timestamp_now() -> String {
        (Utc::now() + Duration::hours(PROVIDER_UTC_OFFSET_HOURS))
            .format("%Y%m%d%H%M%S")
            .to_string()
    }

    /// `base64(shortcode + passkey + timestamp)`.
    pub fn password(&self, timestamp: &str) -> String {
        let raw = format!(
            "{}{}{}",
            self.config.shortcode,
            self.config.passkey.expose_secret(),
            timestamp
        );
        STANDARD.encode(raw)
    }

    /// Exchanges the consumer key and secret for a bearer token. Never cached.
    pub async fn access_token(&self) -> AppResult<String> {
        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.api_base_url
        );
        let response = self
            .client
            .get(&url)
            .basic_auth(
                &self.config.consumer_key,
                Some(self.config.consumer_secret.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| AppError::gateway("M-Pesa credentials error", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::gateway("M-Pesa credentials error", e))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "access token request failed");
            return Err(AppError::gateway("M-Pesa credentials error", body));
        }

        serde_json::from_str::<TokenResponse>(&body)
            .map(|token| token.access_token)
            .map_err(|_| AppError::gateway("M-Pesa credentials error", body))
    }

    pub fn stk_push_request(
        &self,
        phone: &str,
        cart_code: &str,
        amount: i64,
        timestamp: &str,
    ) -> StkPushRequest {
        StkPushRequest {
            business_short_code: self.config.shortcode.clone(),
            password: self.password(timestamp),
            timestamp: timestamp.to_string(),
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount,
            party_a: phone.to_string(),
            party_b: self.config.shortcode.clone(),
            phone_number: phone.to_string(),
            callback_url: self.config.callback_url.clone(),
            account_reference: cart_code.to_string(),
            transaction_desc: "Payment for cart".to_string(),
        }
    }

    /// Submits the push request and passes the provider's answer through.
    pub async fn stk_push(
        &self,
        access_token: &str,
        request: &StkPushRequest,
    ) -> AppResult<(StatusCode, Value)> {
        let url = format!("{}/mpesa/stkpush/v1/processrequest", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::gateway("M-Pesa request failed", e))?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let body = response
            .text()
            .await
            .map_err(|e| AppError::gateway("M-Pesa request failed", e))?;

        tracing::info!(
            status = %status,
            account_reference = %request.account_reference,
            amount = request.amount,
            "stk push submitted"
        );

        match serde_json::from_str::<Value>(&body) {
            Ok(json) => Ok((status, json)),
            Err(_) => Err(AppError::gateway(
                "Failed to decode M-Pesa response",
                body,
            )),
        }
    }
}

pub fn parse_callback(payload: Value) -> AppResult<StkCallback> {
    serde_json::from_value::<StkCallbackEnvelope>(payload)
        .map(|envelope| envelope.body.stk_callback)
        .map_err(|e| AppError::Payload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn client() -> MpesaClient {
        MpesaClient::new(MpesaConfig {
            consumer_key: "key".to_string(),
            consumer_secret: Secret::new("secret".to_string()),
            shortcode: "174379".to_string(),
            passkey: Secret::new("passkey".to_string()),
            callback_url: "https://example.com/callback".to_string(),
            api_base_url: "http://localhost".to_string(),
            usd_to_kes_rate: 140,
        })
    }

    #[test]
    fn password_is_base64_of_shortcode_passkey_timestamp() {
        let password = client().password("20250101120000");
        let decoded = STANDARD.decode(password).unwrap();
        assert_eq!(decoded, b"174379passkey20250101120000");
    }

    #[test]
    fn timestamp_has_fourteen_digits() {
        let ts = MpesaClient::timestamp_now();
        assert_eq!(ts.len(), 14);
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn amounts_convert_at_fixed_rate() {
        let client = client();
        // 25.00 USD -> 3500.00 KES
        assert_eq!(client.convert_to_kes(2500), 350_000);
        assert_eq!(MpesaClient::whole_shillings(350_000), 3500);
        assert_eq!(MpesaClient::whole_shillings(50), 1);
    }

    #[test]
    fn charged_amount_matches_truncated_shillings() {
        let client = client();
        assert_eq!(client.charged_kes_minor(2500), 350_000);
        // 0.01 USD -> 1.40 KES, charged as 1 KES.
        assert_eq!(client.charged_kes_minor(1), 100);
        // 0.99 USD -> 138.60 KES, charged as 138 KES.
        assert_eq!(client.charged_kes_minor(99), 13_800);
    }

    #[test]
    fn push_request_uses_provider_field_names() {
        let request = client().stk_push_request("254700000000", "XYZ", 3500, "20250101120000");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["BusinessShortCode"], "174379");
        assert_eq!(json["AccountReference"], "XYZ");
        assert_eq!(json["CallBackURL"], "https://example.com/callback");
        assert_eq!(json["PartyA"], "254700000000");
        assert_eq!(json["Amount"], 3500);
    }

    #[test]
    fn callback_parses_nested_result() {
        let payload = serde_json::json!({
            "Body": { "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "AccountReference": "XYZ",
                "CallbackMetadata": { "Item": [
                    { "Name": "Amount", "Value": 1.00 },
                    { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" }
                ]}
            }}
        });
        let callback = parse_callback(payload).unwrap();
        assert!(callback.succeeded());
        assert_eq!(callback.account_reference, "XYZ");
        assert_eq!(callback.receipt_number().as_deref(), Some("NLJ7RT61SV"));
    }

    #[test]
    fn callback_without_account_reference_is_a_payload_error() {
        let payload = serde_json::json!({ "Body": { "stkCallback": { "ResultCode": 1032 } } });
        assert!(matches!(parse_callback(payload), Err(AppError::Payload(_))));
    }
}
