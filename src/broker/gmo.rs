// =============================================================================
// GmoClient — HMAC-signed private REST client for speedOrder/closeOrder
// =============================================================================

use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::instrument;

use crate::broker::OrderSide;
use crate::errors::BrokerError;

type HmacSha256 = Hmac<Sha256>;

const PRIVATE_BASE_URL: &str = "https://api.coin.z.com";
const SPEED_ORDER_PATH: &str = "/private/v1/speedOrder";
const CLOSE_ORDER_PATH: &str = "/private/v1/closeOrder";

/// Statuses the venue considers a success; anything else is a business-level
/// rejection (logged, not retried — distinct from an HTTP-level failure).
fn is_success_status(status: &Value) -> bool {
    match status {
        Value::Null => true,
        Value::Number(n) => n.as_i64() == Some(0),
        Value::String(s) => matches!(s.as_str(), "0" | "success" | "SUCCESS"),
        _ => false,
    }
}

pub struct GmoClient {
    api_key: String,
    api_secret: String,
    base_url: String,
    http: reqwest::Client,
}

impl GmoClient {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            base_url: PRIVATE_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    #[cfg(test)]
    fn with_base_url(api_key: impl Into<String>, api_secret: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    fn sign(&self, timestamp: &str, method: &str, path: &str, body: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(timestamp.as_bytes());
        mac.update(method.as_bytes());
        mac.update(path.as_bytes());
        mac.update(body.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn post_signed(&self, path: &str, body: Value) -> Result<Value, BrokerError> {
        let timestamp = (chrono::Utc::now().timestamp_millis()).to_string();
        let body_str = body.to_string();
        let signature = self.sign(&timestamp, "POST", path, &body_str);

        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("API-KEY", &self.api_key)
            .header("API-TIMESTAMP", &timestamp)
            .header("API-SIGN", signature)
            .header("Content-Type", "application/json")
            .body(body_str)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(BrokerError::Transient(status.as_u16()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BrokerError::Permanent(status.as_u16(), text));
        }

        let envelope: Value = response.json().await?;
        let business_status = envelope.get("status").cloned().unwrap_or(Value::Null);
        if !is_success_status(&business_status) {
            let messages = envelope.get("messages").cloned().unwrap_or(Value::Null);
            return Err(BrokerError::Permanent(status.as_u16(), messages.to_string()));
        }

        Ok(envelope)
    }

    #[instrument(skip(self), name = "broker::speed_order")]
    pub async fn speed_order(&self, symbol: &str, side: OrderSide, size: f64) -> Result<Value, BrokerError> {
        let client_order_id = uuid::Uuid::new_v4().to_string();
        let body = json!({
            "symbol": symbol,
            "side": side.as_str(),
            "size": format!("{}", size as i64),
            "clientOrderId": client_order_id,
            "isHedgeable": false,
        });
        self.post_signed(SPEED_ORDER_PATH, body).await
    }

    #[instrument(skip(self), name = "broker::close_order")]
    pub async fn close_order(&self, symbol: &str, side: OrderSide, size: f64) -> Result<Value, BrokerError> {
        let body = json!({
            "symbol": symbol,
            "side": side.as_str(),
            "executionType": "MARKET",
            "timeInForce": "FAK",
            "size": format!("{}", size as i64),
        });
        self.post_signed(CLOSE_ORDER_PATH, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_status_recognises_all_accepted_forms() {
        assert!(is_success_status(&Value::Null));
        assert!(is_success_status(&json!(0)));
        assert!(is_success_status(&json!("0")));
        assert!(is_success_status(&json!("success")));
        assert!(is_success_status(&json!("SUCCESS")));
        assert!(!is_success_status(&json!(1)));
        assert!(!is_success_status(&json!("ERROR")));
    }

    #[test]
    fn sign_is_deterministic_for_same_inputs() {
        let client = GmoClient::with_base_url("key", "secret", "https://example.test");
        let a = client.sign("1700000000000", "POST", "/private/v1/speedOrder", "{}");
        let b = client.sign("1700000000000", "POST", "/private/v1/speedOrder", "{}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn sign_changes_with_body() {
        let client = GmoClient::with_base_url("key", "secret", "https://example.test");
        let a = client.sign("1700000000000", "POST", "/private/v1/speedOrder", "{}");
        let b = client.sign("1700000000000", "POST", "/private/v1/speedOrder", "{\"symbol\":\"USD_JPY\"}");
        assert_ne!(a, b);
    }
}
