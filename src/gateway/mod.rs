use crate::errors::ServiceError;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Order object created on the external payment gateway. Its id is handed to
/// the client for the hosted payment flow and stored on the payment record
/// for callback correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub receipt: String,
}

/// Payment state as reported by the gateway's server-side fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayPaymentState {
    Created,
    Authorized,
    Captured,
    Refunded,
    Failed,
}

/// Client for the external payment gateway.
///
/// Calls are synchronous network requests with a bounded timeout; a timeout
/// maps to `ExternalServiceError` and is handled by the payment state machine
/// as a `Failed` transition, never a hang.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a gateway order for the given amount in integer minor units.
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, ServiceError>;

    /// Fetches the current state of a payment on the gateway.
    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPaymentState, ServiceError>;
}

/// Converts a decimal currency amount to integer minor units (×100).
/// Conversion happens only at this boundary; all internal math is decimal.
pub fn to_minor_units(amount: Decimal) -> i64 {
    (amount * Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

/// Verifies the gateway callback signature: HMAC-SHA256 over
/// `"{order_id}|{payment_id}"` keyed with the shared secret, hex-encoded.
pub fn verify_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// HTTP implementation over the gateway's REST API with basic auth.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Debug, Deserialize)]
struct GatewayOrderResponse {
    id: String,
    amount: i64,
    currency: String,
    receipt: String,
}

#[derive(Debug, Deserialize)]
struct GatewayPaymentResponse {
    status: GatewayPaymentState,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: String,
        key_id: String,
        key_secret: String,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            key_id,
            key_secret,
        })
    }

    fn map_err(context: &str, err: reqwest::Error) -> ServiceError {
        warn!(error = %err, "{} failed", context);
        if err.is_timeout() {
            ServiceError::ExternalServiceError(format!("{}: gateway timed out", context))
        } else {
            ServiceError::ExternalServiceError(format!("{}: {}", context, err))
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, ServiceError> {
        let body = CreateOrderRequest {
            amount: amount_minor,
            currency,
            receipt,
        };

        let resp = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::map_err("gateway order creation", e))?
            .error_for_status()
            .map_err(|e| Self::map_err("gateway order creation", e))?;

        let order: GatewayOrderResponse = resp
            .json()
            .await
            .map_err(|e| Self::map_err("gateway order decoding", e))?;

        Ok(GatewayOrder {
            id: order.id,
            amount_minor: order.amount,
            currency: order.currency,
            receipt: order.receipt,
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPaymentState, ServiceError> {
        let resp = self
            .client
            .get(format!("{}/payments/{}", self.base_url, payment_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| Self::map_err("gateway payment fetch", e))?
            .error_for_status()
            .map_err(|e| Self::map_err("gateway payment fetch", e))?;

        let payment: GatewayPaymentResponse = resp
            .json()
            .await
            .map_err(|e| Self::map_err("gateway payment decoding", e))?;

        Ok(payment.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sign(secret: &str, order_id: &str, payment_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn signature_roundtrip() {
        let sig = sign("secret", "order_1", "pay_1");
        assert!(verify_signature("secret", "order_1", "pay_1", &sig));
    }

    #[test]
    fn tampered_signature_rejected() {
        let sig = sign("secret", "order_1", "pay_1");
        assert!(!verify_signature("secret", "order_1", "pay_2", &sig));
        assert!(!verify_signature("other_secret", "order_1", "pay_1", &sig));
        assert!(!verify_signature("secret", "order_1", "pay_1", "deadbeef"));
    }

    #[test]
    fn minor_unit_conversion_rounds_to_cents() {
        assert_eq!(to_minor_units(dec!(1026.00)), 102600);
        assert_eq!(to_minor_units(dec!(0.01)), 1);
        assert_eq!(to_minor_units(dec!(12.345)), 1235);
        assert_eq!(to_minor_units(Decimal::ZERO), 0);
    }

    #[test]
    fn gateway_state_parses_lowercase() {
        let state: GatewayPaymentState = serde_json::from_str("\"captured\"").unwrap();
        assert_eq!(state, GatewayPaymentState::Captured);
    }
}
