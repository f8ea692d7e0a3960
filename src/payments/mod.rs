//! Payment gateway client: order creation over HTTP behind a circuit
//! breaker, and webhook/callback signature verification.

use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{Config, Error as FailsafeError, StateMachine, backoff, failure_policy};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Gateway rejected order: {0}")]
    OrderRejected(String),
    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::PaymentGateway(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateOrderRequest {
    amount: i64,
    currency: String,
    receipt: String,
}

/// Order as returned by the gateway. `amount` is in currency subunits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl GatewayClient {
    pub fn new(base_url: String, key_id: String, key_secret: String) -> Self {
        Self::with_circuit_breaker(base_url, key_id, key_secret, 3, 60)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        key_id: String,
        key_secret: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        GatewayClient {
            client,
            base_url,
            key_id,
            key_secret,
            circuit_breaker,
        }
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    /// Create a payment order. `amount_subunits` is the deposit amount in
    /// the currency's smallest unit.
    pub async fn create_order(
        &self,
        amount_subunits: i64,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let url = format!("{}/v1/orders", self.base_url.trim_end_matches('/'));
        let client = self.client.clone();
        let key_id = self.key_id.clone();
        let key_secret = self.key_secret.clone();
        let body = CreateOrderRequest {
            amount: amount_subunits,
            currency: "INR".to_string(),
            receipt: receipt.to_string(),
        };

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .post(&url)
                    .basic_auth(&key_id, Some(&key_secret))
                    .json(&body)
                    .send()
                    .await?;

                if !response.status().is_success() {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    return Err(GatewayError::OrderRejected(format!("{}: {}", status, text)));
                }

                let order = response.json::<GatewayOrder>().await.map_err(|e| {
                    GatewayError::InvalidResponse(e.to_string())
                })?;
                Ok(order)
            })
            .await;

        match result {
            Ok(order) => Ok(order),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "payment gateway circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    /// Verify a payment callback signature: HMAC-SHA256 over
    /// `"{order_id}|{payment_id}"` with the API secret, hex-encoded.
    pub fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_signature(&self.key_secret, order_id, payment_id, signature)
    }
}

pub fn verify_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, order_id: &str, payment_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_gateway_client_creation() {
        let client = GatewayClient::new(
            "https://api.gateway.test".to_string(),
            "key".to_string(),
            "secret".to_string(),
        );
        assert_eq!(client.base_url, "https://api.gateway.test");
        assert_eq!(client.circuit_state(), "closed");
    }

    #[test]
    fn valid_signature_verifies() {
        let signature = sign("secret", "order_1", "pay_1");
        assert!(verify_signature("secret", "order_1", "pay_1", &signature));
    }

    #[test]
    fn tampered_payment_id_fails_verification() {
        let signature = sign("secret", "order_1", "pay_1");
        assert!(!verify_signature("secret", "order_1", "pay_2", &signature));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let signature = sign("secret", "order_1", "pay_1");
        assert!(!verify_signature("other", "order_1", "pay_1", &signature));
    }

    #[test]
    fn non_hex_signature_fails_verification() {
        assert!(!verify_signature("secret", "order_1", "pay_1", "not-hex!"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_create_order_with_mock() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/v1/orders")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id": "order_test_1", "amount": 100000, "currency": "INR", "status": "created"}"#,
            )
            .create();

        let client = GatewayClient::new(server.url(), "key".to_string(), "secret".to_string());
        let order = client.create_order(100000, "receipt_1").await;

        assert!(order.is_ok());
        let order = order.unwrap();
        assert_eq!(order.id, "order_test_1");
        assert_eq!(order.amount, 100000);
    }

    #[tokio::test]
    #[ignore]
    async fn test_create_order_rejected() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/v1/orders")
            .with_status(400)
            .with_body(r#"{"error": "amount below minimum"}"#)
            .create();

        let client = GatewayClient::new(server.url(), "key".to_string(), "secret".to_string());
        let result = client.create_order(1, "receipt_1").await;

        assert!(matches!(result, Err(GatewayError::OrderRejected(_))));
    }

    #[tokio::test]
    #[ignore]
    async fn test_circuit_breaker_opens_after_failures() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/v1/orders")
            .with_status(500)
            .expect_at_least(3)
            .create();

        let client = GatewayClient::with_circuit_breaker(
            server.url(),
            "key".to_string(),
            "secret".to_string(),
            3,
            1,
        );

        for _ in 0..3 {
            let _ = client.create_order(100000, "receipt").await;
        }

        let result = client.create_order(100000, "receipt").await;
        assert!(matches!(result, Err(GatewayError::CircuitBreakerOpen(_))));
    }
}
