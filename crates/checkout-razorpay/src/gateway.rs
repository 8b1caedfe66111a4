//! # Razorpay Gateway
//!
//! [`PaymentGateway`] implementation backed by the Razorpay Orders API.
//! A Razorpay order is the payment intent: its id is the correlation id
//! the browser checkout, the client proof and every webhook refer to.

use crate::config::RazorpayConfig;
use crate::{signature, webhook};
use async_trait::async_trait;
use checkout_core::{
    CheckoutError, CheckoutResult, GatewayEvent, Order, PaymentGateway, PaymentIntentRef,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info, instrument};

const PROVIDER: &str = "razorpay";

/// Razorpay payment gateway
pub struct RazorpayGateway {
    config: RazorpayConfig,
    client: Client,
}

impl RazorpayGateway {
    /// Create a new Razorpay gateway
    pub fn new(config: RazorpayConfig) -> CheckoutResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| {
                CheckoutError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> CheckoutResult<Self> {
        Self::new(RazorpayConfig::from_env()?)
    }

    pub fn config(&self) -> &RazorpayConfig {
        &self.config
    }

    fn provider_error(message: impl Into<String>) -> CheckoutError {
        CheckoutError::Gateway {
            provider: PROVIDER.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[instrument(skip(self, order), fields(order_id = %order.id, order_number = %order.order_number))]
    async fn create_payment_intent(&self, order: &Order) -> CheckoutResult<PaymentIntentRef> {
        if order.pricing.total <= 0 {
            return Err(CheckoutError::Validation(
                "Order total must be positive".to_string(),
            ));
        }

        let request = CreateOrderRequest {
            amount: order.pricing.total,
            currency: order.currency().to_string(),
            receipt: order.order_number.clone(),
            notes: HashMap::from([
                ("order_id".to_string(), order.id.clone()),
                ("order_number".to_string(), order.order_number.clone()),
            ]),
        };

        debug!(
            "Creating Razorpay order: amount={}, currency={}",
            request.amount, request.currency
        );

        let url = format!("{}/v1/orders", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::provider_error(format!("network error: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Self::provider_error(format!("network error: {}", e)))?;

        if !status.is_success() {
            error!("Razorpay API error: status={}, body={}", status, body);

            if let Ok(error_response) = serde_json::from_str::<RazorpayErrorResponse>(&body) {
                return Err(Self::provider_error(error_response.error.description));
            }
            return Err(Self::provider_error(format!("HTTP {}: {}", status, body)));
        }

        let created: RazorpayOrderResponse = serde_json::from_str(&body).map_err(|e| {
            Self::provider_error(format!("Failed to parse Razorpay response: {}", e))
        })?;

        if created.amount != order.pricing.total {
            return Err(Self::provider_error(format!(
                "order amount mismatch: sent {}, got {}",
                order.pricing.total, created.amount
            )));
        }

        info!(gateway_order_id = %created.id, status = %created.status, "Created Razorpay order");

        Ok(PaymentIntentRef {
            gateway_order_id: created.id,
            amount: created.amount,
            currency: order.currency(),
        })
    }

    fn verify_client_proof(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> bool {
        signature::verify_payment_signature(
            &self.config.key_secret,
            gateway_order_id,
            gateway_payment_id,
            signature,
        )
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        signature::verify_webhook_signature(&self.config.webhook_secret, payload, signature)
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> CheckoutResult<GatewayEvent> {
        webhook::parse_event(payload)
    }

    fn public_key(&self) -> &str {
        &self.config.key_id
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

// =============================================================================
// Razorpay API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct CreateOrderRequest {
    amount: i64,
    currency: String,
    receipt: String,
    notes: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RazorpayOrderResponse {
    id: String,
    amount: i64,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorResponse {
    error: RazorpayError,
}

#[derive(Debug, Deserialize)]
struct RazorpayError {
    description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{compute_hmac_sha256, payment_signature};
    use checkout_core::{
        Address, Cart, Currency, NewCartLine, OrderOwner, OrderPricing, OwnerRef,
        PaymentMethod, Price, ShippingMethod, Variant,
    };
    use checkout_core::order::OrderDraft;
    use serde_json::json;
    use wiremock::matchers::{basic_auth, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_order() -> Order {
        let owner = OwnerRef::User("u1".into());
        let mut cart = Cart::new(owner.clone(), Currency::INR, chrono::Duration::days(1));
        cart.add_line(NewCartLine {
            product_ref: "tee".into(),
            variant: Variant::default(),
            quantity: 1,
            unit_price: Price::from_minor(1_499, Currency::INR),
            name: "Tee".into(),
            image: None,
        })
        .unwrap();
        let address = Address {
            full_name: "Asha Rao".into(),
            line1: "12 MG Road".into(),
            city: "Bengaluru".into(),
            postal_code: "560001".into(),
            country: "IN".into(),
            ..Address::default()
        };
        Order::place(
            &cart,
            OrderDraft {
                order_number: "ORD-240101-ABCDEF".into(),
                owner: OrderOwner::new(owner, None).unwrap(),
                pricing: OrderPricing {
                    subtotal: 1_499,
                    discount: 0,
                    shipping_cost: 99,
                    tax: 270,
                    total: 1_868,
                    currency: Currency::INR,
                },
                shipping_address: address.clone(),
                billing_address: address,
                shipping_method: ShippingMethod::Standard,
                payment_method: PaymentMethod::Upi,
                note: None,
            },
        )
    }

    fn gateway_for(server: &MockServer) -> RazorpayGateway {
        let config = RazorpayConfig::new("rzp_test_key", "key_secret", "webhook_secret")
            .with_api_base_url(server.uri());
        RazorpayGateway::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_create_payment_intent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/orders"))
            .and(basic_auth("rzp_test_key", "key_secret"))
            .and(body_partial_json(json!({
                "amount": 1868,
                "currency": "INR",
                "receipt": "ORD-240101-ABCDEF"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "order_IluGWxBm9U8zJ8",
                "entity": "order",
                "amount": 1868,
                "amount_paid": 0,
                "amount_due": 1868,
                "currency": "INR",
                "receipt": "ORD-240101-ABCDEF",
                "status": "created",
                "attempts": 0,
                "created_at": 1642662092
            })))
            .expect(1)
            .mount(&server)
            .await;

        let intent = gateway_for(&server)
            .create_payment_intent(&test_order())
            .await
            .unwrap();
        assert_eq!(intent.gateway_order_id, "order_IluGWxBm9U8zJ8");
        assert_eq!(intent.amount, 1868);
        assert_eq!(intent.currency, Currency::INR);
    }

    #[tokio::test]
    async fn test_api_error_is_gateway_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/orders"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": "BAD_REQUEST_ERROR",
                    "description": "Authentication failed",
                    "source": "NA",
                    "step": "NA",
                    "reason": "NA"
                }
            })))
            .mount(&server)
            .await;

        let err = gateway_for(&server)
            .create_payment_intent(&test_order())
            .await
            .unwrap_err();
        match err {
            CheckoutError::Gateway { provider, message } => {
                assert_eq!(provider, "razorpay");
                assert_eq!(message, "Authentication failed");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_signatures_use_distinct_secrets() {
        let gateway =
            RazorpayGateway::new(RazorpayConfig::new("rzp_test_key", "key_secret", "webhook_secret"))
                .unwrap();

        let proof = payment_signature("key_secret", "order_1", "pay_1");
        assert!(gateway.verify_client_proof("order_1", "pay_1", &proof));

        let body = br#"{"event":"payment.captured"}"#;
        let signed_with_key_secret = compute_hmac_sha256("key_secret", body);
        assert!(!gateway.verify_webhook_signature(body, &signed_with_key_secret));
        let signed = compute_hmac_sha256("webhook_secret", body);
        assert!(gateway.verify_webhook_signature(body, &signed));
    }

    #[test]
    fn test_provider_identity() {
        let gateway =
            RazorpayGateway::new(RazorpayConfig::new("rzp_test_key", "key_secret", "webhook_secret"))
                .unwrap();
        assert_eq!(gateway.provider_name(), "razorpay");
        assert_eq!(gateway.public_key(), "rzp_test_key");
        assert_eq!(gateway.webhook_path(), "/webhook/razorpay");
    }
}
