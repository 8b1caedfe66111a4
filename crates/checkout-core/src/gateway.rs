//! # Payment Gateway Trait
//!
//! Seam between the order pipeline and a payment provider. The provider
//! creates a payment intent for an order, proves client-side payments and
//! signs its webhooks; everything else (which status to move to, what to
//! record) is decided by [`crate::payments`] and [`crate::reconcile`].
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            PaymentGateway (trait)            │
//! │  ├── create_payment_intent()                 │
//! │  ├── verify_client_proof()                   │
//! │  ├── verify_webhook_signature()              │
//! │  └── parse_webhook_event()                   │
//! └──────────────────────────────────────────────┘
//!                        ▲
//!            ┌───────────┴───────────┐
//!   ┌────────┴────────┐     ┌────────┴────────┐
//!   │ RazorpayGateway │     │ InMemoryGateway │
//!   └─────────────────┘     └─────────────────┘
//! ```

use crate::error::{CheckoutError, CheckoutResult};
use crate::money::Currency;
use crate::order::Order;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Gateway-side payment intent for an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentRef {
    /// Correlation id stored on the order
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: Currency,
}

/// Provider-neutral webhook event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEvent {
    /// Provider's event id, when it sends one
    #[serde(default)]
    pub event_id: Option<String>,
    /// Correlation id of the order the event belongs to
    #[serde(default)]
    pub gateway_order_id: Option<String>,
    pub kind: GatewayEventKind,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

/// What happened at the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEventKind {
    Captured {
        payment_id: String,
        amount: i64,
    },
    Failed {
        payment_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    RefundCreated {
        refund_id: String,
        payment_id: String,
        amount: i64,
    },
    /// Event type this system does not handle
    Unknown {
        event_type: String,
    },
}

impl GatewayEvent {
    /// Gateway payment id carried by the event, if any
    pub fn payment_id(&self) -> Option<&str> {
        match &self.kind {
            GatewayEventKind::Captured { payment_id, .. }
            | GatewayEventKind::Failed { payment_id, .. }
            | GatewayEventKind::RefundCreated { payment_id, .. } => Some(payment_id),
            GatewayEventKind::Unknown { .. } => None,
        }
    }

    /// Short name for logs
    pub fn kind_name(&self) -> &str {
        match &self.kind {
            GatewayEventKind::Captured { .. } => "captured",
            GatewayEventKind::Failed { .. } => "failed",
            GatewayEventKind::RefundCreated { .. } => "refund_created",
            GatewayEventKind::Unknown { event_type } => event_type,
        }
    }
}

/// Core trait for payment provider implementations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Register the order with the provider and return its correlation id
    async fn create_payment_intent(&self, order: &Order) -> CheckoutResult<PaymentIntentRef>;

    /// Check the signature a client received after paying
    fn verify_client_proof(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> bool;

    /// Check a webhook signature over the raw body bytes
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool;

    /// Parse a verified webhook body
    fn parse_webhook_event(&self, payload: &[u8]) -> CheckoutResult<GatewayEvent>;

    /// Key the browser checkout widget needs
    fn public_key(&self) -> &str;

    /// Get the provider name (for logging and routing).
    fn provider_name(&self) -> &'static str;

    /// Webhook endpoint path for this provider.
    fn webhook_path(&self) -> String {
        format!("/webhook/{}", self.provider_name())
    }
}

/// Shared gateway handle (dynamic dispatch)
pub type SharedGateway = Arc<dyn PaymentGateway>;

#[derive(Default)]
struct Signatures {
    proofs: HashMap<String, (String, String)>,
    webhooks: HashMap<String, Vec<u8>>,
}

/// In-memory gateway for tests and local runs.
///
/// Intents get sequential `order_N` ids. Signatures are opaque tokens handed
/// out by [`InMemoryGateway::sign_payment`] and
/// [`InMemoryGateway::sign_webhook`]; a token only verifies against the
/// exact payload it was issued for.
pub struct InMemoryGateway {
    next_id: AtomicU64,
    fail_intents: AtomicBool,
    latency: Option<Duration>,
    signatures: Mutex<Signatures>,
    intents: Mutex<Vec<PaymentIntentRef>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            fail_intents: AtomicBool::new(false),
            latency: None,
            signatures: Mutex::new(Signatures::default()),
            intents: Mutex::new(Vec::new()),
        }
    }

    /// Builder: delay every intent creation
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make intent creation fail with a gateway error
    pub fn set_fail_intents(&self, fail: bool) {
        self.fail_intents.store(fail, Ordering::SeqCst);
    }

    /// Intents created so far
    pub fn intents(&self) -> Vec<PaymentIntentRef> {
        lock(&self.intents).clone()
    }

    /// Issue the signature a client would receive for a payment
    pub fn sign_payment(&self, gateway_order_id: &str, gateway_payment_id: &str) -> String {
        let token = format!("sig_{}", uuid::Uuid::new_v4().simple());
        lock(&self.signatures).proofs.insert(
            token.clone(),
            (gateway_order_id.to_string(), gateway_payment_id.to_string()),
        );
        token
    }

    /// Issue the signature header for a webhook body
    pub fn sign_webhook(&self, payload: &[u8]) -> String {
        let token = format!("whsig_{}", uuid::Uuid::new_v4().simple());
        lock(&self.signatures)
            .webhooks
            .insert(token.clone(), payload.to_vec());
        token
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn create_payment_intent(&self, order: &Order) -> CheckoutResult<PaymentIntentRef> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_intents.load(Ordering::SeqCst) {
            return Err(CheckoutError::Gateway {
                provider: self.provider_name().to_string(),
                message: "intent creation disabled".to_string(),
            });
        }

        let intent = PaymentIntentRef {
            gateway_order_id: format!("order_{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            amount: order.pricing.total,
            currency: order.currency(),
        };
        lock(&self.intents).push(intent.clone());
        Ok(intent)
    }

    fn verify_client_proof(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> bool {
        lock(&self.signatures)
            .proofs
            .get(signature)
            .map(|(o, p)| o == gateway_order_id && p == gateway_payment_id)
            .unwrap_or(false)
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        lock(&self.signatures)
            .webhooks
            .get(signature)
            .map(|signed| signed.as_slice() == payload)
            .unwrap_or(false)
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> CheckoutResult<GatewayEvent> {
        serde_json::from_slice(payload).map_err(|e| CheckoutError::WebhookParse(e.to_string()))
    }

    fn public_key(&self) -> &str {
        "mem_public_key"
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::fixtures::pending_order;

    #[tokio::test]
    async fn test_intents_are_sequential() {
        let gateway = InMemoryGateway::new();
        let order = pending_order();
        let first = gateway.create_payment_intent(&order).await.unwrap();
        let second = gateway.create_payment_intent(&order).await.unwrap();

        assert_eq!(first.gateway_order_id, "order_1");
        assert_eq!(second.gateway_order_id, "order_2");
        assert_eq!(first.amount, order.pricing.total);
        assert_eq!(gateway.intents().len(), 2);
    }

    #[test]
    fn test_tampered_webhook_fails_verification() {
        let gateway = InMemoryGateway::new();
        let body = br#"{"gateway_order_id":"order_1","kind":{"type":"captured","payment_id":"pay_1","amount":100}}"#;
        let signature = gateway.sign_webhook(body);
        assert!(gateway.verify_webhook_signature(body, &signature));

        let mut tampered = body.to_vec();
        tampered[40] ^= 0x01;
        for _ in 0..3 {
            assert!(!gateway.verify_webhook_signature(&tampered, &signature));
        }
    }

    #[test]
    fn test_client_proof_binds_both_ids() {
        let gateway = InMemoryGateway::new();
        let signature = gateway.sign_payment("order_1", "pay_1");
        assert!(gateway.verify_client_proof("order_1", "pay_1", &signature));
        assert!(!gateway.verify_client_proof("order_2", "pay_1", &signature));
        assert!(!gateway.verify_client_proof("order_1", "pay_2", &signature));
        assert!(!gateway.verify_client_proof("order_1", "pay_1", "forged"));
    }

    #[test]
    fn test_parse_event() {
        let gateway = InMemoryGateway::new();
        let event = gateway
            .parse_webhook_event(
                br#"{"event_id":"evt_1","gateway_order_id":"order_1","kind":{"type":"refund_created","refund_id":"rfnd_1","payment_id":"pay_1","amount":500}}"#,
            )
            .unwrap();
        assert_eq!(event.payment_id(), Some("pay_1"));
        assert_eq!(event.kind_name(), "refund_created");

        assert!(matches!(
            gateway.parse_webhook_event(b"not json"),
            Err(CheckoutError::WebhookParse(_))
        ));
    }

    #[test]
    fn test_default_webhook_path() {
        assert_eq!(InMemoryGateway::new().webhook_path(), "/webhook/memory");
    }
}
