//! # Razorpay Webhook Parsing
//!
//! Maps Razorpay webhook bodies to provider-neutral [`GatewayEvent`]s.
//! Signature verification happens before this runs; see
//! [`crate::signature::verify_webhook_signature`].

use checkout_core::{CheckoutError, CheckoutResult, GatewayEvent, GatewayEventKind};
use chrono::DateTime;
use serde::Deserialize;
use tracing::debug;

/// Events to enable on the webhook in the Razorpay dashboard
pub const REQUIRED_WEBHOOK_EVENTS: &[&str] = &[
    "payment.captured",
    "payment.failed",
    "order.paid",
    "refund.created",
];

#[derive(Debug, Deserialize)]
struct RazorpayWebhook {
    event: String,
    #[serde(default)]
    payload: WebhookPayload,
    #[serde(default)]
    created_at: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    payment: Option<Wrapped<PaymentEntity>>,
    #[serde(default)]
    order: Option<Wrapped<OrderEntity>>,
    #[serde(default)]
    refund: Option<Wrapped<RefundEntity>>,
}

#[derive(Debug, Deserialize)]
struct Wrapped<T> {
    entity: T,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    amount: i64,
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderEntity {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RefundEntity {
    id: String,
    payment_id: String,
    amount: i64,
}

impl WebhookPayload {
    fn payment(&self, event: &str) -> CheckoutResult<&PaymentEntity> {
        self.payment
            .as_ref()
            .map(|p| &p.entity)
            .ok_or_else(|| CheckoutError::WebhookParse(format!("{} without payment entity", event)))
    }
}

/// Parse a verified webhook body
pub fn parse_event(payload: &[u8]) -> CheckoutResult<GatewayEvent> {
    let webhook: RazorpayWebhook = serde_json::from_slice(payload)
        .map_err(|e| CheckoutError::WebhookParse(format!("Failed to parse webhook: {}", e)))?;

    debug!(event = %webhook.event, "parsing razorpay webhook");

    let body = &webhook.payload;
    let payment_order_id = body.payment.as_ref().and_then(|p| p.entity.order_id.clone());

    let (kind, gateway_order_id) = match webhook.event.as_str() {
        "payment.captured" => {
            let payment = body.payment(&webhook.event)?;
            (
                GatewayEventKind::Captured {
                    payment_id: payment.id.clone(),
                    amount: payment.amount,
                },
                payment_order_id,
            )
        }
        "order.paid" => {
            let payment = body.payment(&webhook.event)?;
            let order_id = body
                .order
                .as_ref()
                .map(|o| o.entity.id.clone())
                .or(payment_order_id);
            (
                GatewayEventKind::Captured {
                    payment_id: payment.id.clone(),
                    amount: payment.amount,
                },
                order_id,
            )
        }
        "payment.failed" => {
            let payment = body.payment(&webhook.event)?;
            let reason = payment
                .error_description
                .clone()
                .or_else(|| payment.error_code.clone());
            (
                GatewayEventKind::Failed {
                    payment_id: payment.id.clone(),
                    reason,
                },
                payment_order_id,
            )
        }
        "refund.created" => {
            let refund = body
                .refund
                .as_ref()
                .map(|r| &r.entity)
                .ok_or_else(|| {
                    CheckoutError::WebhookParse("refund.created without refund entity".to_string())
                })?;
            (
                GatewayEventKind::RefundCreated {
                    refund_id: refund.id.clone(),
                    payment_id: refund.payment_id.clone(),
                    amount: refund.amount,
                },
                payment_order_id,
            )
        }
        other => (
            GatewayEventKind::Unknown {
                event_type: other.to_string(),
            },
            payment_order_id,
        ),
    };

    Ok(GatewayEvent {
        event_id: None,
        gateway_order_id,
        kind,
        occurred_at: webhook
            .created_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0)),
    })
}
