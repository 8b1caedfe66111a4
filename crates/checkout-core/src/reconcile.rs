//! # Reconciliation Listener
//!
//! Applies gateway webhooks to orders. The signature is checked against the
//! raw body before anything is parsed or read. Gateways deliver at least
//! once and in no particular order, so every handler decides from the
//! order's current state alone and applying an event twice changes nothing.
//!
//! Events that cannot be matched to an order, or whose type is not handled,
//! are acknowledged so the gateway stops redelivering them. Storage errors
//! after verification propagate so the gateway retries.

use crate::error::{CheckoutError, CheckoutResult};
use crate::gateway::{GatewayEvent, GatewayEventKind, SharedGateway};
use crate::notify::{notify_if_moved, SharedNotifier};
use crate::order::Order;
use crate::order_store::{update_guarded, Change, SharedOrderStore};
use crate::payments::{apply_capture, CaptureEffect};
use crate::status::{OrderStatus, PaymentStatus};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

/// What a delivered event did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The order was updated
    Applied,
    /// The order already reflected the event
    Duplicate,
    /// No order matches the event's correlation ids
    Unmatched,
    /// Event type not handled
    Ignored,
    /// Applied, and the order needs an operator's attention
    FlaggedForReview,
}

/// Webhook handler bound to one gateway
#[derive(Clone)]
pub struct ReconciliationListener {
    orders: SharedOrderStore,
    gateway: SharedGateway,
    notifier: SharedNotifier,
}

impl ReconciliationListener {
    pub fn new(orders: SharedOrderStore, gateway: SharedGateway, notifier: SharedNotifier) -> Self {
        Self {
            orders,
            gateway,
            notifier,
        }
    }

    /// Verify, parse and apply one webhook delivery
    #[instrument(skip_all, fields(provider = self.gateway.provider_name(), bytes = payload.len()))]
    pub async fn handle(&self, payload: &[u8], signature: &str) -> CheckoutResult<ReconcileOutcome> {
        if !self.gateway.verify_webhook_signature(payload, signature) {
            warn!("webhook signature verification failed");
            return Err(CheckoutError::SignatureVerification);
        }
        let event = self.gateway.parse_webhook_event(payload)?;
        self.apply(event).await
    }

    /// Apply an already verified event
    #[instrument(skip_all, fields(event = event.kind_name(), event_id = ?event.event_id, gateway_order_id = ?event.gateway_order_id))]
    pub async fn apply(&self, event: GatewayEvent) -> CheckoutResult<ReconcileOutcome> {
        if let GatewayEventKind::Unknown { event_type } = &event.kind {
            info!(event_type = %event_type, "ignoring unhandled webhook event");
            return Ok(ReconcileOutcome::Ignored);
        }

        let Some(order) = self.resolve(&event).await? else {
            warn!(
                payment_id = ?event.payment_id(),
                "webhook event does not match any order, discarding"
            );
            return Ok(ReconcileOutcome::Unmatched);
        };

        // `before` is the status the winning write actually replaced
        let (order, (outcome, before)) = update_guarded(self.orders.as_ref(), order, |o| {
            let before = o.status;
            Ok(Self::apply_to(o, &event).map(|outcome| (outcome, before)))
        })
        .await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            status = %order.status,
            payment_status = %order.payment.status,
            outcome = ?outcome,
            "webhook event reconciled"
        );
        if outcome == ReconcileOutcome::FlaggedForReview {
            warn!(
                order_id = %order.id,
                reason = ?order.review_flag,
                "order flagged for review"
            );
        }
        notify_if_moved(&self.notifier, &order, before);
        Ok(outcome)
    }

    async fn resolve(&self, event: &GatewayEvent) -> CheckoutResult<Option<Order>> {
        if let Some(gateway_order_id) = &event.gateway_order_id {
            if let Some(order) = self.orders.find_by_gateway_order_id(gateway_order_id).await? {
                return Ok(Some(order));
            }
        }
        match event.payment_id() {
            Some(payment_id) => self.orders.find_by_gateway_payment_id(payment_id).await,
            None => Ok(None),
        }
    }

    fn apply_to(order: &mut Order, event: &GatewayEvent) -> Change<ReconcileOutcome> {
        let at = event.occurred_at.unwrap_or_else(Utc::now);
        match &event.kind {
            GatewayEventKind::Captured { payment_id, amount } => {
                match apply_capture(order, payment_id, None, Some(*amount), at) {
                    CaptureEffect::AlreadySettled => Change::Unchanged(ReconcileOutcome::Duplicate),
                    CaptureEffect::Flagged => Change::Write(ReconcileOutcome::FlaggedForReview),
                    CaptureEffect::Confirmed | CaptureEffect::Recorded => {
                        Change::Write(ReconcileOutcome::Applied)
                    }
                }
            }
            GatewayEventKind::Failed { reason, .. } => {
                let reason = reason
                    .clone()
                    .unwrap_or_else(|| "payment failed at gateway".to_string());
                let payment = &mut order.payment;
                // A late failure of an earlier attempt never undoes a settled payment
                if payment.status.is_settled()
                    || (payment.status == PaymentStatus::Failed
                        && payment.failure_reason.as_deref() == Some(reason.as_str()))
                {
                    return Change::Unchanged(ReconcileOutcome::Duplicate);
                }
                payment.status = PaymentStatus::Failed;
                payment.failure_reason = Some(reason);
                order.updated_at = at;
                Change::Write(ReconcileOutcome::Applied)
            }
            GatewayEventKind::RefundCreated {
                refund_id, amount, ..
            } => {
                if order.payment.status == PaymentStatus::Refunded {
                    return Change::Unchanged(ReconcileOutcome::Duplicate);
                }
                let was_paid = order.payment.status == PaymentStatus::Paid;
                order.payment.status = PaymentStatus::Refunded;
                order.payment.refund_id = Some(refund_id.clone());
                order.updated_at = at;

                let note = Some(format!("Refund {} processed", refund_id));
                if order.status.can_transition_to(OrderStatus::Cancelled) {
                    order.record_status(OrderStatus::Cancelled, at, note);
                } else if order.status.can_transition_to(OrderStatus::Returned) {
                    order.record_status(OrderStatus::Returned, at, note);
                }

                let flag = if !was_paid {
                    Some("refund received for an unpaid order".to_string())
                } else if *amount != order.pricing.total {
                    Some(format!(
                        "partial refund of {} against total {}",
                        amount, order.pricing.total
                    ))
                } else {
                    None
                };
                match flag {
                    Some(reason) => {
                        order.review_flag = Some(reason);
                        Change::Write(ReconcileOutcome::FlaggedForReview)
                    }
                    None => Change::Write(ReconcileOutcome::Applied),
                }
            }
            GatewayEventKind::Unknown { .. } => Change::Unchanged(ReconcileOutcome::Ignored),
        }
    }
}
