//! # Payment Service
//!
//! Drives the gateway for a placed order: creating the payment intent the
//! client pays against, and accepting the client's proof of payment. The
//! gateway call is bounded by a caller-supplied timeout and is never
//! retried here; on timeout the order stays pending.
//!
//! Captures reported by the client and by webhooks go through the same
//! [`apply_capture`] so that either path (or both, in any order) leaves the
//! order in the same state.

use crate::cart::OwnerRef;
use crate::error::{CheckoutError, CheckoutResult};
use crate::gateway::{PaymentIntentRef, SharedGateway};
use crate::money::Currency;
use crate::notify::{notify_if_moved, SharedNotifier};
use crate::order::Order;
use crate::order_store::{update_guarded, Change, SharedOrderStore};
use crate::status::{OrderStatus, PaymentStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Default bound on a gateway call
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// What the client needs to open the provider's checkout widget
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntent {
    pub order_id: String,
    pub order_number: String,
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: Currency,
    pub gateway_public_key: String,
    pub provider: String,
}

/// Proof of payment returned to the client by the provider
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientPaymentProof {
    pub order_id: String,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub client_signature: String,
}

/// Result of checking a client proof
#[derive(Debug, Clone)]
pub enum ProofOutcome {
    /// Signature matched; the order is paid
    Verified(Order),
    /// Signature did not match; the payment is marked failed
    Rejected(Order),
}

/// How a capture changed an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEffect {
    /// Payment was already settled; nothing changed
    AlreadySettled,
    /// Payment recorded and the order confirmed
    Confirmed,
    /// Payment recorded; status left as it was
    Recorded,
    /// Payment recorded and the order flagged for an operator
    Flagged,
}

/// Record a capture on an order.
///
/// Idempotent: a settled payment is left untouched. Only a pending order is
/// advanced (to confirmed). A capture on a cancelled order is recorded and
/// flagged, and so is a captured amount that differs from the order total.
pub fn apply_capture(
    order: &mut Order,
    gateway_payment_id: &str,
    signature: Option<&str>,
    captured_amount: Option<i64>,
    at: DateTime<Utc>,
) -> CaptureEffect {
    if order.payment.status.is_settled() {
        return CaptureEffect::AlreadySettled;
    }

    let payment = &mut order.payment;
    payment.status = PaymentStatus::Paid;
    payment.gateway_payment_id = Some(gateway_payment_id.to_string());
    if let Some(signature) = signature {
        payment.gateway_signature = Some(signature.to_string());
    }
    payment.paid_at = Some(at);
    payment.failure_reason = None;
    order.updated_at = at;

    let mut flag = captured_amount
        .filter(|amount| *amount != order.pricing.total)
        .map(|amount| {
            format!(
                "captured amount {} differs from order total {}",
                amount, order.pricing.total
            )
        });

    let mut confirmed = false;
    match order.status {
        OrderStatus::Pending => {
            order.record_status(OrderStatus::Confirmed, at, Some("Payment captured".to_string()));
            confirmed = true;
        }
        OrderStatus::Cancelled => {
            flag.get_or_insert_with(|| "payment captured after cancellation".to_string());
        }
        _ => {}
    }

    match flag {
        Some(reason) => {
            order.review_flag = Some(reason);
            CaptureEffect::Flagged
        }
        None if confirmed => CaptureEffect::Confirmed,
        None => CaptureEffect::Recorded,
    }
}

/// Payment intents and client-side confirmation
#[derive(Clone)]
pub struct PaymentService {
    orders: SharedOrderStore,
    gateway: SharedGateway,
    notifier: SharedNotifier,
    timeout: Duration,
}

impl PaymentService {
    pub fn new(orders: SharedOrderStore, gateway: SharedGateway, notifier: SharedNotifier) -> Self {
        Self {
            orders,
            gateway,
            notifier,
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    /// Builder: bound on each gateway call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn load_owned(&self, order_id: &str, requester: &OwnerRef) -> CheckoutResult<Order> {
        self.orders
            .get(order_id)
            .await?
            .filter(|order| order.owner.is(requester))
            .ok_or_else(|| CheckoutError::not_found("Order", order_id))
    }

    fn check_payable(order: &Order) -> CheckoutResult<()> {
        match order.payment.status {
            PaymentStatus::Paid => {
                return Err(CheckoutError::PaymentAlreadyCompleted {
                    order_id: order.id.clone(),
                })
            }
            PaymentStatus::Refunded => {
                return Err(CheckoutError::Validation(
                    "payment for this order has been refunded".to_string(),
                ))
            }
            PaymentStatus::Pending | PaymentStatus::Failed => {}
        }
        if !order.payment.method.is_online() {
            return Err(CheckoutError::Validation(
                "cash on delivery orders are not paid online".to_string(),
            ));
        }
        if order.status.is_terminal() {
            return Err(CheckoutError::Validation(format!(
                "order is {}",
                order.status
            )));
        }
        Ok(())
    }

    /// Create (or reuse) the gateway intent for an order
    #[instrument(skip(self), fields(provider = self.gateway.provider_name()))]
    pub async fn create_intent(
        &self,
        order_id: &str,
        requester: &OwnerRef,
    ) -> CheckoutResult<PaymentIntent> {
        let order = self.load_owned(order_id, requester).await?;
        Self::check_payable(&order)?;

        let requested = match &order.payment.gateway_order_id {
            Some(existing) => existing.clone(),
            None => self.request_intent(&order).await?.gateway_order_id,
        };

        // A concurrent request may have stored its own gateway order first;
        // that one stays the correlation id and ours is abandoned.
        let (order, gateway_order_id) = update_guarded(self.orders.as_ref(), order, |o| {
            Self::check_payable(o)?;
            let gateway_order_id = o
                .payment
                .gateway_order_id
                .clone()
                .unwrap_or_else(|| requested.clone());
            if o.payment.gateway_order_id.is_some() && o.payment.status == PaymentStatus::Pending {
                return Ok(Change::Unchanged(gateway_order_id));
            }
            o.payment.gateway_order_id = Some(gateway_order_id.clone());
            o.payment.status = PaymentStatus::Pending;
            o.payment.failure_reason = None;
            o.updated_at = Utc::now();
            Ok(Change::Write(gateway_order_id))
        })
        .await?;

        if gateway_order_id != requested {
            warn!(
                order_id = %order.id,
                abandoned = %requested,
                gateway_order_id = %gateway_order_id,
                "concurrent intent already stored, reusing it"
            );
        }

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            gateway_order_id = %gateway_order_id,
            amount = order.pricing.total,
            "payment intent ready"
        );

        Ok(PaymentIntent {
            gateway_public_key: self.gateway.public_key().to_string(),
            provider: self.gateway.provider_name().to_string(),
            amount: order.pricing.total,
            currency: order.currency(),
            order_id: order.id,
            order_number: order.order_number,
            gateway_order_id,
        })
    }

    async fn request_intent(&self, order: &Order) -> CheckoutResult<PaymentIntentRef> {
        match tokio::time::timeout(self.timeout, self.gateway.create_payment_intent(order)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    order_id = %order.id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "gateway intent creation timed out, order left pending"
                );
                Err(CheckoutError::GatewayTimeout {
                    operation: "create_payment_intent",
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Check the client's payment proof and record the outcome
    #[instrument(skip(self, proof), fields(order_id = %proof.order_id, gateway_payment_id = %proof.gateway_payment_id))]
    pub async fn confirm_client_payment(
        &self,
        proof: ClientPaymentProof,
        requester: &OwnerRef,
    ) -> CheckoutResult<ProofOutcome> {
        let order = self.load_owned(&proof.order_id, requester).await?;

        let correlates =
            order.payment.gateway_order_id.as_deref() == Some(proof.gateway_order_id.as_str());
        let verified = correlates
            && self.gateway.verify_client_proof(
                &proof.gateway_order_id,
                &proof.gateway_payment_id,
                &proof.client_signature,
            );

        if !verified {
            warn!(correlates, "client payment proof rejected");
            let (order, _) = update_guarded(self.orders.as_ref(), order, |o| {
                if o.payment.status != PaymentStatus::Pending {
                    return Ok(Change::Unchanged(()));
                }
                o.payment.status = PaymentStatus::Failed;
                o.payment.failure_reason = Some("payment signature verification failed".to_string());
                o.updated_at = Utc::now();
                Ok(Change::Write(()))
            })
            .await?;
            return Ok(ProofOutcome::Rejected(order));
        }

        let (order, (effect, before)) = update_guarded(self.orders.as_ref(), order, |o| {
            let before = o.status;
            let effect = apply_capture(
                o,
                &proof.gateway_payment_id,
                Some(&proof.client_signature),
                None,
                Utc::now(),
            );
            Ok(match effect {
                CaptureEffect::AlreadySettled => Change::Unchanged((effect, before)),
                _ => Change::Write((effect, before)),
            })
        })
        .await?;

        info!(
            order_number = %order.order_number,
            effect = ?effect,
            status = %order.status,
            "client payment verified"
        );
        notify_if_moved(&self.notifier, &order, before);
        Ok(ProofOutcome::Verified(order))
    }
}
