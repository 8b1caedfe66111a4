//! # Order Lifecycle
//!
//! Operator and customer driven status changes. Every change is checked
//! against the transition table in [`OrderStatus::allowed_transitions`],
//! appended to the order's status history and announced to the notifier.
//!
//! A user request is evaluated against the status the caller read. If a
//! concurrent writer (usually a payment webhook) moved the order first, the
//! request fails with `InvalidTransition` rather than being re-applied to a
//! state the caller never saw.

use crate::cart::OwnerRef;
use crate::error::{CheckoutError, CheckoutResult};
use crate::notify::{notify_if_moved, SharedNotifier};
use crate::order::{Order, OrderSummary};
use crate::order_store::{update_guarded, Change, SharedOrderStore};
use crate::status::OrderStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Carrier details recorded when an order ships
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentDetails {
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

/// A requested status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub target: OrderStatus,
    pub note: Option<String>,
    pub shipment: ShipmentDetails,
}

impl StatusChange {
    pub fn to(target: OrderStatus) -> Self {
        Self {
            target,
            note: None,
            shipment: ShipmentDetails::default(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_shipment(mut self, shipment: ShipmentDetails) -> Self {
        self.shipment = shipment;
        self
    }
}

/// Apply a status change to an order in memory.
///
/// Fails with `InvalidTransition` (order untouched) if the edge is not in
/// the transition table.
pub fn apply_transition(
    order: &mut Order,
    change: &StatusChange,
    at: DateTime<Utc>,
) -> CheckoutResult<()> {
    if !order.status.can_transition_to(change.target) {
        return Err(CheckoutError::InvalidTransition {
            from: order.status.to_string(),
            to: change.target.to_string(),
        });
    }

    match change.target {
        OrderStatus::Shipped => {
            let shipment = change.shipment.clone();
            let fulfillment = &mut order.fulfillment;
            fulfillment.shipped_at = Some(at);
            fulfillment.carrier = shipment.carrier.or(fulfillment.carrier.take());
            fulfillment.tracking_number = shipment
                .tracking_number
                .or(fulfillment.tracking_number.take());
            fulfillment.tracking_url = shipment.tracking_url.or(fulfillment.tracking_url.take());
            fulfillment.estimated_delivery = shipment
                .estimated_delivery
                .or(fulfillment.estimated_delivery.take());
        }
        OrderStatus::Delivered => order.fulfillment.delivered_at = Some(at),
        _ => {}
    }

    order.record_status(change.target, at, change.note.clone());
    Ok(())
}

/// Status transitions and owner-scoped reads
#[derive(Clone)]
pub struct OrderLifecycle {
    orders: SharedOrderStore,
    notifier: SharedNotifier,
}

impl OrderLifecycle {
    pub fn new(orders: SharedOrderStore, notifier: SharedNotifier) -> Self {
        Self { orders, notifier }
    }

    async fn load(&self, order_id: &str) -> CheckoutResult<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Order", order_id))
    }

    /// Load an order the requester owns. Someone else's order reads as absent.
    pub async fn get_for_owner(&self, order_id: &str, owner: &OwnerRef) -> CheckoutResult<Order> {
        let order = self.load(order_id).await?;
        if !order.owner.is(owner) {
            return Err(CheckoutError::not_found("Order", order_id));
        }
        Ok(order)
    }

    /// Summaries of the requester's orders, newest first
    pub async fn list_for_owner(&self, owner: &OwnerRef) -> CheckoutResult<Vec<OrderSummary>> {
        let orders = self.orders.list_for_owner(owner).await?;
        Ok(orders.iter().map(Order::summary).collect())
    }

    /// Operator status change
    #[instrument(skip(self, change), fields(target = %change.target))]
    pub async fn transition(&self, order_id: &str, change: StatusChange) -> CheckoutResult<Order> {
        let order = self.load(order_id).await?;
        self.apply_as_user(order, change).await
    }

    /// Customer cancel, permitted only before shipping
    #[instrument(skip(self, reason), fields(requester = %requester))]
    pub async fn cancel(
        &self,
        order_id: &str,
        requester: &OwnerRef,
        reason: Option<String>,
    ) -> CheckoutResult<Order> {
        let order = self.get_for_owner(order_id, requester).await?;
        if !order.status.is_user_cancellable() {
            return Err(CheckoutError::NotCancellable {
                status: order.status.to_string(),
            });
        }

        let note = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .map(|r| format!("Cancelled by customer: {}", r))
            .unwrap_or_else(|| "Cancelled by customer".to_string());

        self.apply_as_user(order, StatusChange::to(OrderStatus::Cancelled).with_note(note))
            .await
    }

    async fn apply_as_user(&self, order: Order, change: StatusChange) -> CheckoutResult<Order> {
        let read_status = order.status;
        let (updated, from) = update_guarded(self.orders.as_ref(), order, |o| {
            if o.status != read_status {
                return Err(CheckoutError::InvalidTransition {
                    from: o.status.to_string(),
                    to: change.target.to_string(),
                });
            }
            apply_transition(o, &change, Utc::now())?;
            Ok(Change::Write(read_status))
        })
        .await?;

        info!(
            order_id = %updated.id,
            order_number = %updated.order_number,
            from = %from,
            to = %updated.status,
            "order status updated"
        );
        notify_if_moved(&self.notifier, &updated, from);
        Ok(updated)
    }
}
