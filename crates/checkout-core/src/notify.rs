//! Status-change notifications.
//!
//! Notifications are fire-and-forget: [`dispatch`] hands the event to a
//! spawned task and a failing notifier is only logged. Nothing in the order
//! pipeline waits on or rolls back because of a notification.

use crate::error::CheckoutResult;
use crate::order::Order;
use crate::status::OrderStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// An accepted status transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusNotification {
    pub order_id: String,
    pub order_number: String,
    pub from: OrderStatus,
    pub to: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusNotification {
    /// Build from an order that has just moved out of `from`
    pub fn for_order(order: &Order, from: OrderStatus) -> Self {
        let last = order.status_history().last();
        Self {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            from,
            to: order.status,
            contact_email: order.owner.guest_email.clone(),
            note: last.and_then(|entry| entry.note.clone()),
            at: last.map(|entry| entry.timestamp).unwrap_or(order.updated_at),
        }
    }
}

/// Receives status transitions (email, SMS, push, ...)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn status_changed(&self, notification: &StatusNotification) -> CheckoutResult<()>;
}

/// Shared notifier handle
pub type SharedNotifier = Arc<dyn Notifier>;

/// Notifier that only writes a log line
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn status_changed(&self, notification: &StatusNotification) -> CheckoutResult<()> {
        info!(
            order_id = %notification.order_id,
            order_number = %notification.order_number,
            from = %notification.from,
            to = %notification.to,
            "order status changed"
        );
        Ok(())
    }
}

/// Send a notification without waiting for it
pub fn dispatch(notifier: &SharedNotifier, notification: StatusNotification) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(e) = notifier.status_changed(&notification).await {
            warn!(
                order_id = %notification.order_id,
                to = %notification.to,
                error = %e,
                "status notification failed"
            );
        }
    });
}

/// Notify if `order` has moved away from `before`
pub(crate) fn notify_if_moved(notifier: &SharedNotifier, order: &Order, before: OrderStatus) {
    if order.status != before {
        dispatch(notifier, StatusNotification::for_order(order, before));
    }
}


#[cfg(test)]
mod tests {
    use super::recording::*;
    use super::*;
    use crate::order::fixtures::pending_order;

    #[tokio::test]
    async fn test_dispatch_delivers() {
        let recorder = Arc::new(RecordingNotifier::default());
        let notifier: SharedNotifier = recorder.clone();

        let mut order = pending_order();
        order.record_status(OrderStatus::Confirmed, Utc::now(), Some("Payment captured".into()));
        notify_if_moved(&notifier, &order, OrderStatus::Pending);
        settle().await;

        let seen = recorder.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].from, OrderStatus::Pending);
        assert_eq!(seen[0].to, OrderStatus::Confirmed);
        assert_eq!(seen[0].note.as_deref(), Some("Payment captured"));
    }

    #[tokio::test]
    async fn test_unchanged_status_is_not_notified() {
        let recorder = Arc::new(RecordingNotifier::default());
        let notifier: SharedNotifier = recorder.clone();

        notify_if_moved(&notifier, &pending_order(), OrderStatus::Pending);
        settle().await;
        assert!(recorder.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_failing_notifier_does_not_propagate() {
        let notifier: SharedNotifier = Arc::new(BrokenNotifier);
        let mut order = pending_order();
        order.record_status(OrderStatus::Cancelled, Utc::now(), None);

        dispatch(&notifier, StatusNotification::for_order(&order, OrderStatus::Pending));
        settle().await;
    }
}
