//! # Order Store
//!
//! Persistence boundary for orders. There is no implicit locking: every
//! mutation goes through [`OrderStore::replace_if`], a conditional write
//! that only succeeds while the stored order is still at the revision the
//! writer read. Each accepted write bumps [`Order::revision`]. A losing
//! writer gets the current order back and re-evaluates its change against
//! it ([`update_guarded`]).

use crate::cart::OwnerRef;
use crate::error::{CheckoutError, CheckoutResult};
use crate::order::Order;
use crate::status::{OrderStatus, PaymentStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Attempts made by [`update_guarded`] before giving up with `Conflict`
pub const MAX_WRITE_ATTEMPTS: usize = 3;

/// The state a conditional write expects to overwrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateGuard {
    pub revision: u64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
}

impl StateGuard {
    pub fn of(order: &Order) -> Self {
        Self {
            revision: order.revision,
            status: order.status,
            payment_status: order.payment.status,
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        *self == Self::of(order)
    }
}

/// Result of a conditional write
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    /// The write was applied
    Written,
    /// The guard no longer matched; carries the current order
    Stale(Box<Order>),
}

/// Order persistence operations
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order and return the stored one.
    ///
    /// If an order already exists for the same source cart, that order is
    /// returned unchanged. A taken order number fails with
    /// `DuplicateOrderNumber`.
    async fn insert(&self, order: Order) -> CheckoutResult<Order>;

    async fn get(&self, order_id: &str) -> CheckoutResult<Option<Order>>;

    async fn find_by_order_number(&self, order_number: &str) -> CheckoutResult<Option<Order>>;

    /// Resolve by the gateway's correlation id
    async fn find_by_gateway_order_id(&self, gateway_order_id: &str)
        -> CheckoutResult<Option<Order>>;

    async fn find_by_gateway_payment_id(
        &self,
        gateway_payment_id: &str,
    ) -> CheckoutResult<Option<Order>>;

    async fn find_by_source_cart(&self, cart_id: &str) -> CheckoutResult<Option<Order>>;

    /// Orders placed by an owner, newest first
    async fn list_for_owner(&self, owner: &OwnerRef) -> CheckoutResult<Vec<Order>>;

    /// Replace the stored order only if it still matches `expected`.
    ///
    /// The stored copy gets `expected.revision + 1`.
    async fn replace_if(&self, order: Order, expected: StateGuard) -> CheckoutResult<WriteOutcome>;
}

/// Shared order store handle
pub type SharedOrderStore = Arc<dyn OrderStore>;

/// What an [`update_guarded`] step decided
#[derive(Debug)]
pub enum Change<T> {
    /// Persist the modified order
    Write(T),
    /// Nothing to persist (already in the desired state)
    Unchanged(T),
}

impl<T> Change<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Change<U> {
        match self {
            Change::Write(value) => Change::Write(f(value)),
            Change::Unchanged(value) => Change::Unchanged(f(value)),
        }
    }
}

/// Apply `step` to an order with a conditional write, re-reading and
/// re-evaluating when another writer got there first.
///
/// `step` receives a working copy; it must decide purely from the copy's
/// current state so that re-evaluation after a lost race is correct.
pub async fn update_guarded<F, T>(
    store: &dyn OrderStore,
    initial: Order,
    mut step: F,
) -> CheckoutResult<(Order, T)>
where
    F: FnMut(&mut Order) -> CheckoutResult<Change<T>> + Send,
    T: Send,
{
    let mut current = initial;
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let guard = StateGuard::of(&current);
        let mut working = current.clone();
        let value = match step(&mut working)? {
            Change::Unchanged(value) => return Ok((current, value)),
            Change::Write(value) => value,
        };
        working.revision = guard.revision + 1;
        match store.replace_if(working.clone(), guard).await? {
            WriteOutcome::Written => return Ok((working, value)),
            WriteOutcome::Stale(latest) => {
                debug!(
                    order_id = %current.id,
                    attempt,
                    expected_revision = guard.revision,
                    actual_revision = latest.revision,
                    "conditional write lost, re-evaluating"
                );
                current = *latest;
            }
        }
    }
    Err(CheckoutError::Conflict {
        order_id: current.id,
    })
}

#[derive(Debug, Default)]
struct OrderTable {
    orders: HashMap<String, Order>,
    by_number: HashMap<String, String>,
    by_gateway_order: HashMap<String, String>,
    by_gateway_payment: HashMap<String, String>,
    by_cart: HashMap<String, String>,
}

impl OrderTable {
    fn index(&mut self, order: &Order) {
        self.by_number
            .insert(order.order_number.clone(), order.id.clone());
        self.by_cart
            .insert(order.source_cart_id.clone(), order.id.clone());
        if let Some(gid) = &order.payment.gateway_order_id {
            self.by_gateway_order.insert(gid.clone(), order.id.clone());
        }
        if let Some(pid) = &order.payment.gateway_payment_id {
            self.by_gateway_payment.insert(pid.clone(), order.id.clone());
        }
    }

    fn lookup(&self, index: &HashMap<String, String>, key: &str) -> Option<Order> {
        index.get(key).and_then(|id| self.orders.get(id)).cloned()
    }
}

/// In-memory order store
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    table: Arc<RwLock<OrderTable>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self) -> usize {
        self.table.read().await.orders.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> CheckoutResult<Order> {
        let mut table = self.table.write().await;

        if let Some(existing) = table.lookup(&table.by_cart, &order.source_cart_id) {
            return Ok(existing);
        }
        if table.by_number.contains_key(&order.order_number) {
            return Err(CheckoutError::DuplicateOrderNumber {
                order_number: order.order_number,
            });
        }

        table.index(&order);
        table.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn get(&self, order_id: &str) -> CheckoutResult<Option<Order>> {
        Ok(self.table.read().await.orders.get(order_id).cloned())
    }

    async fn find_by_order_number(&self, order_number: &str) -> CheckoutResult<Option<Order>> {
        let table = self.table.read().await;
        Ok(table.lookup(&table.by_number, order_number))
    }

    async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> CheckoutResult<Option<Order>> {
        let table = self.table.read().await;
        Ok(table.lookup(&table.by_gateway_order, gateway_order_id))
    }

    async fn find_by_gateway_payment_id(
        &self,
        gateway_payment_id: &str,
    ) -> CheckoutResult<Option<Order>> {
        let table = self.table.read().await;
        Ok(table.lookup(&table.by_gateway_payment, gateway_payment_id))
    }

    async fn find_by_source_cart(&self, cart_id: &str) -> CheckoutResult<Option<Order>> {
        let table = self.table.read().await;
        Ok(table.lookup(&table.by_cart, cart_id))
    }

    async fn list_for_owner(&self, owner: &OwnerRef) -> CheckoutResult<Vec<Order>> {
        let table = self.table.read().await;
        let mut orders: Vec<Order> = table
            .orders
            .values()
            .filter(|o| o.owner.is(owner))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn replace_if(
        &self,
        mut order: Order,
        expected: StateGuard,
    ) -> CheckoutResult<WriteOutcome> {
        let mut table = self.table.write().await;

        let stored = table
            .orders
            .get(&order.id)
            .ok_or_else(|| CheckoutError::not_found("Order", order.id.clone()))?;

        if !expected.matches(stored) {
            return Ok(WriteOutcome::Stale(Box::new(stored.clone())));
        }
        if stored.order_number != order.order_number || stored.line_items() != order.line_items()
        {
            return Err(CheckoutError::Internal(format!(
                "immutable fields changed on order {}",
                order.id
            )));
        }

        order.revision = stored.revision + 1;
        table.index(&order);
        table.orders.insert(order.id.clone(), order);
        Ok(WriteOutcome::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::fixtures::pending_order;

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = InMemoryOrderStore::new();
        let order = pending_order();
        store.insert(order.clone()).await.unwrap();

        assert_eq!(store.get(&order.id).await.unwrap().unwrap().id, order.id);
        assert!(store
            .find_by_order_number(&order.order_number)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_by_source_cart(&order.source_cart_id)
            .await
            .unwrap()
            .is_some());
        assert_eq!(
            store
                .list_for_owner(&order.owner.owner_ref)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_duplicate_order_number_rejected() {
        let store = InMemoryOrderStore::new();
        let first = pending_order();
        let mut second = pending_order();
        second.order_number = first.order_number.clone();

        store.insert(first).await.unwrap();
        assert!(matches!(
            store.insert(second).await,
            Err(CheckoutError::DuplicateOrderNumber { .. })
        ));
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_per_source_cart() {
        let store = InMemoryOrderStore::new();
        let first = pending_order();
        let mut retry = pending_order();
        retry.source_cart_id = first.source_cart_id.clone();

        let stored_first = store.insert(first.clone()).await.unwrap();
        let stored_retry = store.insert(retry).await.unwrap();
        assert_eq!(stored_first.id, stored_retry.id);
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_replace_if_rejects_stale_guard() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(pending_order()).await.unwrap();
        let guard = StateGuard::of(&order);

        let mut confirmed = order.clone();
        confirmed.status = OrderStatus::Confirmed;
        assert!(matches!(
            store.replace_if(confirmed, guard).await.unwrap(),
            WriteOutcome::Written
        ));

        let mut cancelled = order.clone();
        cancelled.status = OrderStatus::Cancelled;
        match store.replace_if(cancelled, guard).await.unwrap() {
            WriteOutcome::Stale(current) => assert_eq!(current.status, OrderStatus::Confirmed),
            WriteOutcome::Written => panic!("stale write must not apply"),
        }
    }

    #[tokio::test]
    async fn test_replace_if_rejects_same_status_write_at_old_revision() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(pending_order()).await.unwrap();
        let guard = StateGuard::of(&order);

        let mut first = order.clone();
        first.payment.gateway_order_id = Some("order_A".into());
        assert!(matches!(
            store.replace_if(first, guard).await.unwrap(),
            WriteOutcome::Written
        ));

        // Same status and payment status, but the revision moved on
        let mut second = order.clone();
        second.payment.gateway_order_id = Some("order_B".into());
        match store.replace_if(second, guard).await.unwrap() {
            WriteOutcome::Stale(current) => {
                assert_eq!(current.revision, 1);
                assert_eq!(current.payment.gateway_order_id.as_deref(), Some("order_A"));
            }
            WriteOutcome::Written => panic!("write at an old revision must not apply"),
        }
    }

    #[tokio::test]
    async fn test_gateway_indexes_follow_writes() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(pending_order()).await.unwrap();

        let mut updated = order.clone();
        updated.payment.gateway_order_id = Some("order_G1".into());
        store
            .replace_if(updated, StateGuard::of(&order))
            .await
            .unwrap();

        let found = store.find_by_gateway_order_id("order_G1").await.unwrap();
        assert_eq!(found.unwrap().id, order.id);
    }

    #[tokio::test]
    async fn test_update_guarded_reevaluates_after_lost_race() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(pending_order()).await.unwrap();

        // Another writer confirms the order behind our back
        let mut confirmed = order.clone();
        confirmed.status = OrderStatus::Confirmed;
        store
            .replace_if(confirmed, StateGuard::of(&order))
            .await
            .unwrap();

        let mut seen = Vec::new();
        let (result, _) = update_guarded(&store, order, |o| {
            seen.push(o.status);
            if o.status == OrderStatus::Pending {
                o.status = OrderStatus::Cancelled;
                Ok(Change::Write(()))
            } else {
                Ok(Change::Unchanged(()))
            }
        })
        .await
        .unwrap();

        assert_eq!(seen, vec![OrderStatus::Pending, OrderStatus::Confirmed]);
        assert_eq!(result.status, OrderStatus::Confirmed);
    }
}
