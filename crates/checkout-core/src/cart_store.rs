//! # Cart Store
//!
//! Persistence boundary for carts. All mutations for an owner run under the
//! store's write lock, so quantity increments are applied against the
//! persisted line, never against a caller's stale copy.
//!
//! Checkout is a two-step handoff: [`CartStore::begin_checkout`] freezes the
//! cart and returns the snapshot the order is built from, and
//! [`CartStore::retire`] deletes it once the order is persisted. Anything
//! that tries to mutate a frozen or retired cart gets `CartRetired`.
//!
//! Abandoned carts are dropped by [`spawn_expiry_sweep`], which calls
//! [`CartStore::purge_expired`] on a fixed interval.

use crate::cart::{Cart, CartState, NewCartLine, OwnerRef};
use crate::error::{CheckoutError, CheckoutResult};
use crate::money::Currency;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Cart persistence operations
#[async_trait]
pub trait CartStore: Send + Sync {
    /// The owner's live cart, if any. Expired carts read as absent.
    async fn get_cart(&self, owner: &OwnerRef) -> CheckoutResult<Option<Cart>>;

    /// Add a line, creating the cart on first add.
    ///
    /// `expected_cart_id` is the cart the client believes it is editing. If
    /// that cart has been checked out the call fails with `CartRetired`
    /// instead of silently starting a new cart.
    async fn add_item(
        &self,
        owner: &OwnerRef,
        expected_cart_id: Option<&str>,
        line: NewCartLine,
    ) -> CheckoutResult<Cart>;

    /// Set a line's quantity; zero or negative removes it
    async fn update_item_quantity(
        &self,
        owner: &OwnerRef,
        item_id: &str,
        quantity: i64,
    ) -> CheckoutResult<Cart>;

    /// Remove a line
    async fn remove_item(&self, owner: &OwnerRef, item_id: &str) -> CheckoutResult<Cart>;

    /// Remove every line from the owner's cart
    async fn clear(&self, owner: &OwnerRef) -> CheckoutResult<()>;

    /// Freeze the owner's cart for order creation and return its snapshot.
    /// Calling it again on a frozen cart returns the same snapshot.
    async fn begin_checkout(&self, owner: &OwnerRef) -> CheckoutResult<Cart>;

    /// Unfreeze a cart after order creation failed
    async fn release_checkout(&self, owner: &OwnerRef, cart_id: &str) -> CheckoutResult<()>;

    /// Delete a checked-out cart. Retiring an absent cart is a no-op.
    async fn retire(&self, owner: &OwnerRef, cart_id: &str) -> CheckoutResult<()>;

    /// Drop carts past their expiry, returning how many were removed.
    /// Retired-cart markers older than the TTL are dropped as well.
    async fn purge_expired(&self) -> CheckoutResult<usize>;
}

/// Shared cart store handle
pub type SharedCartStore = Arc<dyn CartStore>;

#[derive(Debug, Default)]
struct CartTable {
    carts: HashMap<OwnerRef, Cart>,
    /// Retired cart ids and when they were retired
    retired: HashMap<String, DateTime<Utc>>,
}

impl CartTable {
    /// Live cart for an owner, evicting it if expired
    fn live_mut(&mut self, owner: &OwnerRef) -> Option<&mut Cart> {
        let expired = self
            .carts
            .get(owner)
            .map(|c| c.is_expired(Utc::now()))
            .unwrap_or(false);
        if expired {
            if let Some(cart) = self.carts.remove(owner) {
                debug!(cart_id = %cart.id, owner = %owner, "evicted expired cart");
            }
            return None;
        }
        self.carts.get_mut(owner)
    }

    /// Live, open cart for a mutation
    fn open_mut(&mut self, owner: &OwnerRef) -> CheckoutResult<&mut Cart> {
        let cart = self
            .live_mut(owner)
            .ok_or_else(|| CheckoutError::not_found("Cart", owner.to_string()))?;
        if cart.state != CartState::Open {
            return Err(CheckoutError::CartRetired {
                cart_id: cart.id.clone(),
            });
        }
        Ok(cart)
    }
}

/// In-memory cart store
#[derive(Clone)]
pub struct InMemoryCartStore {
    table: Arc<RwLock<CartTable>>,
    currency: Currency,
    ttl: Duration,
}

impl InMemoryCartStore {
    /// Create a store whose carts use `currency` and expire after `ttl` of inactivity
    pub fn new(currency: Currency, ttl: Duration) -> Self {
        Self {
            table: Arc::new(RwLock::new(CartTable::default())),
            currency,
            ttl,
        }
    }

    /// Number of carts currently held (including expired ones not yet purged)
    pub async fn cart_count(&self) -> usize {
        self.table.read().await.carts.len()
    }
}

impl Default for InMemoryCartStore {
    fn default() -> Self {
        Self::new(Currency::default(), Duration::days(7))
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn get_cart(&self, owner: &OwnerRef) -> CheckoutResult<Option<Cart>> {
        let mut table = self.table.write().await;
        Ok(table.live_mut(owner).map(|c| c.clone()))
    }

    async fn add_item(
        &self,
        owner: &OwnerRef,
        expected_cart_id: Option<&str>,
        line: NewCartLine,
    ) -> CheckoutResult<Cart> {
        let mut table = self.table.write().await;

        if let Some(cart_id) = expected_cart_id {
            if table.retired.contains_key(cart_id) {
                return Err(CheckoutError::CartRetired {
                    cart_id: cart_id.to_string(),
                });
            }
        }

        let ttl = self.ttl;
        let currency = self.currency;
        let current_id = table.live_mut(owner).map(|c| c.id.clone());

        if let (Some(expected), Some(current)) = (expected_cart_id, current_id.as_deref()) {
            if expected != current {
                return Err(CheckoutError::not_found("Cart", expected));
            }
        }

        let cart = table
            .carts
            .entry(owner.clone())
            .or_insert_with(|| Cart::new(owner.clone(), currency, ttl));

        if cart.state != CartState::Open {
            return Err(CheckoutError::CartRetired {
                cart_id: cart.id.clone(),
            });
        }

        if let Err(e) = cart.add_line(line) {
            if cart.is_empty() && current_id.is_none() {
                table.carts.remove(owner);
            }
            return Err(e);
        }
        cart.touch(ttl);
        Ok(cart.clone())
    }

    async fn update_item_quantity(
        &self,
        owner: &OwnerRef,
        item_id: &str,
        quantity: i64,
    ) -> CheckoutResult<Cart> {
        let mut table = self.table.write().await;
        let cart = table.open_mut(owner)?;
        cart.set_quantity(item_id, quantity)?;
        cart.touch(self.ttl);
        Ok(cart.clone())
    }

    async fn remove_item(&self, owner: &OwnerRef, item_id: &str) -> CheckoutResult<Cart> {
        let mut table = self.table.write().await;
        let cart = table.open_mut(owner)?;
        cart.remove_line(item_id)?;
        cart.touch(self.ttl);
        Ok(cart.clone())
    }

    async fn clear(&self, owner: &OwnerRef) -> CheckoutResult<()> {
        let mut table = self.table.write().await;
        let cart = table.open_mut(owner)?;
        cart.clear();
        cart.touch(self.ttl);
        Ok(())
    }

    async fn begin_checkout(&self, owner: &OwnerRef) -> CheckoutResult<Cart> {
        let mut table = self.table.write().await;
        let cart = table
            .live_mut(owner)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| CheckoutError::EmptyCart {
                owner: owner.to_string(),
            })?;
        cart.state = CartState::CheckingOut;
        Ok(cart.clone())
    }

    async fn release_checkout(&self, owner: &OwnerRef, cart_id: &str) -> CheckoutResult<()> {
        let mut table = self.table.write().await;
        if let Some(cart) = table.carts.get_mut(owner) {
            if cart.id == cart_id {
                cart.state = CartState::Open;
            }
        }
        Ok(())
    }

    async fn retire(&self, owner: &OwnerRef, cart_id: &str) -> CheckoutResult<()> {
        let mut table = self.table.write().await;
        let matches = table
            .carts
            .get(owner)
            .map(|c| c.id == cart_id)
            .unwrap_or(false);
        if matches {
            table.carts.remove(owner);
        }
        table.retired.insert(cart_id.to_string(), Utc::now());
        Ok(())
    }

    async fn purge_expired(&self) -> CheckoutResult<usize> {
        let mut table = self.table.write().await;
        let now = Utc::now();
        let before = table.carts.len();
        table.carts.retain(|_, cart| !cart.is_expired(now));

        let ttl = self.ttl;
        table.retired.retain(|_, retired_at| *retired_at + ttl > now);
        Ok(before - table.carts.len())
    }
}

/// Purge expired carts every `every` until the task is aborted
pub fn spawn_expiry_sweep(carts: SharedCartStore, every: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match carts.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "expired carts purged"),
                Err(e) => warn!(error = %e, "cart expiry sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::Variant;
    use crate::money::Price;

    fn owner() -> OwnerRef {
        OwnerRef::User("u1".into())
    }

    fn line(product: &str, qty: u32) -> NewCartLine {
        NewCartLine {
            product_ref: product.to_string(),
            variant: Variant::default(),
            quantity: qty,
            unit_price: Price::from_minor(500, Currency::USD),
            name: product.to_string(),
            image: None,
        }
    }

    #[tokio::test]
    async fn test_first_add_creates_cart() {
        let store = InMemoryCartStore::default();
        assert!(store.get_cart(&owner()).await.unwrap().is_none());

        let cart = store.add_item(&owner(), None, line("p1", 2)).await.unwrap();
        assert_eq!(cart.subtotal(), 1000);
        assert_eq!(store.cart_count().await, 1);
    }

    #[tokio::test]
    async fn test_mutating_missing_cart_is_not_found() {
        let store = InMemoryCartStore::default();
        assert!(matches!(
            store.update_item_quantity(&owner(), "x", 1).await,
            Err(CheckoutError::NotFound { .. })
        ));
        assert!(matches!(
            store.clear(&owner()).await,
            Err(CheckoutError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_adds_do_not_lose_updates() {
        let store = InMemoryCartStore::default();
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.add_item(&owner(), None, line("p1", 1)).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let cart = store.get_cart(&owner()).await.unwrap().unwrap();
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 50);
        assert_eq!(cart.subtotal(), 50 * 500);
    }

    #[tokio::test]
    async fn test_frozen_cart_rejects_mutations() {
        let store = InMemoryCartStore::default();
        let cart = store.add_item(&owner(), None, line("p1", 1)).await.unwrap();
        let item_id = cart.items()[0].id.clone();

        let frozen = store.begin_checkout(&owner()).await.unwrap();
        assert_eq!(frozen.id, cart.id);

        assert!(matches!(
            store.add_item(&owner(), None, line("p2", 1)).await,
            Err(CheckoutError::CartRetired { .. })
        ));
        assert!(matches!(
            store.update_item_quantity(&owner(), &item_id, 3).await,
            Err(CheckoutError::CartRetired { .. })
        ));

        store.release_checkout(&owner(), &cart.id).await.unwrap();
        assert!(store.add_item(&owner(), None, line("p2", 1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_add_after_retire_fails_fast_for_stale_cart() {
        let store = InMemoryCartStore::default();
        let cart = store.add_item(&owner(), None, line("p1", 1)).await.unwrap();
        store.begin_checkout(&owner()).await.unwrap();
        store.retire(&owner(), &cart.id).await.unwrap();

        assert!(store.get_cart(&owner()).await.unwrap().is_none());
        assert!(matches!(
            store.add_item(&owner(), Some(&cart.id), line("p1", 1)).await,
            Err(CheckoutError::CartRetired { .. })
        ));

        // A fresh add without a stale cart id starts a new cart
        let fresh = store.add_item(&owner(), None, line("p1", 1)).await.unwrap();
        assert_ne!(fresh.id, cart.id);
    }

    #[tokio::test]
    async fn test_retire_is_idempotent() {
        let store = InMemoryCartStore::default();
        let cart = store.add_item(&owner(), None, line("p1", 1)).await.unwrap();
        store.retire(&owner(), &cart.id).await.unwrap();
        store.retire(&owner(), &cart.id).await.unwrap();
        store.retire(&owner(), "never-existed").await.unwrap();
        assert_eq!(store.cart_count().await, 0);
    }

    #[tokio::test]
    async fn test_begin_checkout_on_empty_cart() {
        let store = InMemoryCartStore::default();
        assert!(matches!(
            store.begin_checkout(&owner()).await,
            Err(CheckoutError::EmptyCart { .. })
        ));

        let cart = store.add_item(&owner(), None, line("p1", 1)).await.unwrap();
        store
            .remove_item(&owner(), &cart.items()[0].id)
            .await
            .unwrap();
        assert!(matches!(
            store.begin_checkout(&owner()).await,
            Err(CheckoutError::EmptyCart { .. })
        ));
    }

    #[tokio::test]
    async fn test_expired_carts_read_as_absent() {
        let store = InMemoryCartStore::new(Currency::USD, Duration::seconds(-1));
        store.add_item(&owner(), None, line("p1", 1)).await.unwrap();
        assert!(store.get_cart(&owner()).await.unwrap().is_none());

        store.add_item(&owner(), None, line("p1", 1)).await.unwrap();
        assert_eq!(store.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_drops_stale_retired_markers() {
        let store = InMemoryCartStore::new(Currency::USD, Duration::seconds(-1));
        store.retire(&owner(), "cart_old").await.unwrap();
        assert_eq!(store.table.read().await.retired.len(), 1);

        store.purge_expired().await.unwrap();
        assert!(store.table.read().await.retired.is_empty());
    }

    #[tokio::test]
    async fn test_purge_keeps_recent_retired_markers() {
        let store = InMemoryCartStore::default();
        let cart = store.add_item(&owner(), None, line("p1", 1)).await.unwrap();
        store.retire(&owner(), &cart.id).await.unwrap();
        store.purge_expired().await.unwrap();

        assert!(matches!(
            store.add_item(&owner(), Some(&cart.id), line("p1", 1)).await,
            Err(CheckoutError::CartRetired { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_sweep_removes_abandoned_carts() {
        let store = InMemoryCartStore::new(Currency::USD, Duration::seconds(-1));
        store.add_item(&owner(), None, line("p1", 1)).await.unwrap();
        store
            .add_item(&OwnerRef::Session("anon".into()), None, line("p2", 1))
            .await
            .unwrap();
        assert_eq!(store.cart_count().await, 2);

        let sweep = spawn_expiry_sweep(Arc::new(store.clone()), std::time::Duration::from_secs(60));
        tokio::time::sleep(std::time::Duration::from_secs(61)).await;

        assert_eq!(store.cart_count().await, 0);
        sweep.abort();
    }
}
