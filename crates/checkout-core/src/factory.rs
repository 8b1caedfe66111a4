//! # Order Factory
//!
//! Turns an owner's cart into a pending order. The cart is frozen first so
//! that nothing can be added while the order is built, and it is retired
//! only after the order is stored. A retry after a failure part-way
//! through finds the stored order by its source cart and returns it instead
//! of creating a second one.

use crate::cart::{Cart, OwnerRef};
use crate::cart_store::SharedCartStore;
use crate::error::{CheckoutError, CheckoutResult};
use crate::order::{Address, Order, OrderDraft, OrderOwner, PaymentMethod};
use crate::order_store::SharedOrderStore;
use crate::pricing::{PricingConfig, ShippingMethod};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Order number attempts before giving up
pub const MAX_ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Produces human-readable order numbers
pub trait OrderNumberSource: Send + Sync {
    fn next_number(&self, at: DateTime<Utc>) -> String;
}

/// `ORD-YYMMDD-XXXXXX` with a random suffix
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomOrderNumbers;

impl OrderNumberSource for RandomOrderNumbers {
    fn next_number(&self, at: DateTime<Utc>) -> String {
        let suffix = Uuid::new_v4().simple().to_string()[..6].to_ascii_uppercase();
        format!("ORD-{}-{}", at.format("%y%m%d"), suffix)
    }
}

/// Checkout request. `discount` is decided server-side, never taken from
/// the client.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub owner: OwnerRef,
    pub guest_email: Option<String>,
    pub shipping_address: Address,
    /// Defaults to the shipping address
    pub billing_address: Option<Address>,
    pub shipping_method: ShippingMethod,
    pub payment_method: PaymentMethod,
    pub note: Option<String>,
    pub discount: i64,
}

/// Creates orders from carts
#[derive(Clone)]
pub struct OrderFactory {
    carts: SharedCartStore,
    orders: SharedOrderStore,
    pricing: PricingConfig,
    numbers: Arc<dyn OrderNumberSource>,
}

impl OrderFactory {
    pub fn new(carts: SharedCartStore, orders: SharedOrderStore, pricing: PricingConfig) -> Self {
        Self {
            carts,
            orders,
            pricing,
            numbers: Arc::new(RandomOrderNumbers),
        }
    }

    /// Builder: replace the order number generator
    pub fn with_number_source(mut self, numbers: Arc<dyn OrderNumberSource>) -> Self {
        self.numbers = numbers;
        self
    }

    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    /// Create a pending order from the requester's cart
    #[instrument(skip(self, request), fields(owner = %request.owner))]
    pub async fn create_order(&self, request: PlaceOrder) -> CheckoutResult<Order> {
        let owner = OrderOwner::new(request.owner.clone(), request.guest_email.clone())?;
        request.shipping_address.validate("shipping_address")?;
        let billing_address = request
            .billing_address
            .clone()
            .unwrap_or_else(|| request.shipping_address.clone());
        billing_address.validate("billing_address")?;

        let cart = self.carts.begin_checkout(&request.owner).await?;

        if let Some(existing) = self.orders.find_by_source_cart(&cart.id).await? {
            info!(
                order_id = %existing.id,
                cart_id = %cart.id,
                "order already exists for cart, completing handoff"
            );
            self.carts.retire(&request.owner, &cart.id).await?;
            return Ok(existing);
        }

        let draft = OrderDraftParts {
            owner,
            billing_address,
            request: &request,
        };
        match self.persist(&cart, draft).await {
            Ok(order) => {
                self.carts.retire(&request.owner, &cart.id).await?;
                info!(
                    order_id = %order.id,
                    order_number = %order.order_number,
                    total = order.pricing.total,
                    items = order.line_items().len(),
                    "order created"
                );
                Ok(order)
            }
            Err(e) => {
                if let Err(release_err) = self.carts.release_checkout(&request.owner, &cart.id).await {
                    warn!(cart_id = %cart.id, error = %release_err, "failed to release cart");
                }
                Err(e)
            }
        }
    }

    async fn persist(&self, cart: &Cart, parts: OrderDraftParts<'_>) -> CheckoutResult<Order> {
        if cart.currency != self.pricing.currency {
            return Err(CheckoutError::Validation(format!(
                "cart currency {} does not match store currency {}",
                cart.currency, self.pricing.currency
            )));
        }
        let pricing = self.pricing.quote(
            cart.subtotal(),
            parts.request.discount,
            parts.request.shipping_method,
        )?;

        for attempt in 1..=MAX_ORDER_NUMBER_ATTEMPTS {
            let draft = OrderDraft {
                order_number: self.numbers.next_number(Utc::now()),
                owner: parts.owner.clone(),
                pricing,
                shipping_address: parts.request.shipping_address.clone(),
                billing_address: parts.billing_address.clone(),
                shipping_method: parts.request.shipping_method,
                payment_method: parts.request.payment_method,
                note: parts.request.note.clone(),
            };
            match self.orders.insert(Order::place(cart, draft)).await {
                Ok(order) => return Ok(order),
                Err(CheckoutError::DuplicateOrderNumber { order_number }) => {
                    warn!(order_number = %order_number, attempt, "order number collision, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(CheckoutError::Internal(format!(
            "no unique order number after {} attempts",
            MAX_ORDER_NUMBER_ATTEMPTS
        )))
    }
}

struct OrderDraftParts<'a> {
    owner: OrderOwner,
    billing_address: Address,
    request: &'a PlaceOrder,
}
