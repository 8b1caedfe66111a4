//! # checkout-core
//!
//! Core types and services for the checkout-engine order pipeline.
//!
//! This crate provides:
//! - `Cart` and `CartStore` for the per-owner pre-order cart
//! - `OrderFactory` for turning a cart into a pending `Order`
//! - `OrderStatus` transitions and the `OrderLifecycle` service
//! - `PaymentGateway` trait, `PaymentService` and `ReconciliationListener`
//!   for taking payments and applying gateway webhooks
//! - `CheckoutError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use checkout_core::{OrderFactory, PaymentService, PlaceOrder, ReconciliationListener};
//!
//! // Freeze the cart and create a pending order
//! let order = factory.create_order(request).await?;
//!
//! // Register the order with the gateway; the client pays against it
//! let intent = payments.create_intent(&order.id, &owner).await?;
//!
//! // Later, the gateway's webhook confirms the order
//! let outcome = listener.handle(&raw_body, &signature_header).await?;
//! ```

pub mod cart;
pub mod cart_store;
pub mod catalog;
pub mod error;
pub mod factory;
pub mod gateway;
pub mod lifecycle;
pub mod money;
pub mod notify;
pub mod order;
pub mod order_store;
pub mod payments;
pub mod pricing;
pub mod reconcile;
pub mod status;

// Re-exports for convenience
pub use cart::{Cart, CartItem, CartState, NewCartLine, OwnerRef, Variant, MAX_LINE_QUANTITY};
pub use cart_store::{spawn_expiry_sweep, CartStore, InMemoryCartStore, SharedCartStore};
pub use catalog::{Catalog, CatalogEntry, ProductSnapshot, SharedCatalog, StaticCatalog};
pub use error::{CheckoutError, CheckoutResult};
pub use factory::{OrderFactory, OrderNumberSource, PlaceOrder, RandomOrderNumbers};
pub use gateway::{
    GatewayEvent, GatewayEventKind, InMemoryGateway, PaymentGateway, PaymentIntentRef,
    SharedGateway,
};
pub use lifecycle::{apply_transition, OrderLifecycle, ShipmentDetails, StatusChange};
pub use money::{format_amount, Currency, Price};
pub use notify::{LoggingNotifier, Notifier, SharedNotifier, StatusNotification};
pub use order::{
    Address, Fulfillment, Order, OrderLineItem, OrderOwner, OrderSummary, PaymentInfo,
    PaymentMethod, StatusHistoryEntry,
};
pub use order_store::{InMemoryOrderStore, OrderStore, SharedOrderStore, StateGuard};
pub use payments::{ClientPaymentProof, PaymentIntent, PaymentService, ProofOutcome};
pub use pricing::{OrderPricing, PricingConfig, ShippingMethod, ShippingRates, TaxRounding};
pub use reconcile::{ReconcileOutcome, ReconciliationListener};
pub use status::{OrderStatus, PaymentStatus};
