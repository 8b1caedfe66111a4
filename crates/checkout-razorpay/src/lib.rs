//! # checkout-razorpay
//!
//! Razorpay payment gateway for checkout-engine.
//!
//! The flow is create-order-then-pay:
//!
//! 1. **Intent** - `RazorpayGateway::create_payment_intent` registers the
//!    order with the Razorpay Orders API and returns its `order_...` id
//! 2. **Client proof** - after paying in the browser widget the client
//!    posts back `razorpay_payment_id` and `razorpay_signature`, checked
//!    with the key secret
//! 3. **Webhooks** - `payment.captured`, `order.paid`, `payment.failed`
//!    and `refund.created`, checked with the webhook secret against the
//!    raw body
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use checkout_razorpay::RazorpayGateway;
//! use checkout_core::{PaymentService, SharedGateway};
//!
//! // Create gateway from environment
//! let gateway: SharedGateway = Arc::new(RazorpayGateway::from_env()?);
//!
//! let payments = PaymentService::new(orders, gateway.clone(), notifier);
//! let intent = payments.create_intent(&order_id, &owner).await?;
//!
//! // Hand intent.gateway_order_id and intent.gateway_public_key to the client
//! ```

pub mod config;
pub mod gateway;
pub mod signature;
pub mod webhook;

// Re-exports
pub use config::RazorpayConfig;
pub use gateway::RazorpayGateway;
pub use webhook::REQUIRED_WEBHOOK_EVENTS;
