//! # checkout-api
//!
//! HTTP API layer for checkout-engine.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - REST endpoints for the cart, orders and payments
//! - Razorpay webhook endpoint feeding the reconciliation listener
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET / DELETE | `/api/v1/cart` | Current cart / clear cart |
//! | POST | `/api/v1/cart/items` | Add item |
//! | PATCH / DELETE | `/api/v1/cart/items/{item_id}` | Update quantity / remove item |
//! | POST / GET | `/api/v1/orders` | Create order / list orders |
//! | GET | `/api/v1/orders/{order_id}` | Get order |
//! | POST | `/api/v1/orders/{order_id}/cancel` | Cancel order |
//! | POST | `/api/v1/payments/intent` | Create payment intent |
//! | POST | `/api/v1/payments/confirm` | Confirm client payment |
//! | PATCH | `/api/v1/admin/orders/{order_id}/status` | Change order status |
//! | POST | `/webhook/razorpay` | Razorpay webhook |

pub mod error;
pub mod handlers;
pub mod identity;
pub mod routes;
pub mod state;

pub use error::{ApiError, ErrorResponse};
pub use routes::create_router;
pub use state::{AppConfig, AppState, LogFormat};
