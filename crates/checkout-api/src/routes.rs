//! # Routes
//!
//! Axum router configuration for the checkout API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Cart:
///   - GET    /api/v1/cart - Current cart
///   - DELETE /api/v1/cart - Clear cart
///   - POST   /api/v1/cart/items - Add item
///   - PATCH  /api/v1/cart/items/{item_id} - Update quantity
///   - DELETE /api/v1/cart/items/{item_id} - Remove item
///
/// - Orders:
///   - POST /api/v1/orders - Create order from cart
///   - GET  /api/v1/orders - List caller's orders
///   - GET  /api/v1/orders/{order_id} - Get order
///   - POST /api/v1/orders/{order_id}/cancel - Cancel order
///
/// - Payments:
///   - POST /api/v1/payments/intent - Create gateway intent
///   - POST /api/v1/payments/confirm - Verify client payment proof
///
/// - Admin:
///   - PATCH /api/v1/admin/orders/{order_id}/status - Change order status
///
/// - Webhooks:
///   - POST /webhook/razorpay - Razorpay webhook handler
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let cart_routes = Router::new()
        .route("/cart", get(handlers::get_cart).delete(handlers::clear_cart))
        .route("/cart/items", post(handlers::add_cart_item))
        .route(
            "/cart/items/{item_id}",
            patch(handlers::update_cart_item).delete(handlers::remove_cart_item),
        );

    let order_routes = Router::new()
        .route(
            "/orders",
            post(handlers::create_order).get(handlers::list_orders),
        )
        .route("/orders/{order_id}", get(handlers::get_order))
        .route("/orders/{order_id}/cancel", post(handlers::cancel_order));

    let payment_routes = Router::new()
        .route("/intent", post(handlers::create_payment_intent))
        .route("/confirm", post(handlers::confirm_payment));

    let admin_routes = Router::new().route(
        "/orders/{order_id}/status",
        patch(handlers::update_order_status),
    );

    let api_routes = Router::new()
        .merge(cart_routes)
        .merge(order_routes)
        .nest("/payments", payment_routes)
        .nest("/admin", admin_routes);

    // Webhook routes (must accept raw body)
    let webhook_routes = Router::new().route("/razorpay", post(handlers::razorpay_webhook));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api_routes)
        .nest("/webhook", webhook_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
