//! # Request Handlers
//!
//! Axum request handlers for the checkout API.
//! Handlers only translate between HTTP and the checkout-core services;
//! every rule about carts, orders and payments lives in those services.

use crate::error::{ApiError, ApiResult};
use crate::identity::{Admin, Caller};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use checkout_core::{
    Address, Cart, CheckoutError, ClientPaymentProof, NewCartLine, Order, OrderStatus,
    PaymentIntent, PaymentMethod, PlaceOrder, ProofOutcome, ReconcileOutcome, ShipmentDetails,
    ShippingMethod, StatusChange, Variant,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";
pub const EVENT_ID_HEADER: &str = "x-razorpay-event-id";

// =============================================================================
// Request/Response Types
// =============================================================================

/// Add-to-cart request. Name, image and price come from the catalog.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_ref: String,
    #[serde(default)]
    pub variant: Variant,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// The cart the client believes it is editing
    #[serde(default)]
    pub cart_id: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    /// Zero or negative removes the line
    pub quantity: i64,
}

/// Cart response; `cart` is null when the caller has no live cart
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub cart: Option<Cart>,
}

/// Create order request.
///
/// There is no discount field: discounts are decided server-side, and an
/// unknown `discount` key in the body is ignored.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub guest_email: Option<String>,
    pub shipping_address: Address,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub shipping_method: ShippingMethod,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub order_id: String,
}

/// Operator status update
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub new_status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub tracking_url: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<DateTime<Utc>>,
}

impl UpdateStatusRequest {
    fn into_change(self) -> StatusChange {
        let mut change = StatusChange::to(self.new_status).with_shipment(ShipmentDetails {
            carrier: self.carrier,
            tracking_number: self.tracking_number,
            tracking_url: self.tracking_url,
            estimated_delivery: self.estimated_delivery,
        });
        if let Some(note) = self.note.filter(|n| !n.trim().is_empty()) {
            change = change.with_note(note);
        }
        change
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub outcome: ReconcileOutcome,
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "checkout-engine",
        "version": env!("CARGO_PKG_VERSION"),
        "payment_provider": state.gateway.provider_name()
    }))
}

// -----------------------------------------------------------------------------
// Cart
// -----------------------------------------------------------------------------

/// Get the caller's cart
pub async fn get_cart(
    State(state): State<AppState>,
    Caller(owner): Caller,
) -> ApiResult<Json<CartResponse>> {
    let cart = state.carts.get_cart(&owner).await?;
    Ok(Json(CartResponse { cart }))
}

/// Add an item, snapshotting the catalog price at add time
#[instrument(skip(state, request), fields(owner = %owner, product_ref = %request.product_ref))]
pub async fn add_cart_item(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Json(request): Json<AddItemRequest>,
) -> ApiResult<Json<CartResponse>> {
    if request.product_ref.trim().is_empty() {
        return Err(CheckoutError::Validation("product_ref is required".to_string()).into());
    }

    let product = state.catalog.product(&request.product_ref).await?;
    let line = NewCartLine {
        product_ref: product.product_ref,
        variant: request.variant,
        quantity: request.quantity,
        unit_price: product.price,
        name: product.name,
        image: product.image,
    };

    let cart = state
        .carts
        .add_item(&owner, request.cart_id.as_deref(), line)
        .await?;
    Ok(Json(CartResponse { cart: Some(cart) }))
}

/// Set a line's quantity
pub async fn update_cart_item(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(item_id): Path<String>,
    Json(request): Json<UpdateQuantityRequest>,
) -> ApiResult<Json<CartResponse>> {
    let cart = state
        .carts
        .update_item_quantity(&owner, &item_id, request.quantity)
        .await?;
    Ok(Json(CartResponse { cart: Some(cart) }))
}

/// Remove a line
pub async fn remove_cart_item(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(item_id): Path<String>,
) -> ApiResult<Json<CartResponse>> {
    let cart = state.carts.remove_item(&owner, &item_id).await?;
    Ok(Json(CartResponse { cart: Some(cart) }))
}

/// Empty the cart
pub async fn clear_cart(
    State(state): State<AppState>,
    Caller(owner): Caller,
) -> ApiResult<StatusCode> {
    state.carts.clear(&owner).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Orders
// -----------------------------------------------------------------------------

/// Create an order from the caller's cart
#[instrument(skip(state, request), fields(owner = %owner))]
pub async fn create_order(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    let order = state
        .factory
        .create_order(PlaceOrder {
            owner,
            guest_email: request.guest_email,
            shipping_address: request.shipping_address,
            billing_address: request.billing_address,
            shipping_method: request.shipping_method,
            payment_method: request.payment_method,
            note: request.note,
            discount: 0,
        })
        .await?;

    info!(
        order_id = %order.id,
        order_number = %order.order_number,
        total = order.pricing.total,
        "order placed"
    );
    Ok((StatusCode::CREATED, Json(order)))
}

/// List the caller's orders
pub async fn list_orders(
    State(state): State<AppState>,
    Caller(owner): Caller,
) -> ApiResult<impl IntoResponse> {
    let orders = state.lifecycle.list_for_owner(&owner).await?;
    Ok(Json(serde_json::json!({
        "count": orders.len(),
        "orders": orders
    })))
}

/// Get one of the caller's orders
pub async fn get_order(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(order_id): Path<String>,
) -> ApiResult<Json<Order>> {
    let order = state.lifecycle.get_for_owner(&order_id, &owner).await?;
    Ok(Json(order))
}

/// Customer cancel. The body is optional.
pub async fn cancel_order(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(order_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Order>> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        CancelOrderRequest::default()
    } else {
        serde_json::from_slice::<CancelOrderRequest>(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid cancel request: {}", e)))?
    };

    let order = state
        .lifecycle
        .cancel(&order_id, &owner, request.reason)
        .await?;
    Ok(Json(order))
}

// -----------------------------------------------------------------------------
// Payments
// -----------------------------------------------------------------------------

/// Register the order with the gateway and hand the client what it needs to pay
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Json(request): Json<CreateIntentRequest>,
) -> ApiResult<Json<PaymentIntent>> {
    let intent = state
        .payments
        .create_intent(&request.order_id, &owner)
        .await?;
    Ok(Json(intent))
}

/// Check the client's payment proof
pub async fn confirm_payment(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Json(proof): Json<ClientPaymentProof>,
) -> ApiResult<Json<Order>> {
    match state.payments.confirm_client_payment(proof, &owner).await? {
        ProofOutcome::Verified(order) => Ok(Json(order)),
        ProofOutcome::Rejected(order) => {
            warn!(order_id = %order.id, "client payment proof rejected");
            Err(CheckoutError::SignatureVerification.into())
        }
    }
}

// -----------------------------------------------------------------------------
// Admin
// -----------------------------------------------------------------------------

/// Operator status change, including shipment details
#[instrument(skip(state, _admin, request), fields(target = %request.new_status))]
pub async fn update_order_status(
    State(state): State<AppState>,
    _admin: Admin,
    Path(order_id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> ApiResult<Json<Order>> {
    let order = state
        .lifecycle
        .transition(&order_id, request.into_change())
        .await?;
    Ok(Json(order))
}

// -----------------------------------------------------------------------------
// Webhooks
// -----------------------------------------------------------------------------

/// Handle Razorpay webhook
#[instrument(skip(state, headers, body), fields(event_id = tracing::field::Empty))]
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing X-Razorpay-Signature header".to_string()))?;

    if let Some(event_id) = headers.get(EVENT_ID_HEADER).and_then(|v| v.to_str().ok()) {
        tracing::Span::current().record("event_id", event_id);
    }

    let outcome = state
        .listener
        .handle(&body, signature)
        .await
        .map_err(ApiError::webhook)?;

    info!(outcome = ?outcome, "webhook processed");
    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}
