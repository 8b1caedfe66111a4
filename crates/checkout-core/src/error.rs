//! # Checkout Error Types
//!
//! Typed error handling for cart, order and payment operations.
//! All fallible operations return `Result<T, CheckoutError>`.

use thiserror::Error;

/// Core error type for checkout operations
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Invalid input (bad quantity, missing address field, currency mismatch)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Cart, cart item or order does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Checkout attempted with no cart or an empty cart
    #[error("Cart is empty for {owner}")]
    EmptyCart { owner: String },

    /// Cart already handed off to an order
    #[error("Cart {cart_id} has already been checked out")]
    CartRetired { cart_id: String },

    /// Status edge not present in the transition table
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// User cancel requested from a status that does not allow it
    #[error("Order cannot be cancelled while {status}")]
    NotCancellable { status: String },

    /// Payment intent requested for an order that is already paid
    #[error("Payment already completed for order {order_id}")]
    PaymentAlreadyCompleted { order_id: String },

    /// Payment proof or webhook signature did not verify.
    /// Deliberately carries no detail about which part mismatched.
    #[error("Signature verification failed")]
    SignatureVerification,

    /// Gateway call exceeded the caller-supplied timeout
    #[error("Payment gateway timed out during {operation} after {timeout_ms}ms")]
    GatewayTimeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// Gateway answered with an error
    #[error("Gateway error [{provider}]: {message}")]
    Gateway { provider: String, message: String },

    /// Webhook payload could not be parsed after signature verification
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Conditional write kept losing against concurrent writers
    #[error("Concurrent update conflict on order {order_id}")]
    Conflict { order_id: String },

    /// Order number already taken (retried by the factory)
    #[error("Order number {order_number} already exists")]
    DuplicateOrderNumber { order_number: String },

    /// Configuration errors (missing keys, unreadable files)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CheckoutError {
    /// Convenience constructor for [`CheckoutError::NotFound`]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CheckoutError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Returns true if the caller may retry the same request later.
    ///
    /// Gateway timeouts are retryable by the caller only; the adapter never
    /// retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckoutError::GatewayTimeout { .. }
                | CheckoutError::Gateway { .. }
                | CheckoutError::Conflict { .. }
        )
    }

    /// Returns true if the message is safe and useful to show an end user
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            CheckoutError::Internal(_)
                | CheckoutError::Configuration(_)
                | CheckoutError::DuplicateOrderNumber { .. }
                | CheckoutError::WebhookParse(_)
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            CheckoutError::Validation(_) => 400,
            CheckoutError::NotFound { .. } => 404,
            CheckoutError::EmptyCart { .. } => 422,
            CheckoutError::CartRetired { .. } => 409,
            CheckoutError::InvalidTransition { .. } => 409,
            CheckoutError::NotCancellable { .. } => 409,
            CheckoutError::PaymentAlreadyCompleted { .. } => 409,
            CheckoutError::SignatureVerification => 401,
            CheckoutError::GatewayTimeout { .. } => 504,
            CheckoutError::Gateway { .. } => 502,
            CheckoutError::WebhookParse(_) => 400,
            CheckoutError::Conflict { .. } => 409,
            CheckoutError::DuplicateOrderNumber { .. } => 500,
            CheckoutError::Configuration(_) => 500,
            CheckoutError::Internal(_) => 500,
        }
    }
}

/// Result type alias for checkout operations
pub type CheckoutResult<T> = Result<T, CheckoutError>;
