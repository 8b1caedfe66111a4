//! # Cart Types
//!
//! The cart is the mutable pre-order container for one owner. Line items
//! are unique per `(product_ref, variant)` and the subtotal is recomputed on
//! every mutation, so it always equals Σ(unit price × quantity).

use crate::error::{CheckoutError, CheckoutResult};
use crate::money::{Currency, Price};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound for a single line's quantity
pub const MAX_LINE_QUANTITY: u32 = 999;

/// Who a cart belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OwnerRef {
    /// Authenticated user
    User(String),
    /// Anonymous session token
    Session(String),
}

impl OwnerRef {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, OwnerRef::Session(_))
    }
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnerRef::User(id) => write!(f, "user:{}", id),
            OwnerRef::Session(token) => write!(f, "session:{}", token),
        }
    }
}

/// Product variant selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Variant {
    pub fn new(size: Option<&str>, color: Option<&str>) -> Self {
        Self {
            size: size.map(String::from),
            color: color.map(String::from),
        }
    }
}

/// Where a cart is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CartState {
    /// Accepting mutations
    #[default]
    Open,
    /// Frozen for order creation
    CheckingOut,
}

/// A line in the cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    pub product_ref: String,
    #[serde(default)]
    pub variant: Variant,
    pub quantity: u32,
    /// Price captured when the item was first added
    pub unit_price: Price,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl CartItem {
    pub fn line_total(&self) -> i64 {
        self.unit_price.times(self.quantity)
    }
}

/// Input for adding a line to a cart
#[derive(Debug, Clone)]
pub struct NewCartLine {
    pub product_ref: String,
    pub variant: Variant,
    pub quantity: u32,
    pub unit_price: Price,
    pub name: String,
    pub image: Option<String>,
}

/// A shopping cart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: String,
    pub owner: OwnerRef,
    items: Vec<CartItem>,
    subtotal: i64,
    pub currency: Currency,
    #[serde(default)]
    pub state: CartState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Cart {
    /// Create an empty cart expiring after `ttl`
    pub fn new(owner: OwnerRef, currency: Currency, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner,
            items: Vec::new(),
            subtotal: 0,
            currency,
            state: CartState::Open,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn subtotal(&self) -> i64 {
        self.subtotal
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_open(&self) -> bool {
        self.state == CartState::Open
    }

    pub fn item(&self, item_id: &str) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Add a line, merging into an existing `(product_ref, variant)` line.
    ///
    /// Returns the id of the affected line.
    pub fn add_line(&mut self, line: NewCartLine) -> CheckoutResult<String> {
        if line.product_ref.trim().is_empty() {
            return Err(CheckoutError::Validation(
                "product_ref must not be empty".to_string(),
            ));
        }
        if line.quantity == 0 {
            return Err(CheckoutError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }
        if line.unit_price.amount < 0 {
            return Err(CheckoutError::Validation(
                "unit price must not be negative".to_string(),
            ));
        }
        if line.unit_price.currency != self.currency {
            return Err(CheckoutError::Validation(format!(
                "price currency {} does not match cart currency {}",
                line.unit_price.currency, self.currency
            )));
        }

        let id = match self
            .items
            .iter_mut()
            .find(|i| i.product_ref == line.product_ref && i.variant == line.variant)
        {
            Some(existing) => {
                let merged = existing
                    .quantity
                    .checked_add(line.quantity)
                    .filter(|q| *q <= MAX_LINE_QUANTITY)
                    .ok_or_else(|| quantity_limit_error())?;
                existing.quantity = merged;
                existing.id.clone()
            }
            None => {
                if line.quantity > MAX_LINE_QUANTITY {
                    return Err(quantity_limit_error());
                }
                let item = CartItem {
                    id: Uuid::new_v4().to_string(),
                    product_ref: line.product_ref,
                    variant: line.variant,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    name: line.name,
                    image: line.image,
                };
                let id = item.id.clone();
                self.items.push(item);
                id
            }
        };

        self.recompute();
        Ok(id)
    }

    /// Set a line's quantity; zero or negative removes the line
    pub fn set_quantity(&mut self, item_id: &str, quantity: i64) -> CheckoutResult<()> {
        if quantity <= 0 {
            return self.remove_line(item_id);
        }
        let quantity = u32::try_from(quantity)
            .ok()
            .filter(|q| *q <= MAX_LINE_QUANTITY)
            .ok_or_else(quantity_limit_error)?;

        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| CheckoutError::not_found("Cart item", item_id))?;
        item.quantity = quantity;

        self.recompute();
        Ok(())
    }

    /// Remove a line
    pub fn remove_line(&mut self, item_id: &str) -> CheckoutResult<()> {
        let before = self.items.len();
        self.items.retain(|i| i.id != item_id);
        if self.items.len() == before {
            return Err(CheckoutError::not_found("Cart item", item_id));
        }
        self.recompute();
        Ok(())
    }

    /// Remove every line
    pub fn clear(&mut self) {
        self.items.clear();
        self.recompute();
    }

    /// Record activity and push the expiry forward
    pub fn touch(&mut self, ttl: Duration) {
        let now = Utc::now();
        self.updated_at = now;
        self.expires_at = now + ttl;
    }

    fn recompute(&mut self) {
        self.subtotal = self.items.iter().map(CartItem::line_total).sum();
    }
}

fn quantity_limit_error() -> CheckoutError {
    CheckoutError::Validation(format!(
        "quantity per line must not exceed {}",
        MAX_LINE_QUANTITY
    ))
}
