//! # Order Types
//!
//! An order is created once from a cart and never deleted. Its line items
//! and pricing are frozen at creation; only status, payment and
//! fulfillment change afterwards, through the lifecycle service and the
//! reconciliation listener.

use crate::cart::{Cart, CartItem, OwnerRef, Variant};
use crate::error::{CheckoutError, CheckoutResult};
use crate::money::Currency;
use crate::pricing::{OrderPricing, ShippingMethod};
use crate::status::{OrderStatus, PaymentStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the customer intends to pay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Card,
    Upi,
    NetBanking,
    Wallet,
    CashOnDelivery,
}

impl PaymentMethod {
    /// Paid through the gateway (as opposed to cash on delivery)
    pub fn is_online(&self) -> bool {
        !matches!(self, PaymentMethod::CashOnDelivery)
    }
}

/// Postal address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub full_name: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub state: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Address {
    /// Check required fields, naming the first missing one
    pub fn validate(&self, label: &str) -> CheckoutResult<()> {
        let required = [
            ("full_name", &self.full_name),
            ("line1", &self.line1),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CheckoutError::Validation(format!(
                    "{}.{} is required",
                    label, field
                )));
            }
        }
        Ok(())
    }
}

/// Who placed the order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderOwner {
    /// Cart owner the order was created for
    pub owner_ref: OwnerRef,
    /// Contact email; required for anonymous checkouts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_email: Option<String>,
}

impl OrderOwner {
    pub fn new(owner_ref: OwnerRef, guest_email: Option<String>) -> CheckoutResult<Self> {
        let guest_email = guest_email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        if let Some(email) = &guest_email {
            if !looks_like_email(email) {
                return Err(CheckoutError::Validation(format!(
                    "invalid guest email: {}",
                    email
                )));
            }
        }
        if owner_ref.is_anonymous() && guest_email.is_none() {
            return Err(CheckoutError::Validation(
                "guest checkout requires an email".to_string(),
            ));
        }
        Ok(Self {
            owner_ref,
            guest_email,
        })
    }

    pub fn is(&self, owner: &OwnerRef) -> bool {
        &self.owner_ref == owner
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

/// Frozen copy of a cart line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub product_ref: String,
    pub sku: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub variant: Variant,
    pub quantity: u32,
    pub unit_price: i64,
    pub line_total: i64,
}

impl OrderLineItem {
    pub fn from_cart_item(item: &CartItem) -> Self {
        Self {
            product_ref: item.product_ref.clone(),
            sku: derive_sku(&item.product_ref, &item.variant),
            name: item.name.clone(),
            image: item.image.clone(),
            variant: item.variant.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price.amount,
            line_total: item.line_total(),
        }
    }
}

/// SKU from product reference and variant, e.g. `TEE-CLASSIC-M-BLACK`
pub fn derive_sku(product_ref: &str, variant: &Variant) -> String {
    let parts = std::iter::once(product_ref)
        .chain(variant.size.as_deref())
        .chain(variant.color.as_deref());

    parts
        .map(|part| {
            part.trim()
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() {
                        c.to_ascii_uppercase()
                    } else {
                        '-'
                    }
                })
                .collect::<String>()
        })
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Payment details
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// Gateway correlation id (set when an intent is created)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_id: Option<String>,
}

/// Delivery details
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    pub method: ShippingMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

/// One accepted status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Everything the factory decided for a new order
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub order_number: String,
    pub owner: OrderOwner,
    pub pricing: OrderPricing,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub shipping_method: ShippingMethod,
    pub payment_method: PaymentMethod,
    pub note: Option<String>,
}

/// A placed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub owner: OrderOwner,
    pub source_cart_id: String,
    line_items: Vec<OrderLineItem>,
    pub pricing: OrderPricing,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment: PaymentInfo,
    pub fulfillment: Fulfillment,
    pub status: OrderStatus,
    status_history: Vec<StatusHistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Set when reconciliation saw something an operator should look at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_flag: Option<String>,
    /// Bumped by the store on every accepted write
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a pending order from a cart snapshot
    pub fn place(cart: &Cart, draft: OrderDraft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            order_number: draft.order_number,
            owner: draft.owner,
            source_cart_id: cart.id.clone(),
            line_items: cart.items().iter().map(OrderLineItem::from_cart_item).collect(),
            pricing: draft.pricing,
            shipping_address: draft.shipping_address,
            billing_address: draft.billing_address,
            payment: PaymentInfo {
                method: draft.payment_method,
                ..PaymentInfo::default()
            },
            fulfillment: Fulfillment {
                method: draft.shipping_method,
                ..Fulfillment::default()
            },
            status: OrderStatus::Pending,
            status_history: vec![StatusHistoryEntry {
                status: OrderStatus::Pending,
                timestamp: now,
                note: Some("Order placed".to_string()),
            }],
            note: draft.note,
            review_flag: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn line_items(&self) -> &[OrderLineItem] {
        &self.line_items
    }

    pub fn status_history(&self) -> &[StatusHistoryEntry] {
        &self.status_history
    }

    pub fn currency(&self) -> Currency {
        self.pricing.currency
    }

    pub fn item_count(&self) -> u32 {
        self.line_items.iter().map(|i| i.quantity).sum()
    }

    /// Move to `status` and append to the audit trail. Callers are
    /// responsible for checking the edge is allowed.
    pub(crate) fn record_status(
        &mut self,
        status: OrderStatus,
        at: DateTime<Utc>,
        note: Option<String>,
    ) {
        self.status = status;
        self.status_history.push(StatusHistoryEntry {
            status,
            timestamp: at,
            note,
        });
        self.updated_at = at;
    }

    /// Narrow read projection
    pub fn summary(&self) -> OrderSummary {
        OrderSummary {
            id: self.id.clone(),
            order_number: self.order_number.clone(),
            status: self.status,
            payment_status: self.payment.status,
            total: self.pricing.total,
            currency: self.pricing.currency,
            item_count: self.item_count(),
            created_at: self.created_at,
        }
    }
}

/// Listing view of an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total: i64,
    pub currency: Currency,
    pub item_count: u32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::cart::NewCartLine;
    use crate::money::Price;
    use chrono::Duration;

    pub fn address() -> Address {
        Address {
            full_name: "Asha Rao".into(),
            line1: "12 MG Road".into(),
            line2: None,
            city: "Bengaluru".into(),
            state: "KA".into(),
            postal_code: "560001".into(),
            country: "IN".into(),
            phone: None,
        }
    }

    pub fn cart_for(owner: OwnerRef) -> Cart {
        let mut cart = Cart::new(owner, Currency::INR, Duration::days(1));
        cart.add_line(NewCartLine {
            product_ref: "tee-classic".into(),
            variant: Variant::new(Some("M"), Some("black")),
            quantity: 2,
            unit_price: Price::from_minor(1_499, Currency::INR),
            name: "Classic Tee".into(),
            image: None,
        })
        .unwrap();
        cart
    }

    /// A pending order for `user:u1`
    pub fn pending_order() -> Order {
        let owner = OwnerRef::User("u1".into());
        let cart = cart_for(owner.clone());
        Order::place(
            &cart,
            OrderDraft {
                order_number: format!("ORD-TEST-{}", &Uuid::new_v4().simple().to_string()[..6]),
                owner: OrderOwner::new(owner, None).unwrap(),
                pricing: OrderPricing {
                    subtotal: 2_998,
                    discount: 0,
                    shipping_cost: 99,
                    tax: 540,
                    total: 3_637,
                    currency: Currency::INR,
                },
                shipping_address: address(),
                billing_address: address(),
                shipping_method: ShippingMethod::Standard,
                payment_method: PaymentMethod::Upi,
                note: None,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_derive_sku() {
        assert_eq!(
            derive_sku("tee-classic", &Variant::new(Some("M"), Some("black"))),
            "TEE-CLASSIC-M-BLACK"
        );
        assert_eq!(derive_sku("mug 01", &Variant::default()), "MUG-01");
        assert_eq!(derive_sku("cap", &Variant::new(None, Some(" "))), "CAP");
    }

    #[test]
    fn test_place_freezes_cart_lines() {
        let order = pending_order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment.status, PaymentStatus::Pending);
        assert_eq!(order.line_items().len(), 1);
        assert_eq!(order.line_items()[0].sku, "TEE-CLASSIC-M-BLACK");
        assert_eq!(order.line_items()[0].line_total, 2_998);
        assert_eq!(order.status_history().len(), 1);
        assert_eq!(order.item_count(), 2);
    }

    #[test]
    fn test_address_validation_names_field() {
        let mut address = address();
        address.postal_code = " ".into();
        let err = address.validate("shipping_address").unwrap_err();
        assert!(err.to_string().contains("shipping_address.postal_code"));
    }

    #[test]
    fn test_guest_requires_email() {
        let session = OwnerRef::Session("tok".into());
        assert!(OrderOwner::new(session.clone(), None).is_err());
        assert!(OrderOwner::new(session.clone(), Some("not-an-email".into())).is_err());
        assert!(OrderOwner::new(session, Some("guest@example.com".into())).is_ok());
        assert!(OrderOwner::new(OwnerRef::User("u".into()), None).is_ok());
    }

    #[test]
    fn test_summary_projection() {
        let order = pending_order();
        let summary = order.summary();
        assert_eq!(summary.id, order.id);
        assert_eq!(summary.total, 3_637);
        assert_eq!(summary.item_count, 2);
    }
}
