//! # Catalog Boundary
//!
//! The catalog is an external collaborator. The cart only asks it for a
//! product's display data and current price at add-to-cart time; the price
//! is snapshotted into the cart line and never re-fetched.
//!
//! `StaticCatalog` is a TOML-backed implementation loaded from
//! `config/products.toml`.

use crate::error::{CheckoutError, CheckoutResult};
use crate::money::Price;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What the cart needs to know about a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Product reference (catalog id)
    pub product_ref: String,
    /// Display name
    pub name: String,
    /// Optional image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Current price
    pub price: Price,
}

/// Lookup of product data by reference
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve a product. Unknown or inactive products are `NotFound`.
    async fn product(&self, product_ref: &str) -> CheckoutResult<ProductSnapshot>;
}

/// Shared catalog handle
pub type SharedCatalog = Arc<dyn Catalog>;

/// A product entry in `products.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Product catalog held in memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticCatalog {
    #[serde(default)]
    pub products: Vec<CatalogEntry>,
}

impl StaticCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a product
    pub fn with_product(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        price: Price,
    ) -> Self {
        self.products.push(CatalogEntry {
            id: id.into(),
            name: name.into(),
            price,
            image_url: None,
            active: true,
        });
        self
    }

    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Number of active products
    pub fn active_count(&self) -> usize {
        self.products.iter().filter(|p| p.active).count()
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn product(&self, product_ref: &str) -> CheckoutResult<ProductSnapshot> {
        self.products
            .iter()
            .find(|p| p.id == product_ref && p.active)
            .map(|p| ProductSnapshot {
                product_ref: p.id.clone(),
                name: p.name.clone(),
                image: p.image_url.clone(),
                price: p.price,
            })
            .ok_or_else(|| CheckoutError::not_found("Product", product_ref))
    }
}
