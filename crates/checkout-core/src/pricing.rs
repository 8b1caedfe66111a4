//! # Pricing
//!
//! Shipping and tax calculators used by the order factory. Rates, the
//! free-shipping threshold and the tax percentage are configuration
//! (`config/pricing.toml`), not literals, since they depend on jurisdiction
//! and store policy.

use crate::error::{CheckoutError, CheckoutResult};
use crate::money::Currency;
use serde::{Deserialize, Serialize};

/// Delivery method chosen at checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    #[default]
    Standard,
    Express,
    Pickup,
}

impl ShippingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingMethod::Standard => "standard",
            ShippingMethod::Express => "express",
            ShippingMethod::Pickup => "pickup",
        }
    }
}

impl std::fmt::Display for ShippingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat shipping rate per method, in minor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRates {
    pub standard: i64,
    pub express: i64,
    #[serde(default)]
    pub pickup: i64,
}

impl ShippingRates {
    pub fn rate_for(&self, method: ShippingMethod) -> i64 {
        match method {
            ShippingMethod::Standard => self.standard,
            ShippingMethod::Express => self.express,
            ShippingMethod::Pickup => self.pickup,
        }
    }
}

impl Default for ShippingRates {
    fn default() -> Self {
        Self {
            standard: 99,
            express: 249,
            pickup: 0,
        }
    }
}

/// How fractional tax is brought to a whole minor unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaxRounding {
    /// Any fraction rounds up
    #[default]
    Up,
    /// Half rounds away from zero
    Nearest,
    /// Fractions are dropped
    Down,
}

/// Store pricing policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default)]
    pub currency: Currency,
    /// Subtotal at or above which shipping is free (minor units)
    pub free_shipping_threshold: i64,
    #[serde(default)]
    pub shipping_rates: ShippingRates,
    /// Tax rate in basis points (1800 = 18%)
    pub tax_rate_bps: u32,
    #[serde(default)]
    pub tax_rounding: TaxRounding,
}

impl PricingConfig {
    /// Load from TOML string
    pub fn from_toml(toml_str: &str) -> CheckoutResult<Self> {
        let config: PricingConfig = toml::from_str(toml_str)
            .map_err(|e| CheckoutError::Configuration(format!("invalid pricing config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Builder: set the tax rate as a percentage (18.0 = 18%)
    pub fn with_tax_percent(mut self, percent: f64) -> Self {
        self.tax_rate_bps = (percent * 100.0).round() as u32;
        self
    }

    /// Builder: set the free-shipping threshold
    pub fn with_free_shipping_threshold(mut self, threshold: i64) -> Self {
        self.free_shipping_threshold = threshold;
        self
    }

    /// Builder: set the currency
    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn validate(&self) -> CheckoutResult<()> {
        if self.free_shipping_threshold < 0 {
            return Err(CheckoutError::Configuration(
                "free_shipping_threshold must not be negative".to_string(),
            ));
        }
        let rates = self.shipping_rates;
        if rates.standard < 0 || rates.express < 0 || rates.pickup < 0 {
            return Err(CheckoutError::Configuration(
                "shipping rates must not be negative".to_string(),
            ));
        }
        if self.tax_rate_bps > 10_000 {
            return Err(CheckoutError::Configuration(
                "tax rate must not exceed 100%".to_string(),
            ));
        }
        Ok(())
    }

    /// Shipping cost for a subtotal and method
    pub fn shipping_cost(&self, subtotal: i64, method: ShippingMethod) -> i64 {
        if subtotal >= self.free_shipping_threshold {
            0
        } else {
            self.shipping_rates.rate_for(method)
        }
    }

    /// Tax on a subtotal
    pub fn tax(&self, subtotal: i64) -> i64 {
        let scaled = i128::from(subtotal) * i128::from(self.tax_rate_bps);
        let whole = scaled / 10_000;
        let rem = scaled % 10_000;
        let tax = match self.tax_rounding {
            TaxRounding::Down => whole,
            TaxRounding::Up => whole + i128::from(rem > 0),
            TaxRounding::Nearest => whole + i128::from(rem >= 5_000),
        };
        tax as i64
    }

    /// Full price breakdown for an order
    pub fn quote(
        &self,
        subtotal: i64,
        discount: i64,
        method: ShippingMethod,
    ) -> CheckoutResult<OrderPricing> {
        if !(0..=subtotal).contains(&discount) {
            return Err(CheckoutError::Validation(format!(
                "discount {} must be between 0 and subtotal {}",
                discount, subtotal
            )));
        }
        let shipping_cost = self.shipping_cost(subtotal, method);
        let tax = self.tax(subtotal);
        Ok(OrderPricing {
            subtotal,
            discount,
            shipping_cost,
            tax,
            total: subtotal - discount + shipping_cost + tax,
            currency: self.currency,
        })
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            currency: Currency::default(),
            free_shipping_threshold: 50_000,
            shipping_rates: ShippingRates::default(),
            tax_rate_bps: 1_800,
            tax_rounding: TaxRounding::Up,
        }
    }
}

/// Price breakdown frozen onto an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPricing {
    pub subtotal: i64,
    pub discount: i64,
    pub shipping_cost: i64,
    pub tax: i64,
    pub total: i64,
    pub currency: Currency,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_quote() {
        let config = PricingConfig::default()
            .with_currency(Currency::INR)
            .with_tax_percent(18.0);
        let quote = config.quote(7_997, 0, ShippingMethod::Standard).unwrap();

        assert_eq!(quote.shipping_cost, 99);
        assert_eq!(quote.tax, 1_440);
        assert_eq!(quote.total, 9_536);
    }

    #[test]
    fn test_free_shipping_at_threshold() {
        let config = PricingConfig::default().with_free_shipping_threshold(10_000);
        assert_eq!(config.shipping_cost(9_999, ShippingMethod::Express), 249);
        assert_eq!(config.shipping_cost(10_000, ShippingMethod::Express), 0);
        assert_eq!(config.shipping_cost(100, ShippingMethod::Pickup), 0);
    }

    #[test]
    fn test_tax_rounding_modes() {
        let mut config = PricingConfig::default();
        // 7997 * 18% = 1439.46
        config.tax_rounding = TaxRounding::Down;
        assert_eq!(config.tax(7_997), 1_439);
        config.tax_rounding = TaxRounding::Nearest;
        assert_eq!(config.tax(7_997), 1_439);
        assert_eq!(config.tax(2_500), 450);
        config.tax_rounding = TaxRounding::Up;
        assert_eq!(config.tax(7_997), 1_440);
        assert_eq!(config.tax(2_500), 450);
    }

    #[test]
    fn test_discount_bounds() {
        let config = PricingConfig::default();
        assert!(config.quote(1_000, -1, ShippingMethod::Standard).is_err());
        assert!(config.quote(1_000, 1_001, ShippingMethod::Standard).is_err());

        let quote = config.quote(1_000, 200, ShippingMethod::Standard).unwrap();
        assert_eq!(quote.total, 1_000 - 200 + 99 + 180);
    }

    #[test]
    fn test_from_toml() {
        let config = PricingConfig::from_toml(
            r#"
            currency = "inr"
            free_shipping_threshold = 49900
            tax_rate_bps = 1800
            tax_rounding = "nearest"

            [shipping_rates]
            standard = 99
            express = 199
            "#,
        )
        .unwrap();
        assert_eq!(config.currency, Currency::INR);
        assert_eq!(config.shipping_rates.express, 199);
        assert_eq!(config.shipping_rates.pickup, 0);
        assert_eq!(config.tax_rounding, TaxRounding::Nearest);
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(PricingConfig::from_toml("free_shipping_threshold = -1\ntax_rate_bps = 0").is_err());
        assert!(PricingConfig::from_toml("free_shipping_threshold = 0\ntax_rate_bps = 20000").is_err());
    }
}
