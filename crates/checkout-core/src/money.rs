//! # Money Types
//!
//! Currency and price types. Amounts are always held in the smallest
//! currency unit (cents, paise) as `i64`.

use serde::{Deserialize, Serialize};

/// Supported currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    #[default]
    USD,
    EUR,
    GBP,
    INR,
    JPY,
    CAD,
    AUD,
}

impl Currency {
    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::USD => "usd",
            Currency::EUR => "eur",
            Currency::GBP => "gbp",
            Currency::INR => "inr",
            Currency::JPY => "jpy",
            Currency::CAD => "cad",
            Currency::AUD => "aud",
        }
    }

    /// Parse a case-insensitive ISO code
    pub fn parse(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "usd" => Some(Currency::USD),
            "eur" => Some(Currency::EUR),
            "gbp" => Some(Currency::GBP),
            "inr" => Some(Currency::INR),
            "jpy" => Some(Currency::JPY),
            "cad" => Some(Currency::CAD),
            "aud" => Some(Currency::AUD),
            _ => None,
        }
    }

    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u8 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Convert from smallest unit back to decimal
    pub fn from_smallest_unit(&self, amount: i64) -> f64 {
        let divisor = 10_f64.powi(self.decimal_places() as i32);
        amount as f64 / divisor
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

/// Price with amount in smallest currency unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in smallest currency unit
    pub amount: i64,
    /// Currency
    pub currency: Currency,
}

impl Price {
    /// Create a price from smallest unit
    pub fn from_minor(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Multiply by a quantity
    pub fn times(&self, quantity: u32) -> i64 {
        self.amount * i64::from(quantity)
    }

    /// Format for display (e.g., "$10.00")
    pub fn display(&self) -> String {
        format_amount(self.amount, self.currency)
    }
}

/// Format a minor-unit amount with its currency symbol
pub fn format_amount(amount: i64, currency: Currency) -> String {
    let symbol = match currency {
        Currency::USD => "$",
        Currency::EUR => "€",
        Currency::GBP => "£",
        Currency::INR => "₹",
        Currency::JPY => "¥",
        Currency::CAD => "C$",
        Currency::AUD => "A$",
    };
    if currency.decimal_places() == 0 {
        format!("{}{}", symbol, amount)
    } else {
        format!("{}{:.2}", symbol, currency.from_smallest_unit(amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_display() {
        assert_eq!(Price::from_minor(2999, Currency::USD).display(), "$29.99");
        assert_eq!(Price::from_minor(9536, Currency::INR).display(), "₹95.36");
        assert_eq!(Price::from_minor(1000, Currency::JPY).display(), "¥1000");
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(Currency::parse("INR"), Some(Currency::INR));
        assert_eq!(Currency::parse("usd"), Some(Currency::USD));
        assert_eq!(Currency::parse("xyz"), None);
    }

    #[test]
    fn test_price_times() {
        assert_eq!(Price::from_minor(1499, Currency::INR).times(2), 2998);
    }
}
