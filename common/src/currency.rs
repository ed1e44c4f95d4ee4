//! ISO 4217 currency codes and display names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currency all stored rates are expressed against.
pub const BASE_CURRENCY: &str = "RUB";

/// ISO 4217 currency code: exactly three uppercase ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parse a code, rejecting anything that is not three uppercase letters.
    pub fn parse(code: &str) -> Result<Self, InvalidCurrencyCode> {
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(code.to_string()))
        } else {
            Err(InvalidCurrencyCode(code.to_string()))
        }
    }

    /// Parse user input, upper-casing it first (`"usd"` becomes `USD`).
    pub fn normalize(code: &str) -> Result<Self, InvalidCurrencyCode> {
        Self::parse(&code.trim().to_ascii_uppercase())
    }

    /// The base currency (RUB).
    pub fn base() -> Self {
        Self(BASE_CURRENCY.to_string())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// English display name, falling back to the code itself.
    pub fn display_name(&self) -> &str {
        currency_name(&self.0).unwrap_or(&self.0)
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn eur() -> Self {
        Self("EUR".to_string())
    }

    pub fn gbp() -> Self {
        Self("GBP".to_string())
    }

    pub fn cny() -> Self {
        Self("CNY".to_string())
    }

    pub fn jpy() -> Self {
        Self("JPY".to_string())
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = InvalidCurrencyCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = InvalidCurrencyCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

/// Error for a string that is not a valid currency code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCurrencyCode(pub String);

impl fmt::Display for InvalidCurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid currency code: {:?}", self.0)
    }
}

impl std::error::Error for InvalidCurrencyCode {}

/// Look up the English name of a currency.
pub fn currency_name(code: &str) -> Option<&'static str> {
    CURRENCY_NAMES
        .binary_search_by(|(c, _)| c.cmp(&code))
        .ok()
        .map(|idx| CURRENCY_NAMES[idx].1)
}

// Sorted by code.
const CURRENCY_NAMES: &[(&str, &str)] = &[
    ("AED", "UAE Dirham"),
    ("AMD", "Armenian Dram"),
    ("ARS", "Argentine Peso"),
    ("AUD", "Australian Dollar"),
    ("AZN", "Azerbaijani Manat"),
    ("BGN", "Bulgarian Lev"),
    ("BRL", "Brazilian Real"),
    ("BYN", "Belarusian Ruble"),
    ("CAD", "Canadian Dollar"),
    ("CHF", "Swiss Franc"),
    ("CNY", "Chinese Yuan"),
    ("CZK", "Czech Koruna"),
    ("DKK", "Danish Krone"),
    ("EGP", "Egyptian Pound"),
    ("EUR", "Euro"),
    ("GBP", "British Pound"),
    ("GEL", "Georgian Lari"),
    ("HKD", "Hong Kong Dollar"),
    ("HUF", "Hungarian Forint"),
    ("IDR", "Indonesian Rupiah"),
    ("ILS", "Israeli New Shekel"),
    ("INR", "Indian Rupee"),
    ("JPY", "Japanese Yen"),
    ("KGS", "Kyrgyzstani Som"),
    ("KRW", "South Korean Won"),
    ("KZT", "Kazakhstani Tenge"),
    ("MDL", "Moldovan Leu"),
    ("MXN", "Mexican Peso"),
    ("NOK", "Norwegian Krone"),
    ("NZD", "New Zealand Dollar"),
    ("PLN", "Polish Zloty"),
    ("RON", "Romanian Leu"),
    ("RSD", "Serbian Dinar"),
    ("RUB", "Russian Ruble"),
    ("SAR", "Saudi Riyal"),
    ("SEK", "Swedish Krona"),
    ("SGD", "Singapore Dollar"),
    ("THB", "Thai Baht"),
    ("TJS", "Tajikistani Somoni"),
    ("TMT", "Turkmenistani Manat"),
    ("TRY", "Turkish Lira"),
    ("UAH", "Ukrainian Hryvnia"),
    ("USD", "US Dollar"),
    ("UZS", "Uzbekistani Som"),
    ("VND", "Vietnamese Dong"),
    ("ZAR", "South African Rand"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_code() {
        let code = CurrencyCode::parse("EUR").unwrap();
        assert_eq!(code.code(), "EUR");
        assert_eq!(code, CurrencyCode::eur());
    }

    #[test]
    fn test_parse_rejects_malformed_codes() {
        assert!(CurrencyCode::parse("eur").is_err());
        assert!(CurrencyCode::parse("EURO").is_err());
        assert!(CurrencyCode::parse("E1R").is_err());
        assert!(CurrencyCode::parse("").is_err());
    }

    #[test]
    fn test_normalize_upper_cases_input() {
        assert_eq!(CurrencyCode::normalize(" usd ").unwrap(), CurrencyCode::usd());
    }

    #[test]
    fn test_names_table_is_sorted() {
        assert!(CURRENCY_NAMES.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_display_name_falls_back_to_code() {
        assert_eq!(CurrencyCode::gbp().display_name(), "British Pound");
        assert_eq!(CurrencyCode::parse("XAU").unwrap().display_name(), "XAU");
    }

    #[test]
    fn test_serde_validates_code() {
        let code: CurrencyCode = serde_json::from_str("\"JPY\"").unwrap();
        assert_eq!(code, CurrencyCode::jpy());
        assert!(serde_json::from_str::<CurrencyCode>("\"jpy\"").is_err());
    }
}
