//! Ticker symbol validation.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated equity ticker: 1-5 uppercase ASCII letters.
///
/// Construction goes through [`Ticker::parse`], which rejects anything else
/// before a request touches the network or the database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    /// Parses and validates a ticker symbol. Lowercase input is accepted and
    /// normalised to uppercase.
    ///
    /// # Errors
    /// Returns `EngineError::BadInput` for empty, overlong, or non-alphabetic
    /// symbols.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let symbol = raw.trim().to_ascii_uppercase();

        if symbol.is_empty() || symbol.len() > 5 {
            return Err(EngineError::BadInput(format!(
                "ticker must be 1-5 characters, got {:?}",
                raw
            )));
        }
        if !symbol.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(EngineError::BadInput(format!(
                "ticker must be alphabetic, got {:?}",
                raw
            )));
        }

        Ok(Self(symbol))
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Ticker {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Ticker> for String {
    fn from(ticker: Ticker) -> Self {
        ticker.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_valid_symbols() {
        assert_eq!(Ticker::parse("NVDA").unwrap().as_str(), "NVDA");
        assert_eq!(Ticker::parse("F").unwrap().as_str(), "F");
        assert_eq!(Ticker::parse("GOOGL").unwrap().as_str(), "GOOGL");
    }

    #[test]
    fn parse_uppercases_input() {
        assert_eq!(Ticker::parse("nvda").unwrap().as_str(), "NVDA");
    }

    #[test]
    fn parse_trims_whitespace() {
        assert_eq!(Ticker::parse(" AAPL ").unwrap().as_str(), "AAPL");
    }

    #[test]
    fn parse_rejects_empty() {
        assert!(matches!(Ticker::parse(""), Err(EngineError::BadInput(_))));
    }

    #[test]
    fn parse_rejects_too_long() {
        assert!(matches!(
            Ticker::parse("TOOLONG"),
            Err(EngineError::BadInput(_))
        ));
    }

    #[test]
    fn parse_rejects_digits_and_punctuation() {
        assert!(Ticker::parse("BRK.B").is_err());
        assert!(Ticker::parse("A1").is_err());
        assert!(Ticker::parse("SPY ").is_ok());
        assert!(Ticker::parse("$SPY").is_err());
    }

    #[test]
    fn serde_round_trip() {
        let ticker = Ticker::parse("MSFT").unwrap();
        let json = serde_json::to_string(&ticker).unwrap();
        assert_eq!(json, "\"MSFT\"");
        let back: Ticker = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ticker);
    }

    #[test]
    fn serde_rejects_invalid() {
        let result: Result<Ticker, _> = serde_json::from_str("\"not a ticker\"");
        assert!(result.is_err());
    }
}
