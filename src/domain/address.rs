use crate::error::{EscrowError, Result};
use std::fmt;

/// Addresses are length-prefixed with a single byte inside store keys.
pub const MAX_ADDRESS_LENGTH: usize = 255;

/// A decoded account identifier.
///
/// Payments carry their accounts as raw strings; an `Address` only exists once
/// the string has passed decoding, so anything keyed by account (store keys,
/// hold ledger entries, transfers) works with a known-good value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(String);

impl Address {
    /// Decodes `value`, naming the field it came from (`role`) in any error.
    pub fn decode(role: &'static str, value: &str) -> Result<Self> {
        let invalid = |reason: String| EscrowError::InvalidAddress {
            role,
            address: value.to_string(),
            reason,
        };

        if value.is_empty() {
            return Err(invalid("empty address string is not allowed".to_string()));
        }
        if value.len() > MAX_ADDRESS_LENGTH {
            return Err(invalid(format!(
                "address length {} exceeds maximum of {}",
                value.len(),
                MAX_ADDRESS_LENGTH
            )));
        }
        if let Some((i, c)) = value
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
        {
            return Err(invalid(format!("invalid character {c:?} at index {i}")));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
