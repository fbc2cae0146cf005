use super::address::Address;
use super::coins::Coins;
use crate::error::{EscrowError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length (in bytes) of a payment's external id.
pub const MAX_EXTERNAL_ID_LENGTH: usize = 100;

/// A pending bilateral transfer.
///
/// `source_amount` is reserved from `source` for as long as the payment exists.
/// `target` may be empty, in which case nobody can accept or reject the
/// payment until the source assigns one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub source: String,
    #[serde(default)]
    pub source_amount: Coins,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub target_amount: Coins,
    #[serde(default)]
    pub external_id: String,
}

impl Payment {
    /// Checks the structural rules of a payment and reports every problem found.
    pub fn validate(&self) -> Result<()> {
        let mut errs = Vec::new();

        if let Err(e) = Address::decode("source", &self.source) {
            errs.push(e.to_string());
        }
        if !self.target.is_empty()
            && let Err(e) = Address::decode("target", &self.target)
        {
            errs.push(e.to_string());
        }
        if self.source_amount.is_zero() && self.target_amount.is_zero() {
            errs.push("source amount and target amount cannot both be zero".to_string());
        }
        if let Err(e) = validate_external_id(&self.external_id) {
            errs.push(e.to_string());
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(EscrowError::Validation(errs.join("; ")))
        }
    }
}

/// Makes sure an external id isn't too long.
pub fn validate_external_id(external_id: &str) -> Result<()> {
    if external_id.len() > MAX_EXTERNAL_ID_LENGTH {
        return Err(EscrowError::Validation(format!(
            "invalid external id {:?} (length {}): max length {}",
            abbreviate(external_id),
            external_id.len(),
            MAX_EXTERNAL_ID_LENGTH
        )));
    }
    Ok(())
}

fn abbreviate(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 13 {
        return value.to_string();
    }
    let head: String = chars[..5].iter().collect();
    let tail: String = chars[chars.len() - 5..].iter().collect();
    format!("{head}...{tail}")
}

impl fmt::Display for Payment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let or_unknown = |s: &str| if s.is_empty() { "?".to_string() } else { s.to_string() };

        write!(f, "{}+{:?}", or_unknown(&self.source), self.external_id)?;
        if !self.source_amount.is_zero() {
            write!(f, ":{}", self.source_amount)?;
        }
        let arrow = match (self.source_amount.is_zero(), self.target_amount.is_zero()) {
            (false, false) => "<->",
            (false, true) => "-->",
            (true, false) => "<--",
            (true, true) => "-x-",
        };
        write!(f, "{arrow}{}", or_unknown(&self.target))?;
        if !self.target_amount.is_zero() {
            write!(f, ":{}", self.target_amount)?;
        }
        Ok(())
    }
}
