use crate::error::{EscrowError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const MIN_DENOM_LENGTH: usize = 3;
const MAX_DENOM_LENGTH: usize = 128;

fn validate_denom(denom: &str) -> Result<()> {
    let mut chars = denom.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '_' | '-'));
    if !(MIN_DENOM_LENGTH..=MAX_DENOM_LENGTH).contains(&denom.len()) || !starts_with_letter || !rest_ok {
        return Err(EscrowError::Validation(format!("invalid denom: {denom:?}")));
    }
    Ok(())
}

/// A single-denomination amount. The amount is always a positive whole number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coin {
    denom: String,
    amount: Decimal,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: Decimal) -> Result<Self> {
        let denom = denom.into();
        validate_denom(&denom)?;
        if amount <= Decimal::ZERO || !amount.fract().is_zero() {
            return Err(EscrowError::Validation(format!(
                "coin {amount}{denom} amount is not a positive whole number"
            )));
        }
        Ok(Self {
            denom,
            amount: amount.normalize(),
        })
    }

    pub fn denom(&self) -> &str {
        &self.denom
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

impl FromStr for Coin {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        if split == 0 {
            return Err(EscrowError::Validation(format!(
                "invalid coin {s:?}: expected <amount><denom>"
            )));
        }
        let amount = Decimal::from_str(&s[..split])
            .map_err(|e| EscrowError::Validation(format!("invalid coin amount in {s:?}: {e}")))?;
        Self::new(s[split..].trim(), amount)
    }
}

impl TryFrom<String> for Coin {
    type Error = EscrowError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Coin> for String {
    fn from(coin: Coin) -> Self {
        coin.to_string()
    }
}

/// A normalized multi-asset amount.
///
/// Denominations are kept sorted and unique and no entry is ever zero, so two
/// `Coins` are equal exactly when they represent the same amount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coins(BTreeMap<String, Decimal>);

impl Coins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a `Coins` from individual coins, rejecting repeated denominations.
    pub fn from_coins(coins: impl IntoIterator<Item = Coin>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for coin in coins {
            if map.insert(coin.denom.clone(), coin.amount).is_some() {
                return Err(EscrowError::Validation(format!(
                    "duplicate denomination {:?}",
                    coin.denom
                )));
            }
        }
        Ok(Self(map))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the amount of `denom`, or zero if it isn't present.
    pub fn amount_of(&self, denom: &str) -> Decimal {
        self.0.get(denom).copied().unwrap_or(Decimal::ZERO)
    }

    /// Iterates over the coins in denomination order.
    pub fn iter(&self) -> impl Iterator<Item = Coin> + '_ {
        self.0.iter().map(|(denom, amount)| Coin {
            denom: denom.clone(),
            amount: *amount,
        })
    }

    pub fn denoms(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Adds `other` into `self`, failing without modification on overflow.
    pub fn try_add(&mut self, other: &Coins) -> Result<()> {
        let mut sum = self.0.clone();
        for (denom, amount) in &other.0 {
            let entry = sum.entry(denom.clone()).or_insert(Decimal::ZERO);
            *entry = entry
                .checked_add(*amount)
                .ok_or_else(|| EscrowError::AmountOverflow {
                    denom: denom.clone(),
                })?;
        }
        self.0 = sum;
        Ok(())
    }

    pub fn checked_add(&self, other: &Coins) -> Result<Coins> {
        let mut sum = self.clone();
        sum.try_add(other)?;
        Ok(sum)
    }

    /// Subtracts `other`, returning `None` if any denomination would go negative.
    pub fn checked_sub(&self, other: &Coins) -> Option<Coins> {
        let mut diff = self.0.clone();
        for (denom, amount) in &other.0 {
            let have = diff.get(denom).copied().unwrap_or(Decimal::ZERO);
            let left = have.checked_sub(*amount)?;
            if left < Decimal::ZERO {
                return None;
            }
            if left.is_zero() {
                diff.remove(denom);
            } else {
                diff.insert(denom.clone(), left);
            }
        }
        Some(Coins(diff))
    }
}

impl From<Coin> for Coins {
    fn from(coin: Coin) -> Self {
        let mut map = BTreeMap::new();
        map.insert(coin.denom, coin.amount);
        Self(map)
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (denom, amount)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{amount}{denom}")?;
        }
        Ok(())
    }
}

impl FromStr for Coins {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::new());
        }
        let coins = s
            .split(',')
            .map(Coin::from_str)
            .collect::<Result<Vec<_>>>()?;
        Self::from_coins(coins)
    }
}

impl TryFrom<String> for Coins {
    type Error = EscrowError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Coins> for String {
    fn from(coins: Coins) -> Self {
        coins.to_string()
    }
}
