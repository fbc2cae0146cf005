//! Read projections of the entities that reserve funds alongside payments.
//!
//! Only what hold reconciliation needs is modelled here: who owns the entity
//! and how much of their funds it requires to be on hold.

use super::address::Address;
use super::coins::{Coin, Coins};
use super::payment::Payment;
use crate::error::{EscrowError, Result};
use serde::{Deserialize, Serialize};

/// Anything that requires part of an account's funds to be on hold.
pub trait HoldRequirement {
    /// The account whose funds are held.
    fn hold_owner(&self) -> &str;

    /// The amount that must be on hold for this entity.
    fn required_hold_amount(&self) -> Result<Coins>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskOrder {
    pub market_id: u32,
    pub seller: String,
    pub assets: Coins,
    pub price: Coin,
    #[serde(default)]
    pub seller_settlement_flat_fee: Option<Coin>,
}

impl AskOrder {
    /// Assets plus the flat settlement fee, unless the fee comes out of the price.
    pub fn hold_amount(&self) -> Result<Coins> {
        match &self.seller_settlement_flat_fee {
            Some(fee) if fee.denom() != self.price.denom() => {
                self.assets.checked_add(&Coins::from(fee.clone()))
            }
            _ => Ok(self.assets.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidOrder {
    pub market_id: u32,
    pub buyer: String,
    pub assets: Coins,
    pub price: Coin,
    #[serde(default)]
    pub buyer_settlement_fees: Coins,
}

impl BidOrder {
    pub fn hold_amount(&self) -> Result<Coins> {
        self.buyer_settlement_fees
            .checked_add(&Coins::from(self.price.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderKind {
    Ask(AskOrder),
    Bid(BidOrder),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: u64,
    #[serde(flatten)]
    pub kind: OrderKind,
}

impl Order {
    pub fn validate(&self) -> Result<()> {
        if self.order_id == 0 {
            return Err(EscrowError::Validation(
                "invalid order id: must not be zero".to_string(),
            ));
        }
        let (market_id, assets) = match &self.kind {
            OrderKind::Ask(ask) => {
                Address::decode("seller", &ask.seller)?;
                (ask.market_id, &ask.assets)
            }
            OrderKind::Bid(bid) => {
                Address::decode("buyer", &bid.buyer)?;
                (bid.market_id, &bid.assets)
            }
        };
        validate_market_id(market_id)?;
        if assets.is_zero() {
            return Err(EscrowError::Validation(format!(
                "order {} has no assets",
                self.order_id
            )));
        }
        Ok(())
    }
}

fn validate_market_id(market_id: u32) -> Result<()> {
    if market_id == 0 {
        return Err(EscrowError::Validation(
            "invalid market id: must not be zero".to_string(),
        ));
    }
    Ok(())
}

impl HoldRequirement for Order {
    fn hold_owner(&self) -> &str {
        match &self.kind {
            OrderKind::Ask(ask) => &ask.seller,
            OrderKind::Bid(bid) => &bid.buyer,
        }
    }

    fn required_hold_amount(&self) -> Result<Coins> {
        match &self.kind {
            OrderKind::Ask(ask) => ask.hold_amount(),
            OrderKind::Bid(bid) => bid.hold_amount(),
        }
    }
}

/// Funds an account has committed to a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub account: String,
    pub market_id: u32,
    pub amount: Coins,
}

impl Commitment {
    pub fn validate(&self) -> Result<()> {
        Address::decode("account", &self.account)?;
        validate_market_id(self.market_id)?;
        if self.amount.is_zero() {
            return Err(EscrowError::Validation(format!(
                "commitment of {} to market {} has no amount",
                self.account, self.market_id
            )));
        }
        Ok(())
    }
}

impl HoldRequirement for Commitment {
    fn hold_owner(&self) -> &str {
        &self.account
    }

    fn required_hold_amount(&self) -> Result<Coins> {
        Ok(self.amount.clone())
    }
}

impl HoldRequirement for Payment {
    fn hold_owner(&self) -> &str {
        &self.source
    }

    // Target amounts are never held.
    fn required_hold_amount(&self) -> Result<Coins> {
        Ok(self.source_amount.clone())
    }
}
