use super::address::Address;
use super::coins::Coins;
use super::order::{Commitment, Order};
use super::payment::Payment;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// An amount tied to an account, used to seed the hold ledger and bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCoins {
    pub account: String,
    pub amount: Coins,
}

impl AccountCoins {
    pub fn decode(&self) -> Result<(Address, Coins)> {
        Ok((Address::decode("account", &self.account)?, self.amount.clone()))
    }
}

/// Decodes every entry, failing on the first bad account.
pub fn decode_entries(entries: &[AccountCoins]) -> Result<Vec<(Address, Coins)>> {
    entries.iter().map(AccountCoins::decode).collect()
}

/// A full-state document: everything that reserves funds, plus the
/// collaborator state needed to check those reservations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub last_order_id: u64,
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub commitments: Vec<Commitment>,
    #[serde(default)]
    pub payments: Vec<Payment>,
    #[serde(default)]
    pub holds: Vec<AccountCoins>,
    #[serde(default)]
    pub balances: Vec<AccountCoins>,
}

impl StateSnapshot {
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }
}
