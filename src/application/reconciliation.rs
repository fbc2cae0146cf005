//! Whole-state check that the hold ledger covers everything that requires a hold.

use super::payment_store::PaymentStore;
use crate::domain::address::Address;
use crate::domain::coins::Coins;
use crate::domain::order::{Commitment, HoldRequirement, Order};
use crate::domain::ports::{HoldLedger, KvStore};
use crate::error::{EscrowError, InvariantViolation, Result};
use std::collections::HashMap;
use std::ops::ControlFlow;
use tracing::{error, info};

/// Required hold amounts accumulated per account.
///
/// Accounts are kept in the order they were first seen so that verification,
/// and the first violation it reports, is the same on every run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HoldRequirements {
    accounts: Vec<String>,
    amounts: HashMap<String, Coins>,
}

impl HoldRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `amount` to what `owner` must have on hold. Zero amounts are ignored.
    pub fn add(&mut self, owner: &str, amount: &Coins) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        match self.amounts.get_mut(owner) {
            Some(total) => total.try_add(amount),
            None => {
                self.accounts.push(owner.to_string());
                self.amounts.insert(owner.to_string(), amount.clone());
                Ok(())
            }
        }
    }

    pub fn add_requirement<R: HoldRequirement + ?Sized>(&mut self, entity: &R) -> Result<()> {
        let amount = entity.required_hold_amount()?;
        self.add(entity.hold_owner(), &amount)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, owner: &str) -> Option<&Coins> {
        self.amounts.get(owner)
    }

    /// Accounts and their required amounts, in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Coins)> {
        self.accounts
            .iter()
            .filter_map(|account| self.amounts.get(account).map(|c| (account.as_str(), c)))
    }

    /// Checks every requirement against `ledger`, stopping at the first shortfall.
    pub fn verify<H: HoldLedger + ?Sized>(&self, ledger: &H) -> Result<()> {
        for (account, required) in self.iter() {
            let addr = Address::decode("account", account)?;
            for coin in required.iter() {
                let held = ledger
                    .get_hold_amount(&addr, coin.denom())
                    .map_err(|e| InvariantViolation::HoldLookup {
                        account: account.to_string(),
                        denom: coin.denom().to_string(),
                        cause: Box::new(e),
                    })?;
                if held < coin.amount() {
                    let violation = InvariantViolation::InsufficientHold {
                        account: account.to_string(),
                        denom: coin.denom().to_string(),
                        required: coin.to_string(),
                        held: format!("{held}{}", coin.denom()),
                    };
                    error!(%violation, "hold reconciliation failed");
                    return Err(violation.into());
                }
            }
        }
        Ok(())
    }
}

/// Sums what orders, commitments and stored payments require to be on hold,
/// then checks it against `ledger`.
pub fn reconcile_holds<S, H>(
    orders: &[Order],
    commitments: &[Commitment],
    store: &PaymentStore<S>,
    ledger: &H,
) -> Result<HoldRequirements>
where
    S: KvStore,
    H: HoldLedger + ?Sized,
{
    let mut requirements = HoldRequirements::new();
    for order in orders {
        requirements.add_requirement(order)?;
    }
    for commitment in commitments {
        requirements.add_requirement(commitment)?;
    }

    let mut payments = Vec::new();
    store.iterate_all(|payment| {
        payments.push(payment);
        ControlFlow::Continue(())
    })?;
    for payment in &payments {
        requirements.add_requirement(payment)?;
    }

    requirements.verify(ledger)?;

    info!(
        orders = orders.len(),
        commitments = commitments.len(),
        payments = payments.len(),
        accounts = requirements.len(),
        "holds reconciled"
    );
    Ok(requirements)
}

/// The order counter must never be behind an order that already exists.
pub fn validate_last_order_id(last_order_id: u64, orders: &[Order]) -> Result<()> {
    let Some(max_order_id) = orders.iter().map(|o| o.order_id).max() else {
        return Ok(());
    };
    if last_order_id < max_order_id {
        let violation = InvariantViolation::OrderIdRange {
            last_order_id,
            max_order_id,
        };
        error!(%violation, "order id check failed");
        return Err(EscrowError::from(violation));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{AskOrder, BidOrder, OrderKind};
    use crate::domain::payment::Payment;
    use crate::domain::ports::MockHoldLedger;
    use crate::infrastructure::in_memory::{InMemoryHoldLedger, InMemoryKvStore};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn coins(s: &str) -> Coins {
        s.parse().unwrap()
    }

    fn addr(s: &str) -> Address {
        Address::decode("test", s).unwrap()
    }

    fn ask(order_id: u64, seller: &str, assets: &str) -> Order {
        Order {
            order_id,
            kind: OrderKind::Ask(AskOrder {
                market_id: 1,
                seller: seller.to_string(),
                assets: coins(assets),
                price: "10nhash".parse().unwrap(),
                seller_settlement_flat_fee: None,
            }),
        }
    }

    fn bid(order_id: u64, buyer: &str, price: &str) -> Order {
        Order {
            order_id,
            kind: OrderKind::Bid(BidOrder {
                market_id: 1,
                buyer: buyer.to_string(),
                assets: coins("1fig"),
                price: price.parse().unwrap(),
                buyer_settlement_fees: Coins::new(),
            }),
        }
    }

    fn commitment(account: &str, amount: &str) -> Commitment {
        Commitment {
            account: account.to_string(),
            market_id: 3,
            amount: coins(amount),
        }
    }

    fn store_with(payments: &[Payment]) -> PaymentStore<InMemoryKvStore> {
        let mut store = PaymentStore::new(InMemoryKvStore::new());
        for p in payments {
            store.create(p).unwrap();
        }
        store
    }

    fn payment(source: &str, amount: &str, external_id: &str) -> Payment {
        Payment {
            source: source.to_string(),
            source_amount: coins(amount),
            target: "zed".to_string(),
            target_amount: coins("1pear"),
            external_id: external_id.to_string(),
        }
    }

    #[test]
    fn test_requirements_keep_first_seen_order_and_skip_zero() {
        let mut req = HoldRequirements::new();
        req.add("carol", &Coins::new()).unwrap();
        req.add("bob", &coins("1fig")).unwrap();
        req.add("alice", &coins("2fig")).unwrap();
        req.add("bob", &coins("3fig,1pear")).unwrap();

        let seen: Vec<_> = req.iter().map(|(a, c)| (a.to_string(), c.to_string())).collect();
        assert_eq!(
            seen,
            vec![
                ("bob".to_string(), "4fig,1pear".to_string()),
                ("alice".to_string(), "2fig".to_string()),
            ]
        );
        assert!(req.get("carol").is_none());
    }

    #[test]
    fn test_reconcile_sums_orders_commitments_and_payments() {
        let orders = vec![ask(1, "alice", "100fig")];
        let commitments = vec![commitment("alice", "50fig")];
        let store = store_with(&[payment("alice", "15fig", "p1")]);

        let short = InMemoryHoldLedger::from_entries(vec![(addr("alice"), coins("164fig"))]).unwrap();
        let err = reconcile_holds(&orders, &commitments, &store, &short).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "account alice should have at least \"165fig\" on hold, but only has \"164fig\""
        );

        let exact = InMemoryHoldLedger::from_entries(vec![(addr("alice"), coins("165fig"))]).unwrap();
        let req = reconcile_holds(&orders, &commitments, &store, &exact).unwrap();
        assert_eq!(req.get("alice"), Some(&coins("165fig")));
    }

    #[test]
    fn test_reconcile_ignores_target_amounts() {
        let store = store_with(&[payment("alice", "5apple", "p1")]);
        let ledger = InMemoryHoldLedger::from_entries(vec![(addr("alice"), coins("5apple"))]).unwrap();
        let req = reconcile_holds(&[], &[], &store, &ledger).unwrap();
        assert!(req.get("zed").is_none());
    }

    #[test]
    fn test_reconcile_reports_first_violation() {
        let orders = vec![bid(1, "bob", "10nhash"), bid(2, "alice", "10nhash")];
        let store = store_with(&[]);
        let ledger = InMemoryHoldLedger::new();

        let err = reconcile_holds(&orders, &[], &store, &ledger).unwrap_err();
        assert!(matches!(
            err,
            EscrowError::Invariant(InvariantViolation::InsufficientHold { ref account, ref denom, .. })
                if account == "bob" && denom == "nhash"
        ));
    }

    #[test]
    fn test_verify_stops_at_first_shortfall() {
        let mut req = HoldRequirements::new();
        req.add("alice", &coins("1apple,1pear")).unwrap();
        req.add("bob", &coins("1apple")).unwrap();

        let mut ledger = MockHoldLedger::new();
        ledger
            .expect_get_hold_amount()
            .withf(|account, denom| account.as_str() == "alice" && denom == "apple")
            .times(1)
            .returning(|_, _| Ok(dec!(1)));
        ledger
            .expect_get_hold_amount()
            .withf(|account, denom| account.as_str() == "alice" && denom == "pear")
            .times(1)
            .returning(|_, _| Ok(Decimal::ZERO));

        let err = req.verify(&ledger).unwrap_err();
        assert!(matches!(
            err,
            EscrowError::Invariant(InvariantViolation::InsufficientHold { ref denom, .. }) if denom == "pear"
        ));
    }

    #[test]
    fn test_verify_wraps_lookup_failures() {
        let mut req = HoldRequirements::new();
        req.add("alice", &coins("1apple")).unwrap();

        let mut ledger = MockHoldLedger::new();
        ledger
            .expect_get_hold_amount()
            .returning(|_, _| Err(EscrowError::HoldLedger("unavailable".to_string())));

        let err = req.verify(&ledger).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            EscrowError::Invariant(InvariantViolation::HoldLookup { .. })
        ));
    }

    #[test]
    fn test_validate_last_order_id() {
        let orders = vec![ask(70, "alice", "1fig"), ask(3, "bob", "1fig")];

        let err = validate_last_order_id(69, &orders).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "last order id 69 is less than largest order id 70"
        );

        validate_last_order_id(70, &orders).unwrap();
        validate_last_order_id(0, &[]).unwrap();
    }
}
