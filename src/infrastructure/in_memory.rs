use crate::domain::address::Address;
use crate::domain::coins::{Coin, Coins};
use crate::domain::events::PaymentEvent;
use crate::domain::ports::{Checkpoint, EventSink, HoldLedger, KvOp, KvStore, TransferService};
use crate::error::{EscrowError, Result};
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::{Bound, ControlFlow};
use std::rc::Rc;
use tracing::info;

/// An ordered in-memory key/value store.
///
/// Backed by a `BTreeMap`, so prefix scans come out in byte order like they
/// would from RocksDB. Ideal for tests and one-shot runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKvStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for InMemoryKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, batch: Vec<KvOp>) -> Result<()> {
        for op in batch {
            match op {
                KvOp::Put { key, value } => {
                    self.entries.insert(key, value);
                }
                KvOp::Delete { key } => {
                    self.entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn iterate_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> Result<()> {
        let range = self
            .entries
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded));
        for (key, value) in range {
            if !key.starts_with(prefix) {
                break;
            }
            if f(key, value).is_break() {
                break;
            }
        }
        Ok(())
    }
}

/// Holds kept per account, with no backing bank.
///
/// Releasing more than is held fails. Nothing checks that the account can
/// cover a hold; use [`InMemoryAccounts`] for that.
#[derive(Debug, Default, Clone)]
pub struct InMemoryHoldLedger {
    holds: BTreeMap<Address, Coins>,
}

impl InMemoryHoldLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the ledger, summing repeated accounts.
    pub fn from_entries(entries: impl IntoIterator<Item = (Address, Coins)>) -> Result<Self> {
        let mut ledger = Self::new();
        for (account, amount) in entries {
            ledger.holds.entry(account).or_default().try_add(&amount)?;
        }
        Ok(ledger)
    }

    pub fn holds_for(&self, account: &Address) -> Coins {
        self.holds.get(account).cloned().unwrap_or_default()
    }

    /// Every account with something on hold, in address order.
    pub fn entries(&self) -> impl Iterator<Item = (&Address, &Coins)> {
        self.holds.iter().filter(|(_, amount)| !amount.is_zero())
    }
}

impl HoldLedger for InMemoryHoldLedger {
    fn add_hold(&mut self, account: &Address, amount: &Coins, _reason: &str) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        self.holds
            .entry(account.clone())
            .or_default()
            .try_add(amount)
    }

    fn release_hold(&mut self, account: &Address, amount: &Coins) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let held = self.holds_for(account);
        let left = held.checked_sub(amount).ok_or_else(|| {
            EscrowError::HoldLedger(format!(
                "cannot release {amount} from {account}: only {held} on hold"
            ))
        })?;
        if left.is_zero() {
            self.holds.remove(account);
        } else {
            self.holds.insert(account.clone(), left);
        }
        Ok(())
    }

    fn get_hold_amount(&self, account: &Address, denom: &str) -> Result<Decimal> {
        Ok(self
            .holds
            .get(account)
            .map(|coins| coins.amount_of(denom))
            .unwrap_or(Decimal::ZERO))
    }
}

/// Account balances with all-or-nothing transfers.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBank {
    balances: BTreeMap<Address, Coins>,
}

impl InMemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_balances(entries: impl IntoIterator<Item = (Address, Coins)>) -> Result<Self> {
        let mut bank = Self::new();
        for (account, amount) in entries {
            bank.balances.entry(account).or_default().try_add(&amount)?;
        }
        Ok(bank)
    }

    pub fn balance_of(&self, account: &Address) -> Coins {
        self.balances.get(account).cloned().unwrap_or_default()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Address, &Coins)> {
        self.balances.iter().filter(|(_, amount)| !amount.is_zero())
    }
}

impl TransferService for InMemoryBank {
    fn transfer(&mut self, from: &Address, to: &Address, amount: &Coins) -> Result<()> {
        let available = self.balance_of(from);
        let left = available
            .checked_sub(amount)
            .ok_or_else(|| EscrowError::InsufficientFunds {
                account: from.to_string(),
                needed: amount.to_string(),
                available: available.to_string(),
            })?;
        if from == to {
            return Ok(());
        }
        let received = self.balance_of(to).checked_add(amount)?;

        self.balances.insert(from.clone(), left);
        self.balances.insert(to.clone(), received);
        Ok(())
    }
}

impl Checkpoint for InMemoryHoldLedger {
    type Saved = Self;

    fn checkpoint(&self) -> Self {
        self.clone()
    }

    fn rollback(&mut self, saved: Self) {
        *self = saved;
    }
}

impl Checkpoint for InMemoryBank {
    type Saved = Self;

    fn checkpoint(&self) -> Self {
        self.clone()
    }

    fn rollback(&mut self, saved: Self) {
        *self = saved;
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AccountBook {
    balances: BTreeMap<Address, Coins>,
    holds: BTreeMap<Address, Coins>,
}

impl AccountBook {
    fn balance_of(&self, account: &Address) -> Coins {
        self.balances.get(account).cloned().unwrap_or_default()
    }

    fn holds_for(&self, account: &Address) -> Coins {
        self.holds.get(account).cloned().unwrap_or_default()
    }

    /// Balance minus holds, per denomination, never below zero.
    fn spendable(&self, account: &Address) -> Result<Coins> {
        let held = self.holds_for(account);
        let mut coins = Vec::new();
        for coin in self.balance_of(account).iter() {
            let left = coin.amount() - held.amount_of(coin.denom());
            if left > Decimal::ZERO {
                coins.push(Coin::new(coin.denom(), left)?);
            }
        }
        Coins::from_coins(coins)
    }

    fn insufficient(&self, account: &Address, needed: &Coins) -> EscrowError {
        let available = self
            .spendable(account)
            .map(|coins| coins.to_string())
            .unwrap_or_else(|e| e.to_string());
        EscrowError::InsufficientFunds {
            account: account.to_string(),
            needed: needed.to_string(),
            available,
        }
    }
}

/// Balances and holds kept in one book.
///
/// Implements both [`HoldLedger`] and [`TransferService`], so a hold can only
/// reserve coins the account owns and a transfer can only spend coins that are
/// not on hold. Clones are handles onto the same book.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAccounts {
    book: Rc<RefCell<AccountBook>>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the book, summing repeated accounts.
    pub fn from_entries(
        balances: impl IntoIterator<Item = (Address, Coins)>,
        holds: impl IntoIterator<Item = (Address, Coins)>,
    ) -> Result<Self> {
        let mut book = AccountBook::default();
        for (account, amount) in balances {
            book.balances.entry(account).or_default().try_add(&amount)?;
        }
        for (account, amount) in holds {
            book.holds.entry(account).or_default().try_add(&amount)?;
        }
        Ok(Self {
            book: Rc::new(RefCell::new(book)),
        })
    }

    pub fn balance_of(&self, account: &Address) -> Coins {
        self.book.borrow().balance_of(account)
    }

    pub fn holds_for(&self, account: &Address) -> Coins {
        self.book.borrow().holds_for(account)
    }

    pub fn spendable(&self, account: &Address) -> Result<Coins> {
        self.book.borrow().spendable(account)
    }
}

impl HoldLedger for InMemoryAccounts {
    fn add_hold(&mut self, account: &Address, amount: &Coins, _reason: &str) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let mut book = self.book.borrow_mut();
        let held = book.holds_for(account).checked_add(amount)?;
        if book.balance_of(account).checked_sub(&held).is_none() {
            return Err(book.insufficient(account, amount));
        }
        book.holds.insert(account.clone(), held);
        Ok(())
    }

    fn release_hold(&mut self, account: &Address, amount: &Coins) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let mut book = self.book.borrow_mut();
        let held = book.holds_for(account);
        let left = held.checked_sub(amount).ok_or_else(|| {
            EscrowError::HoldLedger(format!(
                "cannot release {amount} from {account}: only {held} on hold"
            ))
        })?;
        if left.is_zero() {
            book.holds.remove(account);
        } else {
            book.holds.insert(account.clone(), left);
        }
        Ok(())
    }

    fn get_hold_amount(&self, account: &Address, denom: &str) -> Result<Decimal> {
        Ok(self.book.borrow().holds_for(account).amount_of(denom))
    }
}

impl TransferService for InMemoryAccounts {
    fn transfer(&mut self, from: &Address, to: &Address, amount: &Coins) -> Result<()> {
        let mut book = self.book.borrow_mut();
        let left = book
            .balance_of(from)
            .checked_sub(amount)
            .filter(|left| left.checked_sub(&book.holds_for(from)).is_some())
            .ok_or_else(|| book.insufficient(from, amount))?;
        if from == to {
            return Ok(());
        }
        let received = book.balance_of(to).checked_add(amount)?;

        book.balances.insert(from.clone(), left);
        book.balances.insert(to.clone(), received);
        Ok(())
    }
}

impl Checkpoint for InMemoryAccounts {
    type Saved = AccountBook;

    fn checkpoint(&self) -> AccountBook {
        self.book.borrow().clone()
    }

    fn rollback(&mut self, saved: AccountBook) {
        *self.book.borrow_mut() = saved;
    }
}

/// Collects emitted events and traces each one.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<PaymentEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[PaymentEvent] {
        &self.events
    }

    pub fn take(&mut self) -> Vec<PaymentEvent> {
        std::mem::take(&mut self.events)
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: PaymentEvent) {
        info!(event = event.name(), "payment event");
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::decode("test", s).unwrap()
    }

    fn coins(s: &str) -> Coins {
        s.parse().unwrap()
    }

    fn put(key: &[u8], value: &[u8]) -> KvOp {
        KvOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    #[test]
    fn test_kv_store_batch_and_get() {
        let mut store = InMemoryKvStore::new();
        store
            .write(vec![put(b"a", b"1"), put(b"b", b"2"), KvOp::Delete { key: b"a".to_vec() }])
            .unwrap();

        assert_eq!(store.get(b"a").unwrap(), None);
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert!(store.has(b"b").unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_kv_store_prefix_scan() {
        let mut store = InMemoryKvStore::new();
        store
            .write(vec![
                put(b"\x70b", b""),
                put(b"\x70a", b""),
                put(b"\x71a", b""),
                put(b"\x6f", b""),
            ])
            .unwrap();

        let mut seen = Vec::new();
        store
            .iterate_prefix(b"\x70", &mut |key, _| {
                seen.push(key.to_vec());
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(seen, vec![b"\x70a".to_vec(), b"\x70b".to_vec()]);

        let mut count = 0;
        store
            .iterate_prefix(b"", &mut |_, _| {
                count += 1;
                if count == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_hold_ledger_add_and_release() {
        let mut ledger = InMemoryHoldLedger::new();
        let alice = addr("alice");
        ledger.add_hold(&alice, &coins("5apple,2pear"), "payment:x").unwrap();
        ledger.add_hold(&alice, &coins("1apple"), "payment:y").unwrap();
        assert_eq!(ledger.get_hold_amount(&alice, "apple").unwrap(), Decimal::from(6));

        ledger.release_hold(&alice, &coins("6apple")).unwrap();
        assert_eq!(ledger.holds_for(&alice), coins("2pear"));

        let err = ledger.release_hold(&alice, &coins("3pear")).unwrap_err();
        assert!(matches!(err, EscrowError::HoldLedger(_)));
        assert_eq!(ledger.holds_for(&alice), coins("2pear"));
    }

    #[test]
    fn test_hold_ledger_from_entries_sums_accounts() {
        let ledger = InMemoryHoldLedger::from_entries(vec![
            (addr("bob"), coins("1fig")),
            (addr("bob"), coins("2fig")),
        ])
        .unwrap();
        assert_eq!(ledger.holds_for(&addr("bob")), coins("3fig"));
        assert_eq!(ledger.get_hold_amount(&addr("nobody"), "fig").unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_bank_transfer() {
        let mut bank =
            InMemoryBank::from_balances(vec![(addr("alice"), coins("10apple"))]).unwrap();
        bank.transfer(&addr("alice"), &addr("bob"), &coins("4apple")).unwrap();
        assert_eq!(bank.balance_of(&addr("alice")), coins("6apple"));
        assert_eq!(bank.balance_of(&addr("bob")), coins("4apple"));

        let err = bank
            .transfer(&addr("alice"), &addr("bob"), &coins("7apple"))
            .unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientFunds { .. }));
        assert_eq!(bank.balance_of(&addr("alice")), coins("6apple"));
    }

    #[test]
    fn test_bank_transfer_to_self_keeps_balance() {
        let mut bank =
            InMemoryBank::from_balances(vec![(addr("alice"), coins("10apple"))]).unwrap();
        bank.transfer(&addr("alice"), &addr("alice"), &coins("4apple")).unwrap();
        assert_eq!(bank.balance_of(&addr("alice")), coins("10apple"));
    }

    #[test]
    fn test_release_error_shows_held_amount() {
        let mut ledger = InMemoryHoldLedger::new();
        ledger.add_hold(&addr("alice"), &coins("2apple"), "test").unwrap();
        let err = ledger.release_hold(&addr("alice"), &coins("3apple")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "hold ledger error: cannot release 3apple from alice: only 2apple on hold"
        );
    }

    fn accounts() -> InMemoryAccounts {
        InMemoryAccounts::from_entries(
            vec![(addr("alice"), coins("20apple,5fig")), (addr("bob"), coins("1pear"))],
            vec![(addr("alice"), coins("5fig"))],
        )
        .unwrap()
    }

    #[test]
    fn test_accounts_hold_needs_unheld_funds() {
        let mut holds = accounts();
        holds.add_hold(&addr("alice"), &coins("15apple"), "a").unwrap();

        let err = holds
            .add_hold(&addr("alice"), &coins("15apple"), "b")
            .unwrap_err();
        assert!(matches!(
            &err,
            EscrowError::InsufficientFunds { available, .. } if available == "5apple"
        ));
        assert_eq!(holds.holds_for(&addr("alice")), coins("15apple,5fig"));

        // Fig is fully held already.
        assert!(holds.add_hold(&addr("alice"), &coins("1fig"), "c").is_err());
        assert!(holds.add_hold(&addr("carl"), &coins("1fig"), "d").is_err());
    }

    #[test]
    fn test_accounts_transfer_cannot_spend_held_coins() {
        let mut holds = accounts();
        let mut bank = holds.clone();
        holds.add_hold(&addr("alice"), &coins("15apple"), "a").unwrap();

        let err = bank
            .transfer(&addr("alice"), &addr("bob"), &coins("6apple"))
            .unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientFunds { .. }));
        assert!(bank.transfer(&addr("alice"), &addr("bob"), &coins("1fig")).is_err());

        bank.transfer(&addr("alice"), &addr("bob"), &coins("5apple")).unwrap();
        assert_eq!(holds.balance_of(&addr("alice")), coins("15apple,5fig"));
        assert_eq!(holds.spendable(&addr("alice")).unwrap(), Coins::new());

        holds.release_hold(&addr("alice"), &coins("15apple")).unwrap();
        bank.transfer(&addr("alice"), &addr("bob"), &coins("15apple")).unwrap();
        assert_eq!(bank.balance_of(&addr("bob")), coins("20apple,1pear"));
    }

    #[test]
    fn test_accounts_rollback_through_any_handle() {
        let mut holds = accounts();
        let mut bank = holds.clone();
        let saved_holds = holds.checkpoint();
        let saved_bank = bank.checkpoint();

        holds.add_hold(&addr("alice"), &coins("3apple"), "a").unwrap();
        bank.transfer(&addr("alice"), &addr("bob"), &coins("2apple")).unwrap();

        holds.rollback(saved_holds);
        bank.rollback(saved_bank);
        assert_eq!(holds.holds_for(&addr("alice")), coins("5fig"));
        assert_eq!(bank.balance_of(&addr("alice")), coins("20apple,5fig"));
        assert_eq!(bank.balance_of(&addr("bob")), coins("1pear"));
    }

    #[test]
    fn test_event_log_take() {
        let mut log = EventLog::new();
        log.emit_batch(vec![
            PaymentEvent::PaymentsCancelled { payments: vec![] },
            PaymentEvent::PaymentsRejected { payments: vec![] },
        ]);
        assert_eq!(log.events().len(), 2);
        assert_eq!(log.take().len(), 2);
        assert!(log.events().is_empty());
    }
}
