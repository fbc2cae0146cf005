use super::address::Address;
use super::coins::Coins;
use super::events::PaymentEvent;
use crate::error::Result;
use rust_decimal::Decimal;
use std::ops::ControlFlow;

/// A single change applied by [`KvStore::write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Ordered byte-keyed storage.
///
/// `write` must apply the whole batch or none of it. `iterate_prefix` visits
/// keys in ascending byte order and stops as soon as the callback breaks.
pub trait KvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn write(&mut self, batch: Vec<KvOp>) -> Result<()>;

    fn iterate_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> Result<()>;
}

pub type KvStoreBox = Box<dyn KvStore>;

impl<T: KvStore + ?Sized> KvStore for Box<T> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        (**self).has(key)
    }

    fn write(&mut self, batch: Vec<KvOp>) -> Result<()> {
        (**self).write(batch)
    }

    fn iterate_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> Result<()> {
        (**self).iterate_prefix(prefix, f)
    }
}

/// The authoritative registry of funds reserved per account and denomination.
#[cfg_attr(test, mockall::automock)]
pub trait HoldLedger {
    fn add_hold(&mut self, account: &Address, amount: &Coins, reason: &str) -> Result<()>;
    fn release_hold(&mut self, account: &Address, amount: &Coins) -> Result<()>;
    fn get_hold_amount(&self, account: &Address, denom: &str) -> Result<Decimal>;
}

/// Moves funds between two accounts, atomically per call.
#[cfg_attr(test, mockall::automock)]
pub trait TransferService {
    fn transfer(&mut self, from: &Address, to: &Address, amount: &Coins) -> Result<()>;
}

impl<T: HoldLedger + ?Sized> HoldLedger for Box<T> {
    fn add_hold(&mut self, account: &Address, amount: &Coins, reason: &str) -> Result<()> {
        (**self).add_hold(account, amount, reason)
    }

    fn release_hold(&mut self, account: &Address, amount: &Coins) -> Result<()> {
        (**self).release_hold(account, amount)
    }

    fn get_hold_amount(&self, account: &Address, denom: &str) -> Result<Decimal> {
        (**self).get_hold_amount(account, denom)
    }
}

impl<T: TransferService + ?Sized> TransferService for Box<T> {
    fn transfer(&mut self, from: &Address, to: &Address, amount: &Coins) -> Result<()> {
        (**self).transfer(from, to, amount)
    }
}

/// Adapter state that can be saved before a command and put back if it fails.
///
/// Handles that share state with other handles must save and restore the
/// shared state, so rolling back twice through two handles is harmless.
pub trait Checkpoint {
    type Saved;

    fn checkpoint(&self) -> Self::Saved;
    fn rollback(&mut self, saved: Self::Saved);
}

/// Receives the domain events produced by payment state transitions.
pub trait EventSink {
    fn emit(&mut self, event: PaymentEvent);

    fn emit_batch(&mut self, events: Vec<PaymentEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}
