//! Loading a full state snapshot into the store, and reading it back out.

use super::payment_store::PaymentStore;
use super::reconciliation::{HoldRequirements, reconcile_holds, validate_last_order_id};
use crate::domain::order::{Commitment, Order};
use crate::domain::payment::Payment;
use crate::domain::ports::{HoldLedger, KvStore};
use crate::domain::state::StateSnapshot;
use crate::error::{EscrowError, InvariantViolation, Result};
use serde::Serialize;
use std::ops::ControlFlow;
use tracing::info;

/// What a successful [`init_state`] loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub payments: usize,
    pub orders: usize,
    pub commitments: usize,
    pub accounts_with_holds: usize,
}

/// Writes every payment of `snapshot` into `store` and checks the result.
///
/// Every failure is fatal. A malformed entry, or a repeated
/// `(source, external_id)`, comes back as [`InvariantViolation::InvalidState`]
/// naming the entry. Afterwards the order counter and the hold ledger are
/// checked.
pub fn init_state<S, H>(
    store: &mut PaymentStore<S>,
    snapshot: &StateSnapshot,
    ledger: &H,
) -> Result<LoadSummary>
where
    S: KvStore,
    H: HoldLedger + ?Sized,
{
    for (i, payment) in snapshot.payments.iter().enumerate() {
        payment
            .validate()
            .and_then(|()| store.create(payment))
            .map_err(|e| invalid_entry("payment", i, e))?;
    }
    for (i, order) in snapshot.orders.iter().enumerate() {
        order.validate().map_err(|e| invalid_entry("order", i, e))?;
    }
    for (i, commitment) in snapshot.commitments.iter().enumerate() {
        commitment
            .validate()
            .map_err(|e| invalid_entry("commitment", i, e))?;
    }

    validate_last_order_id(snapshot.last_order_id, &snapshot.orders)?;
    let requirements = reconcile_holds(&snapshot.orders, &snapshot.commitments, store, ledger)?;

    let summary = LoadSummary {
        payments: snapshot.payments.len(),
        orders: snapshot.orders.len(),
        commitments: snapshot.commitments.len(),
        accounts_with_holds: requirements.len(),
    };
    info!(?summary, "state loaded");
    Ok(summary)
}

fn invalid_entry(kind: &str, index: usize, cause: EscrowError) -> EscrowError {
    InvariantViolation::InvalidState {
        entry: format!("{kind} {index}"),
        cause: Box::new(cause),
    }
    .into()
}

/// Every readable payment in key order. Corrupt records are skipped.
pub fn export_payments<S: KvStore>(store: &PaymentStore<S>) -> Result<Vec<Payment>> {
    let mut payments = Vec::new();
    store.iterate_all(|payment| {
        payments.push(payment);
        ControlFlow::Continue(())
    })?;
    Ok(payments)
}

/// Re-runs hold reconciliation against the payments currently in `store`.
pub fn audit_holds<S, H>(
    orders: &[Order],
    commitments: &[Commitment],
    store: &PaymentStore<S>,
    ledger: &H,
) -> Result<HoldRequirements>
where
    S: KvStore,
    H: HoldLedger + ?Sized,
{
    reconcile_holds(orders, commitments, store, ledger)
}
