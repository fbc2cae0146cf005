use super::payment_store::PaymentStore;
use crate::config::PaymentFeeParams;
use crate::domain::address::Address;
use crate::domain::coins::{Coin, Coins};
use crate::domain::command::PaymentCommand;
use crate::domain::events::PaymentEvent;
use crate::domain::payment::Payment;
use crate::domain::ports::{Checkpoint, EventSink, HoldLedger, KvStore, TransferService};
use crate::error::{EscrowError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::ops::ControlFlow;
use tracing::debug;

/// Flat fees owed for creating and for accepting a payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaymentFees {
    pub fee_create: Option<Coin>,
    pub fee_accept: Option<Coin>,
}

/// The operation surface for payments.
///
/// Each operation is one state transition. A failure part way through leaves
/// earlier steps applied; the caller is expected to discard the whole
/// transaction on error rather than rely on any undo here.
pub struct PaymentEngine<H, T, E> {
    holds: H,
    transfers: T,
    events: E,
    // Events held back until the caller knows the transition persisted.
    deferred: Option<Vec<PaymentEvent>>,
    fees: PaymentFeeParams,
}

impl<H, T, E> PaymentEngine<H, T, E>
where
    H: HoldLedger,
    T: TransferService,
    E: EventSink,
{
    pub fn new(holds: H, transfers: T, events: E, fees: PaymentFeeParams) -> Self {
        Self {
            holds,
            transfers,
            events,
            deferred: None,
            fees,
        }
    }

    pub fn holds(&self) -> &H {
        &self.holds
    }

    pub fn transfers(&self) -> &T {
        &self.transfers
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn into_parts(self) -> (H, T, E) {
        (self.holds, self.transfers, self.events)
    }

    /// Holds back emitted events until [`flush_events`](Self::flush_events)
    /// or [`discard_events`](Self::discard_events).
    pub fn defer_events(&mut self) {
        self.deferred.get_or_insert_with(Vec::new);
    }

    /// Sends every held back event to the sink and stops deferring.
    pub fn flush_events(&mut self) {
        if let Some(events) = self.deferred.take() {
            self.events.emit_batch(events);
        }
    }

    /// Drops every held back event and stops deferring.
    pub fn discard_events(&mut self) -> usize {
        self.deferred.take().map_or(0, |events| events.len())
    }

    fn emit(&mut self, event: PaymentEvent) {
        match &mut self.deferred {
            Some(events) => events.push(event),
            None => self.events.emit(event),
        }
    }

    /// Dispatches a command to the matching operation.
    pub fn execute<S: KvStore>(&mut self, store: &mut PaymentStore<S>, command: PaymentCommand) -> Result<()> {
        match command {
            PaymentCommand::Create(payment) => self.create_payment(store, &payment),
            PaymentCommand::Accept(payment) => self.accept_payment(store, &payment),
            PaymentCommand::Reject {
                target,
                source,
                external_id,
            } => self.reject_payment(store, &target, &source, &external_id),
            PaymentCommand::RejectAll { target, sources } => {
                self.reject_payments(store, &target, &sources)
            }
            PaymentCommand::Cancel {
                source,
                external_ids,
            } => self.cancel_payments(store, &source, &external_ids),
            PaymentCommand::Retarget {
                source,
                external_id,
                new_target,
            } => self.update_payment_target(store, &source, &external_id, &new_target),
        }
    }

    /// Stores a new payment and places a hold on its source amount.
    pub fn create_payment<S: KvStore>(&mut self, store: &mut PaymentStore<S>, payment: &Payment) -> Result<()> {
        payment.validate()?;
        store.create(payment)?;

        let source = Address::decode("source", &payment.source)?;
        let reason = format!("payment:{}", payment.external_id);
        self.holds.add_hold(&source, &payment.source_amount, &reason)?;

        debug!(payment = %payment, "payment created");
        self.emit(PaymentEvent::PaymentCreated {
            payment: payment.clone(),
        });
        Ok(())
    }

    /// Completes a payment: the provided payment must match the stored one exactly.
    ///
    /// The source amount goes to the target and the target amount goes to the
    /// source, in that order.
    pub fn accept_payment<S: KvStore>(&mut self, store: &mut PaymentStore<S>, payment: &Payment) -> Result<()> {
        payment.validate()?;
        if payment.target.is_empty() {
            return Err(EscrowError::Validation(
                "cannot accept a payment without a target".to_string(),
            ));
        }

        let existing = store.require(&payment.source, &payment.external_id)?;
        check_field("source", &payment.source, &existing.source)?;
        check_field(
            "source amount",
            &payment.source_amount.to_string(),
            &existing.source_amount.to_string(),
        )?;
        check_field("target", &payment.target, &existing.target)?;
        check_field(
            "target amount",
            &payment.target_amount.to_string(),
            &existing.target_amount.to_string(),
        )?;
        check_field("external id", &payment.external_id, &existing.external_id)?;

        self.delete_and_release(store, &existing)?;

        let source = Address::decode("source", &existing.source)?;
        let target = Address::decode("target", &existing.target)?;
        if !existing.source_amount.is_zero() {
            self.send(&source, &target, &existing.source_amount)?;
        }
        if !existing.target_amount.is_zero() {
            self.send(&target, &source, &existing.target_amount)?;
        }

        debug!(payment = %existing, "payment accepted");
        self.emit(PaymentEvent::PaymentAccepted { payment: existing });
        Ok(())
    }

    /// Lets a target turn down a single payment made to them.
    pub fn reject_payment<S: KvStore>(
        &mut self,
        store: &mut PaymentStore<S>,
        target: &str,
        source: &str,
        external_id: &str,
    ) -> Result<()> {
        require_account("target", target)?;
        require_account("source", source)?;

        let payment = store.require(source, external_id)?;
        if payment.target.is_empty() {
            return Err(EscrowError::NoTarget {
                owner: payment.source,
                external_id: payment.external_id,
            });
        }
        if payment.target != target {
            return Err(EscrowError::TargetMismatch {
                target: target.to_string(),
                payment_target: payment.target,
            });
        }

        self.delete_and_release(store, &payment)?;

        debug!(payment = %payment, "payment rejected");
        self.emit(PaymentEvent::PaymentRejected { payment });
        Ok(())
    }

    /// Lets a target turn down every payment made to them by each of `sources`.
    ///
    /// Each source must have at least one such payment; nothing is deleted
    /// unless all of them do.
    pub fn reject_payments<S: KvStore>(
        &mut self,
        store: &mut PaymentStore<S>,
        target: &str,
        sources: &[String],
    ) -> Result<()> {
        require_account("target", target)?;
        if sources.is_empty() {
            return Err(EscrowError::Validation(
                "at least one source is required".to_string(),
            ));
        }

        let mut payments = Vec::new();
        for source in dedup(sources) {
            let found = store.list_by_target_and_source(target, source)?;
            if found.is_empty() {
                return Err(EscrowError::NoPaymentsForSource {
                    owner: source.to_string(),
                    target: target.to_string(),
                });
            }
            payments.extend(found);
        }

        self.delete_all_and_release(store, &payments)?;

        debug!(target_account = target, count = payments.len(), "payments rejected");
        self.emit(PaymentEvent::PaymentsRejected { payments });
        Ok(())
    }

    /// Lets a source withdraw some of their payments, whatever their target.
    pub fn cancel_payments<S: KvStore>(
        &mut self,
        store: &mut PaymentStore<S>,
        source: &str,
        external_ids: &[String],
    ) -> Result<()> {
        require_account("source", source)?;
        if external_ids.is_empty() {
            return Err(EscrowError::Validation(
                "at least one external id is required".to_string(),
            ));
        }

        let payments = dedup(external_ids)
            .into_iter()
            .map(|external_id| store.require(source, external_id))
            .collect::<Result<Vec<_>>>()?;

        self.delete_all_and_release(store, &payments)?;

        debug!(source_account = source, count = payments.len(), "payments cancelled");
        self.emit(PaymentEvent::PaymentsCancelled { payments });
        Ok(())
    }

    /// Changes who a payment is for. An empty `new_target` unassigns it.
    pub fn update_payment_target<S: KvStore>(
        &mut self,
        store: &mut PaymentStore<S>,
        source: &str,
        external_id: &str,
        new_target: &str,
    ) -> Result<()> {
        let mut payment = store.require(source, external_id)?;
        if payment.target == new_target {
            return Err(EscrowError::NoChange {
                owner: payment.source,
                external_id: payment.external_id,
                target: payment.target,
            });
        }
        if !new_target.is_empty() {
            Address::decode("new target", new_target)?;
        }

        let old_target = std::mem::replace(&mut payment.target, new_target.to_string());
        store.put(&payment)?;

        debug!(payment = %payment, old_target = %old_target, "payment target updated");
        self.emit(PaymentEvent::PaymentUpdated {
            payment,
            old_target,
        });
        Ok(())
    }

    pub fn get_payment<S: KvStore>(&self, store: &PaymentStore<S>, source: &str, external_id: &str) -> Result<Option<Payment>> {
        store.get(source, external_id)
    }

    pub fn get_payments_for_target_and_source<S: KvStore>(
        &self,
        store: &PaymentStore<S>,
        target: &str,
        source: &str,
    ) -> Result<Vec<Payment>> {
        store.list_by_target_and_source(target, source)
    }

    pub fn iterate_payments<S: KvStore, F>(&self, store: &PaymentStore<S>, f: F) -> Result<()>
    where
        F: FnMut(Payment) -> ControlFlow<()>,
    {
        store.iterate_all(f)
    }

    /// Looks up the flat fees that apply to `payment`.
    ///
    /// Creating costs the create fee when something is offered, accepting costs
    /// the accept fee when something is asked for. No payment means no fees.
    pub fn calculate_payment_fees(&self, payment: Option<&Payment>) -> PaymentFees {
        let Some(payment) = payment else {
            return PaymentFees::default();
        };
        PaymentFees {
            fee_create: if payment.source_amount.is_zero() {
                None
            } else {
                self.fees.fee_create_payment_flat.first().cloned()
            },
            fee_accept: if payment.target_amount.is_zero() {
                None
            } else {
                self.fees.fee_accept_payment_flat.first().cloned()
            },
        }
    }

    fn send(&mut self, from: &Address, to: &Address, amount: &Coins) -> Result<()> {
        self.transfers
            .transfer(from, to, amount)
            .map_err(|e| EscrowError::Transfer {
                from: from.to_string(),
                to: to.to_string(),
                amount: amount.to_string(),
                cause: Box::new(e),
            })
    }

    fn delete_and_release<S: KvStore>(&mut self, store: &mut PaymentStore<S>, payment: &Payment) -> Result<()> {
        store.delete(payment)?;
        let source = Address::decode("source", &payment.source)?;
        self.holds.release_hold(&source, &payment.source_amount)
    }

    fn delete_all_and_release<S: KvStore>(&mut self, store: &mut PaymentStore<S>, payments: &[Payment]) -> Result<()> {
        for payment in payments {
            self.delete_and_release(store, payment)?;
        }
        Ok(())
    }
}

impl<H, T, E> PaymentEngine<H, T, E>
where
    H: HoldLedger + Checkpoint,
    T: TransferService + Checkpoint,
    E: EventSink,
{
    /// Saves hold and transfer state ahead of a command.
    pub fn checkpoint(&self) -> (H::Saved, T::Saved) {
        (self.holds.checkpoint(), self.transfers.checkpoint())
    }

    /// Puts back state saved by [`checkpoint`](Self::checkpoint) and drops
    /// any deferred events.
    pub fn rollback(&mut self, (holds, transfers): (H::Saved, T::Saved)) {
        self.holds.rollback(holds);
        self.transfers.rollback(transfers);
        let dropped = self.discard_events();
        debug!(dropped, "rolled back failed command");
    }
}

fn check_field(field: &'static str, provided: &str, existing: &str) -> Result<()> {
    if provided != existing {
        return Err(EscrowError::Mismatch {
            field,
            provided: provided.to_string(),
            existing: existing.to_string(),
        });
    }
    Ok(())
}

fn require_account(role: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(EscrowError::Validation(format!("{role} must not be empty")));
    }
    Ok(())
}

/// Drops repeated entries, keeping the first occurrence of each.
fn dedup(values: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    values
        .iter()
        .map(String::as_str)
        .filter(|v| seen.insert(*v))
        .collect()
}
