use super::keys::{
    all_payments_prefix, display_key, payment_key, target_index_key, target_index_prefix,
};
use crate::domain::address::Address;
use crate::domain::payment::Payment;
use crate::domain::ports::{KvOp, KvStore};
use crate::error::{EscrowError, Result};
use std::ops::ControlFlow;
use tracing::warn;

/// Keyed storage of payments and their target index.
///
/// Every write that touches a payment also issues the matching index change in
/// the same [`KvStore::write`] batch, so the primary record and its index entry
/// never diverge.
pub struct PaymentStore<S> {
    kv: S,
}

impl<S: KvStore> PaymentStore<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    pub fn into_inner(self) -> S {
        self.kv
    }

    fn decode_value(key: &[u8], value: &[u8]) -> Result<Payment> {
        serde_json::from_slice(value).map_err(|e| EscrowError::Decode {
            key: display_key(key),
            reason: e.to_string(),
        })
    }

    /// Looks up a payment. A missing payment is `Ok(None)`.
    pub fn get(&self, source: &str, external_id: &str) -> Result<Option<Payment>> {
        let source = Address::decode("source", source)?;
        self.get_by_address(&source, external_id)
    }

    fn get_by_address(&self, source: &Address, external_id: &str) -> Result<Option<Payment>> {
        let key = payment_key(source, external_id);
        match self.kv.get(&key)? {
            Some(value) => Self::decode_value(&key, &value).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get), but a missing payment is an error.
    pub fn require(&self, source: &str, external_id: &str) -> Result<Payment> {
        self.get(source, external_id)?
            .ok_or_else(|| EscrowError::NotFound {
                owner: source.to_string(),
                external_id: external_id.to_string(),
            })
    }

    /// Writes a payment, moving its target index entry if the target changed.
    pub fn put(&mut self, payment: &Payment) -> Result<()> {
        let source = Address::decode("source", &payment.source)?;
        let target = if payment.target.is_empty() {
            None
        } else {
            Some(Address::decode("target", &payment.target)?)
        };

        let key = payment_key(&source, &payment.external_id);
        let value = serde_json::to_vec(payment)?;

        let mut new_index = target
            .as_ref()
            .map(|t| target_index_key(t, &source, &payment.external_id));
        let mut old_index = None;
        if let Some(existing) = self.get_by_address(&source, &payment.external_id)? {
            if existing.target == payment.target {
                // Same target: the index entry is already in place.
                new_index = None;
            } else if !existing.target.is_empty() {
                let old_target = Address::decode("target", &existing.target)?;
                old_index = Some(target_index_key(&old_target, &source, &payment.external_id));
            }
        }

        let mut batch = vec![KvOp::Put { key, value }];
        if let Some(key) = old_index {
            batch.push(KvOp::Delete { key });
        }
        if let Some(key) = new_index {
            batch.push(KvOp::Put { key, value: Vec::new() });
        }
        self.kv.write(batch)
    }

    /// Writes a new payment, failing if one already exists with the same key.
    pub fn create(&mut self, payment: &Payment) -> Result<()> {
        let source = Address::decode("source", &payment.source)?;
        if self.kv.has(&payment_key(&source, &payment.external_id))? {
            return Err(EscrowError::AlreadyExists {
                owner: payment.source.clone(),
                external_id: payment.external_id.clone(),
            });
        }
        self.put(payment)
    }

    /// Removes a payment and its index entry.
    pub fn delete(&mut self, payment: &Payment) -> Result<()> {
        let source = Address::decode("source", &payment.source)?;
        let mut batch = vec![KvOp::Delete {
            key: payment_key(&source, &payment.external_id),
        }];
        if !payment.target.is_empty() {
            let target = Address::decode("target", &payment.target)?;
            batch.push(KvOp::Delete {
                key: target_index_key(&target, &source, &payment.external_id),
            });
        }
        self.kv.write(batch)
    }

    /// Gets the payments from `source` that have `target` as their target.
    ///
    /// Always empty when either account is empty: payments without a target
    /// are never listed this way.
    pub fn list_by_target_and_source(&self, target: &str, source: &str) -> Result<Vec<Payment>> {
        if target.is_empty() || source.is_empty() {
            return Ok(Vec::new());
        }
        let target = Address::decode("target", target)?;
        let source = Address::decode("source", source)?;
        let prefix = target_index_prefix(&target, &source);

        let mut external_ids = Vec::new();
        self.kv.iterate_prefix(&prefix, &mut |key, _| {
            match std::str::from_utf8(&key[prefix.len()..]) {
                Ok(id) => external_ids.push(id.to_string()),
                Err(_) => warn!(key = %display_key(key), "skipping index entry with non-utf8 external id"),
            }
            ControlFlow::Continue(())
        })?;

        let mut payments = Vec::with_capacity(external_ids.len());
        for external_id in external_ids {
            match self.get_by_address(&source, &external_id) {
                Ok(Some(payment)) => payments.push(payment),
                Ok(None) => warn!(
                    target_account = %target,
                    source_account = %source,
                    external_id = %external_id,
                    "index entry points to a missing payment"
                ),
                Err(e) => warn!(error = %e, "skipping unreadable payment"),
            }
        }
        Ok(payments)
    }

    /// Visits every payment in key order until `f` breaks.
    ///
    /// Records that can't be decoded are logged and skipped.
    pub fn iterate_all<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Payment) -> ControlFlow<()>,
    {
        self.kv.iterate_prefix(&all_payments_prefix(), &mut |key, value| {
            match Self::decode_value(key, value) {
                Ok(payment) => f(payment),
                Err(e) => {
                    warn!(error = %e, "skipping corrupt payment record");
                    ControlFlow::Continue(())
                }
            }
        })
    }
}
