//! Buffered writes over another [`KvStore`].
//!
//! Reads see the buffered changes on top of the parent store. Nothing reaches
//! the parent until [`StagedKvStore::commit`], which issues every buffered
//! change as one batch; dropping the stage discards them.

use crate::domain::ports::{KvOp, KvStore};
use crate::error::Result;
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use tracing::debug;

pub struct StagedKvStore<'a, S: KvStore + ?Sized> {
    parent: &'a mut S,
    // `None` marks a buffered delete.
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a, S: KvStore + ?Sized> StagedKvStore<'a, S> {
    pub fn new(parent: &'a mut S) -> Self {
        Self {
            parent,
            pending: BTreeMap::new(),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Writes every buffered change to the parent store.
    pub fn commit(self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        debug!(ops = self.pending.len(), "committing staged writes");
        let batch = self
            .pending
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => KvOp::Put { key, value },
                None => KvOp::Delete { key },
            })
            .collect();
        self.parent.write(batch)
    }
}

impl<S: KvStore + ?Sized> KvStore for StagedKvStore<'_, S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.pending.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.parent.get(key),
        }
    }

    fn write(&mut self, batch: Vec<KvOp>) -> Result<()> {
        for op in batch {
            match op {
                KvOp::Put { key, value } => self.pending.insert(key, Some(value)),
                KvOp::Delete { key } => self.pending.insert(key, None),
            };
        }
        Ok(())
    }

    fn iterate_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> Result<()> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        self.parent.iterate_prefix(prefix, &mut |key, value| {
            merged.insert(key.to_vec(), value.to_vec());
            ControlFlow::Continue(())
        })?;
        for (key, value) in &self.pending {
            if !key.starts_with(prefix) {
                continue;
            }
            match value {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }
        for (key, value) in &merged {
            if f(key, value).is_break() {
                break;
            }
        }
        Ok(())
    }
}
