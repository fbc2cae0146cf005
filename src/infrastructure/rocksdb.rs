use crate::domain::ports::{KvOp, KvStore};
use crate::error::{EscrowError, Result};
use rocksdb::{ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

/// Column Family holding payment records and their target index.
pub const CF_PAYMENTS: &str = "payments";

/// A persistent key/value store implementation using RocksDB.
///
/// Every key lives in the `payments` column family; batches are applied with a
/// single `WriteBatch` so a record and its index entry never drift apart.
///
/// This struct is cheap to clone (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbKvStore {
    db: Arc<DB>,
}

impl RocksDbKvStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_payments = ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_payments])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_PAYMENTS)
            .ok_or_else(|| EscrowError::Storage("payments column family not found".to_string()))
    }
}

impl KvStore for RocksDbKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf()?;
        Ok(self.db.get_cf(cf, key)?)
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        let cf = self.cf()?;
        // Just check if the key exists without copying the value out.
        Ok(self.db.get_pinned_cf(cf, key)?.is_some())
    }

    fn write(&mut self, ops: Vec<KvOp>) -> Result<()> {
        let cf = self.cf()?;
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                KvOp::Put { key, value } => batch.put_cf(cf, key, value),
                KvOp::Delete { key } => batch.delete_cf(cf, key),
            }
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn iterate_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> Result<()> {
        let cf = self.cf()?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            if f(&key, &value).is_break() {
                break;
            }
        }
        Ok(())
    }
}
