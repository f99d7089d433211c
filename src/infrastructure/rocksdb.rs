use crate::domain::enrollment::{Enrollment, EnrollmentKey, EnrollmentStatus};
use crate::domain::identity::UserId;
use crate::domain::ports::{EnrollmentStore, TransactionStore};
use crate::domain::transaction::{StatusChange, Transaction};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, ErrorKind, IteratorMode, Options,
    TransactionDB, TransactionDBOptions,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column Family for storing payment transactions, keyed by reference.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for storing enrollments, keyed by (user, course).
pub const CF_ENROLLMENTS: &str = "enrollments";

/// A persistent store implementation using a RocksDB `TransactionDB`.
///
/// Every conditional update reads the record with `get_for_update`, which
/// takes an exclusive row lock until the write commits. The status check and
/// the write therefore happen as one atomic step, exactly like an
/// `UPDATE ... WHERE status = ?` against a relational store.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<TransactionDB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<TransactionDB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("transactions" and "enrollments") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_transactions = ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default());
        let cf_enrollments = ColumnFamilyDescriptor::new(CF_ENROLLMENTS, Options::default());

        let db: TransactionDB = TransactionDB::open_cf_descriptors(
            &opts,
            &TransactionDBOptions::default(),
            path,
            vec![cf_transactions, cf_enrollments],
        )?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            EngineError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Row-lock waits that gave up because another writer holds the record.
fn is_contention(error: &EngineError) -> bool {
    matches!(
        error,
        EngineError::RocksDBError(e)
            if matches!(e.kind(), ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain)
    )
}

impl RocksDBStore {
    fn apply_transition(&self, reference: &str, change: StatusChange) -> Result<Transaction> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let key = reference.as_bytes();

        let txn = self.db.transaction();
        let bytes = txn
            .get_for_update_cf(&cf, key, true)?
            .ok_or_else(|| EngineError::NotFound(format!("transaction {reference}")))?;

        let mut tx: Transaction = decode(&bytes)?;
        tx.apply(change)?;
        txn.put_cf(&cf, key, encode(&tx)?)?;
        txn.commit()?;
        Ok(tx)
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn insert(&self, tx: Transaction) -> Result<()> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let key = tx.reference.as_bytes();

        let txn = self.db.transaction();
        if txn.get_for_update_cf(&cf, key, true)?.is_some() {
            return Err(EngineError::DuplicateReference(tx.reference.clone()));
        }
        txn.put_cf(&cf, key, encode(&tx)?)?;
        txn.commit()?;
        Ok(())
    }

    async fn find(&self, reference: &str) -> Result<Option<Transaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        match self.db.get_cf(&cf, reference.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Lock contention is reported as `InvalidTransition`: the record is
    /// being changed by another caller, which is what a lost CAS means.
    async fn transition(&self, reference: &str, change: StatusChange) -> Result<Transaction> {
        let (source, target) = (change.source(), change.target());
        match self.apply_transition(reference, change) {
            Err(e) if is_contention(&e) => {
                let current = TransactionStore::find(self, reference).await?;
                Err(EngineError::InvalidTransition {
                    reference: reference.to_string(),
                    from: current.map_or(source, |tx| tx.status),
                    to: target,
                })
            }
            result => result,
        }
    }
}

#[async_trait]
impl EnrollmentStore for RocksDBStore {
    async fn insert_if_absent(&self, enrollment: Enrollment) -> Result<Enrollment> {
        let cf = self.cf(CF_ENROLLMENTS)?;
        let key = enrollment.key().to_bytes();

        let txn = self.db.transaction();
        if let Some(bytes) = txn.get_for_update_cf(&cf, &key, true)? {
            let existing: Enrollment = decode(&bytes)?;
            if !existing.is_replaced_by(&enrollment) {
                return Ok(existing);
            }
        }
        txn.put_cf(&cf, &key, encode(&enrollment)?)?;
        txn.commit()?;
        Ok(enrollment)
    }

    async fn find(&self, key: &EnrollmentKey) -> Result<Option<Enrollment>> {
        let cf = self.cf(CF_ENROLLMENTS)?;
        match self.db.get_cf(&cf, key.to_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Enrollment>> {
        let cf = self.cf(CF_ENROLLMENTS)?;
        let prefix = EnrollmentKey::user_prefix(user_id);

        let mut enrollments = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix.as_slice(), Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            enrollments.push(decode(&value)?);
        }
        Ok(enrollments)
    }

    async fn revoke(&self, key: &EnrollmentKey) -> Result<Enrollment> {
        let cf = self.cf(CF_ENROLLMENTS)?;
        let raw_key = key.to_bytes();

        let txn = self.db.transaction();
        let bytes = txn
            .get_for_update_cf(&cf, &raw_key, true)?
            .ok_or_else(|| EngineError::NotFound(format!("enrollment {key}")))?;
        let mut enrollment: Enrollment = decode(&bytes)?;
        enrollment.status = EnrollmentStatus::Revoked;
        txn.put_cf(&cf, &raw_key, encode(&enrollment)?)?;
        txn.commit()?;
        Ok(enrollment)
    }
}
