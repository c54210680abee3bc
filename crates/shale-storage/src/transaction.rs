//! Scoped transactions

use crate::error::StorageResult;
use crate::traits::{DbConnection, IsolationLevel};

/// A transaction that rolls back unless committed
pub struct Transaction<'c, C: DbConnection> {
    conn: &'c mut C,
    finished: bool,
}

impl<'c, C: DbConnection> Transaction<'c, C> {
    pub fn begin(conn: &'c mut C, isolation: IsolationLevel) -> StorageResult<Self> {
        conn.begin(isolation)?;
        Ok(Self {
            conn,
            finished: false,
        })
    }

    /// The connection the transaction runs on
    pub fn connection(&mut self) -> &mut C {
        self.conn
    }

    /// Commit; on failure the guard still rolls back when dropped
    pub fn commit(mut self) -> StorageResult<()> {
        self.conn.commit()?;
        self.finished = true;
        Ok(())
    }
}

impl<C: DbConnection> Drop for Transaction<'_, C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::debug!("Rolling back unfinished transaction");
        if let Err(e) = self.conn.rollback() {
            tracing::warn!("Rollback failed: {}", e);
        }
    }
}
