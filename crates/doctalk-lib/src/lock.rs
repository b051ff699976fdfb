use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::error::AnswerError;

/// One reader/writer lock per alias.
///
/// Ingestion holds the write side for a whole run, so uploads to the same
/// alias are serialized and questions wait until the swap is done.
#[derive(Default)]
pub struct CollectionLocks {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl CollectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, alias: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(alias.to_string()).or_default())
    }

    pub async fn write(&self, alias: &str) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(alias).write_owned().await
    }

    /// Read access, or [`AnswerError::NotReady`] if an ingestion still holds
    /// the alias after `wait`.
    pub async fn read(
        &self,
        alias: &str,
        wait: Duration,
    ) -> Result<OwnedRwLockReadGuard<()>, AnswerError> {
        tokio::time::timeout(wait, self.lock_for(alias).read_owned())
            .await
            .map_err(|_| AnswerError::NotReady(alias.to_string()))
    }
}
