//! In-memory lease store for single-process deployments and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::lease::{LeaseKey, LeaseStore};
use crate::{DbError, DbResult};

/// Lease signatures kept in a process-local map.
///
/// Uses tokio's clock so paused-time tests drive expiry.
#[derive(Debug, Default)]
pub struct MemoryLeaseStore {
    signed: Mutex<HashMap<LeaseKey, Option<Instant>>>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete a lease row, as an operator or cleanup job might.
    pub fn remove(&self, key: &LeaseKey) -> bool {
        self.lock().remove(key).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<LeaseKey, Option<Instant>>> {
        self.signed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn attempt_sign(&self, key: &LeaseKey, interval: Duration) -> DbResult<bool> {
        let now = Instant::now();
        let mut signed = self.lock();
        let last = signed.entry(key.clone()).or_insert(None);

        match *last {
            Some(at) if now.duration_since(at) < interval => Ok(false),
            _ => {
                *last = Some(now);
                Ok(true)
            }
        }
    }

    async fn renew(&self, key: &LeaseKey) -> DbResult<()> {
        let now = Instant::now();
        match self.lock().get_mut(key) {
            Some(last) => {
                *last = Some(now);
                Ok(())
            }
            None => Err(DbError::LeaseNotFound(key.to_string())),
        }
    }
}
