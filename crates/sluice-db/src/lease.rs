//! Renewable leases backed by persistent storage.
//!
//! A lease is signed with a conditional write that only succeeds once the
//! previous holder's signature is at least one interval old. While held, a
//! background task re-signs it every `interval / 2`. Any failed or late
//! renewal marks the lease lost; the holder must stop working under it.

use async_trait::async_trait;
use sluice_core::{BuildId, PipelineId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error};

use crate::{DbError, DbResult};

/// What a lease protects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LeaseKey {
    /// Tracking (running) a build.
    BuildTracking(BuildId),
    /// Scheduling a pending build.
    BuildScheduling(BuildId),
    /// One scheduling pass over a pipeline.
    PipelineScheduling(PipelineId),
    /// A named periodic task.
    Task(String),
}

impl fmt::Display for LeaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseKey::BuildTracking(id) => write!(f, "build-tracking:{}", id),
            LeaseKey::BuildScheduling(id) => write!(f, "build-scheduling:{}", id),
            LeaseKey::PipelineScheduling(id) => write!(f, "pipeline-scheduling:{}", id),
            LeaseKey::Task(name) => write!(f, "task:{}", name),
        }
    }
}

/// Persistent storage for lease signatures.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Sign the lease if its last signature is at least `interval` old.
    ///
    /// Returns `false` when someone else holds it. Unknown task keys are
    /// created first.
    async fn attempt_sign(&self, key: &LeaseKey, interval: Duration) -> DbResult<bool>;

    /// Re-sign a lease unconditionally.
    ///
    /// Fails with [`DbError::LeaseNotFound`] if the row was removed.
    async fn renew(&self, key: &LeaseKey) -> DbResult<()>;
}

type ReleaseCallback = Box<dyn FnOnce() + Send + Sync + 'static>;

/// A held lease. Exclusively owned by whoever signed it.
pub struct Lease {
    key: LeaseKey,
    stop_tx: watch::Sender<bool>,
    lost_rx: watch::Receiver<bool>,
    renewal: Option<JoinHandle<()>>,
    on_release: Option<ReleaseCallback>,
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("key", &self.key)
            .field("held", &self.is_held())
            .finish()
    }
}

impl Lease {
    /// Try to take the lease for `key`.
    ///
    /// `Ok(None)` means another party currently holds it, which is the
    /// normal outcome when several replicas race for the same work.
    pub async fn acquire(
        store: Arc<dyn LeaseStore>,
        key: LeaseKey,
        interval: Duration,
    ) -> DbResult<Option<Lease>> {
        if interval.is_zero() {
            return Err(DbError::InvalidArgument(format!(
                "lease interval for {} must be greater than zero",
                key
            )));
        }

        if !store.attempt_sign(&key, interval).await? {
            debug!(lease = %key, "lease held elsewhere");
            return Ok(None);
        }

        debug!(lease = %key, interval_ms = interval.as_millis() as u64, "lease acquired");
        Ok(Some(Self::keep_signed(store, key, interval)))
    }

    /// Lease the right to track a running build.
    pub async fn build_tracking(
        store: Arc<dyn LeaseStore>,
        build_id: BuildId,
        interval: Duration,
    ) -> DbResult<Option<Lease>> {
        Self::acquire(store, LeaseKey::BuildTracking(build_id), interval).await
    }

    /// Lease the right to schedule a pending build.
    pub async fn build_scheduling(
        store: Arc<dyn LeaseStore>,
        build_id: BuildId,
        interval: Duration,
    ) -> DbResult<Option<Lease>> {
        Self::acquire(store, LeaseKey::BuildScheduling(build_id), interval).await
    }

    /// Lease one scheduling pass over a pipeline.
    pub async fn pipeline_scheduling(
        store: Arc<dyn LeaseStore>,
        pipeline_id: PipelineId,
        interval: Duration,
    ) -> DbResult<Option<Lease>> {
        Self::acquire(store, LeaseKey::PipelineScheduling(pipeline_id), interval).await
    }

    /// Lease a named periodic task. The store creates the task's record on
    /// first use.
    pub async fn task(
        store: Arc<dyn LeaseStore>,
        name: &str,
        interval: Duration,
    ) -> DbResult<Option<Lease>> {
        Self::acquire(store, LeaseKey::Task(name.to_string()), interval).await
    }

    fn keep_signed(store: Arc<dyn LeaseStore>, key: LeaseKey, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (lost_tx, lost_rx) = watch::channel(false);

        let renewal = tokio::spawn(keep_leased(store, key.clone(), interval, stop_rx, lost_tx));

        Self {
            key,
            stop_tx,
            lost_rx,
            renewal: Some(renewal),
            on_release: None,
        }
    }

    pub fn key(&self) -> &LeaseKey {
        &self.key
    }

    /// Run `callback` once the lease is released.
    pub fn on_release(&mut self, callback: impl FnOnce() + Send + Sync + 'static) {
        self.on_release = Some(Box::new(callback));
    }

    /// Whether the lease is still held: not released and not lost.
    pub fn is_held(&self) -> bool {
        self.renewal.is_some() && !*self.lost_rx.borrow()
    }

    /// Resolves once the lease is lost or released.
    pub async fn lost(&self) {
        let mut lost = self.lost_rx.clone();
        // the sender is dropped when renewal stops, which also ends the hold
        let _ = lost.wait_for(|lost| *lost).await;
    }

    /// Stop renewing, wait for the renewal task to exit, then run the
    /// release callback. Calling it again does nothing.
    pub async fn release(&mut self) {
        let Some(renewal) = self.renewal.take() else {
            return;
        };

        let _ = self.stop_tx.send(true);
        if let Err(e) = renewal.await {
            error!(lease = %self.key, error = %e, "lease renewal task failed");
        }

        if let Some(callback) = self.on_release.take() {
            callback();
        }

        debug!(lease = %self.key, "lease released");
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(renewal) = self.renewal.take() {
            let _ = self.stop_tx.send(true);
            renewal.abort();
        }
    }
}

async fn keep_leased(
    store: Arc<dyn LeaseStore>,
    key: LeaseKey,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
    lost: watch::Sender<bool>,
) {
    let period = interval / 2;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match tokio::time::timeout(period, store.renew(&key)).await {
                    Ok(Ok(())) => debug!(lease = %key, "renewed the lease"),
                    Ok(Err(e)) => {
                        error!(lease = %key, error = %e, "failed to renew lease");
                        let _ = lost.send(true);
                        break;
                    }
                    Err(_) => {
                        error!(lease = %key, "timed out renewing lease");
                        let _ = lost.send(true);
                        break;
                    }
                }
            }
            _ = stop.changed() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryLeaseStore;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const INTERVAL: Duration = Duration::from_secs(2);

    fn pipeline_key() -> LeaseKey {
        LeaseKey::PipelineScheduling(PipelineId::new(1))
    }

    /// Delegates to a memory store, but renewals hang while `stalled` is set.
    #[derive(Default)]
    struct StallingStore {
        inner: MemoryLeaseStore,
        stalled: AtomicBool,
    }

    #[async_trait]
    impl LeaseStore for StallingStore {
        async fn attempt_sign(&self, key: &LeaseKey, interval: Duration) -> DbResult<bool> {
            self.inner.attempt_sign(key, interval).await
        }

        async fn renew(&self, key: &LeaseKey) -> DbResult<()> {
            if self.stalled.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.inner.renew(key).await
        }
    }

    #[test]
    fn test_key_display() {
        assert_eq!(pipeline_key().to_string(), "pipeline-scheduling:1");
        assert_eq!(
            LeaseKey::BuildTracking(BuildId::new(7)).to_string(),
            "build-tracking:7"
        );
        assert_eq!(LeaseKey::Task("gc".to_string()).to_string(), "task:gc");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquire_is_exclusive() {
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());

        let (a, b) = tokio::join!(
            Lease::acquire(store.clone(), pipeline_key(), INTERVAL),
            Lease::acquire(store.clone(), pipeline_key(), INTERVAL),
        );
        let (mut a, mut b) = (a.unwrap(), b.unwrap());

        assert!(a.is_some() ^ b.is_some());

        if let Some(lease) = a.as_mut() {
            lease.release().await;
        }
        if let Some(lease) = b.as_mut() {
            lease.release().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_keys_do_not_conflict() {
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());

        let mut a = Lease::acquire(store.clone(), pipeline_key(), INTERVAL)
            .await
            .unwrap()
            .unwrap();
        let mut b = Lease::acquire(store.clone(), LeaseKey::Task("gc".to_string()), INTERVAL)
            .await
            .unwrap()
            .unwrap();

        a.release().await;
        b.release().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_lease_is_created_on_first_use() {
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());

        let mut gc = Lease::task(store.clone(), "gc", INTERVAL)
            .await
            .unwrap()
            .expect("an unknown task should be created and signed");
        assert_eq!(gc.key(), &LeaseKey::Task("gc".to_string()));

        assert!(Lease::task(store.clone(), "gc", INTERVAL).await.unwrap().is_none());
        let mut other = Lease::task(store.clone(), "reaper", INTERVAL)
            .await
            .unwrap()
            .expect("a different task is independent");

        // still renewed after several intervals
        tokio::time::sleep(INTERVAL * 3).await;
        assert!(gc.is_held());
        assert!(Lease::task(store, "gc", INTERVAL).await.unwrap().is_none());

        gc.release().await;
        other.release().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_leases_are_per_kind() {
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
        let build = BuildId::new(7);

        let mut tracking = Lease::build_tracking(store.clone(), build, INTERVAL)
            .await
            .unwrap()
            .unwrap();
        let mut scheduling = Lease::build_scheduling(store.clone(), build, INTERVAL)
            .await
            .unwrap()
            .expect("scheduling a build does not conflict with tracking it");

        assert!(
            Lease::build_tracking(store.clone(), build, INTERVAL)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            Lease::build_scheduling(store.clone(), build, INTERVAL)
                .await
                .unwrap()
                .is_none()
        );
        let mut pipeline = Lease::pipeline_scheduling(store, PipelineId::new(7), INTERVAL)
            .await
            .unwrap()
            .expect("pipeline ids are a separate key space");

        tracking.release().await;
        scheduling.release().await;
        pipeline.release().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewed_lease_stays_held() {
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());

        let mut lease = Lease::acquire(store.clone(), pipeline_key(), INTERVAL)
            .await
            .unwrap()
            .unwrap();

        for _ in 0..10 {
            tokio::time::sleep(INTERVAL).await;
            assert!(lease.is_held());
            let rival = Lease::acquire(store.clone(), pipeline_key(), INTERVAL)
                .await
                .unwrap();
            assert!(rival.is_none());
        }

        lease.release().await;
        assert!(!lease.is_held());

        tokio::time::sleep(INTERVAL + Duration::from_millis(1)).await;
        let mut next = Lease::acquire(store, pipeline_key(), INTERVAL)
            .await
            .unwrap()
            .expect("lease should be free after the holder stopped renewing");
        next.release().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_renewal_loses_lease() {
        let stalling = Arc::new(StallingStore::default());
        let store: Arc<dyn LeaseStore> = stalling.clone();

        let mut lease = Lease::acquire(store.clone(), pipeline_key(), INTERVAL)
            .await
            .unwrap()
            .unwrap();
        stalling.stalled.store(true, Ordering::SeqCst);

        tokio::time::timeout(INTERVAL * 2, lease.lost())
            .await
            .expect("a stalled renewal should lose the lease");
        assert!(!lease.is_held());

        tokio::time::sleep(Duration::from_millis(1)).await;
        let mut rival = Lease::acquire(store, pipeline_key(), INTERVAL)
            .await
            .unwrap()
            .expect("another party should take over after one interval");

        lease.release().await;
        stalling.stalled.store(false, Ordering::SeqCst);
        rival.release().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_row_loses_lease() {
        let memory = Arc::new(MemoryLeaseStore::new());
        let store: Arc<dyn LeaseStore> = memory.clone();

        let lease = Lease::acquire(store, pipeline_key(), INTERVAL)
            .await
            .unwrap()
            .unwrap();
        memory.remove(&pipeline_key());

        tokio::time::timeout(INTERVAL, lease.lost())
            .await
            .expect("renewing a deleted lease should fail");
        assert!(!lease.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_is_idempotent_and_runs_callback_once() {
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
        let released = Arc::new(AtomicUsize::new(0));

        let mut lease = Lease::acquire(store, pipeline_key(), INTERVAL)
            .await
            .unwrap()
            .unwrap();
        let counter = released.clone();
        lease.on_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        lease.release().await;
        lease.release().await;

        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(!lease.is_held());
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());

        let result = Lease::acquire(store, pipeline_key(), Duration::ZERO).await;
        assert!(matches!(result, Err(DbError::InvalidArgument(_))));
    }
}
