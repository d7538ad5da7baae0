//! Background drain scheduling.

use crate::engine::SyncEngine;
use crate::error::{EngineResult, SyncError};
use crate::remote::RemoteDataStore;
use crate::result::SyncResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use waypoint_core::SyncStore;

/// Runs drains on a tokio runtime.
///
/// A drain starts when connectivity comes back, on every interval tick while
/// online, and whenever [`SyncWorker::trigger`] is called. Drains execute on
/// the blocking pool because remote calls are synchronous; the engine's own
/// guard keeps them from overlapping.
pub struct SyncWorker {
    trigger: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    results: watch::Receiver<Option<SyncResult>>,
    handle: JoinHandle<()>,
}

impl SyncWorker {
    /// Spawns the worker on the current runtime.
    ///
    /// `connectivity` carries the online flag; `interval` is the periodic
    /// drain interval.
    pub fn spawn<S, R>(
        engine: Arc<SyncEngine<S, R>>,
        connectivity: watch::Receiver<bool>,
        interval: Duration,
    ) -> Self
    where
        S: SyncStore + 'static,
        R: RemoteDataStore + 'static,
    {
        let trigger = Arc::new(Notify::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (results_tx, results) = watch::channel(None);

        let handle = tokio::spawn(run(
            engine,
            connectivity,
            interval,
            Arc::clone(&trigger),
            shutdown_rx,
            results_tx,
        ));

        Self {
            trigger,
            shutdown,
            results,
            handle,
        }
    }

    /// Requests a drain as soon as possible.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Subscribes to the result of each completed drain.
    pub fn subscribe(&self) -> watch::Receiver<Option<SyncResult>> {
        self.results.clone()
    }

    /// Stops the worker and waits for an in-flight drain to finish.
    pub async fn shutdown(self) -> EngineResult<()> {
        // The worker may already have exited; that is not an error.
        let _ = self.shutdown.send(true);
        self.handle
            .await
            .map_err(|e| SyncError::Task(e.to_string()))
    }
}

impl std::fmt::Debug for SyncWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncWorker")
            .field("finished", &self.handle.is_finished())
            .finish_non_exhaustive()
    }
}

async fn run<S, R>(
    engine: Arc<SyncEngine<S, R>>,
    mut connectivity: watch::Receiver<bool>,
    interval: Duration,
    trigger: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
    results: watch::Sender<Option<SyncResult>>,
) where
    S: SyncStore + 'static,
    R: RemoteDataStore + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    let mut online = *connectivity.borrow_and_update();
    let mut watching = true;
    tracing::debug!(online, ?interval, "sync worker started");

    if online {
        drain_once(&engine, &results).await;
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            changed = connectivity.changed(), if watching => {
                if changed.is_err() {
                    tracing::debug!("connectivity channel closed");
                    watching = false;
                    continue;
                }
                let now_online = *connectivity.borrow_and_update();
                if now_online && !online {
                    tracing::info!("connectivity restored, draining sync queue");
                    online = true;
                    drain_once(&engine, &results).await;
                } else {
                    online = now_online;
                }
            }
            _ = ticker.tick() => {
                if online {
                    drain_once(&engine, &results).await;
                }
            }
            () = trigger.notified() => {
                drain_once(&engine, &results).await;
            }
        }
    }

    tracing::debug!("sync worker stopped");
}

async fn drain_once<S, R>(engine: &Arc<SyncEngine<S, R>>, results: &watch::Sender<Option<SyncResult>>)
where
    S: SyncStore + 'static,
    R: RemoteDataStore + 'static,
{
    let engine = Arc::clone(engine);
    match tokio::task::spawn_blocking(move || engine.drain()).await {
        Ok(Ok(result)) => {
            results.send_replace(Some(result));
        }
        Ok(Err(e)) => tracing::error!(error = %e, "background drain failed"),
        Err(e) => tracing::error!(error = %e, "drain task did not complete"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::memory::MemoryRemoteStore;
    use serde_json::json;
    use waypoint_core::{LocalStore, MutationEnqueuer, Schema};

    type Engine = SyncEngine<LocalStore, MemoryRemoteStore>;

    fn engine() -> Arc<Engine> {
        let store = Arc::new(LocalStore::open_in_memory(Schema::new()).unwrap());
        let remote = Arc::new(MemoryRemoteStore::new());
        Arc::new(SyncEngine::new(SyncConfig::default(), store, remote))
    }

    async fn next_result(rx: &mut watch::Receiver<Option<SyncResult>>) -> SyncResult {
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("drain within timeout")
            .unwrap();
        rx.borrow_and_update().clone().unwrap()
    }

    #[tokio::test]
    async fn drains_when_connectivity_returns() {
        let engine = engine();
        let enqueuer = MutationEnqueuer::new(Arc::clone(engine.store()));
        enqueuer.create("notes", json!({ "content": "a" })).unwrap();

        let (online_tx, online_rx) = watch::channel(false);
        let worker = SyncWorker::spawn(Arc::clone(&engine), online_rx, Duration::from_secs(3600));
        let mut results = worker.subscribe();

        online_tx.send(true).unwrap();
        let result = next_result(&mut results).await;
        assert_eq!(result.processed_count, 1);
        assert_eq!(engine.remote().len("notes"), 1);

        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn explicit_trigger_drains() {
        let engine = engine();
        let (_online_tx, online_rx) = watch::channel(false);
        let worker = SyncWorker::spawn(Arc::clone(&engine), online_rx, Duration::from_secs(3600));
        let mut results = worker.subscribe();

        let enqueuer = MutationEnqueuer::new(Arc::clone(engine.store()));
        enqueuer.create("notes", json!({ "content": "a" })).unwrap();
        worker.trigger();

        let result = next_result(&mut results).await;
        assert!(result.success);
        assert_eq!(engine.remote().len("notes"), 1);

        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn interval_drains_while_online() {
        let engine = engine();
        let (_online_tx, online_rx) = watch::channel(true);
        let worker = SyncWorker::spawn(Arc::clone(&engine), online_rx, Duration::from_millis(20));
        let mut results = worker.subscribe();

        // Initial drain on start, then an interval drain picks up new work.
        next_result(&mut results).await;
        let enqueuer = MutationEnqueuer::new(Arc::clone(engine.store()));
        enqueuer.create("notes", json!({ "content": "late" })).unwrap();

        let mut synced = false;
        for _ in 0..20 {
            if next_result(&mut results).await.processed_count == 1 {
                synced = true;
                break;
            }
        }
        assert!(synced);
        worker.shutdown().await.unwrap();
    }
}
