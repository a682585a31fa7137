use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    dao::{
        models::{LedgerEntity, WatchedIdentityEntity},
        record_store::RecordStore,
        storage::StorageResult,
    },
    state::SharedState,
};

/// Write scheduler for the two record collections.
///
/// Scheduling never waits on disk: it replaces the pending snapshot of a collection and
/// wakes its writer. Each collection has exactly one writer task, so writes to the same
/// file never overlap and a burst of changes collapses into the latest snapshot.
pub struct Persistence {
    watched: watch::Sender<Option<Vec<WatchedIdentityEntity>>>,
    ledger: watch::Sender<Option<LedgerEntity>>,
    stop: watch::Sender<bool>,
}

impl Persistence {
    /// Scheduler with no writers attached; scheduled snapshots are simply kept.
    pub fn detached() -> Self {
        let (watched, _) = watch::channel(None);
        let (ledger, _) = watch::channel(None);
        let (stop, _) = watch::channel(false);
        Self {
            watched,
            ledger,
            stop,
        }
    }

    pub fn schedule_watched(&self, records: Vec<WatchedIdentityEntity>) {
        self.watched.send_replace(Some(records));
    }

    pub fn schedule_ledger(&self, ledger: LedgerEntity) {
        self.ledger.send_replace(Some(ledger));
    }

    /// Ask the writers to save what is still pending and exit.
    pub fn stop_writers(&self) {
        self.stop.send_replace(true);
    }
}

/// Start one writer task per collection backed by `store`.
pub fn spawn_writers(store: Arc<dyn RecordStore>) -> (Persistence, Vec<JoinHandle<()>>) {
    let persistence = Persistence::detached();

    let watched_store = store.clone();
    let watched_task = tokio::spawn(run_writer(
        "watched",
        persistence.watched.subscribe(),
        persistence.stop.subscribe(),
        move |records| watched_store.save_watched(records),
    ));
    let ledger_task = tokio::spawn(run_writer(
        "ledger",
        persistence.ledger.subscribe(),
        persistence.stop.subscribe(),
        move |ledger| store.save_ledger(ledger),
    ));

    (persistence, vec![watched_task, ledger_task])
}

async fn run_writer<T, F>(
    collection: &'static str,
    mut pending: watch::Receiver<Option<T>>,
    mut stop: watch::Receiver<bool>,
    save: F,
) where
    T: Clone + Send + Sync,
    F: Fn(T) -> BoxFuture<'static, StorageResult<()>>,
{
    loop {
        tokio::select! {
            changed = pending.changed() => {
                if changed.is_err() {
                    break;
                }
                save_latest(collection, &mut pending, &save).await;
            }
            stopped = stop.changed() => {
                let stopped = stopped.is_err() || *stop.borrow();
                if stopped {
                    if pending.has_changed().unwrap_or(false) {
                        save_latest(collection, &mut pending, &save).await;
                    }
                    break;
                }
            }
        }
    }
    debug!(collection, "persistence writer stopped");
}

async fn save_latest<T, F>(
    collection: &'static str,
    pending: &mut watch::Receiver<Option<T>>,
    save: &F,
) where
    T: Clone + Send + Sync,
    F: Fn(T) -> BoxFuture<'static, StorageResult<()>>,
{
    let Some(snapshot) = pending.borrow_and_update().clone() else {
        return;
    };
    match save(snapshot).await {
        Ok(()) => debug!(collection, "collection saved"),
        // The in-memory state stays authoritative; the next schedule retries.
        Err(err) => warn!(collection, error = %err, "failed to save collection"),
    }
}

/// Re-schedule both collections every `interval`.
pub async fn run_periodic_flush(state: SharedState, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; startup state was just loaded.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let registry = state.registry().read().await;
        state.persist_watched(&registry);
        state.persist_ledger(&registry);
        debug!("periodic flush scheduled");
    }
}

/// Write both collections once and wait for completion.
pub async fn flush_now(state: &SharedState, store: &dyn RecordStore) {
    let (watched, ledger) = {
        let registry = state.registry().read().await;
        (
            registry.presence.to_entities(),
            registry.ledger.to_entity(),
        )
    };

    let count = watched.len();
    match store.save_watched(watched).await {
        Ok(()) => info!(count, "flushed watch list"),
        Err(err) => warn!(error = %err, "failed to flush watch list"),
    }
    match store.save_ledger(ledger).await {
        Ok(()) => info!("flushed ledger"),
        Err(err) => warn!(error = %err, "failed to flush ledger"),
    }
}
