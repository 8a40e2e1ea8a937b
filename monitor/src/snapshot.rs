use crate::{
    state::StateReader,
    store::{StoreError, TimeSeriesStore},
};
use plantmon_sensor_data::LogRecord;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    sync::{watch, Notify},
    task::JoinError,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub(crate) enum SnapshotError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("Store task failed: {0}")]
    Task(#[from] JoinError),
}

/// The slow loop: copies the current snapshot into the store.
pub(crate) struct Snapshotter {
    store: Arc<dyn TimeSeriesStore>,
    state: StateReader,
    persist_now: Arc<Notify>,
}

impl Snapshotter {
    pub(crate) fn new(
        store: Arc<dyn TimeSeriesStore>,
        state: StateReader,
        persist_now: Arc<Notify>,
    ) -> Self {
        Self {
            store,
            state,
            persist_now,
        }
    }

    /// Appends the current snapshot. Returns `None` if nothing has been
    /// sampled yet.
    pub(crate) async fn snapshot(&self) -> Result<Option<LogRecord>, SnapshotError> {
        let current = self.state.current();
        if current.samples == 0 {
            return Ok(None);
        }

        let record = LogRecord::from(&current.snapshot);

        // File writes block, keep them off the async workers
        let store = self.store.clone();
        let appended = record.clone();
        tokio::task::spawn_blocking(move || store.append(appended)).await??;

        Ok(Some(record))
    }

    /// Persists every `period`, and additionally whenever a snapshot is
    /// requested, until `shutdown` becomes true.
    pub(crate) async fn run(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = ticker.tick() => debug!("Snapshot period elapsed"),
                _ = self.persist_now.notified() => debug!("Snapshot requested"),
            }

            match self.snapshot().await {
                Ok(Some(record)) => info!("Logged snapshot {:?}", record.values),
                Ok(None) => debug!("Nothing sampled yet, skipping snapshot"),
                Err(e) => warn!("Failed to log snapshot: {e}"),
            }
        }

        info!("Snapshots stopped");
    }
}
