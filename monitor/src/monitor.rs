use crate::{
    api::ReadSurface,
    config::MonitorConfig,
    notify::{spawn_dispatcher, Notifier},
    sampling::Sampler,
    serial::SerialLink,
    snapshot::Snapshotter,
    state::{shared_state, MonitorState},
    store::TimeSeriesStore,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{watch, Notify},
    task::JoinHandle,
};
use tracing::{info, warn};

/// A running monitor: the sampling, snapshot and notification tasks.
pub(crate) struct Monitor {
    surface: ReadSurface,
    shutdown: watch::Sender<bool>,
    sampling: JoinHandle<()>,
    snapshots: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

pub(crate) fn start<S, N>(
    link: SerialLink<S>,
    store: Arc<dyn TimeSeriesStore>,
    notifier: N,
    config: &MonitorConfig,
) -> Monitor
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    N: Notifier,
{
    let (publisher, reader) = shared_state(MonitorState::new(Utc::now()));
    let (notifications, dispatcher) = spawn_dispatcher(notifier, config.notify_timeout);
    let persist_now = Arc::new(Notify::new());
    let (shutdown, shutdown_rx) = watch::channel(false);

    let surface = ReadSurface::new(reader.clone(), config.labels.clone());

    let sampler = Sampler::new(
        link,
        config.calibrator.clone(),
        config.thresholds,
        config.labels.clone(),
        publisher,
        notifications,
        persist_now.clone(),
    );
    let sampling = tokio::spawn(sampler.run(config.poll_period, shutdown_rx.clone()));

    let snapshotter = Snapshotter::new(store, reader, persist_now);
    let snapshots = tokio::spawn(snapshotter.run(config.snapshot_period, shutdown_rx));

    info!(
        "Monitor started, polling every {:?}, logging every {:?}",
        config.poll_period, config.snapshot_period
    );
    info!("Channels: {}", surface.sensor_names().join(", "));

    Monitor {
        surface,
        shutdown,
        sampling,
        snapshots,
        dispatcher,
    }
}

impl Monitor {
    pub(crate) fn surface(&self) -> &ReadSurface {
        &self.surface
    }

    /// Stops both loops, then waits for queued notifications to be delivered.
    pub(crate) async fn stop(self) {
        info!("Stopping monitor");
        let _ = self.shutdown.send(true);

        for (name, task) in [("sampling", self.sampling), ("snapshot", self.snapshots)] {
            if let Err(e) = task.await {
                warn!("The {name} task failed: {e}");
            }
        }

        // The sampler owned the last notification sender, so the dispatcher
        // drains its queue and ends
        if let Err(e) = self.dispatcher.await {
            warn!("The notification task failed: {e}");
        }

        info!("Monitor stopped");
    }
}
