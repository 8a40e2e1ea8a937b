use chrono::{DateTime, Utc};
use plantmon_sensor_data::{AlarmVector, SensorSnapshot};
use tokio::sync::watch;

/// Everything the sampling task publishes in one step.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MonitorState {
    pub(crate) snapshot: SensorSnapshot,
    pub(crate) alarms: AlarmVector,
    /// Successfully parsed responses since startup.
    pub(crate) samples: u64,
}

impl MonitorState {
    pub(crate) fn new(started: DateTime<Utc>) -> Self {
        Self {
            snapshot: SensorSnapshot::new(started),
            alarms: AlarmVector::default(),
            samples: 0,
        }
    }
}

/// Write side of the shared state. Owned by the sampling task only.
pub(crate) struct StatePublisher {
    tx: watch::Sender<MonitorState>,
}

/// Read side of the shared state. Every read sees a complete published state.
#[derive(Clone)]
pub(crate) struct StateReader {
    rx: watch::Receiver<MonitorState>,
}

pub(crate) fn shared_state(initial: MonitorState) -> (StatePublisher, StateReader) {
    let (tx, rx) = watch::channel(initial);
    (StatePublisher { tx }, StateReader { rx })
}

impl StatePublisher {
    pub(crate) fn current(&self) -> MonitorState {
        self.tx.borrow().clone()
    }

    pub(crate) fn publish(&self, state: MonitorState) {
        self.tx.send_replace(state);
    }
}

impl StateReader {
    pub(crate) fn current(&self) -> MonitorState {
        self.rx.borrow().clone()
    }
}
