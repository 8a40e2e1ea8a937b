use crate::{
    alarm::AlarmThresholds,
    calibrate::{CalibrationError, Calibrator},
    notify::{Notification, NotificationSender},
    serial::{LinkError, SerialLink},
    state::StatePublisher,
};
use chrono::{DateTime, Utc};
use plantmon_sensor_data::{ChannelLabels, SensorSnapshot, CHANNEL_COUNT};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{watch, Notify},
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub(crate) enum TickError {
    #[error("{0}")]
    Link(#[from] LinkError),

    #[error("{0}")]
    Calibration(#[from] CalibrationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    /// The sensors answered with an empty line, nothing was updated.
    NoResponse,
    Sampled { notified: bool },
}

/// The fast loop: polls the sensors, calibrates, evaluates alarms and
/// publishes the result.
pub(crate) struct Sampler<S> {
    link: SerialLink<S>,
    calibrator: Calibrator,
    thresholds: AlarmThresholds,
    labels: ChannelLabels,
    state: StatePublisher,
    notifications: NotificationSender,
    persist_now: Arc<Notify>,
}

impl<S: AsyncRead + AsyncWrite> Sampler<S> {
    pub(crate) fn new(
        link: SerialLink<S>,
        calibrator: Calibrator,
        thresholds: AlarmThresholds,
        labels: ChannelLabels,
        state: StatePublisher,
        notifications: NotificationSender,
        persist_now: Arc<Notify>,
    ) -> Self {
        Self {
            link,
            calibrator,
            thresholds,
            labels,
            state,
            notifications,
            persist_now,
        }
    }

    pub(crate) async fn tick(&mut self) -> Result<TickOutcome, TickError> {
        let line = self.link.query().await?;

        if line.is_empty() {
            return Ok(TickOutcome::NoResponse);
        }

        self.apply(&line, Utc::now())
    }

    /// Applies one non-empty response line. Nothing is published unless the
    /// whole line was accepted.
    fn apply(&mut self, line: &str, now: DateTime<Utc>) -> Result<TickOutcome, TickError> {
        let mut state = self.state.current();

        let calibrated = self
            .calibrator
            .calibrate_line(line, &state.snapshot.values)?;
        if calibrated.received < CHANNEL_COUNT {
            warn!(
                "Only {} of {CHANNEL_COUNT} channels received, keeping previous values for the rest",
                calibrated.received
            );
        }

        let alarms = self.thresholds.evaluate(&calibrated.values, &state.alarms);
        let notification = Notification::for_transition(&state.alarms, &alarms, &self.labels);

        state.snapshot = SensorSnapshot {
            timestamp: now,
            values: calibrated.values,
        };
        state.alarms = alarms;
        state.samples = state.samples.saturating_add(1);
        let first = state.samples == 1;

        debug!("Sampled {:?}, alarms {:?}", state.snapshot.values, state.alarms);
        self.state.publish(state);

        let notified = match notification {
            Some(notification) => {
                if self.notifications.send(notification).is_err() {
                    warn!("Notification dispatcher is not running");
                }
                true
            }
            None => false,
        };

        if first {
            info!("First sample received, requesting a snapshot");
            self.persist_now.notify_one();
        }

        Ok(TickOutcome::Sampled { notified })
    }

    /// Polls every `period` until `shutdown` becomes true. A poll in progress
    /// is always completed before stopping.
    pub(crate) async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = ticker.tick() => {}
            }

            match self.tick().await {
                Ok(TickOutcome::NoResponse) => debug!("Empty response from sensors"),
                Ok(TickOutcome::Sampled { .. }) => {}
                Err(TickError::Link(LinkError::Timeout)) => {
                    debug!("No response from sensors")
                }
                Err(e) => warn!("Sampling failed: {e}"),
            }
        }

        info!("Sampling stopped");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        notify::{ALARM_TITLE, CLEARED_TITLE},
        state::{shared_state, MonitorState, StateReader},
    };
    use tokio::{
        io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream},
        sync::mpsc::{unbounded_channel, UnboundedReceiver},
        task::JoinHandle,
    };

    const WET: &str = "0,0,0,0,0,0";
    const DRY: &str = "1024,1024,1024,1024,1024,1024";
    const MID: &str = "512,512,512,512,512,512";

    /// Answers each query with the next scripted line; `None` stays silent.
    fn spawn_device(
        mut device: DuplexStream,
        script: Vec<Option<&'static str>>,
    ) -> JoinHandle<DuplexStream> {
        tokio::spawn(async move {
            for response in script {
                let mut command = [0u8; 1];
                device.read_exact(&mut command).await.unwrap();
                assert_eq!(&command, b"q");

                if let Some(line) = response {
                    device.write_all(line.as_bytes()).await.unwrap();
                    device.write_all(b"\r\n").await.unwrap();
                }
            }
            device
        })
    }

    struct Harness {
        sampler: Sampler<DuplexStream>,
        state: StateReader,
        notifications: UnboundedReceiver<Notification>,
        persist_now: Arc<Notify>,
        device: JoinHandle<DuplexStream>,
    }

    fn harness(script: Vec<Option<&'static str>>) -> Harness {
        let (host, device) = duplex(256);
        let device = spawn_device(device, script);

        let (publisher, state) =
            shared_state(MonitorState::new(DateTime::from_timestamp(0, 0).unwrap()));
        let (tx, notifications) = unbounded_channel();
        let persist_now = Arc::new(Notify::new());

        let sampler = Sampler::new(
            SerialLink::new(host, Duration::from_secs(5)),
            Calibrator::default(),
            AlarmThresholds::default(),
            ChannelLabels::default(),
            publisher,
            tx,
            persist_now.clone(),
        );

        Harness {
            sampler,
            state,
            notifications,
            persist_now,
            device,
        }
    }

    async fn was_notified(notify: &Notify) -> bool {
        tokio::time::timeout(Duration::from_millis(1), notify.notified())
            .await
            .is_ok()
    }

    #[tokio::test(start_paused = true)]
    async fn sample_updates_state() {
        let mut h = harness(vec![Some(MID)]);

        let outcome = h.sampler.tick().await.unwrap();
        assert_eq!(outcome, TickOutcome::Sampled { notified: false });

        let state = h.state.current();
        assert_eq!(state.snapshot.values, [60.0; CHANNEL_COUNT]);
        assert_eq!(state.samples, 1);
        assert!(state.snapshot.timestamp > DateTime::from_timestamp(0, 0).unwrap());
        assert!(!state.alarms.any());

        h.device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn empty_response_changes_nothing() {
        let mut h = harness(vec![Some(MID), Some("")]);

        h.sampler.tick().await.unwrap();
        let before = h.state.current();

        let outcome = h.sampler.tick().await.unwrap();
        assert_eq!(outcome, TickOutcome::NoResponse);
        assert_eq!(h.state.current(), before);

        h.device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_changes_nothing() {
        let mut h = harness(vec![Some(DRY), None]);

        h.sampler.tick().await.unwrap();
        let before = h.state.current();

        assert!(matches!(
            h.sampler.tick().await,
            Err(TickError::Link(LinkError::Timeout))
        ));
        assert_eq!(h.state.current(), before);

        h.device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_response_changes_nothing() {
        let mut h = harness(vec![Some(MID), Some("512,oops,512,512,512,512")]);

        h.sampler.tick().await.unwrap();
        let before = h.state.current();

        assert!(matches!(
            h.sampler.tick().await,
            Err(TickError::Calibration(_))
        ));
        assert_eq!(h.state.current(), before);

        h.device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn only_first_sample_requests_a_snapshot() {
        let mut h = harness(vec![Some(""), Some(MID), Some(MID)]);

        h.sampler.tick().await.unwrap();
        assert!(!was_notified(&h.persist_now).await);

        h.sampler.tick().await.unwrap();
        assert!(was_notified(&h.persist_now).await);

        h.sampler.tick().await.unwrap();
        assert!(!was_notified(&h.persist_now).await);

        h.device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn one_notification_per_transition() {
        let mut h = harness(vec![
            Some(WET),
            Some(DRY),
            Some(DRY),
            Some(MID),
            Some(WET),
            Some(WET),
        ]);

        let mut notified = Vec::new();
        for _ in 0..6 {
            match h.sampler.tick().await.unwrap() {
                TickOutcome::Sampled { notified: n } => notified.push(n),
                TickOutcome::NoResponse => panic!("unexpected empty response"),
            }
        }
        assert_eq!(notified, vec![false, true, false, false, true, false]);

        let alarm = h.notifications.recv().await.unwrap();
        assert_eq!(alarm.title, ALARM_TITLE);
        assert_eq!(
            alarm.body,
            "The following sensors are in alarm: Tomatoes, Grape Vines, Petunias, Grass, Spruce, ?"
        );

        let cleared = h.notifications.recv().await.unwrap();
        assert_eq!(cleared.title, CLEARED_TITLE);

        assert!(h.notifications.try_recv().is_err());

        h.device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn short_response_keeps_remaining_channels() {
        let mut h = harness(vec![Some(MID), Some("1024,1024")]);

        h.sampler.tick().await.unwrap();
        h.sampler.tick().await.unwrap();

        let state = h.state.current();
        assert_eq!(state.snapshot.values, [0.0, 0.0, 60.0, 60.0, 60.0, 60.0]);
        assert_eq!(
            state.alarms.as_array(),
            [true, true, false, false, false, false]
        );

        let n = h.notifications.recv().await.unwrap();
        assert_eq!(n.body, "The following sensors are in alarm: Tomatoes, Grape Vines");

        h.device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn loop_survives_failures_and_stops_on_shutdown() {
        let h = harness(vec![Some("garbage"), None, Some(MID)]);
        let (stop_tx, stop_rx) = watch::channel(false);

        let running = tokio::spawn(h.sampler.run(Duration::from_secs(2), stop_rx));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.state.current().samples, 1);
        assert_eq!(h.state.current().snapshot.values, [60.0; CHANNEL_COUNT]);

        stop_tx.send(true).unwrap();
        running.await.unwrap();

        // Sampler dropped with the task, so the serial handle is released
        let mut device = h.device.await.unwrap();
        let mut rest = Vec::new();
        device.read_to_end(&mut rest).await.unwrap();
    }
}
