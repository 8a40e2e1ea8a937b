use plantmon_sensor_data::{AlarmVector, ChannelLabels};
use serde::Serialize;
use std::{future::Future, time::Duration};
use thiserror::Error;
use tokio::{
    sync::mpsc::{unbounded_channel, UnboundedSender},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub(crate) const ALARM_TITLE: &str = "PLANT ALARM";
pub(crate) const CLEARED_TITLE: &str = "Alarms Cleared";

const APP_NAME: &str = "PlantMon";
const PUSHBULLET_PUSHES_URL: &str = "https://api.pushbullet.com/v2/pushes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Notification {
    pub(crate) title: String,
    pub(crate) body: String,
}

impl Notification {
    /// Builds the single notification describing a change of alarm state, or
    /// `None` if no channel changed.
    pub(crate) fn for_transition(
        prior: &AlarmVector,
        new: &AlarmVector,
        labels: &ChannelLabels,
    ) -> Option<Self> {
        if prior == new {
            return None;
        }

        Some(if new.any() {
            let plants: Vec<&str> = new.alarming().map(|c| labels.get(c)).collect();
            Self {
                title: ALARM_TITLE.to_owned(),
                body: format!("The following sensors are in alarm: {}", plants.join(", ")),
            }
        } else {
            Self {
                title: CLEARED_TITLE.to_owned(),
                body: "All plant alarms have been cleared!".to_owned(),
            }
        })
    }
}

#[derive(Debug, Error)]
pub(crate) enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification rejected with status {0}")]
    Rejected(reqwest::StatusCode),
}

/// Delivers a notification to the operator. Delivery is attempted once.
pub(crate) trait Notifier: Send + Sync + 'static {
    fn send(
        &self,
        notification: &Notification,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Only writes notifications to the log.
pub(crate) struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!("{APP_NAME}: {}: {}", notification.title, notification.body);
        Ok(())
    }
}

#[derive(Serialize)]
struct PushNote<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    title: String,
    body: &'a str,
}

pub(crate) struct PushbulletNotifier {
    client: reqwest::Client,
    token: String,
}

impl PushbulletNotifier {
    pub(crate) fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }
}

impl Notifier for PushbulletNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let note = PushNote {
            kind: "note",
            title: format!("{APP_NAME}: {}", notification.title),
            body: &notification.body,
        };

        let response = self
            .client
            .post(PUSHBULLET_PUSHES_URL)
            .header("Access-Token", &self.token)
            .json(&note)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(response.status()))
        }
    }
}

/// The notifier selected at startup.
pub(crate) enum AnyNotifier {
    Log(LogNotifier),
    Pushbullet(PushbulletNotifier),
}

impl Notifier for AnyNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        match self {
            Self::Log(n) => n.send(notification).await,
            Self::Pushbullet(n) => n.send(notification).await,
        }
    }
}

pub(crate) type NotificationSender = UnboundedSender<Notification>;

/// Runs notification delivery on its own task so a slow or unreachable
/// notifier never holds up sampling. Each delivery is bounded by `timeout`.
///
/// The task ends once every sender has been dropped and the queue is drained.
pub(crate) fn spawn_dispatcher<N: Notifier>(
    notifier: N,
    timeout: Duration,
) -> (NotificationSender, JoinHandle<()>) {
    let (tx, mut rx) = unbounded_channel::<Notification>();

    let handle = tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            warn!(">>> {}: {}", notification.title, notification.body);

            match tokio::time::timeout(timeout, notifier.send(&notification)).await {
                Ok(Ok(())) => info!("Push status: success"),
                Ok(Err(e)) => warn!("Push status: failed ({e})"),
                Err(_) => warn!("Push status: failed (no result after {timeout:?})"),
            }
        }

        debug!("Notification dispatcher stopped");
    });

    (tx, handle)
}
