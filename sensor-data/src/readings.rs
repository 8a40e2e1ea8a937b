use crate::{ChannelId, ChannelValues, TimeMillis, CHANNEL_COUNT};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The most recent calibrated reading of every channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSnapshot {
    /// Time of the last successfully parsed response.
    pub timestamp: DateTime<Utc>,
    pub values: ChannelValues,
}

impl SensorSnapshot {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: [0.0; CHANNEL_COUNT],
        }
    }
}

/// Alarm state of every channel, `true` meaning the channel is in alarm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmVector([bool; CHANNEL_COUNT]);

impl AlarmVector {
    pub const fn new(alarms: [bool; CHANNEL_COUNT]) -> Self {
        Self(alarms)
    }

    pub fn is_alarming(&self, channel: ChannelId) -> bool {
        self.0[channel.index()]
    }

    pub fn set(&mut self, channel: ChannelId, alarming: bool) {
        self.0[channel.index()] = alarming;
    }

    /// True if any channel is in alarm.
    pub fn any(&self) -> bool {
        self.0.iter().any(|a| *a)
    }

    /// Channels currently in alarm, in ascending order.
    pub fn alarming(&self) -> impl Iterator<Item = ChannelId> + '_ {
        ChannelId::all().filter(|c| self.is_alarming(*c))
    }

    pub fn as_array(&self) -> [bool; CHANNEL_COUNT] {
        self.0
    }
}

/// A persisted snapshot. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp_millis: TimeMillis,
    pub values: ChannelValues,
}

impl LogRecord {
    pub fn value(&self, channel: ChannelId) -> f64 {
        self.values[channel.index()]
    }
}

impl From<&SensorSnapshot> for LogRecord {
    fn from(value: &SensorSnapshot) -> Self {
        Self {
            timestamp_millis: value.timestamp.timestamp_millis(),
            values: value.values,
        }
    }
}
