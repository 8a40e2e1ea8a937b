use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The number of moisture channels on the sensor array.
pub const CHANNEL_COUNT: usize = 6;

/// One value per channel, indexed by [`ChannelId::index`].
pub type ChannelValues = [f64; CHANNEL_COUNT];

const DEFAULT_LABELS: [&str; CHANNEL_COUNT] =
    ["Tomatoes", "Grape Vines", "Petunias", "Grass", "Spruce", "?"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Channel {0} does not exist (expected 0 to 5)")]
pub struct InvalidChannel(pub i64);

/// Index of a sensor channel, always in `0..CHANNEL_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ChannelId(u8);

impl ChannelId {
    pub fn new(index: usize) -> Result<Self, InvalidChannel> {
        if index < CHANNEL_COUNT {
            Ok(Self(index as u8))
        } else {
            Err(InvalidChannel(index as i64))
        }
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// All channels in ascending order.
    pub fn all() -> impl Iterator<Item = ChannelId> {
        (0..CHANNEL_COUNT as u8).map(ChannelId)
    }
}

impl TryFrom<i64> for ChannelId {
    type Error = InvalidChannel;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (0..CHANNEL_COUNT as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(InvalidChannel(value))
        }
    }
}

impl TryFrom<u8> for ChannelId {
    type Error = InvalidChannel;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from(value as i64)
    }
}

impl From<ChannelId> for u8 {
    fn from(value: ChannelId) -> Self {
        value.0
    }
}

impl core::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Expected {CHANNEL_COUNT} channel labels, got {0}")]
pub struct LabelCount(pub usize);

/// Human readable names of the channels, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelLabels([String; CHANNEL_COUNT]);

impl ChannelLabels {
    pub fn get(&self, channel: ChannelId) -> &str {
        &self.0[channel.index()]
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.to_vec()
    }
}

impl Default for ChannelLabels {
    fn default() -> Self {
        Self(DEFAULT_LABELS.map(str::to_owned))
    }
}

impl TryFrom<Vec<String>> for ChannelLabels {
    type Error = LabelCount;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        let len = value.len();
        value.try_into().map(Self).map_err(|_| LabelCount(len))
    }
}
