pub mod channel;
pub mod readings;
pub mod responses;

pub use self::{
    channel::{ChannelId, ChannelLabels, ChannelValues, InvalidChannel, LabelCount, CHANNEL_COUNT},
    readings::{AlarmVector, LogRecord, SensorSnapshot},
    responses::{HistoryPoint, HistoryResponse, SensorsResponse},
};

/// Milliseconds since the Unix epoch.
pub type TimeMillis = i64;
