use chrono::{DateTime, TimeDelta, Utc};
use plantmon_sensor_data::{
    ChannelId, HistoryPoint, HistoryResponse, LogRecord, TimeMillis, CHANNEL_COUNT,
};
use thiserror::Error;

pub(crate) mod file;
pub(crate) mod memory;

pub(crate) use self::{file::FileStore, memory::MemoryStore};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode record: {0}")]
    Encode(#[from] postcard::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Append-only storage of snapshots.
///
/// Implementations must not hold a lock across a whole query: `records`
/// returns a copy so that appends are never blocked by a slow reader.
pub(crate) trait TimeSeriesStore: Send + Sync {
    /// Durably stores a record. Records are never modified afterwards.
    fn append(&self, record: LogRecord) -> Result<(), StoreError>;

    /// Every stored record in insertion order.
    fn records(&self) -> Result<Vec<LogRecord>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Selection {
    All,
    Channel(ChannelId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HistoryQuery {
    pub(crate) selection: Selection,
    /// Upper bound on the number of records considered.
    pub(crate) max_count: usize,
    /// Only records no older than this are considered.
    pub(crate) since: Option<TimeDelta>,
}

pub(crate) fn query(
    store: &dyn TimeSeriesStore,
    query: &HistoryQuery,
    now: DateTime<Utc>,
) -> Result<HistoryResponse, StoreError> {
    let cutoff = query.since.map(|since| {
        now.checked_sub_signed(since)
            .map_or(TimeMillis::MIN, |t| t.timestamp_millis())
    });
    let records = select(store.records()?, query.max_count, cutoff);

    Ok(match query.selection {
        Selection::Channel(channel) => HistoryResponse::Channel(series(&records, channel)),
        Selection::All => {
            let mut all: [Vec<HistoryPoint>; CHANNEL_COUNT] = Default::default();
            for channel in ChannelId::all() {
                all[channel.index()] = series(&records, channel);
            }
            HistoryResponse::All(all)
        }
    })
}

/// Picks the newest `max_count` records at or after `cutoff`.
fn select(
    mut records: Vec<LogRecord>,
    max_count: usize,
    cutoff: Option<TimeMillis>,
) -> Vec<LogRecord> {
    if let Some(cutoff) = cutoff {
        records.retain(|r| r.timestamp_millis >= cutoff);
    }

    // Newest first, and the later write first among equal timestamps
    records.reverse();
    records.sort_by(|a, b| b.timestamp_millis.cmp(&a.timestamp_millis));
    records.truncate(max_count);

    // Oldest first, equal timestamps back in insertion order
    records.reverse();
    records
}

fn series(records: &[LogRecord], channel: ChannelId) -> Vec<HistoryPoint> {
    let mut points: Vec<HistoryPoint> = records
        .iter()
        .map(|r| (r.timestamp_millis, r.value(channel)))
        .collect();
    points.sort_by_key(|p| p.0);
    points
}
