//! Read operations backing the web front end: current readings, alarm state,
//! channel names and history.

use crate::{
    state::StateReader,
    store::{self, HistoryQuery, Selection, StoreError, TimeSeriesStore},
};
use chrono::{DateTime, TimeDelta, Utc};
use plantmon_sensor_data::{
    AlarmVector, ChannelId, ChannelLabels, HistoryResponse, InvalidChannel, SensorsResponse,
};
use thiserror::Error;

pub(crate) const DEFAULT_HISTORY_COUNT: usize = 1000;

/// `sensor` value selecting every channel.
const ALL_CHANNELS: i64 = -1;

#[derive(Debug, Error)]
pub(crate) enum QueryError {
    #[error("{0}")]
    InvalidChannel(#[from] InvalidChannel),

    #[error("Parameter {name} must be an integer, got {value:?}")]
    NotAnInteger { name: &'static str, value: String },

    #[error("Parameter {name} must not be negative, got {value}")]
    Negative { name: &'static str, value: i64 },

    #[error("{0}")]
    Store(#[from] StoreError),
}

/// Raw `history` request parameters, as received.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct HistoryParams<'a> {
    pub(crate) sensor: Option<&'a str>,
    pub(crate) cnt: Option<&'a str>,
    pub(crate) dt: Option<&'a str>,
}

fn parse_integer(name: &'static str, value: &str) -> Result<i64, QueryError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| QueryError::NotAnInteger {
            name,
            value: value.to_owned(),
        })
}

fn parse_non_negative(name: &'static str, value: &str) -> Result<u64, QueryError> {
    let parsed = parse_integer(name, value)?;
    u64::try_from(parsed).map_err(|_| QueryError::Negative {
        name,
        value: parsed,
    })
}

impl TryFrom<HistoryParams<'_>> for HistoryQuery {
    type Error = QueryError;

    fn try_from(params: HistoryParams<'_>) -> Result<Self, Self::Error> {
        let selection = match params.sensor {
            None => Selection::All,
            Some(sensor) => match parse_integer("sensor", sensor)? {
                ALL_CHANNELS => Selection::All,
                channel => Selection::Channel(ChannelId::try_from(channel)?),
            },
        };

        let max_count = match params.cnt {
            None => DEFAULT_HISTORY_COUNT,
            Some(cnt) => parse_non_negative("cnt", cnt)? as usize,
        };

        let since = params
            .dt
            .map(|dt| parse_non_negative("dt", dt))
            .transpose()?
            .map(|secs| TimeDelta::seconds(secs.min(i64::MAX as u64 / 1000) as i64));

        Ok(Self {
            selection,
            max_count,
            since,
        })
    }
}

pub(crate) fn history(
    store: &dyn TimeSeriesStore,
    params: HistoryParams<'_>,
    now: DateTime<Utc>,
) -> Result<HistoryResponse, QueryError> {
    let query = HistoryQuery::try_from(params)?;
    Ok(store::query(store, &query, now)?)
}

/// Live readings of a running monitor. History is served from the store by
/// [`history`].
#[derive(Clone)]
pub(crate) struct ReadSurface {
    state: StateReader,
    labels: ChannelLabels,
}

impl ReadSurface {
    pub(crate) fn new(state: StateReader, labels: ChannelLabels) -> Self {
        Self { state, labels }
    }

    pub(crate) fn sensors(&self) -> SensorsResponse {
        SensorsResponse::from(&self.state.current().snapshot)
    }

    pub(crate) fn alarms(&self) -> AlarmVector {
        self.state.current().alarms
    }

    pub(crate) fn sensor_names(&self) -> Vec<String> {
        self.labels.to_vec()
    }
}
